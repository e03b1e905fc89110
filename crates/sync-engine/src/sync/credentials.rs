//! Keeps each account's calendar access credential valid.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared_types::Account;

use crate::error::{CredentialError, TokenError};
use crate::providers::CalendarProvider;
use crate::store::Store;

pub struct CredentialManager {
    store: Arc<dyn Store>,
    calendar: Arc<dyn CalendarProvider>,
    refresh_margin: Duration,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn Store>,
        calendar: Arc<dyn CalendarProvider>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            store,
            calendar,
            refresh_margin,
        }
    }

    /// Return a usable access credential for `account`.
    ///
    /// A stored credential that outlives the refresh margin is returned as
    /// is. Otherwise the refresh credential is exchanged; when that is
    /// impossible the account is deauthorized before the error is returned.
    pub async fn ensure_access_token(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        if let Some(token) = self.stored_token(account, now) {
            return Ok(token);
        }

        let Some(refresh_token) = account.refresh_token.as_deref() else {
            self.deauthorize(account, "no refresh credential").await;
            return Err(CredentialError::NoRefreshToken);
        };

        let refreshed = self
            .calendar
            .refresh_access_token(refresh_token)
            .await
            .and_then(|grant| {
                let expires_at = expiry_after(now, grant.expires_in_secs)?;
                Ok((grant, expires_at))
            });

        match refreshed {
            Ok((grant, expires_at)) => {
                if let Err(e) = self
                    .store
                    .update_credentials(account.id, &grant.access_token, expires_at)
                    .await
                {
                    // The fresh token is still good for this tick.
                    tracing::warn!(account_id = %account.id, error = %e, "failed to persist refreshed credential");
                }

                tracing::info!(account_id = %account.id, %expires_at, "refreshed access credential");
                Ok(grant.access_token)
            }
            Err(e) => {
                self.deauthorize(account, "refresh failed").await;
                Err(CredentialError::RefreshFailed(e))
            }
        }
    }

    /// Deauthorize after an upstream 401/403.
    pub async fn revoke(&self, account: &Account) {
        self.deauthorize(account, "calendar provider rejected credentials")
            .await;
    }

    fn stored_token(&self, account: &Account, now: DateTime<Utc>) -> Option<String> {
        let token = account.access_token.as_deref().filter(|t| !t.is_empty())?;
        let expires_at = account.token_expires_at?;

        (expires_at > now + self.refresh_margin).then(|| token.to_string())
    }

    async fn deauthorize(&self, account: &Account, reason: &str) {
        tracing::warn!(account_id = %account.id, reason, "deauthorizing calendar");

        if let Err(e) = self.store.deauthorize(account.id).await {
            tracing::error!(account_id = %account.id, error = %e, "failed to deauthorize account");
        }
    }
}

/// Absolute expiry for a grant lasting `expires_in_secs`. Non-positive or
/// unrepresentable lifetimes are rejected as a malformed token response.
fn expiry_after(now: DateTime<Utc>, expires_in_secs: i64) -> Result<DateTime<Utc>, TokenError> {
    if expires_in_secs <= 0 {
        return Err(TokenError::Decode(format!(
            "non-positive expires_in: {expires_in_secs}"
        )));
    }

    Duration::try_seconds(expires_in_secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| TokenError::Decode(format!("expires_in out of range: {expires_in_secs}")))
}
