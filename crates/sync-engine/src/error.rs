//! Error types for the sync engine.
//!
//! Each collaborator seam has its own error so callers can tell an
//! authorization failure (deauthorize the account) from a transient one
//! (retry next tick). Only `TickError` ever escapes `run_tick`.

use thiserror::Error;

/// Failure exchanging a refresh credential at the token endpoint.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token endpoint unreachable: {0}")]
    Network(#[source] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token response did not include an access token")]
    MissingToken,

    #[error("invalid token response: {0}")]
    Decode(String),
}

/// Why no access credential is available for an account.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("account has no refresh credential")]
    NoRefreshToken,

    #[error("refresh failed: {0}")]
    RefreshFailed(#[from] TokenError),
}

/// Failure fetching calendar events.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("calendar provider rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("calendar provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("calendar provider unreachable: {0}")]
    Network(#[source] reqwest::Error),

    #[error("invalid calendar response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Build the error for a non-success HTTP status, folding 401/403 into
    /// `Unauthorized`.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => FetchError::Unauthorized { status },
            _ => FetchError::Status { status, body },
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, FetchError::Unauthorized { .. })
    }
}

/// Failure asking the bot-deployment provider to join a meeting.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("bot provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("bot provider unreachable: {0}")]
    Network(#[source] reqwest::Error),

    #[error("invalid bot provider response: {0}")]
    Decode(String),

    #[error("bot provider response did not include a bot id")]
    MissingBotId,
}

/// Failure reconciling a single account.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("calendar access revoked: {0}")]
    UpstreamAuth(#[source] FetchError),

    #[error("calendar fetch failed: {0}")]
    TransientFetch(#[source] FetchError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<FetchError> for ReconcileError {
    fn from(err: FetchError) -> Self {
        if err.is_auth_failure() {
            ReconcileError::UpstreamAuth(err)
        } else {
            ReconcileError::TransientFetch(err)
        }
    }
}

/// Failure of a whole tick. Per-account and per-meeting failures never
/// surface here.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("store unavailable: {0}")]
    Store(#[from] anyhow::Error),
}
