//! Tick orchestration: credentials, reconciliation, then dispatch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use shared_types::Account;

use crate::config::EngineConfig;
use crate::error::{ReconcileError, TickError};
use crate::providers::{BotDeployer, CalendarProvider};
use crate::store::Store;
use crate::sync::{BotDispatcher, CalendarReconciler, CredentialManager, ReconcileStats};

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accounts_seen: usize,
    pub accounts_synced: usize,
    pub accounts_skipped: usize,
    pub accounts_deauthorized: usize,
    pub meetings_created: usize,
    pub meetings_updated: usize,
    pub meetings_deleted: usize,
    pub events_rejected: usize,
    pub bots_dispatched: usize,
    pub bots_denied: usize,
    pub bots_failed: usize,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            accounts_seen: 0,
            accounts_synced: 0,
            accounts_skipped: 0,
            accounts_deauthorized: 0,
            meetings_created: 0,
            meetings_updated: 0,
            meetings_deleted: 0,
            events_rejected: 0,
            bots_dispatched: 0,
            bots_denied: 0,
            bots_failed: 0,
        }
    }

    fn record(&mut self, outcome: AccountOutcome) {
        match outcome {
            AccountOutcome::Synced(stats) => {
                self.accounts_synced += 1;
                self.meetings_created += stats.created;
                self.meetings_updated += stats.updated;
                self.meetings_deleted += stats.deleted;
                self.events_rejected += stats.rejected;
            }
            AccountOutcome::Skipped => self.accounts_skipped += 1,
            AccountOutcome::Deauthorized => self.accounts_deauthorized += 1,
        }
    }
}

enum AccountOutcome {
    Synced(ReconcileStats),
    /// Transient failure; retried next tick
    Skipped,
    Deauthorized,
}

pub struct SyncEngine {
    store: Arc<dyn Store>,
    credentials: CredentialManager,
    reconciler: CalendarReconciler,
    dispatcher: BotDispatcher,
    account_concurrency: usize,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn Store>,
        calendar: Arc<dyn CalendarProvider>,
        bots: Arc<dyn BotDeployer>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            credentials: CredentialManager::new(
                store.clone(),
                calendar.clone(),
                config.refresh_margin,
            ),
            reconciler: CalendarReconciler::new(store.clone(), calendar, config.lookahead),
            dispatcher: BotDispatcher::new(store.clone(), bots, config),
            store,
            account_concurrency: config.account_concurrency.max(1),
        }
    }

    pub async fn run_tick(&self) -> Result<TickReport, TickError> {
        self.run_tick_at(Utc::now()).await
    }

    /// Run one tick as of `now`.
    ///
    /// Per-account and per-meeting failures are logged and counted in the
    /// report; only an unreachable store fails the tick.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, TickError> {
        let mut report = TickReport::new(now);

        let accounts = self.store.list_syncable_accounts().await?;
        report.accounts_seen = accounts.len();

        // Owned accounts keep the tick future `Send` for the scheduler task.
        let outcomes: Vec<AccountOutcome> = stream::iter(accounts)
            .map(|account| async move { self.sync_account(&account, now).await })
            .buffer_unordered(self.account_concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.record(outcome);
        }

        // Runs after reconciliation so meetings created this tick are seen.
        let dispatch = self.dispatcher.dispatch_due(now).await?;
        report.bots_dispatched = dispatch.dispatched;
        report.bots_denied = dispatch.denied;
        report.bots_failed = dispatch.failed;

        report.finished_at = Utc::now();

        tracing::info!(
            accounts = report.accounts_seen,
            synced = report.accounts_synced,
            skipped = report.accounts_skipped,
            deauthorized = report.accounts_deauthorized,
            created = report.meetings_created,
            updated = report.meetings_updated,
            deleted = report.meetings_deleted,
            dispatched = report.bots_dispatched,
            denied = report.bots_denied,
            failed = report.bots_failed,
            "tick complete"
        );

        Ok(report)
    }

    async fn sync_account(&self, account: &Account, now: DateTime<Utc>) -> AccountOutcome {
        let access_token = match self.credentials.ensure_access_token(account, now).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "no usable calendar credential");
                return AccountOutcome::Deauthorized;
            }
        };

        match self.reconciler.reconcile(account, &access_token, now).await {
            Ok(stats) => AccountOutcome::Synced(stats),
            Err(ReconcileError::UpstreamAuth(e)) => {
                tracing::warn!(account_id = %account.id, error = %e, "calendar rejected credential");
                self.credentials.revoke(account).await;
                AccountOutcome::Deauthorized
            }
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "reconciliation failed, retrying next tick");
                AccountOutcome::Skipped
            }
        }
    }
}
