//! Sends recording bots into meetings that are about to start.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use shared_types::{evaluate_quota, Account, MeetingRecord, QuotaDecision};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::providers::{BotDeployer, BotMetadata, BotRequest};
use crate::store::Store;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub due: usize,
    pub dispatched: usize,
    pub denied: usize,
    pub failed: usize,
}

impl DispatchStats {
    fn merge(mut self, other: DispatchStats) -> Self {
        self.due += other.due;
        self.dispatched += other.dispatched;
        self.denied += other.denied;
        self.failed += other.failed;
        self
    }
}

pub struct BotDispatcher {
    store: Arc<dyn Store>,
    bots: Arc<dyn BotDeployer>,
    window: Duration,
    callback_url: String,
    recording_mode: String,
    default_bot_name: String,
}

impl BotDispatcher {
    pub fn new(store: Arc<dyn Store>, bots: Arc<dyn BotDeployer>, config: &EngineConfig) -> Self {
        Self {
            store,
            bots,
            window: config.dispatch_window,
            callback_url: config.callback_url.clone(),
            recording_mode: config.recording_mode.clone(),
            default_bot_name: config.default_bot_name.clone(),
        }
    }

    /// Handle every meeting eligible for a bot in `[now, now + window]`.
    ///
    /// Accounts are processed concurrently; meetings of one account run in
    /// start order, one at a time, so each quota check sees the usage left
    /// by the previous dispatch. Only listing the due meetings can fail.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<DispatchStats> {
        let due = self.store.list_due_meetings(now, now + self.window).await?;
        if due.is_empty() {
            return Ok(DispatchStats::default());
        }

        let mut by_account: BTreeMap<Uuid, Vec<MeetingRecord>> = BTreeMap::new();
        for meeting in due {
            by_account.entry(meeting.account_id).or_default().push(meeting);
        }

        let results = join_all(
            by_account
                .into_iter()
                .map(|(account_id, meetings)| self.dispatch_account(account_id, meetings, now)),
        )
        .await;

        Ok(results
            .into_iter()
            .fold(DispatchStats::default(), DispatchStats::merge))
    }

    async fn dispatch_account(
        &self,
        account_id: Uuid,
        meetings: Vec<MeetingRecord>,
        now: DateTime<Utc>,
    ) -> DispatchStats {
        let mut stats = DispatchStats {
            due: meetings.len(),
            ..Default::default()
        };

        for meeting in meetings {
            // Re-read so usage reflects the dispatch just recorded.
            let account = match self.store.get_account(account_id).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    tracing::warn!(%account_id, meeting_id = %meeting.id, "meeting owner not found");
                    stats.failed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(%account_id, error = %e, "failed to load account");
                    stats.failed += 1;
                    continue;
                }
            };

            match evaluate_quota(
                account.plan_tier,
                account.subscription_active,
                account.monthly_bot_usage,
            ) {
                QuotaDecision::Deny(reason) => {
                    // Marked handled so it is not re-evaluated on every tick.
                    match self.store.mark_bot_skipped(meeting.id, now).await {
                        Ok(()) => {
                            tracing::info!(
                                %account_id,
                                meeting_id = %meeting.id,
                                reason = reason.as_str(),
                                "bot denied by quota"
                            );
                            stats.denied += 1;
                        }
                        Err(e) => {
                            tracing::error!(meeting_id = %meeting.id, error = %e, "failed to mark meeting skipped");
                            stats.failed += 1;
                        }
                    }
                }
                QuotaDecision::Allow => {
                    if self.deploy(&account, &meeting, now).await {
                        stats.dispatched += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
            }
        }

        stats
    }

    /// Returns whether the dispatch was sent and recorded. A failure leaves
    /// the meeting unsent so the next tick retries it.
    async fn deploy(&self, account: &Account, meeting: &MeetingRecord, now: DateTime<Utc>) -> bool {
        let Some(request) = self.build_request(account, meeting) else {
            tracing::warn!(meeting_id = %meeting.id, "due meeting has no join url");
            return false;
        };

        let bot_id = match self.bots.deploy(&request).await {
            Ok(bot_id) => bot_id,
            Err(e) => {
                tracing::error!(meeting_id = %meeting.id, error = %e, "bot dispatch failed");
                return false;
            }
        };

        match self
            .store
            .record_dispatch(meeting.id, account.id, &bot_id, now)
            .await
        {
            Ok(()) => {
                tracing::info!(account_id = %account.id, meeting_id = %meeting.id, %bot_id, "bot dispatched");
                true
            }
            Err(e) => {
                tracing::error!(meeting_id = %meeting.id, %bot_id, error = %e, "failed to record dispatch");
                false
            }
        }
    }

    fn build_request(&self, account: &Account, meeting: &MeetingRecord) -> Option<BotRequest> {
        let meeting_url = meeting.join_url.clone()?;
        let bot_name = account
            .bot_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.default_bot_name.as_str())
            .to_string();

        Some(BotRequest {
            meeting_url,
            bot_name,
            bot_image: account.bot_avatar_url.clone(),
            recording_mode: self.recording_mode.clone(),
            webhook_url: self.callback_url.clone(),
            metadata: BotMetadata {
                meeting_id: meeting.id,
                account_id: account.id,
            },
        })
    }
}
