//! Converges an account's calendar-origin meeting records to the provider's
//! event list for the lookahead window.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use shared_types::{Account, MeetingOrigin, NewMeetingRecord};

use super::normalizer::normalize;
use crate::error::ReconcileError;
use crate::providers::{CalendarProvider, RawCalendarEvent};
use crate::store::Store;

/// Outcome of reconciling one account.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Events skipped for lacking an id, a join URL or a start time
    pub rejected: usize,
}

impl ReconcileStats {
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

pub struct CalendarReconciler {
    store: Arc<dyn Store>,
    calendar: Arc<dyn CalendarProvider>,
    lookahead: Duration,
}

impl CalendarReconciler {
    pub fn new(store: Arc<dyn Store>, calendar: Arc<dyn CalendarProvider>, lookahead: Duration) -> Self {
        Self {
            store,
            calendar,
            lookahead,
        }
    }

    /// Reconcile `account` against the window `[now, now + lookahead]`.
    ///
    /// The whole window is fetched before anything is written, so a fetch
    /// failure never deletes records. Cancelled events are handled before
    /// upserts and never enter the seen set.
    #[tracing::instrument(skip_all, fields(account_id = %account.id))]
    pub async fn reconcile(
        &self,
        account: &Account,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileStats, ReconcileError> {
        let window_end = now + self.lookahead;
        let events = self
            .calendar
            .list_events(access_token, now, window_end)
            .await?;

        let mut stats = ReconcileStats {
            fetched: events.len(),
            ..Default::default()
        };
        let (cancelled, active): (Vec<RawCalendarEvent>, Vec<RawCalendarEvent>) =
            events.into_iter().partition(RawCalendarEvent::is_cancelled);

        // Scoped to this call; never shared across accounts.
        let mut seen: HashSet<String> = HashSet::new();

        for event in &cancelled {
            let Some(external_id) = event.id.as_deref() else {
                continue;
            };

            if let Some(existing) = self
                .store
                .find_meeting_by_external_id(account.id, external_id)
                .await?
            {
                self.store.delete_meeting(existing.id).await?;
                stats.deleted += 1;
                tracing::debug!(external_id, meeting_id = %existing.id, "deleted cancelled meeting");
            }
        }

        for event in &active {
            let Some(normalized) = normalize(event) else {
                stats.rejected += 1;
                continue;
            };

            let external_id = normalized.external_event_id.clone();
            let bot_scheduled = normalized.bot_scheduled;
            let Some(fields) = normalized.into_fields() else {
                tracing::debug!(external_id = %external_id, "skipping event without join url or start time");
                stats.rejected += 1;
                continue;
            };

            if !seen.insert(external_id.clone()) {
                continue;
            }

            match self
                .store
                .find_meeting_by_external_id(account.id, &external_id)
                .await?
            {
                None => {
                    let created = self
                        .store
                        .create_meeting(NewMeetingRecord {
                            account_id: account.id,
                            external_event_id: Some(external_id),
                            fields,
                            origin: MeetingOrigin::Calendar,
                            bot_scheduled,
                        })
                        .await?;
                    stats.created += 1;
                    tracing::debug!(meeting_id = %created.id, "created meeting");
                }
                // Only calendar-sourced fields are written; the stored
                // bot_scheduled, bot_sent and bot_id are never overwritten.
                Some(existing) if existing.fields() != fields => {
                    self.store.update_meeting_fields(existing.id, fields).await?;
                    stats.updated += 1;
                    tracing::debug!(meeting_id = %existing.id, "updated meeting");
                }
                Some(_) => {}
            }
        }

        let local = self
            .store
            .list_calendar_meetings(account.id, now, window_end)
            .await?;

        for record in local {
            let still_listed = record
                .external_event_id
                .as_ref()
                .is_some_and(|id| seen.contains(id));

            if !still_listed {
                self.store.delete_meeting(record.id).await?;
                stats.deleted += 1;
                tracing::debug!(meeting_id = %record.id, "deleted meeting no longer on calendar");
            }
        }

        Ok(stats)
    }
}
