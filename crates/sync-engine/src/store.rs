//! Persistent-store abstraction used by the engine.
//!
//! The engine only needs keyed CRUD over accounts and meeting records, so
//! the trait stays narrow. `PgStore` in `db` is the production
//! implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{Account, MeetingFields, MeetingRecord, NewMeetingRecord};
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Accounts with a connected calendar and a stored refresh credential.
    async fn list_syncable_accounts(&self) -> Result<Vec<Account>>;

    /// Get a single account by id.
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>>;

    /// Persist a freshly issued access credential.
    async fn update_credentials(
        &self,
        account_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Clear the connected flag and the access credential.
    async fn deauthorize(&self, account_id: Uuid) -> Result<()>;

    // ------------------------------------------------------------------
    // Meeting records
    // ------------------------------------------------------------------

    async fn find_meeting_by_external_id(
        &self,
        account_id: Uuid,
        external_event_id: &str,
    ) -> Result<Option<MeetingRecord>>;

    async fn create_meeting(&self, new: NewMeetingRecord) -> Result<MeetingRecord>;

    /// Overwrite the calendar-sourced fields; bot fields are untouched.
    async fn update_meeting_fields(&self, meeting_id: Uuid, fields: MeetingFields) -> Result<()>;

    async fn delete_meeting(&self, meeting_id: Uuid) -> Result<()>;

    /// Calendar-origin records of one account starting within `[from, to]`.
    async fn list_calendar_meetings(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>>;

    /// Records across all accounts that are eligible for a bot in `[from, to]`.
    async fn list_due_meetings(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>>;

    /// Mark a meeting handled without dispatching (quota denied).
    async fn mark_bot_skipped(&self, meeting_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Record a successful dispatch: mark sent, store the bot id, set the
    /// joined timestamp and increment the owner's usage counter, atomically.
    async fn record_dispatch(
        &self,
        meeting_id: Uuid,
        account_id: Uuid,
        bot_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
