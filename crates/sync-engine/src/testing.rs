//! In-memory collaborators for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared_types::{
    Account, MeetingFields, MeetingOrigin, MeetingRecord, NewMeetingRecord, PlanTier,
};
use uuid::Uuid;

use crate::error::{DispatchError, FetchError, TokenError};
use crate::providers::calendar::{EventAttendee, EventTime};
use crate::providers::{BotDeployer, BotRequest, CalendarProvider, RawCalendarEvent, TokenGrant};
use crate::store::Store;

// ============================================================================
// Fixtures
// ============================================================================

/// A connected account whose stored credential is good for another hour.
pub fn test_account(tier: PlanTier, usage: u32) -> Account {
    let id = Uuid::new_v4();

    Account {
        id,
        email: format!("user-{}@example.com", id.simple()),
        calendar_connected: true,
        access_token: Some(format!("access-{id}")),
        refresh_token: Some(format!("refresh-{id}")),
        token_expires_at: Some(Utc::now() + Duration::hours(1)),
        plan_tier: tier,
        subscription_active: true,
        monthly_bot_usage: usage,
        bot_name: None,
        bot_avatar_url: None,
    }
}

pub fn join_url_for(external_id: &str) -> String {
    format!("https://meet.google.com/{external_id}")
}

/// A confirmed, timed event with a conferencing link.
pub fn test_event(external_id: &str, start: DateTime<Utc>) -> RawCalendarEvent {
    RawCalendarEvent {
        id: Some(external_id.to_string()),
        status: Some("confirmed".to_string()),
        summary: Some(format!("Meeting {external_id}")),
        description: None,
        start: Some(timed(start)),
        end: Some(timed(start + Duration::minutes(30))),
        hangout_link: Some(join_url_for(external_id)),
        conference_data: None,
        attendees: Some(vec![EventAttendee {
            email: Some("guest@example.com".to_string()),
        }]),
    }
}

pub fn cancelled_event(external_id: &str, start: DateTime<Utc>) -> RawCalendarEvent {
    RawCalendarEvent {
        id: Some(external_id.to_string()),
        status: Some("cancelled".to_string()),
        start: Some(timed(start)),
        ..Default::default()
    }
}

/// The record the reconciler would create for `test_event(external_id, start)`.
pub fn test_meeting(account_id: Uuid, external_id: &str, start: DateTime<Utc>) -> MeetingRecord {
    MeetingRecord {
        id: Uuid::new_v4(),
        account_id,
        external_event_id: Some(external_id.to_string()),
        title: format!("Meeting {external_id}"),
        description: None,
        join_url: Some(join_url_for(external_id)),
        start_time: start,
        end_time: Some(start + Duration::minutes(30)),
        attendees: Some(vec!["guest@example.com".to_string()]),
        origin: MeetingOrigin::Calendar,
        bot_scheduled: true,
        bot_sent: false,
        bot_id: None,
        bot_joined_at: None,
    }
}

fn timed(at: DateTime<Utc>) -> EventTime {
    EventTime {
        date_time: Some(at.to_rfc3339()),
        ..Default::default()
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct StoreState {
    accounts: Vec<Account>,
    meetings: Vec<MeetingRecord>,
    meeting_writes: usize,
    unavailable: bool,
}

/// `Store` over plain vectors, mirroring the filters of `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: Account) {
        self.state.lock().unwrap().accounts.push(account);
    }

    pub fn insert_meeting(&self, meeting: MeetingRecord) {
        self.state.lock().unwrap().meetings.push(meeting);
    }

    pub fn account(&self, account_id: Uuid) -> Option<Account> {
        let state = self.state.lock().unwrap();
        state.accounts.iter().find(|a| a.id == account_id).cloned()
    }

    pub fn meeting(&self, meeting_id: Uuid) -> Option<MeetingRecord> {
        let state = self.state.lock().unwrap();
        state.meetings.iter().find(|m| m.id == meeting_id).cloned()
    }

    /// Records of one account, ordered by start time.
    pub fn meetings_for(&self, account_id: Uuid) -> Vec<MeetingRecord> {
        let state = self.state.lock().unwrap();
        let mut meetings: Vec<_> = state
            .meetings
            .iter()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect();
        meetings.sort_by_key(|m| m.start_time);
        meetings
    }

    /// Number of meeting-record writes so far.
    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().meeting_writes
    }

    /// Make every subsequent call fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            bail!("store unavailable");
        }
        Ok(state)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_syncable_accounts(&self) -> Result<Vec<Account>> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.is_syncable())
            .cloned()
            .collect())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>> {
        let state = self.lock()?;
        Ok(state.accounts.iter().find(|a| a.id == account_id).cloned())
    }

    async fn update_credentials(
        &self,
        account_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
            account.access_token = Some(access_token.to_string());
            account.token_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn deauthorize(&self, account_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
            account.calendar_connected = false;
            account.access_token = None;
            account.token_expires_at = None;
        }
        Ok(())
    }

    async fn find_meeting_by_external_id(
        &self,
        account_id: Uuid,
        external_event_id: &str,
    ) -> Result<Option<MeetingRecord>> {
        let state = self.lock()?;
        Ok(state
            .meetings
            .iter()
            .find(|m| {
                m.account_id == account_id
                    && m.external_event_id.as_deref() == Some(external_event_id)
            })
            .cloned())
    }

    async fn create_meeting(&self, new: NewMeetingRecord) -> Result<MeetingRecord> {
        let mut state = self.lock()?;

        if let Some(ref external_id) = new.external_event_id {
            let duplicate = state.meetings.iter().any(|m| {
                m.account_id == new.account_id && m.external_event_id.as_ref() == Some(external_id)
            });
            if duplicate {
                bail!("duplicate external event id {external_id}");
            }
        }

        let MeetingFields {
            title,
            description,
            join_url,
            start_time,
            end_time,
            attendees,
        } = new.fields;

        let record = MeetingRecord {
            id: Uuid::new_v4(),
            account_id: new.account_id,
            external_event_id: new.external_event_id,
            title,
            description,
            join_url,
            start_time,
            end_time,
            attendees,
            origin: new.origin,
            bot_scheduled: new.bot_scheduled,
            bot_sent: false,
            bot_id: None,
            bot_joined_at: None,
        };

        state.meetings.push(record.clone());
        state.meeting_writes += 1;
        Ok(record)
    }

    async fn update_meeting_fields(&self, meeting_id: Uuid, fields: MeetingFields) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(meeting) = state.meetings.iter_mut().find(|m| m.id == meeting_id) {
            meeting.title = fields.title;
            meeting.description = fields.description;
            meeting.join_url = fields.join_url;
            meeting.start_time = fields.start_time;
            meeting.end_time = fields.end_time;
            meeting.attendees = fields.attendees;
        }
        state.meeting_writes += 1;
        Ok(())
    }

    async fn delete_meeting(&self, meeting_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        state.meetings.retain(|m| m.id != meeting_id);
        state.meeting_writes += 1;
        Ok(())
    }

    async fn list_calendar_meetings(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>> {
        let state = self.lock()?;
        Ok(state
            .meetings
            .iter()
            .filter(|m| {
                m.account_id == account_id
                    && m.origin == MeetingOrigin::Calendar
                    && m.start_time >= from
                    && m.start_time <= to
            })
            .cloned()
            .collect())
    }

    async fn list_due_meetings(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>> {
        let state = self.lock()?;
        let mut due: Vec<_> = state
            .meetings
            .iter()
            .filter(|m| m.is_due(from, to))
            .cloned()
            .collect();
        due.sort_by_key(|m| m.start_time);
        Ok(due)
    }

    async fn mark_bot_skipped(&self, meeting_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(meeting) = state.meetings.iter_mut().find(|m| m.id == meeting_id) {
            meeting.bot_sent = true;
            meeting.bot_joined_at = Some(at);
        }
        state.meeting_writes += 1;
        Ok(())
    }

    async fn record_dispatch(
        &self,
        meeting_id: Uuid,
        account_id: Uuid,
        bot_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock()?;

        let Some(meeting) = state
            .meetings
            .iter_mut()
            .find(|m| m.id == meeting_id && !m.bot_sent)
        else {
            return Ok(());
        };
        meeting.bot_sent = true;
        meeting.bot_id = Some(bot_id.to_string());
        meeting.bot_joined_at = Some(at);

        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
            account.monthly_bot_usage += 1;
        }
        state.meeting_writes += 1;
        Ok(())
    }
}

// ============================================================================
// Calendar provider
// ============================================================================

enum FetchOutcome {
    Events(Vec<RawCalendarEvent>),
    Unauthorized,
    Unavailable,
}

/// Calendar keyed by access credential. Unknown credentials see an empty
/// calendar; refresh is rejected until `grant_refresh` is called.
#[derive(Default)]
pub struct FakeCalendar {
    calendars: Mutex<HashMap<String, FetchOutcome>>,
    grant: Mutex<Option<TokenGrant>>,
    fetch_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl FakeCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_events(&self, access_token: &str, events: Vec<RawCalendarEvent>) {
        self.set(access_token, FetchOutcome::Events(events));
    }

    pub fn unauthorize_fetch(&self, access_token: &str) {
        self.set(access_token, FetchOutcome::Unauthorized);
    }

    pub fn fail_fetch(&self, access_token: &str) {
        self.set(access_token, FetchOutcome::Unavailable);
    }

    pub fn grant_refresh(&self, access_token: &str, expires_in_secs: i64) {
        *self.grant.lock().unwrap() = Some(TokenGrant {
            access_token: access_token.to_string(),
            expires_in_secs,
        });
    }

    pub fn reject_refresh(&self) {
        *self.grant.lock().unwrap() = None;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn set(&self, access_token: &str, outcome: FetchOutcome) {
        self.calendars
            .lock()
            .unwrap()
            .insert(access_token.to_string(), outcome);
    }
}

#[async_trait]
impl CalendarProvider for FakeCalendar {
    async fn list_events(
        &self,
        access_token: &str,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> Result<Vec<RawCalendarEvent>, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        match self.calendars.lock().unwrap().get(access_token) {
            None => Ok(Vec::new()),
            Some(FetchOutcome::Events(events)) => Ok(events.clone()),
            Some(FetchOutcome::Unauthorized) => Err(FetchError::from_status(401, String::new())),
            Some(FetchOutcome::Unavailable) => {
                Err(FetchError::from_status(503, "backend error".to_string()))
            }
        }
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<TokenGrant, TokenError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        self.grant
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TokenError::Status {
                status: 400,
                body: r#"{"error":"invalid_grant"}"#.to_string(),
            })
    }
}

// ============================================================================
// Bot provider
// ============================================================================

/// Records every request; queued failures are consumed one per call.
#[derive(Default)]
pub struct FakeBotDeployer {
    requests: Mutex<Vec<BotRequest>>,
    failures: Mutex<VecDeque<u16>>,
}

impl FakeBotDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `status`.
    pub fn fail_next(&self, status: u16) {
        self.failures.lock().unwrap().push_back(status);
    }

    pub fn requests(&self) -> Vec<BotRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl BotDeployer for FakeBotDeployer {
    async fn deploy(&self, request: &BotRequest) -> Result<String, DispatchError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());

        if let Some(status) = self.failures.lock().unwrap().pop_front() {
            return Err(DispatchError::Status {
                status,
                body: "bot provider error".to_string(),
            });
        }

        Ok(format!("bot-{}", requests.len()))
    }
}
