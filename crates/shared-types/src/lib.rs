use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod quota;

pub use quota::{evaluate_quota, DenyReason, QuotaDecision};

// ============================================================================
// Accounts
// ============================================================================

/// Billing plan tier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Starter,
    Pro,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }

    /// Parse a stored tier name. Unknown names fall back to `Free`, which
    /// the quota evaluator always denies.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => PlanTier::Free,
            "starter" => PlanTier::Starter,
            "pro" => PlanTier::Pro,
            "premium" => PlanTier::Premium,
            other => {
                tracing::warn!(tier = other, "unknown plan tier, treating as free");
                PlanTier::Free
            }
        }
    }

    /// Monthly bot cap for the tier; `None` means unlimited.
    pub fn monthly_cap(&self) -> Option<u32> {
        match self {
            PlanTier::Free => Some(0),
            PlanTier::Starter => Some(10),
            PlanTier::Pro => Some(30),
            PlanTier::Premium => None,
        }
    }
}

/// A user's persisted profile: calendar credentials, billing tier and
/// bot presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub calendar_connected: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub plan_tier: PlanTier,
    pub subscription_active: bool,
    pub monthly_bot_usage: u32,
    pub bot_name: Option<String>,
    pub bot_avatar_url: Option<String>,
}

impl Account {
    /// Whether the account qualifies for calendar reconciliation.
    pub fn is_syncable(&self) -> bool {
        self.calendar_connected && self.refresh_token.is_some()
    }
}

// ============================================================================
// Meeting records
// ============================================================================

/// Where a meeting record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingOrigin {
    Calendar,
    Manual,
}

impl MeetingOrigin {
    pub fn as_str(&self) -> &str {
        match self {
            MeetingOrigin::Calendar => "calendar",
            MeetingOrigin::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(MeetingOrigin::Calendar),
            "manual" => Some(MeetingOrigin::Manual),
            _ => None,
        }
    }
}

/// The canonical local representation of a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub external_event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub join_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Option<Vec<String>>,
    pub origin: MeetingOrigin,
    pub bot_scheduled: bool,
    pub bot_sent: bool,
    pub bot_id: Option<String>,
    pub bot_joined_at: Option<DateTime<Utc>>,
}

impl MeetingRecord {
    /// Whether the dispatcher should consider this record at `now` given a
    /// dispatch window ending at `window_end`.
    pub fn is_due(&self, now: DateTime<Utc>, window_end: DateTime<Utc>) -> bool {
        self.bot_scheduled
            && !self.bot_sent
            && self.join_url.is_some()
            && self.start_time >= now
            && self.start_time <= window_end
    }

    /// Current values of the fields the reconciler is allowed to change.
    pub fn fields(&self) -> MeetingFields {
        MeetingFields {
            title: self.title.clone(),
            description: self.description.clone(),
            join_url: self.join_url.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            attendees: self.attendees.clone(),
        }
    }
}

/// Mutable, calendar-sourced fields of a meeting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingFields {
    pub title: String,
    pub description: Option<String>,
    pub join_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Option<Vec<String>>,
}

/// Input for creating a meeting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMeetingRecord {
    pub account_id: Uuid,
    pub external_event_id: Option<String>,
    pub fields: MeetingFields,
    pub origin: MeetingOrigin,
    pub bot_scheduled: bool,
}
