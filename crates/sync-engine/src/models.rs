// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared_types::{Account, MeetingFields, MeetingOrigin, MeetingRecord, NewMeetingRecord, PlanTier};
use uuid::Uuid;

/// Database representation of accounts
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub calendar_connected: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub plan_tier: String,
    pub subscription_active: bool,
    pub monthly_bot_usage: i32,
    pub bot_name: Option<String>,
    pub bot_avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            email: row.email,
            calendar_connected: row.calendar_connected,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_expires_at: row.token_expires_at,
            plan_tier: PlanTier::parse(&row.plan_tier),
            subscription_active: row.subscription_active,
            monthly_bot_usage: row.monthly_bot_usage.max(0) as u32,
            bot_name: row.bot_name,
            bot_avatar_url: row.bot_avatar_url,
        }
    }
}

/// Database representation of meeting_records
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::meeting_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MeetingRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub external_event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub join_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Option<Vec<Option<String>>>,
    pub origin: String,
    pub bot_scheduled: bool,
    pub bot_sent: bool,
    pub bot_id: Option<String>,
    pub bot_joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MeetingRow> for MeetingRecord {
    fn from(row: MeetingRow) -> Self {
        MeetingRecord {
            id: row.id,
            account_id: row.account_id,
            external_event_id: row.external_event_id,
            title: row.title,
            description: row.description,
            join_url: row.join_url,
            start_time: row.start_time,
            end_time: row.end_time,
            attendees: row
                .attendees
                .map(|list| list.into_iter().flatten().collect()),
            // Unrecognised origins are treated as manual so the reconciler
            // never deletes them.
            origin: MeetingOrigin::parse(&row.origin).unwrap_or(MeetingOrigin::Manual),
            bot_scheduled: row.bot_scheduled,
            bot_sent: row.bot_sent,
            bot_id: row.bot_id,
            bot_joined_at: row.bot_joined_at,
        }
    }
}

/// Insertable struct for new meeting records
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::meeting_records)]
pub struct NewMeetingRow {
    pub account_id: Uuid,
    pub external_event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub join_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Option<Vec<Option<String>>>,
    pub origin: String,
    pub bot_scheduled: bool,
}

impl From<NewMeetingRecord> for NewMeetingRow {
    fn from(new: NewMeetingRecord) -> Self {
        let MeetingFields {
            title,
            description,
            join_url,
            start_time,
            end_time,
            attendees,
        } = new.fields;

        NewMeetingRow {
            account_id: new.account_id,
            external_event_id: new.external_event_id,
            title,
            description,
            join_url,
            start_time,
            end_time,
            attendees: attendees.map(into_nullable_array),
            origin: new.origin.as_str().to_string(),
            bot_scheduled: new.bot_scheduled,
        }
    }
}

/// Changeset for the calendar-sourced fields. `None` clears the column.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::meeting_records)]
#[diesel(treat_none_as_null = true)]
pub struct MeetingFieldsChangeset {
    pub title: String,
    pub description: Option<String>,
    pub join_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Option<Vec<Option<String>>>,
    pub updated_at: DateTime<Utc>,
}

impl From<MeetingFields> for MeetingFieldsChangeset {
    fn from(fields: MeetingFields) -> Self {
        MeetingFieldsChangeset {
            title: fields.title,
            description: fields.description,
            join_url: fields.join_url,
            start_time: fields.start_time,
            end_time: fields.end_time,
            attendees: fields.attendees.map(into_nullable_array),
            updated_at: Utc::now(),
        }
    }
}

fn into_nullable_array(list: Vec<String>) -> Vec<Option<String>> {
    list.into_iter().map(Some).collect()
}
