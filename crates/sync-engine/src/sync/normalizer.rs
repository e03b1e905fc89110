//! Raw provider event -> canonical meeting fields.
//!
//! All presence checks on provider payloads live here; the reconciler only
//! sees `NormalizedEvent`.

use chrono::{DateTime, Utc};
use shared_types::MeetingFields;

use crate::providers::calendar::{EventTime, RawCalendarEvent};

pub const UNTITLED_MEETING: &str = "Untitled meeting";

/// Canonical view of a provider event. `join_url` and `start_time` stay
/// optional so the caller can reject unusable events explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub external_event_id: String,
    pub title: String,
    pub description: Option<String>,
    pub join_url: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Option<Vec<String>>,
    pub bot_scheduled: bool,
}

impl NormalizedEvent {
    /// Fields to store, or `None` when the event lacks a join URL or a
    /// start time and must never be stored.
    pub fn into_fields(self) -> Option<MeetingFields> {
        let start_time = self.start_time?;
        let join_url = self.join_url?;

        Some(MeetingFields {
            title: self.title,
            description: self.description,
            join_url: Some(join_url),
            start_time,
            end_time: self.end_time,
            attendees: self.attendees,
        })
    }
}

/// Normalize a provider event. Returns `None` only when the event has no id,
/// since without one it cannot be joined to local state.
pub fn normalize(raw: &RawCalendarEvent) -> Option<NormalizedEvent> {
    let external_event_id = raw.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;

    Some(NormalizedEvent {
        external_event_id: external_event_id.to_string(),
        title: non_blank(raw.summary.as_deref()).unwrap_or_else(|| UNTITLED_MEETING.to_string()),
        description: non_blank(raw.description.as_deref()),
        join_url: join_url(raw),
        start_time: raw.start.as_ref().and_then(parse_event_time),
        end_time: raw.end.as_ref().and_then(parse_event_time),
        attendees: attendees(raw),
        bot_scheduled: true,
    })
}

/// Primary conferencing link, else the first conference entry point.
fn join_url(raw: &RawCalendarEvent) -> Option<String> {
    if let Some(link) = non_blank(raw.hangout_link.as_deref()) {
        return Some(link);
    }

    raw.conference_data
        .as_ref()
        .and_then(|data| data.entry_points.as_ref())
        .and_then(|points| points.first())
        .and_then(|point| non_blank(point.uri.as_deref()))
}

/// Attendee emails in provider order. An absent list stays `None`.
fn attendees(raw: &RawCalendarEvent) -> Option<Vec<String>> {
    raw.attendees.as_ref().map(|list| {
        list.iter()
            .filter_map(|attendee| non_blank(attendee.email.as_deref()))
            .collect()
    })
}

/// Only timed events carry a `dateTime`; all-day events have no start.
fn parse_event_time(time: &EventTime) -> Option<DateTime<Utc>> {
    let value = time.date_time.as_deref()?.trim();

    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(value, error = %e, "unparseable event timestamp");
            None
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::calendar::{ConferenceData, EntryPoint, EventAttendee};
    use chrono::TimeZone;

    fn timed(value: &str) -> Option<EventTime> {
        Some(EventTime {
            date_time: Some(value.to_string()),
            ..Default::default()
        })
    }

    fn base_event() -> RawCalendarEvent {
        RawCalendarEvent {
            id: Some("evt-1".to_string()),
            status: Some("confirmed".to_string()),
            summary: Some("Weekly sync".to_string()),
            description: Some("Agenda in doc".to_string()),
            start: timed("2026-10-20T10:00:00-04:00"),
            end: timed("2026-10-20T10:30:00-04:00"),
            hangout_link: Some("https://meet.google.com/aaa-bbbb-ccc".to_string()),
            conference_data: None,
            attendees: Some(vec![
                EventAttendee {
                    email: Some("a@example.com".to_string()),
                },
                EventAttendee {
                    email: Some("b@example.com".to_string()),
                },
            ]),
        }
    }

    #[test]
    fn test_normalize_full_event() {
        let normalized = normalize(&base_event()).expect("event has an id");

        assert_eq!(normalized.external_event_id, "evt-1");
        assert_eq!(normalized.title, "Weekly sync");
        assert_eq!(
            normalized.start_time,
            Some(Utc.with_ymd_and_hms(2026, 10, 20, 14, 0, 0).unwrap())
        );
        assert_eq!(
            normalized.end_time,
            Some(Utc.with_ymd_and_hms(2026, 10, 20, 14, 30, 0).unwrap())
        );
        assert_eq!(
            normalized.attendees,
            Some(vec!["a@example.com".to_string(), "b@example.com".to_string()])
        );
        assert!(normalized.bot_scheduled);
    }

    #[test]
    fn test_join_url_falls_back_to_conference_entry() {
        let mut event = base_event();
        event.hangout_link = None;
        event.conference_data = Some(ConferenceData {
            entry_points: Some(vec![
                EntryPoint {
                    uri: Some("https://zoom.us/j/123".to_string()),
                    entry_point_type: Some("video".to_string()),
                },
                EntryPoint {
                    uri: Some("tel:+1-555-0100".to_string()),
                    entry_point_type: Some("phone".to_string()),
                },
            ]),
        });

        let normalized = normalize(&event).unwrap();
        assert_eq!(normalized.join_url.as_deref(), Some("https://zoom.us/j/123"));
    }

    #[test]
    fn test_missing_title_uses_placeholder() {
        let mut event = base_event();
        event.summary = Some("   ".to_string());
        assert_eq!(normalize(&event).unwrap().title, UNTITLED_MEETING);

        event.summary = None;
        assert_eq!(normalize(&event).unwrap().title, UNTITLED_MEETING);
    }

    #[test]
    fn test_absent_attendees_is_distinct_from_empty() {
        let mut event = base_event();
        event.attendees = None;
        assert_eq!(normalize(&event).unwrap().attendees, None);

        event.attendees = Some(vec![EventAttendee { email: None }]);
        assert_eq!(normalize(&event).unwrap().attendees, Some(vec![]));
    }

    #[test]
    fn test_event_without_join_url_is_not_storable() {
        let mut event = base_event();
        event.hangout_link = None;

        let normalized = normalize(&event).unwrap();
        assert!(normalized.join_url.is_none());
        assert!(normalized.into_fields().is_none());
    }

    #[test]
    fn test_all_day_event_has_no_start() {
        let mut event = base_event();
        event.start = Some(EventTime {
            date: Some("2026-10-20".to_string()),
            ..Default::default()
        });

        let normalized = normalize(&event).unwrap();
        assert!(normalized.start_time.is_none());
        assert!(normalized.into_fields().is_none());
    }

    #[test]
    fn test_event_without_id_is_dropped() {
        let mut event = base_event();
        event.id = None;
        assert!(normalize(&event).is_none());
    }
}
