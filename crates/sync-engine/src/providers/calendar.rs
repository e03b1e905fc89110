//! Calendar provider client (Google Calendar v3 + OAuth token endpoint).

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::{FetchError, TokenError};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const PAGE_SIZE: &str = "250";
/// Upper bound on pages per fetch; a longer listing is treated as malformed.
const MAX_PAGES: usize = 100;

/// Raw event as returned by the provider. Every field is optional; the
/// normalizer decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCalendarEvent {
    pub id: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub hangout_link: Option<String>,
    pub conference_data: Option<ConferenceData>,
    pub attendees: Option<Vec<EventAttendee>>,
}

impl RawCalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    pub entry_points: Option<Vec<EntryPoint>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub uri: Option<String>,
    pub entry_point_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventAttendee {
    pub email: Option<String>,
}

/// Result of a refresh-grant exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in_secs: i64,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Fetch every event in `[time_min, time_max]`, including cancelled
    /// ones, with recurring events expanded and ordered by start.
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RawCalendarEvent>, FetchError>;

    /// Exchange a refresh credential for a new access credential.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, TokenError>;
}

/// Google Calendar provider
pub struct GoogleCalendarProvider {
    http: Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleCalendarProvider {
    pub fn new(
        http: Client,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_config(http: Client, config: &SyncConfig) -> Self {
        Self::new(
            http,
            config.calendar_api_url.clone(),
            config.token_url.clone(),
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<RawCalendarEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RawCalendarEvent>, FetchError> {
        let url = format!("{}/calendars/primary/events", self.api_base);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                // Cancelled events are omitted unless asked for
                ("showDeleted", "true".to_string()),
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await
                .map_err(FetchError::Network)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::from_status(status.as_u16(), body));
            }

            let page: EventsPage = response
                .json()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;

            tracing::debug!(count = page.items.len(), "fetched calendar page");
            events.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    // A partial listing must never reach the reconciler.
                    if !seen_tokens.insert(token.clone()) {
                        return Err(FetchError::Decode(format!("repeated page token {token:?}")));
                    }
                    page_token = Some(token);
                }
                _ => return Ok(events),
            }
        }

        Err(FetchError::Decode(format!(
            "event listing exceeded {MAX_PAGES} pages"
        )))
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, TokenError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(TokenError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Decode(e.to_string()))?;

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::MissingToken)?;

        Ok(TokenGrant {
            access_token,
            expires_in_secs: token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
        })
    }
}
