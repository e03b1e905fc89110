//! External collaborators reached over HTTP.

pub mod bot;
pub mod calendar;

use anyhow::{Context, Result};
use std::time::Duration;

pub use bot::{BotDeployer, BotMetadata, BotRequest, HttpBotDeployer};
pub use calendar::{CalendarProvider, GoogleCalendarProvider, RawCalendarEvent, TokenGrant};

/// Shared HTTP client; the timeout bounds every suspension point on the
/// network.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("meeting-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
