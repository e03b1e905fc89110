use anyhow::{ensure, Context, Result};
use chrono::Duration as ChronoDuration;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Process-level configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub calendar_api_url: String,
    pub token_url: String,
    pub bot_api_url: String,
    pub bot_api_key: String,
    pub http_timeout: Duration,
    pub sync_interval: Duration,
    pub status_addr: SocketAddr,
    pub engine: EngineConfig,
}

/// Tunables the engine itself needs on every tick.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How far ahead reconciliation fetches events
    pub lookahead: ChronoDuration,
    /// How soon a meeting must start to be eligible for a bot
    pub dispatch_window: ChronoDuration,
    /// Stored credentials expiring sooner than this are refreshed
    pub refresh_margin: ChronoDuration,
    /// Maximum accounts reconciled at once
    pub account_concurrency: usize,
    pub callback_url: String,
    pub recording_mode: String,
    pub default_bot_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead: ChronoDuration::days(7),
            dispatch_window: ChronoDuration::minutes(5),
            refresh_margin: ChronoDuration::minutes(10),
            account_concurrency: 8,
            callback_url: "http://localhost:3000/api/bot-events".to_string(),
            recording_mode: "speaker_view".to_string(),
            default_bot_name: "Meeting Notetaker".to_string(),
        }
    }
}

const MAX_LOOKAHEAD_DAYS: u64 = 366;
const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = EngineConfig::default();

        let engine = EngineConfig {
            lookahead: ChronoDuration::days(bounded(
                "SYNC_LOOKAHEAD_DAYS",
                parse_or("SYNC_LOOKAHEAD_DAYS", 7)?,
                1,
                MAX_LOOKAHEAD_DAYS,
            )? as i64),
            dispatch_window: ChronoDuration::seconds(bounded(
                "DISPATCH_WINDOW_SECS",
                parse_or("DISPATCH_WINDOW_SECS", 300)?,
                1,
                MAX_WINDOW_SECS,
            )? as i64),
            refresh_margin: ChronoDuration::seconds(bounded(
                "TOKEN_REFRESH_MARGIN_SECS",
                parse_or("TOKEN_REFRESH_MARGIN_SECS", 600)?,
                0,
                MAX_WINDOW_SECS,
            )? as i64),
            account_concurrency: parse_or::<usize>("ACCOUNT_CONCURRENCY", 8)?.max(1),
            callback_url: env::var("BOT_CALLBACK_URL").context("BOT_CALLBACK_URL must be set")?,
            recording_mode: env::var("BOT_RECORDING_MODE").unwrap_or(defaults.recording_mode),
            default_bot_name: env::var("DEFAULT_BOT_NAME").unwrap_or(defaults.default_bot_name),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID must be set")?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET must be set")?,
            calendar_api_url: env::var("GOOGLE_CALENDAR_API_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            bot_api_url: env::var("BOT_API_URL").context("BOT_API_URL must be set")?,
            bot_api_key: env::var("BOT_API_KEY").context("BOT_API_KEY must be set")?,
            http_timeout: Duration::from_secs(bounded(
                "HTTP_TIMEOUT_SECS",
                parse_or("HTTP_TIMEOUT_SECS", 30)?,
                1,
                MAX_WINDOW_SECS,
            )?),
            // tokio's interval panics on a zero period
            sync_interval: Duration::from_secs(bounded(
                "SYNC_INTERVAL_SECS",
                parse_or("SYNC_INTERVAL_SECS", 60)?,
                1,
                MAX_WINDOW_SECS,
            )?),
            status_addr: env::var("STATUS_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
                .parse()
                .context("STATUS_ADDR must be a socket address")?,
            engine,
        })
    }
}

fn parse_or<T>(var: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", var)),
        Err(_) => Ok(default),
    }
}

/// Reject values outside `[min, max]`. Every max is small enough that the
/// chrono constructors above cannot overflow.
fn bounded(var: &str, value: u64, min: u64, max: u64) -> Result<u64> {
    ensure!(
        (min..=max).contains(&value),
        "{} must be between {} and {}, got {}",
        var,
        min,
        max,
        value
    );
    Ok(value)
}
