//! Read-only HTTP status surface.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::engine::TickReport;

pub type SharedStatus = Arc<RwLock<EngineStatus>>;

/// What the scheduler has observed since the process started.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub started_at: DateTime<Utc>,
    pub ticks_completed: u64,
    pub ticks_failed: u64,
    pub last_report: Option<TickReport>,
    pub last_error: Option<String>,
}

impl EngineStatus {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ticks_completed: 0,
            ticks_failed: 0,
            last_report: None,
            last_error: None,
        }
    }

    pub fn shared() -> SharedStatus {
        Arc::new(RwLock::new(Self::new(Utc::now())))
    }

    pub fn record_success(&mut self, report: TickReport) {
        self.ticks_completed += 1;
        self.last_report = Some(report);
        self.last_error = None;
    }

    /// The previous report is kept so the status still shows the last
    /// good tick.
    pub fn record_failure(&mut self, error: String) {
        self.ticks_failed += 1;
        self.last_error = Some(error);
    }
}

pub fn router(status: SharedStatus) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn get_status(State(status): State<SharedStatus>) -> Json<EngineStatus> {
    Json(status.read().await.clone())
}
