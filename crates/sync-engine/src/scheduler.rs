use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::engine::{SyncEngine, TickReport};
use crate::status::SharedStatus;

/// Runs the engine on a fixed interval, one tick at a time.
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    status: SharedStatus,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration, status: SharedStatus) -> Self {
        Self {
            engine,
            interval,
            status,
        }
    }

    /// Loop forever. The tick is awaited inline, so a slow tick delays the
    /// next one instead of overlapping it.
    pub async fn run(&self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Sync scheduler started (interval: {:?})", self.interval);

        loop {
            ticker.tick().await;
            tracing::debug!("Running sync tick");
            self.tick_once().await;
        }
    }

    /// Run a single tick and record its outcome for the status surface.
    pub async fn tick_once(&self) -> Option<TickReport> {
        match self.engine.run_tick().await {
            Ok(report) => {
                self.status.write().await.record_success(report.clone());
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "sync tick failed");
                self.status.write().await.record_failure(e.to_string());
                None
            }
        }
    }
}
