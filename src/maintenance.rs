//! Background retention cleanup.
//!
//! Periodically removes stale schedule entries (active windows left over from
//! previous days) and old completed/cancelled goals past the retention
//! horizon. The loop reacts to shutdown immediately rather than sleeping out
//! its interval.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clock::Clock;
use crate::goals::GoalStore;

pub struct MaintenanceLoop {
    store: GoalStore,
    clock: Clock,
    interval: Duration,
    retention_days: i64,
}

impl MaintenanceLoop {
    pub fn new(store: GoalStore, clock: Clock, interval: Duration, retention_days: i64) -> Self {
        Self {
            store,
            clock,
            interval,
            retention_days,
        }
    }

    /// Run until the token is cancelled. One cleanup pass fires immediately,
    /// then once per interval.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_days = self.retention_days,
            "Maintenance loop started"
        );
        loop {
            self.cleanup_pass().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Maintenance loop stopped");
    }

    async fn cleanup_pass(&self) {
        let expired = self.store.cleanup_expired_schedules(&self.clock).await;
        let old = self.store.cleanup_old(self.retention_days).await;
        if expired > 0 || old > 0 {
            info!(expired, old, "Cleanup pass removed goals");
        }
        if let Err(e) = self.store.flush().await {
            error!("Flush after cleanup pass failed: {e}");
        }
    }
}
