//! Background purge of expired records
//!
//! The worker sweeps once on start and then every `interval`. The shutdown
//! signal is also handed to the sweep itself, so a long sweep stops between
//! batches instead of running to completion.

use flex_record::RecordStore;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic `purge_expired` driver
#[derive(Debug)]
pub struct PurgeWorker {
    records: RecordStore,
    interval: Duration,
}

impl PurgeWorker {
    pub fn new(records: RecordStore, interval: Duration) -> Self {
        Self { records, interval }
    }

    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run on the current tokio runtime until `shutdown` turns `true` or its
    /// sender is dropped
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let cancel = shutdown.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Purge worker started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *cancel.borrow() {
                        break;
                    }
                    match self.records.purge_expired(&cancel).await {
                        Ok(report) if report.cancelled => break,
                        Ok(_) => {}
                        Err(e) => tracing::error!("Purge sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Purge worker stopped");
    }
}
