//! Background tracking monitor.
//!
//! Periodically sweeps the tracker for overdue parcels, clears their
//! scheduled diverter tasks, and reports their disposition upstream.
//! Runs until cancelled.

use super::store::ParcelTracker;
use crate::deadline::DeadlineQueueRegistry;
use crate::messaging::{CompletionSink, SortingCompletedNotification, SortingOutcome};
use crate::telemetry::{SortingEvent, TelemetrySink};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Periodic timeout/loss detector over the parcel tracker.
pub struct TrackingMonitor {
    tracker: Arc<ParcelTracker>,
    queues: Arc<DeadlineQueueRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    completions: Arc<dyn CompletionSink>,
    exception_chute_id: u32,
    interval: Duration,
}

impl TrackingMonitor {
    /// Creates a monitor over the given tracker and queues.
    pub fn new(
        tracker: Arc<ParcelTracker>,
        queues: Arc<DeadlineQueueRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        completions: Arc<dyn CompletionSink>,
        exception_chute_id: u32,
    ) -> Self {
        let interval = tracker.settings().monitor_interval;
        Self {
            tracker,
            queues,
            telemetry,
            completions,
            exception_chute_id,
            interval,
        }
    }

    /// Runs the monitor until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.tick(),
            }
        }
        debug!("Tracking monitor stopped");
    }

    /// One sweep pass; factored out for direct testing.
    pub fn tick(&self) {
        let now = Utc::now();
        let report = self.tracker.sweep(now);

        for parcel_id in &report.timed_out {
            self.queues.remove_parcel(parcel_id);
            self.telemetry.emit(SortingEvent::ParcelTimedOut {
                parcel_id: parcel_id.clone(),
            });
            self.completions.notify(SortingCompletedNotification {
                parcel_id: parcel_id.clone(),
                actual_chute_id: self.exception_chute_id,
                completed_at: now,
                outcome: SortingOutcome::Timeout,
            });
        }

        for parcel_id in &report.lost {
            self.queues.remove_parcel(parcel_id);
            self.telemetry.emit(SortingEvent::ParcelLost {
                parcel_id: parcel_id.clone(),
            });
            self.completions.notify(SortingCompletedNotification {
                parcel_id: parcel_id.clone(),
                actual_chute_id: self.exception_chute_id,
                completed_at: now,
                outcome: SortingOutcome::Lost,
            });
        }
    }
}
