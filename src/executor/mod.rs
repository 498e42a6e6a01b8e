//! Path execution.
//!
//! Walks a switching path segment by segment: acquire the diverter's write
//! lock (time-boxed against the segment TTL), issue the command, await the
//! acknowledgement or the residual TTL, release the lock. Deadline expiry
//! is a first-class outcome, not an exception. Driver errors never escape
//! this boundary; they are converted to a [`PathFailureReason`].
//!
//! One diverter lock is held at a time and always dropped before the next
//! segment, so concurrently executing parcels whose paths share diverters
//! in different orders cannot deadlock.

mod failure;

pub use failure::{PathFailureReason, SegmentFailure};

use crate::hardware::DiverterDriver;
use crate::health::HealthRegistry;
use crate::lock::DiverterLockManager;
use crate::parcel::ParcelId;
use crate::path::SwitchingPath;
use crate::telemetry::{SortingEvent, TelemetrySink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Execution state of a parcel's path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    /// No segment started yet.
    Pending,
    /// A segment's command is in flight.
    SegmentInProgress,
    /// Every segment acknowledged in time.
    Completed,
    /// A segment failed or timed out.
    Failed,
}

/// Result of executing a path.
#[derive(Clone, Debug)]
pub enum ExecutionOutcome {
    /// Every segment completed within its TTL.
    Completed {
        /// Number of segments executed.
        segments_executed: usize,
    },
    /// Execution stopped at a failed segment.
    Failed(SegmentFailure),
}

impl ExecutionOutcome {
    /// Returns the failure, if any.
    pub fn failure(&self) -> Option<&SegmentFailure> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Executes switching paths against the hardware abstraction.
pub struct PathExecutor {
    driver: Arc<dyn DiverterDriver>,
    locks: Arc<DiverterLockManager>,
    health: Arc<dyn HealthRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PathExecutor {
    /// Creates an executor over the given collaborators.
    pub fn new(
        driver: Arc<dyn DiverterDriver>,
        locks: Arc<DiverterLockManager>,
        health: Arc<dyn HealthRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            driver,
            locks,
            health,
            telemetry,
        }
    }

    /// Walks the path, executing each segment under its TTL.
    ///
    /// Cancellation between segments is treated as a parcel dropout. The
    /// returned outcome carries enough context for the rerouting service.
    pub async fn execute(
        &self,
        parcel_id: &ParcelId,
        path: &SwitchingPath,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let mut state = ExecutionState::Pending;

        for (index, segment) in path.segments.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(parcel_id = %parcel_id, "Execution cancelled mid-path");
                return self.fail(
                    parcel_id,
                    PathFailureReason::ParcelDropout,
                    &segment.diverter_id,
                    index,
                );
            }

            state = ExecutionState::SegmentInProgress;
            let budget = Duration::from_millis(segment.ttl_ms);
            let started = Instant::now();
            debug!(
                parcel_id = %parcel_id,
                diverter_id = %segment.diverter_id,
                sequence = segment.sequence_number,
                state = ?state,
                ttl_ms = segment.ttl_ms,
                "Starting segment"
            );

            if !self.health.is_node_healthy(&segment.diverter_id) {
                return self.fail(
                    parcel_id,
                    PathFailureReason::NodeUnhealthy,
                    &segment.diverter_id,
                    index,
                );
            }

            // Lock wait is time-boxed against the same TTL as the command;
            // a diverter monopolized past the deadline is a timeout.
            let lock = self.locks.get_lock(&segment.diverter_id);
            let guard = match timeout(budget, lock.acquire_write()).await {
                Ok(guard) => guard,
                Err(_) => {
                    return self.fail(
                        parcel_id,
                        PathFailureReason::CommunicationTimeout,
                        &segment.diverter_id,
                        index,
                    );
                }
            };

            let residual = budget.saturating_sub(started.elapsed());
            let command = self.driver.command(&segment.diverter_id, segment.direction);
            let result = timeout(residual, command).await;
            drop(guard);

            match result {
                Ok(Ok(true)) => {
                    debug!(
                        parcel_id = %parcel_id,
                        diverter_id = %segment.diverter_id,
                        sequence = segment.sequence_number,
                        "Segment acknowledged"
                    );
                    self.telemetry.emit(SortingEvent::SegmentCompleted {
                        parcel_id: parcel_id.clone(),
                        diverter_id: segment.diverter_id.clone(),
                        direction: segment.direction,
                        elapsed: started.elapsed(),
                    });
                }
                Ok(Ok(false)) => {
                    return self.fail(
                        parcel_id,
                        PathFailureReason::PhysicalConstraint,
                        &segment.diverter_id,
                        index,
                    );
                }
                Ok(Err(error)) => {
                    warn!(
                        parcel_id = %parcel_id,
                        diverter_id = %segment.diverter_id,
                        error = %error,
                        "Driver error during segment"
                    );
                    return self.fail(
                        parcel_id,
                        PathFailureReason::from(&error),
                        &segment.diverter_id,
                        index,
                    );
                }
                Err(_elapsed) => {
                    return self.fail(
                        parcel_id,
                        PathFailureReason::CommunicationTimeout,
                        &segment.diverter_id,
                        index,
                    );
                }
            }
        }

        state = ExecutionState::Completed;
        debug!(parcel_id = %parcel_id, state = ?state, "Path complete");
        ExecutionOutcome::Completed {
            segments_executed: path.segments.len(),
        }
    }

    fn fail(
        &self,
        parcel_id: &ParcelId,
        reason: PathFailureReason,
        diverter_id: &str,
        segment_index: usize,
    ) -> ExecutionOutcome {
        self.telemetry.emit(SortingEvent::SegmentFailed {
            parcel_id: parcel_id.clone(),
            diverter_id: diverter_id.to_string(),
            reason,
        });
        ExecutionOutcome::Failed(SegmentFailure {
            reason,
            diverter_id: diverter_id.to_string(),
            segment_index,
        })
    }
}
