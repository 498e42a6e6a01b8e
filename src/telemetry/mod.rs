//! Sorting observability events.
//!
//! The core emits structured events via a sink abstraction and does not
//! know how they are consumed — logging, metrics aggregation, and the
//! administrative UI all sit behind [`TelemetrySink`]. This keeps the hot
//! path free of presentation concerns.

use crate::executor::PathFailureReason;
use crate::hardware::DiverterDirection;
use crate::parcel::ParcelId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Events emitted during sorting orchestration.
#[derive(Clone, Debug)]
pub enum SortingEvent {
    // -------------------------------------------------------------------------
    // Path generation
    // -------------------------------------------------------------------------
    /// A switching path was generated for a parcel.
    PathGenerated {
        parcel_id: ParcelId,
        chute_id: u32,
        segment_count: usize,
        total_ttl_ms: u64,
    },

    /// No route exists for the assigned chute.
    PathUnavailable { parcel_id: ParcelId, chute_id: u32 },

    /// A generated path was rejected pre-execution (unhealthy node).
    PathValidationFailed {
        parcel_id: ParcelId,
        chute_id: u32,
        diverter_id: String,
    },

    /// The admission check rejected a path as unable to finish in budget.
    OverloadRejected {
        parcel_id: ParcelId,
        chute_id: u32,
        budget_ms: u64,
    },

    // -------------------------------------------------------------------------
    // Segment execution
    // -------------------------------------------------------------------------
    /// A segment's diverter acknowledged its command in time.
    SegmentCompleted {
        parcel_id: ParcelId,
        diverter_id: String,
        direction: DiverterDirection,
        elapsed: Duration,
    },

    /// A segment failed or timed out.
    SegmentFailed {
        parcel_id: ParcelId,
        diverter_id: String,
        reason: PathFailureReason,
    },

    /// A late queue head received its fallback action.
    FallbackSubstituted {
        parcel_id: ParcelId,
        diverter_id: String,
        planned: DiverterDirection,
        fallback: DiverterDirection,
    },

    // -------------------------------------------------------------------------
    // Rerouting
    // -------------------------------------------------------------------------
    /// A reroute was attempted after a segment failure.
    RerouteAttempted {
        parcel_id: ParcelId,
        failed_node_id: String,
    },

    /// A reroute produced a new path from the failure point.
    RerouteSucceeded {
        parcel_id: ParcelId,
        remaining_segments: usize,
    },

    /// No reroute was possible from the failure point.
    RerouteFailed {
        parcel_id: ParcelId,
        failed_node_id: String,
        detail: String,
    },

    // -------------------------------------------------------------------------
    // Parcel outcomes
    // -------------------------------------------------------------------------
    /// A parcel reached a chute.
    ParcelSorted {
        parcel_id: ParcelId,
        chute_id: u32,
        duration: Duration,
    },

    /// A parcel exceeded one of its wait budgets.
    ParcelTimedOut { parcel_id: ParcelId },

    /// A parcel exceeded its lifetime with no sighting.
    ParcelLost { parcel_id: ParcelId },

    // -------------------------------------------------------------------------
    // Capacity
    // -------------------------------------------------------------------------
    /// A capacity estimate was produced.
    CapacityEstimated {
        safe_min_ppm: f64,
        safe_max_ppm: f64,
        dangerous_threshold_ppm: f64,
        confidence: f64,
    },
}

/// Sink for sorting events.
pub trait TelemetrySink: Send + Sync {
    /// Emits a single event. Implementations must not block.
    fn emit(&self, event: SortingEvent);
}

/// Sink that discards all events.
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: SortingEvent) {}
}

/// Sink that logs events via `tracing`.
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: SortingEvent) {
        match &event {
            SortingEvent::PathGenerated {
                parcel_id,
                chute_id,
                segment_count,
                total_ttl_ms,
            } => info!(
                parcel_id = %parcel_id,
                chute_id,
                segment_count,
                total_ttl_ms,
                "Path generated"
            ),
            SortingEvent::PathUnavailable { parcel_id, chute_id } => warn!(
                parcel_id = %parcel_id,
                chute_id,
                "No route for chute, diverting to exception chute"
            ),
            SortingEvent::PathValidationFailed {
                parcel_id,
                chute_id,
                diverter_id,
            } => warn!(
                parcel_id = %parcel_id,
                chute_id,
                diverter_id = %diverter_id,
                "Path rejected pre-execution"
            ),
            SortingEvent::OverloadRejected {
                parcel_id,
                chute_id,
                budget_ms,
            } => warn!(
                parcel_id = %parcel_id,
                chute_id,
                budget_ms,
                "Path cannot complete within budget"
            ),
            SortingEvent::SegmentCompleted {
                parcel_id,
                diverter_id,
                direction,
                elapsed,
            } => info!(
                parcel_id = %parcel_id,
                diverter_id = %diverter_id,
                direction = %direction,
                elapsed_ms = elapsed.as_millis() as u64,
                "Segment completed"
            ),
            SortingEvent::SegmentFailed {
                parcel_id,
                diverter_id,
                reason,
            } => warn!(
                parcel_id = %parcel_id,
                diverter_id = %diverter_id,
                reason = %reason,
                "Segment failed"
            ),
            SortingEvent::FallbackSubstituted {
                parcel_id,
                diverter_id,
                planned,
                fallback,
            } => warn!(
                parcel_id = %parcel_id,
                diverter_id = %diverter_id,
                planned = %planned,
                fallback = %fallback,
                "Deadline passed, fallback action substituted"
            ),
            SortingEvent::RerouteAttempted {
                parcel_id,
                failed_node_id,
            } => info!(
                parcel_id = %parcel_id,
                failed_node_id = %failed_node_id,
                "Attempting reroute"
            ),
            SortingEvent::RerouteSucceeded {
                parcel_id,
                remaining_segments,
            } => info!(
                parcel_id = %parcel_id,
                remaining_segments,
                "Reroute succeeded"
            ),
            SortingEvent::RerouteFailed {
                parcel_id,
                failed_node_id,
                detail,
            } => warn!(
                parcel_id = %parcel_id,
                failed_node_id = %failed_node_id,
                detail = %detail,
                "Reroute failed"
            ),
            SortingEvent::ParcelSorted {
                parcel_id,
                chute_id,
                duration,
            } => info!(
                parcel_id = %parcel_id,
                chute_id,
                duration_ms = duration.as_millis() as u64,
                "Parcel sorted"
            ),
            SortingEvent::ParcelTimedOut { parcel_id } => {
                warn!(parcel_id = %parcel_id, "Parcel timed out")
            }
            SortingEvent::ParcelLost { parcel_id } => {
                warn!(parcel_id = %parcel_id, "Parcel lost")
            }
            SortingEvent::CapacityEstimated {
                safe_min_ppm,
                safe_max_ppm,
                dangerous_threshold_ppm,
                confidence,
            } => info!(
                safe_min_ppm,
                safe_max_ppm,
                dangerous_threshold_ppm,
                confidence,
                "Capacity estimated"
            ),
        }
    }
}

/// Sink that forwards each event to multiple sinks.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiplexTelemetrySink {
    /// Creates a multiplexer over the given sinks.
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: SortingEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
