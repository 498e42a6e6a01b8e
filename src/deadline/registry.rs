//! Registry of per-diverter position queues.

use super::queue::{PositionQueue, PositionQueueItem, QueueDecision, DEFAULT_FALLBACK_ACTION};
use crate::parcel::ParcelId;
use crate::path::SwitchingPath;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Concurrent map of position queues, keyed by diverter ID.
///
/// This is the single source of truth for "what should this diverter do
/// right now". Queues are created lazily on first enqueue and live for the
/// process lifetime.
#[derive(Debug, Default)]
pub struct DeadlineQueueRegistry {
    queues: DashMap<String, PositionQueue>,
}

impl DeadlineQueueRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules one task on its diverter's queue.
    pub fn enqueue(&self, item: PositionQueueItem) {
        self.queues
            .entry(item.diverter_id.clone())
            .or_default()
            .push(item);
    }

    /// Schedules every segment of a path, with arrivals derived from the
    /// cumulative TTLs of the preceding segments.
    ///
    /// Segment `i`'s expected arrival is `start + Σ ttl of segments before
    /// i`; its timeout threshold is its own TTL. This keeps arrivals
    /// monotonically consistent with the transit times the TTLs encode.
    pub fn enqueue_path(&self, parcel_id: &ParcelId, path: &SwitchingPath, start: Instant) {
        let created_at = Instant::now();
        let mut offset_ms: u64 = 0;
        for segment in &path.segments {
            self.enqueue(PositionQueueItem {
                parcel_id: parcel_id.clone(),
                diverter_id: segment.diverter_id.clone(),
                planned: segment.direction,
                expected_arrival: start + Duration::from_millis(offset_ms),
                timeout_threshold_ms: segment.ttl_ms,
                fallback: DEFAULT_FALLBACK_ACTION,
                position_index: segment.sequence_number,
                created_at,
            });
            offset_ms += segment.ttl_ms;
        }
        debug!(
            parcel_id = %parcel_id,
            chute_id = path.target_chute_id,
            segments = path.segments.len(),
            "Scheduled path on position queues"
        );
    }

    /// Pops and decides the head task for a diverter.
    pub fn pop_next(&self, diverter_id: &str, now: Instant) -> Option<QueueDecision> {
        self.queues.get_mut(diverter_id)?.pop_next(now)
    }

    /// Removes a parcel's tasks from every queue, returning the count.
    ///
    /// Called when a parcel reaches a terminal state so superseded tasks
    /// never fire.
    pub fn remove_parcel(&self, parcel_id: &ParcelId) -> usize {
        let mut removed = 0;
        for mut entry in self.queues.iter_mut() {
            removed += entry.value_mut().remove_parcel(parcel_id);
        }
        if removed > 0 {
            debug!(parcel_id = %parcel_id, removed, "Cleared scheduled tasks");
        }
        removed
    }

    /// Number of tasks currently scheduled on a diverter.
    pub fn depth(&self, diverter_id: &str) -> usize {
        self.queues.get(diverter_id).map_or(0, |q| q.len())
    }

    /// Total tasks scheduled across all diverters.
    pub fn total_depth(&self) -> usize {
        self.queues.iter().map(|entry| entry.value().len()).sum()
    }
}
