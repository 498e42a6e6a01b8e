//! Per-diverter position queue with deadline-tracked pops.

use crate::hardware::DiverterDirection;
use crate::parcel::ParcelId;
use std::time::Instant;

/// Fallback action substituted for late parcels.
///
/// Straight-through is chosen because it never blocks downstream flow.
pub const DEFAULT_FALLBACK_ACTION: DiverterDirection = DiverterDirection::Straight;

/// A scheduled task for one diverter.
///
/// Created when a path is generated; consumed and removed when the
/// diverter fires or the deadline passes.
#[derive(Clone, Debug)]
pub struct PositionQueueItem {
    /// Parcel this task belongs to.
    pub parcel_id: ParcelId,
    /// Diverter the task is scheduled on.
    pub diverter_id: String,
    /// Action planned for the parcel.
    pub planned: DiverterDirection,
    /// Absolute time the parcel is expected to arrive at the diverter.
    pub expected_arrival: Instant,
    /// Grace period after expected arrival before the task is late.
    pub timeout_threshold_ms: u64,
    /// Action substituted when the task is late.
    pub fallback: DiverterDirection,
    /// Segment position within the parcel's path, starting at 1.
    pub position_index: u32,
    /// When the task was created; FIFO tie-break on equal arrival.
    pub created_at: Instant,
}

impl PositionQueueItem {
    /// The absolute deadline after which the fallback action applies.
    pub fn deadline(&self) -> Instant {
        self.expected_arrival + std::time::Duration::from_millis(self.timeout_threshold_ms)
    }

    /// Returns whether the task is past its deadline at `now`.
    pub fn is_late(&self, now: Instant) -> bool {
        now > self.deadline()
    }
}

/// Whether a popped task was executed on time or substituted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOutcome {
    /// The planned action applies.
    OnTime,
    /// The deadline passed; the fallback action applies instead.
    TimedOut,
}

/// The action a diverter should take for its head-of-queue task.
#[derive(Clone, Debug)]
pub struct QueueDecision {
    /// The popped task.
    pub item: PositionQueueItem,
    /// The action to execute: planned when on time, fallback when late.
    pub action: DiverterDirection,
    /// Timeliness of the pop.
    pub outcome: QueueOutcome,
}

/// Ordered task queue for a single diverter.
///
/// Items are kept sorted by expected arrival, earliest first; the
/// creation time breaks ties so equal arrivals pop in FIFO order and no
/// parcel starves. Growth is bounded by one entry per in-flight parcel.
#[derive(Debug, Default)]
pub struct PositionQueue {
    items: Vec<PositionQueueItem>,
}

impl PositionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task in arrival order.
    pub fn push(&mut self, item: PositionQueueItem) {
        let at = self
            .items
            .partition_point(|existing| {
                (existing.expected_arrival, existing.created_at)
                    <= (item.expected_arrival, item.created_at)
            });
        self.items.insert(at, item);
    }

    /// Pops the head task and decides its action against `now`.
    ///
    /// A head past its deadline yields the fallback action, never the
    /// planned one. Returns `None` when the queue is empty.
    pub fn pop_next(&mut self, now: Instant) -> Option<QueueDecision> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items.remove(0);
        let (action, outcome) = if item.is_late(now) {
            (item.fallback, QueueOutcome::TimedOut)
        } else {
            (item.planned, QueueOutcome::OnTime)
        };
        Some(QueueDecision {
            item,
            action,
            outcome,
        })
    }

    /// Returns the head task without removing it.
    pub fn peek(&self) -> Option<&PositionQueueItem> {
        self.items.first()
    }

    /// Removes every task belonging to a parcel, returning the count.
    pub fn remove_parcel(&mut self, parcel_id: &ParcelId) -> usize {
        let before = self.items.len();
        self.items.retain(|item| &item.parcel_id != parcel_id);
        before - self.items.len()
    }

    /// Number of scheduled tasks.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
