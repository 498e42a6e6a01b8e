//! Deadline-tracked position queues.
//!
//! Each diverter owns an ordered queue of scheduled tasks, one per
//! in-flight parcel. Popping the head against the current time either
//! confirms the planned action or, past the deadline, substitutes the
//! fallback action so a late or lost parcel never receives a stale
//! directional command.

mod queue;
mod registry;

pub use queue::{
    PositionQueue, PositionQueueItem, QueueDecision, QueueOutcome, DEFAULT_FALLBACK_ACTION,
};
pub use registry::DeadlineQueueRegistry;
