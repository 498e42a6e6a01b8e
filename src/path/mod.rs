//! Path generation: target chute to timed diverter action sequence.
//!
//! The generator is a pure function over route configuration. Per-segment
//! TTLs are derived from physical geometry (`length / speed` plus
//! tolerance) with a one-second floor, so deadlines are physical bounds
//! rather than configuration guesses.

mod generator;
mod types;

pub use generator::{segment_ttl_ms, PathGenerator, MIN_SEGMENT_TTL_MS};
pub use types::{SwitchingPath, SwitchingPathSegment};

use thiserror::Error;

/// Path-level failures surfaced before execution.
///
/// A missing route is not an error: [`PathGenerator::generate`] returns
/// `None` and the caller diverts to the exception chute.
#[derive(Debug, Error)]
pub enum PathError {
    /// The path crosses a node the health registry reports unhealthy.
    #[error("path for chute {chute_id} rejected: diverter {diverter_id} is unhealthy")]
    ValidationFailed { chute_id: u32, diverter_id: String },
}
