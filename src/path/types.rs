//! Switching path value types.

use crate::hardware::DiverterDirection;
use std::time::SystemTime;

/// One diverter action plus its timing deadline within a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchingPathSegment {
    /// Position within the path, contiguous from 1.
    pub sequence_number: u32,
    /// Diverter to actuate.
    pub diverter_id: String,
    /// Direction the diverter must take.
    pub direction: DiverterDirection,
    /// Deadline for completing this segment's action, in milliseconds.
    pub ttl_ms: u64,
}

/// Immutable routing plan for one parcel.
///
/// Created once at assignment time and never mutated. Rerouting supersedes
/// a path with a new one containing only the remaining segments; it never
/// edits an existing path.
#[derive(Clone, Debug)]
pub struct SwitchingPath {
    /// Destination chute this plan routes to.
    pub target_chute_id: u32,
    /// Ordered diverter actions.
    pub segments: Vec<SwitchingPathSegment>,
    /// When this plan was generated.
    pub generated_at: SystemTime,
    /// Chute used when the whole path cannot be honored.
    pub fallback_chute_id: u32,
}

impl SwitchingPath {
    /// Sum of all segment TTLs, in milliseconds.
    pub fn total_ttl_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.ttl_ms).sum()
    }

    /// Returns the index of the segment actuating the given diverter.
    pub fn position_of(&self, diverter_id: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.diverter_id == diverter_id)
    }

    /// Structural equality ignoring the generation timestamp.
    pub fn same_plan(&self, other: &SwitchingPath) -> bool {
        self.target_chute_id == other.target_chute_id
            && self.fallback_chute_id == other.fallback_chute_id
            && self.segments == other.segments
    }
}
