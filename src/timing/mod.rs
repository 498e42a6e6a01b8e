//! Assignment-wait budget derivation.
//!
//! How long may we legitimately wait for an upstream chute assignment?
//! The answer is physical: the transit time from the entry sensor to the
//! first decision diverter, scaled by a safety factor. Configuration
//! failures fall back to a fixed default, always with a trace.

use crate::topology::Topology;
use std::sync::Arc;
use tracing::warn;

/// Lower clamp for the safety factor.
pub const MIN_SAFETY_FACTOR: f64 = 0.1;

/// Upper clamp for the safety factor.
pub const MAX_SAFETY_FACTOR: f64 = 1.0;

/// Derives wait budgets from line geometry.
pub struct TimeoutCalculator {
    topology: Arc<dyn Topology>,
    default_wait_secs: f64,
}

impl TimeoutCalculator {
    /// Creates a calculator over the given topology.
    ///
    /// `default_wait_secs` is returned whenever the topology cannot supply
    /// a physical budget.
    pub fn new(topology: Arc<dyn Topology>, default_wait_secs: f64) -> Self {
        Self {
            topology,
            default_wait_secs,
        }
    }

    /// Assignment-wait budget for a line, in seconds.
    ///
    /// Walks the line from the entry sensor to the first decision
    /// diverter, summing `length / speed` per segment, then scales by the
    /// clamped safety factor. Falls back to the default (logged) when the
    /// line is unknown, a segment speed is non-positive, or the computed
    /// value is non-positive.
    pub fn calculate_timeout_seconds(&self, line_id: &str, safety_factor: f64) -> f64 {
        let factor = safety_factor.clamp(MIN_SAFETY_FACTOR, MAX_SAFETY_FACTOR);
        if factor != safety_factor {
            warn!(
                line_id,
                safety_factor,
                clamped = factor,
                "Safety factor outside [0.1, 1.0], clamped"
            );
        }

        let Some(segments) = self.topology.line_segments(line_id) else {
            warn!(
                line_id,
                default_secs = self.default_wait_secs,
                "No topology for line, using default assignment wait"
            );
            return self.default_wait_secs;
        };

        let mut transit_secs = 0.0;
        for segment in &segments {
            if segment.speed_mm_per_s == 0 {
                warn!(
                    line_id,
                    default_secs = self.default_wait_secs,
                    "Non-positive segment speed, using default assignment wait"
                );
                return self.default_wait_secs;
            }
            transit_secs += f64::from(segment.length_mm) / f64::from(segment.speed_mm_per_s);
        }

        let budget = transit_secs * factor;
        if budget <= 0.0 {
            warn!(
                line_id,
                default_secs = self.default_wait_secs,
                "Computed assignment wait is non-positive, using default"
            );
            return self.default_wait_secs;
        }
        budget
    }
}
