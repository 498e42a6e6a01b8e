//! Path generation from route configuration.
//!
//! Pure lookup plus TTL arithmetic: no I/O, no shared mutable state.
//! Generating the same chute twice against the same configuration yields
//! structurally identical paths.

use super::types::{SwitchingPath, SwitchingPathSegment};
use super::PathError;
use crate::config::ConfigError;
use crate::health::HealthRegistry;
use crate::topology::{RouteTable, SegmentGeometry};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Floor for segment TTLs, guarding against pathologically short deadlines.
pub const MIN_SEGMENT_TTL_MS: u64 = 1_000;

/// Computes a segment's TTL from its geometry.
///
/// `TTL = max(1000, ceil(length / speed * 1000) + tolerance)`. Returns
/// `None` when the configured speed is non-positive.
pub fn segment_ttl_ms(geometry: &SegmentGeometry) -> Option<u64> {
    let transit = geometry.transit_ms()?;
    Some((transit + u64::from(geometry.tolerance_ms)).max(MIN_SEGMENT_TTL_MS))
}

/// Generates timed diverter action sequences for destination chutes.
pub struct PathGenerator {
    routes: Arc<dyn RouteTable>,
    exception_chute_id: u32,
}

impl PathGenerator {
    /// Creates a generator over the given route table.
    pub fn new(routes: Arc<dyn RouteTable>, exception_chute_id: u32) -> Self {
        Self {
            routes,
            exception_chute_id,
        }
    }

    /// Generates the switching path for a target chute.
    ///
    /// Returns `None` when no route is configured or a segment's speed is
    /// non-positive (logged); the caller routes the parcel to the
    /// exception chute in both cases.
    pub fn generate(&self, target_chute_id: u32) -> Option<SwitchingPath> {
        let mut entries = self.routes.get_route(target_chute_id)?;
        entries.sort_by_key(|e| e.sequence_number);

        let mut segments = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let Some(ttl_ms) = segment_ttl_ms(&entry.geometry) else {
                warn!(
                    chute_id = target_chute_id,
                    diverter_id = %entry.diverter_id,
                    "non-positive segment speed, treating route as unavailable"
                );
                return None;
            };
            segments.push(SwitchingPathSegment {
                sequence_number: (index + 1) as u32,
                diverter_id: entry.diverter_id.clone(),
                direction: entry.direction,
                ttl_ms,
            });
        }

        let path = SwitchingPath {
            target_chute_id,
            segments,
            generated_at: SystemTime::now(),
            fallback_chute_id: self.exception_chute_id,
        };

        debug!(
            chute_id = target_chute_id,
            segment_count = path.segments.len(),
            total_ttl_ms = path.total_ttl_ms(),
            "Generated switching path"
        );

        Some(path)
    }

    /// Second-pass overload check before committing a path.
    ///
    /// Sums the segment TTLs and compares against the remaining budget.
    /// The segment TTLs already bake in configured belt speeds; the live
    /// speed only guards the degenerate stopped-belt case.
    pub fn can_complete_in_time(
        &self,
        path: &SwitchingPath,
        current_speed_mm_per_s: u32,
        available_budget_ms: u64,
    ) -> bool {
        if current_speed_mm_per_s == 0 {
            warn!(
                chute_id = path.target_chute_id,
                "belt stopped, path cannot complete in time"
            );
            return false;
        }
        path.total_ttl_ms() <= available_budget_ms
    }

    /// Rejects a path through an unhealthy diverter before execution.
    pub fn validate_health(
        &self,
        path: &SwitchingPath,
        health: &dyn HealthRegistry,
    ) -> Result<(), PathError> {
        for segment in &path.segments {
            if !health.is_node_healthy(&segment.diverter_id) {
                return Err(PathError::ValidationFailed {
                    chute_id: path.target_chute_id,
                    diverter_id: segment.diverter_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Configuration-time checks for one chute's route.
    ///
    /// Segment speeds must be positive, and each segment tolerance must
    /// stay below half the parcel interval so that adjacent parcels'
    /// timeout windows never overlap. This is a load-time invariant, not a
    /// runtime gate.
    pub fn validate_tolerances(
        &self,
        chute_id: u32,
        parcel_interval_ms: u64,
    ) -> Result<(), ConfigError> {
        let Some(entries) = self.routes.get_route(chute_id) else {
            return Ok(());
        };
        for entry in entries {
            if entry.geometry.speed_mm_per_s == 0 {
                return Err(ConfigError::NonPositiveSpeed {
                    chute_id,
                    diverter_id: entry.diverter_id,
                });
            }
            if u64::from(entry.geometry.tolerance_ms) >= parcel_interval_ms / 2 {
                return Err(ConfigError::ToleranceTooLarge {
                    chute_id,
                    diverter_id: entry.diverter_id,
                    tolerance_ms: entry.geometry.tolerance_ms,
                    parcel_interval_ms,
                });
            }
        }
        Ok(())
    }

    /// Runs the tolerance check for every configured chute.
    pub fn validate_all_tolerances(&self, parcel_interval_ms: u64) -> Result<(), ConfigError> {
        for chute_id in self.routes.chute_ids() {
            self.validate_tolerances(chute_id, parcel_interval_ms)?;
        }
        Ok(())
    }

    /// The chute parcels fall back to when no route can be honored.
    pub fn exception_chute_id(&self) -> u32 {
        self.exception_chute_id
    }
}
