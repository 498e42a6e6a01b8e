//! Failure-triggered path rerouting.
//!
//! A deliberately conservative heuristic: take the segments after the
//! failure point, intersect them with the chute's full required-diverter
//! list, and splice a new path only when every required diverter is still
//! reachable downstream. Route tables are authored as total orders of
//! required nodes; this service never invents alternate topological paths
//! through unvalidated geometry.

use crate::executor::PathFailureReason;
use crate::parcel::ParcelId;
use crate::path::{SwitchingPath, SwitchingPathSegment};
use crate::topology::RouteTable;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Outcome of a reroute attempt.
#[derive(Clone, Debug)]
pub enum RerouteResult {
    /// A new path covering the remaining segments.
    Rerouted(SwitchingPath),
    /// No reroute is possible from the failure point.
    Unrecoverable {
        /// Node at which the original path failed.
        failed_node_id: String,
        /// Human-readable diagnostic for the completion notification.
        detail: String,
    },
}

impl RerouteResult {
    /// Returns the new path, if any.
    pub fn path(&self) -> Option<&SwitchingPath> {
        match self {
            Self::Rerouted(path) => Some(path),
            Self::Unrecoverable { .. } => None,
        }
    }
}

/// Splices replacement paths from a failure point.
pub struct RerouteService {
    routes: Arc<dyn RouteTable>,
}

impl RerouteService {
    /// Creates a reroute service over the given route table.
    pub fn new(routes: Arc<dyn RouteTable>) -> Self {
        Self { routes }
    }

    /// Attempts to splice a new path after a segment failure.
    ///
    /// Never panics: an unknown failed node or an unreachable required set
    /// yields [`RerouteResult::Unrecoverable`] with a diagnostic naming
    /// the node.
    pub fn try_reroute(
        &self,
        parcel_id: &ParcelId,
        current_path: &SwitchingPath,
        failed_node_id: &str,
        reason: PathFailureReason,
    ) -> RerouteResult {
        if !reason.is_reroutable() {
            return self.unrecoverable(
                parcel_id,
                failed_node_id,
                format!("failure reason {} is not recoverable by rerouting", reason),
            );
        }

        let Some(failed_index) = current_path.position_of(failed_node_id) else {
            return self.unrecoverable(
                parcel_id,
                failed_node_id,
                format!(
                    "failed node {} is not part of the current path",
                    failed_node_id
                ),
            );
        };

        let required = self
            .routes
            .required_diverters(current_path.target_chute_id);
        let required_set: HashSet<&str> = required.iter().map(String::as_str).collect();

        // Keep the downstream segments that are still required, preserving
        // their original direction and TTL.
        let remaining: Vec<SwitchingPathSegment> = current_path.segments[failed_index + 1..]
            .iter()
            .filter(|segment| required_set.contains(segment.diverter_id.as_str()))
            .cloned()
            .collect();

        // An empty splice would "complete" without commanding anything;
        // a parcel with no actionable segments left is not rerouted.
        if remaining.is_empty() {
            return self.unrecoverable(
                parcel_id,
                failed_node_id,
                format!("no actionable segments remain after {}", failed_node_id),
            );
        }

        if remaining.len() != required_set.len() {
            return self.unrecoverable(
                parcel_id,
                failed_node_id,
                format!(
                    "only {} of {} required diverters reachable after {}",
                    remaining.len(),
                    required_set.len(),
                    failed_node_id
                ),
            );
        }

        let segments: Vec<SwitchingPathSegment> = remaining
            .into_iter()
            .enumerate()
            .map(|(index, segment)| SwitchingPathSegment {
                sequence_number: (index + 1) as u32,
                ..segment
            })
            .collect();

        debug!(
            parcel_id = %parcel_id,
            failed_node_id = %failed_node_id,
            remaining_segments = segments.len(),
            "Spliced replacement path"
        );

        RerouteResult::Rerouted(SwitchingPath {
            target_chute_id: current_path.target_chute_id,
            segments,
            generated_at: SystemTime::now(),
            fallback_chute_id: current_path.fallback_chute_id,
        })
    }

    fn unrecoverable(
        &self,
        parcel_id: &ParcelId,
        failed_node_id: &str,
        detail: String,
    ) -> RerouteResult {
        warn!(
            parcel_id = %parcel_id,
            failed_node_id = %failed_node_id,
            detail = %detail,
            "Reroute not possible"
        );
        RerouteResult::Unrecoverable {
            failed_node_id: failed_node_id.to_string(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::DiverterDirection;
    use crate::topology::{RouteEntry, SegmentGeometry, StaticRouteTable};

    fn geometry() -> SegmentGeometry {
        SegmentGeometry {
            length_mm: 1000,
            speed_mm_per_s: 500,
            tolerance_ms: 100,
        }
    }

    fn entry(seq: u32, id: &str) -> RouteEntry {
        RouteEntry {
            sequence_number: seq,
            diverter_id: id.to_string(),
            direction: DiverterDirection::Left,
            geometry: geometry(),
        }
    }

    fn segment(seq: u32, id: &str) -> SwitchingPathSegment {
        SwitchingPathSegment {
            sequence_number: seq,
            diverter_id: id.to_string(),
            direction: DiverterDirection::Left,
            ttl_ms: 2100,
        }
    }

    fn path_over(diverters: &[&str]) -> SwitchingPath {
        SwitchingPath {
            target_chute_id: 7,
            segments: diverters
                .iter()
                .enumerate()
                .map(|(index, id)| segment((index + 1) as u32, id))
                .collect(),
            generated_at: SystemTime::now(),
            fallback_chute_id: 0,
        }
    }

    fn service_with_required(required: &[&str]) -> RerouteService {
        let entries = required
            .iter()
            .enumerate()
            .map(|(index, id)| entry((index + 1) as u32, id))
            .collect();
        RerouteService::new(Arc::new(StaticRouteTable::new().with_route(7, entries)))
    }

    #[test]
    fn splices_remaining_segments_when_required_set_is_covered() {
        // Route requires only D2 and D3; the current path also crossed D1.
        let service = service_with_required(&["D2", "D3"]);
        let current = path_over(&["D1", "D2", "D3"]);
        let parcel = ParcelId::new("P1");

        let result = service.try_reroute(
            &parcel,
            &current,
            "D1",
            PathFailureReason::CommunicationTimeout,
        );

        let new_path = result.path().expect("reroute should succeed");
        assert_eq!(new_path.segments.len(), 2);
        assert_eq!(new_path.segments[0].diverter_id, "D2");
        assert_eq!(new_path.segments[0].sequence_number, 1);
        assert_eq!(new_path.segments[1].sequence_number, 2);
        // Direction and TTL preserved from the original plan
        assert_eq!(new_path.segments[0].ttl_ms, 2100);
        assert_eq!(new_path.fallback_chute_id, 0);
    }

    #[test]
    fn fails_when_a_required_diverter_is_upstream_of_the_failure() {
        let service = service_with_required(&["D1", "D2", "D3"]);
        let current = path_over(&["D1", "D2", "D3"]);
        let parcel = ParcelId::new("P1");

        // D1 is required but the failure happened at D2; D1 is behind us.
        let result = service.try_reroute(
            &parcel,
            &current,
            "D2",
            PathFailureReason::CommunicationTimeout,
        );

        assert!(matches!(result, RerouteResult::Unrecoverable { .. }));
    }

    #[test]
    fn unknown_failed_node_yields_diagnostic_not_panic() {
        let service = service_with_required(&["D1", "D2"]);
        let current = path_over(&["D1", "D2"]);
        let parcel = ParcelId::new("P1");

        let result = service.try_reroute(
            &parcel,
            &current,
            "D9",
            PathFailureReason::CommunicationTimeout,
        );

        match result {
            RerouteResult::Unrecoverable {
                failed_node_id,
                detail,
            } => {
                assert_eq!(failed_node_id, "D9");
                assert!(detail.contains("D9"));
            }
            RerouteResult::Rerouted(_) => panic!("expected unrecoverable"),
        }
    }

    #[test]
    fn empty_required_set_never_yields_an_empty_path() {
        // No route entries for the chute: the required set is empty, so an
        // unguarded length comparison would hold vacuously.
        let service = RerouteService::new(Arc::new(StaticRouteTable::new()));
        let current = path_over(&["D1", "D2"]);
        let parcel = ParcelId::new("P1");

        let result = service.try_reroute(
            &parcel,
            &current,
            "D2",
            PathFailureReason::CommunicationTimeout,
        );

        assert!(result.path().is_none());
        assert!(matches!(result, RerouteResult::Unrecoverable { .. }));
    }

    #[test]
    fn non_reroutable_reasons_are_refused() {
        let service = service_with_required(&["D2"]);
        let current = path_over(&["D1", "D2"]);
        let parcel = ParcelId::new("P1");

        let result =
            service.try_reroute(&parcel, &current, "D1", PathFailureReason::ParcelDropout);
        assert!(matches!(result, RerouteResult::Unrecoverable { .. }));

        let result = service.try_reroute(
            &parcel,
            &current,
            "D1",
            PathFailureReason::PhysicalConstraint,
        );
        assert!(matches!(result, RerouteResult::Unrecoverable { .. }));
    }
}
