//! Conveyor topology and route configuration interfaces.
//!
//! Route tables map a destination chute to the ordered list of diverters a
//! parcel must traverse; the topology exposes per-segment geometry
//! (length, belt speed, tolerance). Both are supplied by the configuration
//! store and are read-mostly, so implementations should be cheap to query
//! on the hot path.

use crate::hardware::DiverterDirection;
use std::collections::HashMap;

/// Physical geometry of one conveyor segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentGeometry {
    /// Segment length in millimetres.
    pub length_mm: u32,
    /// Belt speed in millimetres per second.
    pub speed_mm_per_s: u32,
    /// Timing tolerance added to the transit time, in milliseconds.
    pub tolerance_ms: u32,
}

impl SegmentGeometry {
    /// Transit time for this segment in milliseconds, rounded up.
    ///
    /// Returns `None` when the configured speed is non-positive; callers
    /// must treat that as a configuration error, not a zero-length hop.
    pub fn transit_ms(&self) -> Option<u64> {
        if self.speed_mm_per_s == 0 {
            return None;
        }
        let length = u64::from(self.length_mm) * 1000;
        let speed = u64::from(self.speed_mm_per_s);
        Some(length.div_ceil(speed))
    }
}

/// One diverter entry in a chute's route configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    /// Position of this diverter in the route, starting at 1.
    pub sequence_number: u32,
    /// Identifier of the diverter to actuate.
    pub diverter_id: String,
    /// Direction the diverter must take for this chute.
    pub direction: DiverterDirection,
    /// Geometry of the segment leading to this diverter.
    pub geometry: SegmentGeometry,
}

/// Route configuration lookup, keyed by destination chute.
pub trait RouteTable: Send + Sync {
    /// Returns the ordered diverter entries for a chute, or `None` when no
    /// route is configured.
    fn get_route(&self, chute_id: u32) -> Option<Vec<RouteEntry>>;

    /// Returns all chute IDs with a configured route.
    fn chute_ids(&self) -> Vec<u32>;

    /// Returns the full required-diverter list for a chute, in route order.
    fn required_diverters(&self, chute_id: u32) -> Vec<String> {
        self.get_route(chute_id)
            .map(|entries| entries.into_iter().map(|e| e.diverter_id).collect())
            .unwrap_or_default()
    }
}

/// Line geometry lookup for the entry-sensor to first-diverter walk.
pub trait Topology: Send + Sync {
    /// Returns the segments between a line's entry sensor and its first
    /// decision diverter, or `None` when the line is not configured.
    fn line_segments(&self, line_id: &str) -> Option<Vec<SegmentGeometry>>;
}

/// In-memory route table, used for composition and tests.
#[derive(Debug, Default)]
pub struct StaticRouteTable {
    routes: HashMap<u32, Vec<RouteEntry>>,
}

impl StaticRouteTable {
    /// Creates an empty route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the route for a chute, replacing any existing route.
    pub fn insert_route(&mut self, chute_id: u32, entries: Vec<RouteEntry>) {
        self.routes.insert(chute_id, entries);
    }

    /// Builder-style variant of [`insert_route`].
    ///
    /// [`insert_route`]: StaticRouteTable::insert_route
    pub fn with_route(mut self, chute_id: u32, entries: Vec<RouteEntry>) -> Self {
        self.insert_route(chute_id, entries);
        self
    }
}

impl RouteTable for StaticRouteTable {
    fn get_route(&self, chute_id: u32) -> Option<Vec<RouteEntry>> {
        self.routes.get(&chute_id).cloned()
    }

    fn chute_ids(&self) -> Vec<u32> {
        self.routes.keys().copied().collect()
    }
}

/// In-memory topology, used for composition and tests.
#[derive(Debug, Default)]
pub struct StaticTopology {
    lines: HashMap<String, Vec<SegmentGeometry>>,
}

impl StaticTopology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the segment walk for a line.
    pub fn insert_line(&mut self, line_id: impl Into<String>, segments: Vec<SegmentGeometry>) {
        self.lines.insert(line_id.into(), segments);
    }

    /// Builder-style variant of [`insert_line`].
    ///
    /// [`insert_line`]: StaticTopology::insert_line
    pub fn with_line(mut self, line_id: impl Into<String>, segments: Vec<SegmentGeometry>) -> Self {
        self.insert_line(line_id, segments);
        self
    }
}

impl Topology for StaticTopology {
    fn line_segments(&self, line_id: &str) -> Option<Vec<SegmentGeometry>> {
        self.lines.get(line_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u32, id: &str) -> RouteEntry {
        RouteEntry {
            sequence_number: seq,
            diverter_id: id.to_string(),
            direction: DiverterDirection::Left,
            geometry: SegmentGeometry {
                length_mm: 1000,
                speed_mm_per_s: 500,
                tolerance_ms: 100,
            },
        }
    }

    #[test]
    fn transit_time_rounds_up() {
        let geometry = SegmentGeometry {
            length_mm: 1000,
            speed_mm_per_s: 500,
            tolerance_ms: 0,
        };
        assert_eq!(geometry.transit_ms(), Some(2000));

        // 999mm at 1000mm/s is 999ms exactly; 1000mm at 333mm/s rounds up
        let geometry = SegmentGeometry {
            length_mm: 1000,
            speed_mm_per_s: 333,
            tolerance_ms: 0,
        };
        assert_eq!(geometry.transit_ms(), Some(3004));
    }

    #[test]
    fn zero_speed_is_a_config_error_not_a_zero_hop() {
        let geometry = SegmentGeometry {
            length_mm: 1000,
            speed_mm_per_s: 0,
            tolerance_ms: 100,
        };
        assert_eq!(geometry.transit_ms(), None);
    }

    #[test]
    fn static_route_table_lookup() {
        let table = StaticRouteTable::new().with_route(7, vec![entry(1, "D1"), entry(2, "D2")]);

        let route = table.get_route(7).unwrap();
        assert_eq!(route.len(), 2);
        assert_eq!(route[0].diverter_id, "D1");
        assert!(table.get_route(8).is_none());
        assert_eq!(table.chute_ids(), vec![7]);
    }

    #[test]
    fn required_diverters_preserve_route_order() {
        let table = StaticRouteTable::new().with_route(7, vec![entry(1, "D1"), entry(2, "D2")]);
        assert_eq!(table.required_diverters(7), vec!["D1", "D2"]);
        assert!(table.required_diverters(99).is_empty());
    }

    #[test]
    fn static_topology_lookup() {
        let topology = StaticTopology::new().with_line(
            "line-1",
            vec![SegmentGeometry {
                length_mm: 2000,
                speed_mm_per_s: 1000,
                tolerance_ms: 0,
            }],
        );

        assert_eq!(topology.line_segments("line-1").unwrap().len(), 1);
        assert!(topology.line_segments("line-2").is_none());
    }
}
