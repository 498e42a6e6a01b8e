//! Node health and system degradation.
//!
//! The health registry is an external collaborator: the core only asks
//! whether a node is currently healthy before committing a path through it.
//! The degradation mode summarizes the fraction of unhealthy nodes for
//! overload policy and administrative reporting.

use dashmap::DashSet;
use std::fmt;

/// Fraction of unhealthy nodes at which the whole line is considered
/// degraded rather than individual nodes.
pub const DEFAULT_LINE_DEGRADED_FRACTION: f64 = 0.5;

/// Health lookup for conveyor nodes (diverters, sensors).
pub trait HealthRegistry: Send + Sync {
    /// Returns whether the node is currently healthy.
    ///
    /// Unknown nodes are reported healthy; absence of evidence is not a
    /// reason to reject a configured route.
    fn is_node_healthy(&self, node_id: &str) -> bool;
}

/// System-wide degradation state derived from node health.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegradationMode {
    /// All nodes healthy.
    None,
    /// Some nodes unhealthy, below the line-degraded fraction.
    NodeDegraded,
    /// Unhealthy fraction at or above the line-degraded fraction.
    LineDegraded,
}

impl DegradationMode {
    /// Classifies the degradation mode from unhealthy/total node counts.
    ///
    /// `line_fraction` is the unhealthy fraction at which the mode becomes
    /// [`LineDegraded`](DegradationMode::LineDegraded). An empty node set
    /// classifies as `None`.
    pub fn classify(unhealthy: usize, total: usize, line_fraction: f64) -> Self {
        if total == 0 || unhealthy == 0 {
            return Self::None;
        }
        let fraction = unhealthy as f64 / total as f64;
        if fraction >= line_fraction {
            Self::LineDegraded
        } else {
            Self::NodeDegraded
        }
    }
}

impl fmt::Display for DegradationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::NodeDegraded => write!(f, "NodeDegraded"),
            Self::LineDegraded => write!(f, "LineDegraded"),
        }
    }
}

/// In-memory health registry, used for composition and tests.
///
/// Tracks the set of unhealthy nodes; everything else is healthy.
#[derive(Debug, Default)]
pub struct StaticHealthRegistry {
    unhealthy: DashSet<String>,
}

impl StaticHealthRegistry {
    /// Creates a registry with every node healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a node unhealthy.
    pub fn mark_unhealthy(&self, node_id: impl Into<String>) {
        self.unhealthy.insert(node_id.into());
    }

    /// Marks a node healthy again.
    pub fn mark_healthy(&self, node_id: &str) {
        self.unhealthy.remove(node_id);
    }

    /// Returns the number of nodes currently marked unhealthy.
    pub fn unhealthy_count(&self) -> usize {
        self.unhealthy.len()
    }
}

impl HealthRegistry for StaticHealthRegistry {
    fn is_node_healthy(&self, node_id: &str) -> bool {
        !self.unhealthy.contains(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_nodes_are_healthy() {
        let registry = StaticHealthRegistry::new();
        assert!(registry.is_node_healthy("D1"));
    }

    #[test]
    fn mark_and_clear_unhealthy() {
        let registry = StaticHealthRegistry::new();
        registry.mark_unhealthy("D1");
        assert!(!registry.is_node_healthy("D1"));
        assert!(registry.is_node_healthy("D2"));
        assert_eq!(registry.unhealthy_count(), 1);

        registry.mark_healthy("D1");
        assert!(registry.is_node_healthy("D1"));
    }

    #[test]
    fn classify_all_healthy() {
        assert_eq!(
            DegradationMode::classify(0, 10, DEFAULT_LINE_DEGRADED_FRACTION),
            DegradationMode::None
        );
        // Empty node set is not degraded
        assert_eq!(
            DegradationMode::classify(0, 0, DEFAULT_LINE_DEGRADED_FRACTION),
            DegradationMode::None
        );
    }

    #[test]
    fn classify_node_degraded_below_fraction() {
        assert_eq!(
            DegradationMode::classify(1, 10, DEFAULT_LINE_DEGRADED_FRACTION),
            DegradationMode::NodeDegraded
        );
    }

    #[test]
    fn classify_line_degraded_at_fraction() {
        assert_eq!(
            DegradationMode::classify(5, 10, DEFAULT_LINE_DEGRADED_FRACTION),
            DegradationMode::LineDegraded
        );
        assert_eq!(
            DegradationMode::classify(10, 10, DEFAULT_LINE_DEGRADED_FRACTION),
            DegradationMode::LineDegraded
        );
    }
}
