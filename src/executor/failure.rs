//! Segment failure classification.

use crate::hardware::DriverError;
use std::fmt;

/// Why a path segment failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathFailureReason {
    /// The diverter refused the command (mechanical interlock) or the
    /// route configuration names an unknown device.
    PhysicalConstraint,
    /// The diverter did not acknowledge within the segment TTL.
    CommunicationTimeout,
    /// The health registry or driver reports the node degraded.
    NodeUnhealthy,
    /// The parcel left the belt or was cancelled mid-path.
    ParcelDropout,
}

impl PathFailureReason {
    /// Whether rerouting can recover from this failure.
    ///
    /// A physical constraint or a lost parcel cannot be fixed by choosing
    /// a different path.
    pub fn is_reroutable(&self) -> bool {
        matches!(self, Self::CommunicationTimeout | Self::NodeUnhealthy)
    }
}

impl fmt::Display for PathFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PhysicalConstraint => write!(f, "PhysicalConstraint"),
            Self::CommunicationTimeout => write!(f, "CommunicationTimeout"),
            Self::NodeUnhealthy => write!(f, "NodeUnhealthy"),
            Self::ParcelDropout => write!(f, "ParcelDropout"),
        }
    }
}

impl From<&DriverError> for PathFailureReason {
    fn from(error: &DriverError) -> Self {
        match error {
            DriverError::CommunicationTimeout { .. } => Self::CommunicationTimeout,
            DriverError::DeviceFault { .. } => Self::NodeUnhealthy,
            DriverError::UnknownDiverter(_) => Self::PhysicalConstraint,
        }
    }
}

/// A failed segment with enough context to attempt a reroute.
#[derive(Clone, Debug)]
pub struct SegmentFailure {
    /// Classification of the failure.
    pub reason: PathFailureReason,
    /// Diverter at which the segment failed.
    pub diverter_id: String,
    /// Zero-based index of the failed segment within the path.
    pub segment_index: usize,
}
