//! Immutable parcel lifecycle records.
//!
//! Every transition is a pure function from a prior record plus a
//! timestamp to a new record. Records are never mutated in place, so
//! concurrent readers of a snapshot never see a half-updated record.

use crate::parcel::ParcelId;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Lifecycle status of a parcel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParcelLifecycleStatus {
    /// Seen at the entry sensor, no chute assigned yet.
    Detected,
    /// Upstream assigned a destination chute.
    Assigned,
    /// Path execution started.
    Routing,
    /// Dropoff confirmed.
    Sorted,
    /// A wait budget was exceeded.
    TimedOut,
    /// Lifetime elapsed with no sighting.
    Lost,
}

impl ParcelLifecycleStatus {
    /// Returns whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sorted | Self::TimedOut | Self::Lost)
    }

    /// Returns whether the parcel is still in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Lifecycle transition failures.
#[derive(Debug, Error, PartialEq)]
pub enum TrackingError {
    /// The requested transition is not legal from the current status.
    #[error("invalid transition for parcel {parcel_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        parcel_id: ParcelId,
        from: ParcelLifecycleStatus,
        to: ParcelLifecycleStatus,
    },

    /// No record exists for the parcel.
    #[error("unknown parcel {0}")]
    UnknownParcel(ParcelId),

    /// The supplied timestamp precedes an earlier one in the record.
    #[error("timestamp for parcel {parcel_id} would move backwards")]
    NonMonotonicTimestamp { parcel_id: ParcelId },

    /// Lost was requested before the maximum lifetime elapsed.
    #[error("parcel {parcel_id} cannot be Lost before its maximum lifetime elapses")]
    LostTooEarly { parcel_id: ParcelId },
}

/// Lifecycle record for one parcel.
///
/// Timestamps are monotonic in the order detected ≤ assigned ≤ sorted
/// where present.
#[derive(Clone, Debug, PartialEq)]
pub struct ParcelTrackingRecord {
    /// Parcel this record tracks.
    pub parcel_id: ParcelId,
    /// When the entry sensor detected the parcel.
    pub detected_at: DateTime<Utc>,
    /// When upstream assigned a chute.
    pub assigned_at: Option<DateTime<Utc>>,
    /// When the dropoff was confirmed.
    pub sorted_at: Option<DateTime<Utc>>,
    /// Most recent confirmed sighting, including terminal classification.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Chute decided upstream.
    pub target_chute_id: Option<u32>,
    /// Chute the parcel actually reached.
    pub actual_chute_id: Option<u32>,
    /// Current lifecycle status.
    pub status: ParcelLifecycleStatus,
}

impl ParcelTrackingRecord {
    /// Creates a record for a freshly detected parcel.
    pub fn detected(parcel_id: ParcelId, at: DateTime<Utc>) -> Self {
        Self {
            parcel_id,
            detected_at: at,
            assigned_at: None,
            sorted_at: None,
            last_seen_at: None,
            target_chute_id: None,
            actual_chute_id: None,
            status: ParcelLifecycleStatus::Detected,
        }
    }

    /// Detected → Assigned, on upstream chute assignment.
    pub fn with_assigned(
        &self,
        chute_id: u32,
        at: DateTime<Utc>,
    ) -> Result<Self, TrackingError> {
        self.expect_status(ParcelLifecycleStatus::Detected, ParcelLifecycleStatus::Assigned)?;
        self.expect_not_before(at, self.detected_at)?;
        Ok(Self {
            assigned_at: Some(at),
            target_chute_id: Some(chute_id),
            status: ParcelLifecycleStatus::Assigned,
            ..self.clone()
        })
    }

    /// Assigned → Routing, when path execution starts.
    pub fn with_routing(&self, at: DateTime<Utc>) -> Result<Self, TrackingError> {
        self.expect_status(ParcelLifecycleStatus::Assigned, ParcelLifecycleStatus::Routing)?;
        self.expect_not_before(at, self.assigned_at.unwrap_or(self.detected_at))?;
        Ok(Self {
            last_seen_at: Some(at),
            status: ParcelLifecycleStatus::Routing,
            ..self.clone()
        })
    }

    /// Routing → Sorted, on confirmed dropoff.
    pub fn with_sorted(
        &self,
        actual_chute_id: u32,
        at: DateTime<Utc>,
    ) -> Result<Self, TrackingError> {
        self.expect_status(ParcelLifecycleStatus::Routing, ParcelLifecycleStatus::Sorted)?;
        self.expect_not_before(at, self.assigned_at.unwrap_or(self.detected_at))?;
        Ok(Self {
            sorted_at: Some(at),
            last_seen_at: Some(at),
            actual_chute_id: Some(actual_chute_id),
            status: ParcelLifecycleStatus::Sorted,
            ..self.clone()
        })
    }

    /// Any active state → TimedOut, when a wait budget is exceeded.
    pub fn with_timed_out(&self, at: DateTime<Utc>) -> Result<Self, TrackingError> {
        if self.status.is_terminal() {
            return Err(TrackingError::InvalidTransition {
                parcel_id: self.parcel_id.clone(),
                from: self.status,
                to: ParcelLifecycleStatus::TimedOut,
            });
        }
        Ok(Self {
            last_seen_at: Some(at),
            status: ParcelLifecycleStatus::TimedOut,
            ..self.clone()
        })
    }

    /// Any active state → Lost, once the maximum lifetime elapsed with no
    /// sighting.
    pub fn with_lost(
        &self,
        at: DateTime<Utc>,
        max_lifetime: Duration,
    ) -> Result<Self, TrackingError> {
        if self.status.is_terminal() {
            return Err(TrackingError::InvalidTransition {
                parcel_id: self.parcel_id.clone(),
                from: self.status,
                to: ParcelLifecycleStatus::Lost,
            });
        }
        let lifetime = chrono::Duration::from_std(max_lifetime)
            .unwrap_or_else(|_| chrono::Duration::max_value());
        if at.signed_duration_since(self.detected_at) < lifetime {
            return Err(TrackingError::LostTooEarly {
                parcel_id: self.parcel_id.clone(),
            });
        }
        Ok(Self {
            last_seen_at: Some(at),
            status: ParcelLifecycleStatus::Lost,
            ..self.clone()
        })
    }

    /// Records a confirmed sighting without changing status.
    ///
    /// Terminal records are returned unchanged.
    pub fn with_seen(&self, at: DateTime<Utc>) -> Self {
        if self.status.is_terminal() {
            return self.clone();
        }
        Self {
            last_seen_at: Some(at),
            ..self.clone()
        }
    }

    /// When the record reached its terminal status, if it has.
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        if !self.status.is_terminal() {
            return None;
        }
        self.sorted_at.or(self.last_seen_at).or(Some(self.detected_at))
    }

    /// Most recent confirmed sighting, falling back to detection.
    pub fn last_sighting(&self) -> DateTime<Utc> {
        self.last_seen_at.unwrap_or(self.detected_at)
    }

    fn expect_status(
        &self,
        expected: ParcelLifecycleStatus,
        to: ParcelLifecycleStatus,
    ) -> Result<(), TrackingError> {
        if self.status != expected {
            return Err(TrackingError::InvalidTransition {
                parcel_id: self.parcel_id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn expect_not_before(
        &self,
        at: DateTime<Utc>,
        earlier: DateTime<Utc>,
    ) -> Result<(), TrackingError> {
        if at < earlier {
            return Err(TrackingError::NonMonotonicTimestamp {
                parcel_id: self.parcel_id.clone(),
            });
        }
        Ok(())
    }
}
