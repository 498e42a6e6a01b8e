//! Parcel lifecycle tracking.
//!
//! Records walk Detected → Assigned → Routing → Sorted, with TimedOut and
//! Lost as failure terminals. Transitions are pure record transforms; the
//! concurrent store swaps whole records; a background monitor sweeps for
//! overdue parcels and reports their disposition upstream.

mod monitor;
mod record;
mod store;

pub use monitor::TrackingMonitor;
pub use record::{ParcelLifecycleStatus, ParcelTrackingRecord, TrackingError};
pub use store::{ParcelTracker, SweepReport};
