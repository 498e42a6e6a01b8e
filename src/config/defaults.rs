//! Named default values for sorting configuration.
//!
//! Every tunable has a named constant here so defaults are greppable and
//! referenced from exactly one place.

/// Default exception chute for parcels with no honorable route.
pub const DEFAULT_EXCEPTION_CHUTE_ID: u32 = 0;

/// Default minimum spacing between consecutive parcels, in milliseconds.
pub const DEFAULT_PARCEL_INTERVAL_MS: u64 = 600;

/// Default nominal belt speed assumed until a live speed report arrives,
/// in millimeters per second.
pub const DEFAULT_BELT_SPEED_MM_PER_S: u32 = 2_000;

/// Default assignment-wait budget used when the topology cannot supply a
/// physical one, in seconds.
pub const DEFAULT_ASSIGNMENT_WAIT_SECS: f64 = 5.0;

/// Default safety factor applied to the physical assignment-wait budget.
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.8;

/// Default budget for waiting on an upstream chute assignment, in
/// milliseconds.
pub const DEFAULT_DETECTION_TO_ASSIGNMENT_TIMEOUT_MS: u64 = 5_000;

/// Default budget for completing the sort after assignment, in milliseconds.
pub const DEFAULT_ASSIGNMENT_TO_SORTING_TIMEOUT_MS: u64 = 30_000;

/// Default lifetime after which an unsighted parcel is classified Lost,
/// in milliseconds. Must exceed the sum of the two budgets above.
pub const DEFAULT_MAX_LIFETIME_BEFORE_LOST_MS: u64 = 60_000;

/// Default retention window for terminal tracking records, in milliseconds.
pub const DEFAULT_RECORD_RETENTION_MS: u64 = 300_000;

/// Default interval between tracking monitor sweeps, in milliseconds.
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1_000;
