//! Sorting core configuration.
//!
//! Settings structs, named defaults, and load-time validation. Invalid
//! configuration is surfaced as [`ConfigError`] at load time; the runtime
//! never silently defaults without a trace.

pub mod defaults;
mod settings;

pub use settings::{DegradationSettings, SortingConfig, TimeoutSettings, TrackingSettings};

use thiserror::Error;

/// Configuration-time validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A segment tolerance is large enough that adjacent parcels' timeout
    /// windows would overlap.
    #[error(
        "tolerance {tolerance_ms}ms on diverter {diverter_id} (chute {chute_id}) must be \
         below half the parcel interval ({parcel_interval_ms}ms)"
    )]
    ToleranceTooLarge {
        chute_id: u32,
        diverter_id: String,
        tolerance_ms: u32,
        parcel_interval_ms: u64,
    },

    /// The Lost classification could fire before a legitimate timeout.
    #[error(
        "max lifetime before lost ({max_lifetime_ms}ms) must exceed the combined \
         detection and sorting budgets ({combined_ms}ms)"
    )]
    LifetimeBudgetTooSmall {
        max_lifetime_ms: u64,
        combined_ms: u64,
    },

    /// A configured segment speed is non-positive.
    #[error("non-positive speed configured for diverter {diverter_id} on chute {chute_id}")]
    NonPositiveSpeed { chute_id: u32, diverter_id: String },

    /// The parcel interval must be positive.
    #[error("parcel interval must be positive")]
    NonPositiveParcelInterval,
}
