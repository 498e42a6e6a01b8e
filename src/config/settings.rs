//! Settings structs for the sorting core.
//!
//! These are pure data types with no parsing logic; the configuration
//! store (out of scope here) populates them. [`SortingConfig::validate`]
//! enforces the cross-field invariants the runtime depends on.

use super::defaults;
use super::ConfigError;
use crate::capacity::CapacityThresholds;
use crate::health::DEFAULT_LINE_DEGRADED_FRACTION;
use std::time::Duration;

/// Complete configuration for the sorting orchestration core.
#[derive(Debug, Clone)]
pub struct SortingConfig {
    /// Well-known chute receiving parcels with no honorable route.
    pub exception_chute_id: u32,
    /// Minimum spacing between consecutive parcels in milliseconds.
    /// Bounds segment tolerances (see [`SortingConfig::validate`]).
    pub parcel_interval_ms: u64,
    /// Nominal belt speed assumed until a live speed report arrives, in
    /// millimeters per second.
    pub nominal_belt_speed_mm_per_s: u32,
    /// Timeout derivation settings.
    pub timeouts: TimeoutSettings,
    /// Lifecycle tracking budgets.
    pub tracking: TrackingSettings,
    /// Thresholds for classifying capacity samples as safe.
    pub capacity: CapacityThresholds,
    /// Degradation classification settings.
    pub degradation: DegradationSettings,
}

/// Timeout derivation settings.
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    /// Fallback assignment-wait budget in seconds, used when the topology
    /// cannot supply a physical one.
    pub default_assignment_wait_secs: f64,
    /// Safety factor applied to the physical assignment-wait budget.
    /// Clamped to [0.1, 1.0] at calculation time.
    pub safety_factor: f64,
}

/// Lifecycle tracking budgets.
#[derive(Debug, Clone)]
pub struct TrackingSettings {
    /// How long a detected parcel may wait for an upstream assignment.
    pub detection_to_assignment_timeout: Duration,
    /// How long an assigned parcel may take to reach its chute.
    pub assignment_to_sorting_timeout: Duration,
    /// Lifetime after which an unsighted parcel is classified Lost.
    pub max_lifetime_before_lost: Duration,
    /// How long terminal records are retained before the cleanup sweep
    /// removes them.
    pub record_retention: Duration,
    /// Interval between tracking monitor sweeps.
    pub monitor_interval: Duration,
}

/// Degradation classification settings.
#[derive(Debug, Clone)]
pub struct DegradationSettings {
    /// Unhealthy-node fraction at which the line is considered degraded.
    pub line_degraded_fraction: f64,
}

impl Default for SortingConfig {
    fn default() -> Self {
        Self {
            exception_chute_id: defaults::DEFAULT_EXCEPTION_CHUTE_ID,
            parcel_interval_ms: defaults::DEFAULT_PARCEL_INTERVAL_MS,
            nominal_belt_speed_mm_per_s: defaults::DEFAULT_BELT_SPEED_MM_PER_S,
            timeouts: TimeoutSettings::default(),
            tracking: TrackingSettings::default(),
            capacity: CapacityThresholds::default(),
            degradation: DegradationSettings::default(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_assignment_wait_secs: defaults::DEFAULT_ASSIGNMENT_WAIT_SECS,
            safety_factor: defaults::DEFAULT_SAFETY_FACTOR,
        }
    }
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            detection_to_assignment_timeout: Duration::from_millis(
                defaults::DEFAULT_DETECTION_TO_ASSIGNMENT_TIMEOUT_MS,
            ),
            assignment_to_sorting_timeout: Duration::from_millis(
                defaults::DEFAULT_ASSIGNMENT_TO_SORTING_TIMEOUT_MS,
            ),
            max_lifetime_before_lost: Duration::from_millis(
                defaults::DEFAULT_MAX_LIFETIME_BEFORE_LOST_MS,
            ),
            record_retention: Duration::from_millis(defaults::DEFAULT_RECORD_RETENTION_MS),
            monitor_interval: Duration::from_millis(defaults::DEFAULT_MONITOR_INTERVAL_MS),
        }
    }
}

impl Default for DegradationSettings {
    fn default() -> Self {
        Self {
            line_degraded_fraction: DEFAULT_LINE_DEGRADED_FRACTION,
        }
    }
}

impl SortingConfig {
    /// Validates cross-field invariants.
    ///
    /// The lifetime budget must leave room for a parcel to time out through
    /// the normal path first; otherwise the lifecycle state machine could
    /// classify a parcel as Lost before it could legitimately time out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let combined = self.tracking.detection_to_assignment_timeout
            + self.tracking.assignment_to_sorting_timeout;
        if self.tracking.max_lifetime_before_lost <= combined {
            return Err(ConfigError::LifetimeBudgetTooSmall {
                max_lifetime_ms: self.tracking.max_lifetime_before_lost.as_millis() as u64,
                combined_ms: combined.as_millis() as u64,
            });
        }
        if self.parcel_interval_ms == 0 {
            return Err(ConfigError::NonPositiveParcelInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SortingConfig::default().validate().is_ok());
    }

    #[test]
    fn lifetime_must_exceed_combined_budgets() {
        let mut config = SortingConfig::default();
        config.tracking.detection_to_assignment_timeout = Duration::from_secs(10);
        config.tracking.assignment_to_sorting_timeout = Duration::from_secs(50);
        config.tracking.max_lifetime_before_lost = Duration::from_secs(60);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::LifetimeBudgetTooSmall { .. }));

        config.tracking.max_lifetime_before_lost = Duration::from_secs(61);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_parcel_interval_is_rejected() {
        let mut config = SortingConfig::default();
        config.parcel_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveParcelInterval)
        ));
    }
}
