//! Empirical capacity estimation.
//!
//! Reduces a bounded history of throughput test samples to a safe
//! parcels-per-minute band plus a dangerous threshold. The estimate feeds
//! admission control: rates inside the safe band are accepted, rates at or
//! above the dangerous threshold are rejected.
//!
//! [`estimate`] is a pure function over the history; it never mutates
//! shared state and carries no persisted identity.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// Default bound on retained capacity samples.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Sample count at which estimate confidence reaches 1.0.
pub const CONFIDENCE_FULL_SAMPLE_COUNT: usize = 10;

/// Margin applied to the safe maximum when no unsafe samples exist.
pub const DANGEROUS_THRESHOLD_MARGIN: f64 = 1.2;

/// One throughput test sample.
///
/// `interval_ms` is the spacing between parcel inductions during the test;
/// the implied rate is `60000 / interval_ms` parcels per minute.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapacityTestResult {
    /// Parcel induction interval during the test, in milliseconds.
    pub interval_ms: u64,
    /// Fraction of parcels sorted to their target chute, in [0, 1].
    pub success_rate: f64,
    /// Average end-to-end sorting latency, in milliseconds.
    pub average_latency_ms: f64,
    /// Fraction of parcels routed to the exception chute, in [0, 1].
    pub exception_rate: f64,
}

impl CapacityTestResult {
    /// The induction rate this sample was taken at, in parcels per minute.
    pub fn parcels_per_minute(&self) -> f64 {
        60_000.0 / self.interval_ms as f64
    }
}

/// Thresholds for classifying a sample as safe.
#[derive(Debug, Clone)]
pub struct CapacityThresholds {
    /// Minimum acceptable success rate.
    pub min_success_rate: f64,
    /// Maximum acceptable exception rate.
    pub max_exception_rate: f64,
    /// Maximum acceptable average latency in milliseconds.
    pub max_acceptable_latency_ms: f64,
}

impl Default for CapacityThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: 0.95,
            max_exception_rate: 0.02,
            max_acceptable_latency_ms: 2_000.0,
        }
    }
}

impl CapacityThresholds {
    /// Returns whether a sample passes all safety criteria.
    pub fn is_safe(&self, sample: &CapacityTestResult) -> bool {
        sample.success_rate >= self.min_success_rate
            && sample.exception_rate <= self.max_exception_rate
            && sample.average_latency_ms <= self.max_acceptable_latency_ms
    }
}

/// Bounded history of capacity samples; oldest dropped first.
#[derive(Debug, Clone)]
pub struct CapacityHistory {
    samples: VecDeque<CapacityTestResult>,
    capacity: usize,
}

impl Default for CapacityHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CapacityHistory {
    /// Creates a history retaining at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, dropping the oldest when at capacity.
    pub fn push(&mut self, sample: CapacityTestResult) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Returns the number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates samples oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &CapacityTestResult> {
        self.samples.iter()
    }
}

/// Safe-rate band estimate in parcels per minute.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CapacityEstimate {
    /// Lowest rate observed safe.
    pub safe_min_ppm: f64,
    /// Highest rate observed safe.
    pub safe_max_ppm: f64,
    /// Rate at which the system becomes unsafe.
    pub dangerous_threshold_ppm: f64,
    /// Estimate confidence in [0, 1], saturating at
    /// [`CONFIDENCE_FULL_SAMPLE_COUNT`] samples.
    pub confidence: f64,
    /// Number of samples the estimate is based on.
    pub data_point_count: usize,
}

impl CapacityEstimate {
    /// The all-zero estimate produced for an empty history.
    pub fn zero() -> Self {
        Self {
            safe_min_ppm: 0.0,
            safe_max_ppm: 0.0,
            dangerous_threshold_ppm: 0.0,
            confidence: 0.0,
            data_point_count: 0,
        }
    }
}

/// Reduces a sample history to a safe-rate band.
///
/// Safe min/max are the extremal rates among safe samples. The dangerous
/// threshold is the lowest rate among unsafe samples, or 120% of the safe
/// maximum when every sample is safe. Confidence scales linearly with
/// sample count. An empty history yields the all-zero estimate.
pub fn estimate(history: &CapacityHistory, thresholds: &CapacityThresholds) -> CapacityEstimate {
    if history.is_empty() {
        return CapacityEstimate::zero();
    }

    let mut safe_min = f64::INFINITY;
    let mut safe_max: f64 = 0.0;
    let mut dangerous = f64::INFINITY;
    let mut any_safe = false;
    let mut any_unsafe = false;

    for sample in history.iter() {
        if sample.interval_ms == 0 {
            // Config-invalid sample; counted but never classified.
            warn!("capacity sample with zero interval ignored");
            continue;
        }
        let ppm = sample.parcels_per_minute();
        if thresholds.is_safe(sample) {
            any_safe = true;
            safe_min = safe_min.min(ppm);
            safe_max = safe_max.max(ppm);
        } else {
            any_unsafe = true;
            dangerous = dangerous.min(ppm);
        }
    }

    let (safe_min_ppm, safe_max_ppm) = if any_safe {
        (safe_min, safe_max)
    } else {
        (0.0, 0.0)
    };

    let dangerous_threshold_ppm = if any_unsafe {
        dangerous
    } else {
        safe_max_ppm * DANGEROUS_THRESHOLD_MARGIN
    };

    let count = history.len();
    CapacityEstimate {
        safe_min_ppm,
        safe_max_ppm,
        dangerous_threshold_ppm,
        confidence: (count as f64 / CONFIDENCE_FULL_SAMPLE_COUNT as f64).min(1.0),
        data_point_count: count,
    }
}
