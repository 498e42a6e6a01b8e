//! Concurrent parcel tracking store.

use super::record::{ParcelLifecycleStatus, ParcelTrackingRecord, TrackingError};
use crate::config::TrackingSettings;
use crate::parcel::ParcelId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

/// What one sweep of the store decided.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Parcels transitioned to TimedOut this sweep.
    pub timed_out: Vec<ParcelId>,
    /// Parcels transitioned to Lost this sweep.
    pub lost: Vec<ParcelId>,
    /// Terminal records purged past the retention window.
    pub purged: Vec<ParcelId>,
}

impl SweepReport {
    /// Returns whether the sweep changed nothing.
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.lost.is_empty() && self.purged.is_empty()
    }
}

/// Concurrent store of parcel lifecycle records.
///
/// All updates go through the immutable record transforms; the store only
/// swaps whole records, so snapshot readers never observe a half-updated
/// record.
pub struct ParcelTracker {
    records: DashMap<ParcelId, ParcelTrackingRecord>,
    settings: TrackingSettings,
}

impl ParcelTracker {
    /// Creates an empty tracker with the given budgets.
    pub fn new(settings: TrackingSettings) -> Self {
        Self {
            records: DashMap::new(),
            settings,
        }
    }

    /// Returns the tracking budgets in force.
    pub fn settings(&self) -> &TrackingSettings {
        &self.settings
    }

    /// Records an entry-sensor detection.
    ///
    /// A repeat detection of a known active parcel counts as a sighting
    /// rather than a new record.
    pub fn record_detected(&self, parcel_id: ParcelId, at: DateTime<Utc>) -> ParcelTrackingRecord {
        let record = self
            .records
            .entry(parcel_id.clone())
            .and_modify(|existing| *existing = existing.with_seen(at))
            .or_insert_with(|| ParcelTrackingRecord::detected(parcel_id, at))
            .clone();
        debug!(parcel_id = %record.parcel_id, "Parcel detected");
        record
    }

    /// Applies the Detected → Assigned transition.
    pub fn record_assigned(
        &self,
        parcel_id: &ParcelId,
        chute_id: u32,
        at: DateTime<Utc>,
    ) -> Result<ParcelTrackingRecord, TrackingError> {
        self.update(parcel_id, |record| record.with_assigned(chute_id, at))
    }

    /// Applies the Assigned → Routing transition.
    pub fn record_routing(
        &self,
        parcel_id: &ParcelId,
        at: DateTime<Utc>,
    ) -> Result<ParcelTrackingRecord, TrackingError> {
        self.update(parcel_id, |record| record.with_routing(at))
    }

    /// Applies the Routing → Sorted transition.
    pub fn record_sorted(
        &self,
        parcel_id: &ParcelId,
        actual_chute_id: u32,
        at: DateTime<Utc>,
    ) -> Result<ParcelTrackingRecord, TrackingError> {
        self.update(parcel_id, |record| record.with_sorted(actual_chute_id, at))
    }

    /// Applies a timeout transition from any active state.
    pub fn record_timed_out(
        &self,
        parcel_id: &ParcelId,
        at: DateTime<Utc>,
    ) -> Result<ParcelTrackingRecord, TrackingError> {
        self.update(parcel_id, |record| record.with_timed_out(at))
    }

    /// Applies the Lost classification, enforcing the lifetime guard.
    pub fn record_lost(
        &self,
        parcel_id: &ParcelId,
        at: DateTime<Utc>,
    ) -> Result<ParcelTrackingRecord, TrackingError> {
        let max_lifetime = self.settings.max_lifetime_before_lost;
        self.update(parcel_id, |record| record.with_lost(at, max_lifetime))
    }

    /// Records a confirmed sighting.
    pub fn record_seen(
        &self,
        parcel_id: &ParcelId,
        at: DateTime<Utc>,
    ) -> Result<ParcelTrackingRecord, TrackingError> {
        self.update(parcel_id, |record| Ok(record.with_seen(at)))
    }

    /// Returns a copy of a parcel's record.
    pub fn get(&self, parcel_id: &ParcelId) -> Option<ParcelTrackingRecord> {
        self.records.get(parcel_id).map(|r| r.clone())
    }

    /// Read-only snapshot of every record, for the monitor and for
    /// administrative reporting.
    pub fn snapshot(&self) -> Vec<ParcelTrackingRecord> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of parcels still in flight.
    pub fn active_count(&self) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.value().status.is_active())
            .count()
    }

    /// Classifies overdue parcels and purges stale terminal records.
    ///
    /// Lost takes precedence over a plain timeout: a parcel past its
    /// maximum lifetime with no recent sighting is Lost even if a wait
    /// budget also expired.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        // Decide over a snapshot, then apply; mutating the map while
        // iterating it would hold shard locks across updates.
        let snapshot = self.snapshot();
        let mut report = SweepReport::default();

        for record in snapshot {
            if record.status.is_terminal() {
                if let Some(terminal_at) = record.terminal_at() {
                    if exceeds(now, terminal_at, self.settings.record_retention) {
                        self.records.remove(&record.parcel_id);
                        report.purged.push(record.parcel_id);
                    }
                }
                continue;
            }

            if exceeds(
                now,
                record.last_sighting(),
                self.settings.max_lifetime_before_lost,
            ) {
                if self.record_lost(&record.parcel_id, now).is_ok() {
                    report.lost.push(record.parcel_id);
                }
                continue;
            }

            let overdue = match record.status {
                ParcelLifecycleStatus::Detected => exceeds(
                    now,
                    record.detected_at,
                    self.settings.detection_to_assignment_timeout,
                ),
                ParcelLifecycleStatus::Assigned | ParcelLifecycleStatus::Routing => exceeds(
                    now,
                    record.assigned_at.unwrap_or(record.detected_at),
                    self.settings.assignment_to_sorting_timeout,
                ),
                _ => false,
            };

            if overdue && self.record_timed_out(&record.parcel_id, now).is_ok() {
                report.timed_out.push(record.parcel_id);
            }
        }

        if !report.is_empty() {
            info!(
                timed_out = report.timed_out.len(),
                lost = report.lost.len(),
                purged = report.purged.len(),
                "Tracking sweep"
            );
        }
        report
    }

    fn update<F>(
        &self,
        parcel_id: &ParcelId,
        transform: F,
    ) -> Result<ParcelTrackingRecord, TrackingError>
    where
        F: FnOnce(&ParcelTrackingRecord) -> Result<ParcelTrackingRecord, TrackingError>,
    {
        let mut entry = self
            .records
            .get_mut(parcel_id)
            .ok_or_else(|| TrackingError::UnknownParcel(parcel_id.clone()))?;
        let updated = transform(entry.value())?;
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }
}

/// Whether `now` is strictly more than `window` past `earlier`.
fn exceeds(now: DateTime<Utc>, earlier: DateTime<Utc>, window: std::time::Duration) -> bool {
    let window = chrono::Duration::from_std(window)
        .unwrap_or_else(|_| chrono::Duration::max_value());
    now.signed_duration_since(earlier) > window
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn settings() -> TrackingSettings {
        TrackingSettings {
            detection_to_assignment_timeout: Duration::from_secs(5),
            assignment_to_sorting_timeout: Duration::from_secs(30),
            max_lifetime_before_lost: Duration::from_secs(60),
            record_retention: Duration::from_secs(300),
            monitor_interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn unknown_parcel_is_an_error_not_a_panic() {
        let tracker = ParcelTracker::new(settings());
        let err = tracker
            .record_assigned(&ParcelId::new("ghost"), 7, at(0))
            .unwrap_err();
        assert!(matches!(err, TrackingError::UnknownParcel(_)));
    }

    #[test]
    fn repeat_detection_is_a_sighting() {
        let tracker = ParcelTracker::new(settings());
        tracker.record_detected(ParcelId::new("P1"), at(0));
        let record = tracker.record_detected(ParcelId::new("P1"), at(3));

        assert_eq!(tracker.len(), 1);
        assert_eq!(record.last_sighting(), at(3));
    }

    #[test]
    fn sweep_times_out_unassigned_parcels() {
        let tracker = ParcelTracker::new(settings());
        tracker.record_detected(ParcelId::new("P1"), at(0));

        // Within the 5s assignment budget: nothing happens
        assert!(tracker.sweep(at(5)).is_empty());

        let report = tracker.sweep(at(6));
        assert_eq!(report.timed_out, vec![ParcelId::new("P1")]);
        assert_eq!(
            tracker.get(&ParcelId::new("P1")).unwrap().status,
            ParcelLifecycleStatus::TimedOut
        );
    }

    #[test]
    fn sweep_times_out_stuck_routing() {
        let tracker = ParcelTracker::new(settings());
        tracker.record_detected(ParcelId::new("P1"), at(0));
        tracker.record_assigned(&ParcelId::new("P1"), 7, at(1)).unwrap();
        tracker.record_routing(&ParcelId::new("P1"), at(2)).unwrap();

        assert!(tracker.sweep(at(31)).is_empty());
        let report = tracker.sweep(at(32));
        assert_eq!(report.timed_out, vec![ParcelId::new("P1")]);
    }

    #[test]
    fn sweep_classifies_lost_only_after_max_lifetime() {
        let tracker = ParcelTracker::new(settings());
        tracker.record_detected(ParcelId::new("P1"), at(0));
        tracker.record_assigned(&ParcelId::new("P1"), 7, at(1)).unwrap();
        tracker.record_routing(&ParcelId::new("P1"), at(2)).unwrap();
        // Keep sighting fresh enough that timeout fires first is avoided:
        // sighting at t=2, lifetime 60s, sorting budget 30s from t=1.

        // At t=31 the sorting budget is blown: TimedOut, not Lost.
        let report = tracker.sweep(at(31));
        assert!(report.lost.is_empty());
        assert_eq!(report.timed_out.len(), 1);

        // A second parcel that stays Routing past its lifetime goes Lost.
        let tracker = ParcelTracker::new(TrackingSettings {
            assignment_to_sorting_timeout: Duration::from_secs(120),
            max_lifetime_before_lost: Duration::from_secs(60),
            ..settings()
        });
        tracker.record_detected(ParcelId::new("P2"), at(0));
        tracker.record_assigned(&ParcelId::new("P2"), 7, at(1)).unwrap();
        tracker.record_routing(&ParcelId::new("P2"), at(2)).unwrap();

        assert!(tracker.sweep(at(61)).lost.is_empty());
        let report = tracker.sweep(at(63));
        assert_eq!(report.lost, vec![ParcelId::new("P2")]);
        assert_eq!(
            tracker.get(&ParcelId::new("P2")).unwrap().status,
            ParcelLifecycleStatus::Lost
        );
    }

    #[test]
    fn sweep_purges_terminal_records_past_retention() {
        let tracker = ParcelTracker::new(settings());
        tracker.record_detected(ParcelId::new("P1"), at(0));
        tracker.record_assigned(&ParcelId::new("P1"), 7, at(1)).unwrap();
        tracker.record_routing(&ParcelId::new("P1"), at(2)).unwrap();
        tracker.record_sorted(&ParcelId::new("P1"), 7, at(3)).unwrap();

        // Inside retention: kept
        assert!(tracker.sweep(at(300)).purged.is_empty());
        assert_eq!(tracker.len(), 1);

        let report = tracker.sweep(at(304));
        assert_eq!(report.purged, vec![ParcelId::new("P1")]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn snapshot_is_a_stable_copy() {
        let tracker = ParcelTracker::new(settings());
        tracker.record_detected(ParcelId::new("P1"), at(0));
        let snapshot = tracker.snapshot();

        tracker.record_assigned(&ParcelId::new("P1"), 7, at(1)).unwrap();

        assert_eq!(snapshot[0].status, ParcelLifecycleStatus::Detected);
        assert_eq!(tracker.active_count(), 1);
    }
}
