//! Sorting orchestration facade.
//!
//! [`SortingService`] wires the path generator, deadline queues, executor,
//! reroute service, and lifecycle tracker into one entry point. The
//! transport layer feeds it detections and chute assignments; it reports
//! terminal outcomes through the registered [`CompletionSink`] and emits
//! structured telemetry along the way.
//!
//! One async task per assignment. Shared state is confined to the
//! concurrent collaborators (tracker, queues, locks); the service itself
//! holds no locks across await points.

use crate::capacity::{self, CapacityEstimate, CapacityHistory, CapacityTestResult};
use crate::config::{ConfigError, SortingConfig};
use crate::deadline::{DeadlineQueueRegistry, QueueDecision, QueueOutcome};
use crate::executor::{ExecutionOutcome, PathExecutor, SegmentFailure};
use crate::hardware::DiverterDriver;
use crate::health::{DegradationMode, HealthRegistry};
use crate::lock::DiverterLockManager;
use crate::messaging::{
    ChuteAssignment, CompletionSink, SortingCompletedNotification, SortingOutcome,
};
use crate::parcel::ParcelId;
use crate::path::{PathError, PathGenerator, SwitchingPath};
use crate::reroute::{RerouteResult, RerouteService};
use crate::telemetry::{SortingEvent, TelemetrySink};
use crate::timing::TimeoutCalculator;
use crate::topology::{RouteTable, Topology};
use crate::tracker::{ParcelTracker, TrackingError, TrackingMonitor};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Orchestrates the sorting of parcels from detection to terminal outcome.
pub struct SortingService {
    config: SortingConfig,
    routes: Arc<dyn RouteTable>,
    generator: PathGenerator,
    executor: PathExecutor,
    reroute: RerouteService,
    driver: Arc<dyn DiverterDriver>,
    locks: Arc<DiverterLockManager>,
    tracker: Arc<ParcelTracker>,
    queues: Arc<DeadlineQueueRegistry>,
    health: Arc<dyn HealthRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    completions: Arc<dyn CompletionSink>,
    timeouts: TimeoutCalculator,
    capacity_history: Mutex<CapacityHistory>,
    belt_speed_mm_per_s: AtomicU32,
    shutdown: CancellationToken,
}

impl SortingService {
    /// Wires the service from its collaborators.
    ///
    /// Validates the configuration and every configured route's tolerances
    /// up front; a bad route fails startup instead of a parcel.
    pub fn new(
        config: SortingConfig,
        routes: Arc<dyn RouteTable>,
        topology: Arc<dyn Topology>,
        driver: Arc<dyn DiverterDriver>,
        health: Arc<dyn HealthRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        completions: Arc<dyn CompletionSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let generator = PathGenerator::new(Arc::clone(&routes), config.exception_chute_id);
        generator.validate_all_tolerances(config.parcel_interval_ms)?;

        let locks = Arc::new(DiverterLockManager::new());
        let executor = PathExecutor::new(
            Arc::clone(&driver),
            Arc::clone(&locks),
            Arc::clone(&health),
            Arc::clone(&telemetry),
        );
        let reroute = RerouteService::new(Arc::clone(&routes));
        let tracker = Arc::new(ParcelTracker::new(config.tracking.clone()));
        let timeouts = TimeoutCalculator::new(
            topology,
            config.timeouts.default_assignment_wait_secs,
        );

        info!(
            exception_chute_id = config.exception_chute_id,
            parcel_interval_ms = config.parcel_interval_ms,
            "Sorting service initialized"
        );

        Ok(Self {
            belt_speed_mm_per_s: AtomicU32::new(config.nominal_belt_speed_mm_per_s),
            config,
            routes,
            generator,
            executor,
            reroute,
            driver,
            locks,
            tracker,
            queues: Arc::new(DeadlineQueueRegistry::new()),
            health,
            telemetry,
            completions,
            timeouts,
            capacity_history: Mutex::new(CapacityHistory::default()),
            shutdown: CancellationToken::new(),
        })
    }

    /// The lifecycle tracker, for administrative reporting.
    pub fn tracker(&self) -> &Arc<ParcelTracker> {
        &self.tracker
    }

    /// The deadline queue registry, for diverter-side consumers.
    pub fn queues(&self) -> &Arc<DeadlineQueueRegistry> {
        &self.queues
    }

    /// Records an entry-sensor detection.
    pub fn handle_detection(&self, parcel_id: ParcelId) {
        self.tracker.record_detected(parcel_id, Utc::now());
    }

    /// Records a confirmed mid-belt sighting.
    pub fn handle_sighting(&self, parcel_id: &ParcelId) {
        if let Err(error) = self.tracker.record_seen(parcel_id, Utc::now()) {
            debug!(parcel_id = %parcel_id, %error, "Sighting for unknown parcel ignored");
        }
    }

    /// Confirms a parcel's physical arrival at a diverter and settles the
    /// head of that diverter's position queue.
    ///
    /// The transport layer calls this from the pre-diverter position
    /// sensor. An on-time head needs no command here: the path executor
    /// already has the planned command in flight under the same lock. A
    /// late head gets the fallback action commanded instead, so a delayed
    /// parcel never receives the stale planned direction.
    ///
    /// Returns `None` when the diverter has nothing scheduled.
    pub async fn handle_arrival(&self, diverter_id: &str) -> Option<QueueDecision> {
        let decision = self.queues.pop_next(diverter_id, Instant::now())?;
        self.handle_sighting(&decision.item.parcel_id);

        match decision.outcome {
            QueueOutcome::OnTime => {
                debug!(
                    parcel_id = %decision.item.parcel_id,
                    diverter_id,
                    action = %decision.action,
                    "Arrival on time, planned action stands"
                );
            }
            QueueOutcome::TimedOut => {
                self.telemetry.emit(SortingEvent::FallbackSubstituted {
                    parcel_id: decision.item.parcel_id.clone(),
                    diverter_id: diverter_id.to_string(),
                    planned: decision.item.planned,
                    fallback: decision.action,
                });
                let lock = self.locks.get_lock(diverter_id);
                let _guard = lock.acquire_write().await;
                match self.driver.command(diverter_id, decision.action).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        parcel_id = %decision.item.parcel_id,
                        diverter_id,
                        action = %decision.action,
                        "Fallback command refused by diverter"
                    ),
                    Err(error) => warn!(
                        parcel_id = %decision.item.parcel_id,
                        diverter_id,
                        %error,
                        "Fallback command failed"
                    ),
                }
            }
        }
        Some(decision)
    }

    /// Updates the live belt speed used by the admission check.
    pub fn update_belt_speed(&self, speed_mm_per_s: u32) {
        self.belt_speed_mm_per_s
            .store(speed_mm_per_s, Ordering::Relaxed);
    }

    /// The belt speed currently assumed, in millimeters per second.
    pub fn belt_speed(&self) -> u32 {
        self.belt_speed_mm_per_s.load(Ordering::Relaxed)
    }

    /// Drives one parcel from chute assignment to a terminal outcome.
    ///
    /// Every exit notifies the completion sink exactly once; a parcel never
    /// ends without a reported destination.
    pub async fn handle_assignment(&self, assignment: ChuteAssignment) -> SortingOutcome {
        let parcel_id = assignment.parcel_id.clone();
        let now = Utc::now();

        match self
            .tracker
            .record_assigned(&parcel_id, assignment.chute_id, now)
        {
            Ok(_) => {}
            Err(TrackingError::UnknownParcel(_)) => {
                // Assignment raced ahead of the detection event. Register
                // the parcel now rather than dropping a live assignment.
                warn!(
                    parcel_id = %parcel_id,
                    chute_id = assignment.chute_id,
                    "Assignment for untracked parcel, registering detection"
                );
                self.tracker.record_detected(parcel_id.clone(), now);
                if let Err(error) =
                    self.tracker
                        .record_assigned(&parcel_id, assignment.chute_id, now)
                {
                    warn!(parcel_id = %parcel_id, %error, "Assignment rejected");
                    return SortingOutcome::Failed;
                }
            }
            Err(error) => {
                warn!(
                    parcel_id = %parcel_id,
                    chute_id = assignment.chute_id,
                    %error,
                    "Assignment rejected by lifecycle tracker"
                );
                return SortingOutcome::Failed;
            }
        }

        let Some(path) = self.generator.generate(assignment.chute_id) else {
            self.telemetry.emit(SortingEvent::PathUnavailable {
                parcel_id: parcel_id.clone(),
                chute_id: assignment.chute_id,
            });
            return self
                .divert_to_exception(&parcel_id, SortingOutcome::Failed)
                .await;
        };
        self.telemetry.emit(SortingEvent::PathGenerated {
            parcel_id: parcel_id.clone(),
            chute_id: path.target_chute_id,
            segment_count: path.segments.len(),
            total_ttl_ms: path.total_ttl_ms(),
        });

        if let Err(error) = self.generator.validate_health(&path, self.health.as_ref()) {
            warn!(parcel_id = %parcel_id, %error, "Path rejected pre-execution");
            let PathError::ValidationFailed { diverter_id, .. } = &error;
            let diverter_id = diverter_id.clone();
            self.telemetry.emit(SortingEvent::PathValidationFailed {
                parcel_id: parcel_id.clone(),
                chute_id: path.target_chute_id,
                diverter_id,
            });
            return self
                .divert_to_exception(&parcel_id, SortingOutcome::Failed)
                .await;
        }

        let budget_ms = self
            .tracker
            .settings()
            .assignment_to_sorting_timeout
            .as_millis() as u64;
        if !self
            .generator
            .can_complete_in_time(&path, self.belt_speed(), budget_ms)
        {
            self.telemetry.emit(SortingEvent::OverloadRejected {
                parcel_id: parcel_id.clone(),
                chute_id: path.target_chute_id,
                budget_ms,
            });
            return self
                .divert_to_exception(&parcel_id, SortingOutcome::Failed)
                .await;
        }

        if let Err(error) = self.tracker.record_routing(&parcel_id, Utc::now()) {
            // The monitor beat us to a terminal state; do not double-report.
            warn!(parcel_id = %parcel_id, %error, "Parcel no longer routable");
            return SortingOutcome::Failed;
        }

        let started = Instant::now();
        self.queues.enqueue_path(&parcel_id, &path, started);

        match self.executor.execute(&parcel_id, &path, &self.shutdown).await {
            ExecutionOutcome::Completed { .. } => {
                self.complete_sorted(&parcel_id, path.target_chute_id, started)
            }
            ExecutionOutcome::Failed(failure) => {
                self.recover_from_failure(&parcel_id, &path, failure, started)
                    .await
            }
        }
    }

    /// Attempts one reroute after a segment failure, then falls back to the
    /// exception chute.
    async fn recover_from_failure(
        &self,
        parcel_id: &ParcelId,
        path: &SwitchingPath,
        failure: SegmentFailure,
        started: Instant,
    ) -> SortingOutcome {
        if failure.reason.is_reroutable() {
            self.telemetry.emit(SortingEvent::RerouteAttempted {
                parcel_id: parcel_id.clone(),
                failed_node_id: failure.diverter_id.clone(),
            });
            match self
                .reroute
                .try_reroute(parcel_id, path, &failure.diverter_id, failure.reason)
            {
                RerouteResult::Rerouted(new_path) => {
                    self.telemetry.emit(SortingEvent::RerouteSucceeded {
                        parcel_id: parcel_id.clone(),
                        remaining_segments: new_path.segments.len(),
                    });
                    self.queues.remove_parcel(parcel_id);
                    self.queues
                        .enqueue_path(parcel_id, &new_path, Instant::now());
                    if let ExecutionOutcome::Completed { .. } = self
                        .executor
                        .execute(parcel_id, &new_path, &self.shutdown)
                        .await
                    {
                        return self.complete_sorted(
                            parcel_id,
                            new_path.target_chute_id,
                            started,
                        );
                    }
                }
                RerouteResult::Unrecoverable {
                    failed_node_id,
                    detail,
                } => {
                    self.telemetry.emit(SortingEvent::RerouteFailed {
                        parcel_id: parcel_id.clone(),
                        failed_node_id,
                        detail,
                    });
                }
            }
        }

        self.divert_to_exception(parcel_id, SortingOutcome::Failed)
            .await
    }

    /// Marks a parcel sorted and reports success upstream.
    fn complete_sorted(
        &self,
        parcel_id: &ParcelId,
        chute_id: u32,
        started: Instant,
    ) -> SortingOutcome {
        self.queues.remove_parcel(parcel_id);
        let now = Utc::now();
        if let Err(error) = self.tracker.record_sorted(parcel_id, chute_id, now) {
            warn!(parcel_id = %parcel_id, %error, "Sorted parcel had no routable record");
        }
        self.telemetry.emit(SortingEvent::ParcelSorted {
            parcel_id: parcel_id.clone(),
            chute_id,
            duration: started.elapsed(),
        });
        self.completions.notify(SortingCompletedNotification {
            parcel_id: parcel_id.clone(),
            actual_chute_id: chute_id,
            completed_at: now,
            outcome: SortingOutcome::Success,
        });
        SortingOutcome::Success
    }

    /// Sends a parcel to the exception chute and reports the outcome.
    ///
    /// The physical diversion is best effort: the exception chute is the
    /// straight-through destination, so a missing route or a failed command
    /// still ends with the parcel there.
    async fn divert_to_exception(
        &self,
        parcel_id: &ParcelId,
        outcome: SortingOutcome,
    ) -> SortingOutcome {
        self.queues.remove_parcel(parcel_id);

        if let Some(path) = self.generator.generate(self.generator.exception_chute_id()) {
            if let ExecutionOutcome::Failed(failure) =
                self.executor.execute(parcel_id, &path, &self.shutdown).await
            {
                warn!(
                    parcel_id = %parcel_id,
                    diverter_id = %failure.diverter_id,
                    reason = %failure.reason,
                    "Exception diversion failed, parcel continues straight"
                );
            }
        }

        let now = Utc::now();
        if let Err(error) = self.tracker.record_timed_out(parcel_id, now) {
            debug!(parcel_id = %parcel_id, %error, "Parcel already terminal");
        }
        self.completions.notify(SortingCompletedNotification {
            parcel_id: parcel_id.clone(),
            actual_chute_id: self.generator.exception_chute_id(),
            completed_at: now,
            outcome,
        });
        outcome
    }

    /// Assignment-wait budget for a line, in seconds.
    pub fn assignment_wait_secs(&self, line_id: &str) -> f64 {
        self.timeouts
            .calculate_timeout_seconds(line_id, self.config.timeouts.safety_factor)
    }

    /// Current system degradation, derived from the health of every
    /// diverter any configured route requires.
    pub fn degradation_mode(&self) -> DegradationMode {
        let mut nodes: HashSet<String> = HashSet::new();
        for chute_id in self.routes.chute_ids() {
            nodes.extend(self.routes.required_diverters(chute_id));
        }
        let total = nodes.len();
        let unhealthy = nodes
            .iter()
            .filter(|node| !self.health.is_node_healthy(node))
            .count();
        DegradationMode::classify(
            unhealthy,
            total,
            self.config.degradation.line_degraded_fraction,
        )
    }

    /// Records one capacity test sample.
    pub fn record_capacity_sample(&self, sample: CapacityTestResult) {
        self.capacity_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }

    /// Estimates safe throughput from the recorded samples.
    pub fn estimate_capacity(&self) -> CapacityEstimate {
        let estimate = {
            let history = self
                .capacity_history
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            capacity::estimate(&history, &self.config.capacity)
        };
        self.telemetry.emit(SortingEvent::CapacityEstimated {
            safe_min_ppm: estimate.safe_min_ppm,
            safe_max_ppm: estimate.safe_max_ppm,
            dangerous_threshold_ppm: estimate.dangerous_threshold_ppm,
            confidence: estimate.confidence,
        });
        estimate
    }

    /// Spawns the background tracking monitor.
    ///
    /// The monitor stops when [`SortingService::shutdown`] is called.
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let monitor = TrackingMonitor::new(
            Arc::clone(&self.tracker),
            Arc::clone(&self.queues),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.completions),
            self.config.exception_chute_id,
        );
        tokio::spawn(monitor.run(self.shutdown.child_token()))
    }

    /// Drains the inbound assignment channel until shutdown.
    ///
    /// Each assignment is handled on its own task so a slow diverter never
    /// stalls the intake.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ChuteAssignment>) {
        info!("Sorting service running");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Some(assignment) => {
                        let service = Arc::clone(&self);
                        tokio::spawn(async move {
                            service.handle_assignment(assignment).await;
                        });
                    }
                    None => break,
                },
            }
        }
        info!("Sorting service stopped");
    }

    /// Requests shutdown of the run loop, the monitor, and any in-flight
    /// executions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{DiverterDirection, DriverError, DriverFuture};
    use crate::health::StaticHealthRegistry;
    use crate::messaging::ChannelCompletionSink;
    use crate::telemetry::NullTelemetrySink;
    use crate::topology::{RouteEntry, SegmentGeometry, StaticRouteTable, StaticTopology};
    use crate::path::SwitchingPathSegment;
    use crate::tracker::ParcelLifecycleStatus;
    use std::time::{Duration, SystemTime};

    struct ObedientDriver;

    impl DiverterDriver for ObedientDriver {
        fn command<'a>(
            &'a self,
            _diverter_id: &'a str,
            _direction: DiverterDirection,
        ) -> DriverFuture<'a, Result<bool, DriverError>> {
            Box::pin(async { Ok(true) })
        }

        fn status<'a>(
            &'a self,
            _diverter_id: &'a str,
        ) -> DriverFuture<'a, Result<String, DriverError>> {
            Box::pin(async { Ok("idle".to_string()) })
        }
    }

    /// Driver whose named diverter always faults.
    struct FaultingDriver(&'static str);

    impl DiverterDriver for FaultingDriver {
        fn command<'a>(
            &'a self,
            diverter_id: &'a str,
            _direction: DiverterDirection,
        ) -> DriverFuture<'a, Result<bool, DriverError>> {
            Box::pin(async move {
                if diverter_id == self.0 {
                    Err(DriverError::DeviceFault {
                        diverter_id: diverter_id.to_string(),
                        detail: "stuck actuator".to_string(),
                    })
                } else {
                    Ok(true)
                }
            })
        }

        fn status<'a>(
            &'a self,
            _diverter_id: &'a str,
        ) -> DriverFuture<'a, Result<String, DriverError>> {
            Box::pin(async { Ok("idle".to_string()) })
        }
    }

    /// Driver that acknowledges every command and records it.
    struct RecordingDriver {
        issued: Mutex<Vec<(String, DiverterDirection)>>,
    }

    impl RecordingDriver {
        fn new() -> Self {
            Self {
                issued: Mutex::new(Vec::new()),
            }
        }

        fn issued(&self) -> Vec<(String, DiverterDirection)> {
            self.issued.lock().unwrap().clone()
        }
    }

    impl DiverterDriver for RecordingDriver {
        fn command<'a>(
            &'a self,
            diverter_id: &'a str,
            direction: DiverterDirection,
        ) -> DriverFuture<'a, Result<bool, DriverError>> {
            Box::pin(async move {
                self.issued
                    .lock()
                    .unwrap()
                    .push((diverter_id.to_string(), direction));
                Ok(true)
            })
        }

        fn status<'a>(
            &'a self,
            _diverter_id: &'a str,
        ) -> DriverFuture<'a, Result<String, DriverError>> {
            Box::pin(async { Ok("idle".to_string()) })
        }
    }

    /// Sink that records events for assertions.
    struct RecordingSink {
        events: Mutex<Vec<SortingEvent>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    impl TelemetrySink for RecordingSink {
        fn emit(&self, event: SortingEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

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

    fn routes() -> StaticRouteTable {
        StaticRouteTable::new().with_route(7, vec![entry(1, "D1"), entry(2, "D2")])
    }

    fn service_with(
        driver: Arc<dyn DiverterDriver>,
        health: Arc<StaticHealthRegistry>,
    ) -> (
        Arc<SortingService>,
        mpsc::UnboundedReceiver<SortingCompletedNotification>,
    ) {
        let (completions, rx) = ChannelCompletionSink::new();
        let service = SortingService::new(
            SortingConfig::default(),
            Arc::new(routes()),
            Arc::new(StaticTopology::new()),
            driver,
            health,
            Arc::new(NullTelemetrySink),
            Arc::new(completions),
        )
        .unwrap();
        (Arc::new(service), rx)
    }

    fn assignment(parcel_id: &str, chute_id: u32) -> ChuteAssignment {
        ChuteAssignment {
            parcel_id: ParcelId::new(parcel_id),
            chute_id,
            assigned_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sorts_a_parcel_end_to_end() {
        let (service, mut rx) =
            service_with(Arc::new(ObedientDriver), Arc::new(StaticHealthRegistry::new()));
        service.handle_detection(ParcelId::new("P1"));

        let outcome = service.handle_assignment(assignment("P1", 7)).await;

        assert_eq!(outcome, SortingOutcome::Success);
        let record = service.tracker().get(&ParcelId::new("P1")).unwrap();
        assert_eq!(record.status, ParcelLifecycleStatus::Sorted);
        assert_eq!(record.actual_chute_id, Some(7));

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.actual_chute_id, 7);
        assert_eq!(notification.outcome, SortingOutcome::Success);
        // Terminal parcels leave no scheduled tasks behind
        assert_eq!(service.queues().total_depth(), 0);
    }

    #[tokio::test]
    async fn missing_route_goes_to_exception_chute() {
        let (service, mut rx) =
            service_with(Arc::new(ObedientDriver), Arc::new(StaticHealthRegistry::new()));
        service.handle_detection(ParcelId::new("P1"));

        let outcome = service.handle_assignment(assignment("P1", 42)).await;

        assert_eq!(outcome, SortingOutcome::Failed);
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.actual_chute_id, 0);
        assert_eq!(notification.outcome, SortingOutcome::Failed);
        assert_eq!(
            service.tracker().get(&ParcelId::new("P1")).unwrap().status,
            ParcelLifecycleStatus::TimedOut
        );
    }

    #[tokio::test]
    async fn unhealthy_diverter_rejects_the_path_pre_execution() {
        let health = Arc::new(StaticHealthRegistry::new());
        health.mark_unhealthy("D2");
        let (service, mut rx) = service_with(Arc::new(ObedientDriver), health);
        service.handle_detection(ParcelId::new("P1"));

        let outcome = service.handle_assignment(assignment("P1", 7)).await;

        assert_eq!(outcome, SortingOutcome::Failed);
        assert_eq!(rx.recv().await.unwrap().outcome, SortingOutcome::Failed);
    }

    #[tokio::test]
    async fn stopped_belt_rejects_admission() {
        let (service, mut rx) =
            service_with(Arc::new(ObedientDriver), Arc::new(StaticHealthRegistry::new()));
        service.update_belt_speed(0);
        service.handle_detection(ParcelId::new("P1"));

        let outcome = service.handle_assignment(assignment("P1", 7)).await;

        assert_eq!(outcome, SortingOutcome::Failed);
        assert_eq!(rx.recv().await.unwrap().outcome, SortingOutcome::Failed);
    }

    #[tokio::test]
    async fn unrecoverable_fault_reports_failed() {
        let (service, mut rx) = service_with(
            Arc::new(FaultingDriver("D1")),
            Arc::new(StaticHealthRegistry::new()),
        );
        service.handle_detection(ParcelId::new("P1"));

        // D1 faults; the only splice dropping D1 cannot cover the required
        // set {D1, D2}, so no reroute is possible.
        let outcome = service.handle_assignment(assignment("P1", 7)).await;

        assert_eq!(outcome, SortingOutcome::Failed);
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.outcome, SortingOutcome::Failed);
        assert_eq!(notification.actual_chute_id, 0);
    }

    #[tokio::test]
    async fn assignment_racing_ahead_of_detection_still_sorts() {
        let (service, mut rx) =
            service_with(Arc::new(ObedientDriver), Arc::new(StaticHealthRegistry::new()));

        let outcome = service.handle_assignment(assignment("P9", 7)).await;

        assert_eq!(outcome, SortingOutcome::Success);
        assert_eq!(rx.recv().await.unwrap().outcome, SortingOutcome::Success);
    }

    fn single_segment_path(ttl_ms: u64) -> SwitchingPath {
        SwitchingPath {
            target_chute_id: 7,
            segments: vec![SwitchingPathSegment {
                sequence_number: 1,
                diverter_id: "D1".to_string(),
                direction: DiverterDirection::Left,
                ttl_ms,
            }],
            generated_at: SystemTime::now(),
            fallback_chute_id: 0,
        }
    }

    fn recording_service(
        driver: Arc<RecordingDriver>,
        sink: Arc<RecordingSink>,
    ) -> Arc<SortingService> {
        let (completions, _rx) = ChannelCompletionSink::new();
        Arc::new(
            SortingService::new(
                SortingConfig::default(),
                Arc::new(routes()),
                Arc::new(StaticTopology::new()),
                driver,
                Arc::new(StaticHealthRegistry::new()),
                sink,
                Arc::new(completions),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn on_time_arrival_keeps_the_planned_action() {
        let driver = Arc::new(RecordingDriver::new());
        let sink = Arc::new(RecordingSink::new());
        let service = recording_service(Arc::clone(&driver), Arc::clone(&sink));

        service.handle_detection(ParcelId::new("P1"));
        service
            .queues()
            .enqueue_path(&ParcelId::new("P1"), &single_segment_path(60_000), Instant::now());

        let decision = service.handle_arrival("D1").await.unwrap();

        assert_eq!(decision.outcome, QueueOutcome::OnTime);
        assert_eq!(decision.action, DiverterDirection::Left);
        // The planned command belongs to the path executor; no extra
        // actuation from the arrival path.
        assert!(driver.issued().is_empty());
        assert!(!sink
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, SortingEvent::FallbackSubstituted { .. })));
        // The arrival counted as a sighting
        let record = service.tracker().get(&ParcelId::new("P1")).unwrap();
        assert!(record.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn late_arrival_substitutes_the_fallback_action() {
        let driver = Arc::new(RecordingDriver::new());
        let sink = Arc::new(RecordingSink::new());
        let service = recording_service(Arc::clone(&driver), Arc::clone(&sink));

        service.handle_detection(ParcelId::new("P1"));
        // Zero grace period: the head is late as soon as any time passes
        service
            .queues()
            .enqueue_path(&ParcelId::new("P1"), &single_segment_path(0), Instant::now());
        tokio::time::sleep(Duration::from_millis(5)).await;

        let decision = service.handle_arrival("D1").await.unwrap();

        assert_eq!(decision.outcome, QueueOutcome::TimedOut);
        assert_eq!(decision.action, DiverterDirection::Straight);
        assert_ne!(decision.action, decision.item.planned);
        // The fallback reached the driver
        assert_eq!(
            driver.issued(),
            vec![("D1".to_string(), DiverterDirection::Straight)]
        );
        assert!(sink
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(
                e,
                SortingEvent::FallbackSubstituted { planned, fallback, .. }
                    if *planned == DiverterDirection::Left
                        && *fallback == DiverterDirection::Straight
            )));

        // The pop consumed the task
        assert!(service.handle_arrival("D1").await.is_none());
    }

    #[tokio::test]
    async fn degradation_follows_node_health() {
        let health = Arc::new(StaticHealthRegistry::new());
        let (service, _rx) = service_with(Arc::new(ObedientDriver), Arc::clone(&health));

        assert_eq!(service.degradation_mode(), DegradationMode::None);

        health.mark_unhealthy("D1");
        assert_eq!(service.degradation_mode(), DegradationMode::LineDegraded);
    }

    #[tokio::test]
    async fn capacity_estimate_reflects_recorded_samples() {
        let (service, _rx) =
            service_with(Arc::new(ObedientDriver), Arc::new(StaticHealthRegistry::new()));

        assert_eq!(service.estimate_capacity().data_point_count, 0);

        service.record_capacity_sample(CapacityTestResult {
            interval_ms: 600,
            success_rate: 0.99,
            average_latency_ms: 500.0,
            exception_rate: 0.01,
        });
        let estimate = service.estimate_capacity();
        assert_eq!(estimate.data_point_count, 1);
        assert!(estimate.safe_max_ppm > 0.0);
    }

    #[tokio::test]
    async fn run_loop_processes_assignments_until_shutdown() {
        let (service, mut rx) =
            service_with(Arc::new(ObedientDriver), Arc::new(StaticHealthRegistry::new()));
        service.handle_detection(ParcelId::new("P1"));

        let (tx, assignment_rx) = crate::messaging::assignment_channel();
        let runner = tokio::spawn(Arc::clone(&service).run(assignment_rx));

        tx.send(assignment("P1", 7)).unwrap();
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.outcome, SortingOutcome::Success);

        service.shutdown();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn assignment_wait_uses_topology_with_default_fallback() {
        let (service, _rx) =
            service_with(Arc::new(ObedientDriver), Arc::new(StaticHealthRegistry::new()));
        // No topology configured for the line
        let wait = service.assignment_wait_secs("line-1");
        assert!((wait - 5.0).abs() < 1e-9);
    }
}
