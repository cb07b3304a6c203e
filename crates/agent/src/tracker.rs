//! Async polling tracker for long-running operations.
//!
//! Each registered operation gets exactly one driver task that races an
//! interval tick against a hard deadline in a single `select!` loop, so a
//! progress check and the timeout can never both finalize the same
//! operation. The registry is a mutex-guarded map; whoever removes the
//! entry owns finalization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use opsbot_core::config::TrackerConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl OperationStatus {
    /// Terminal states are absorbing; the tracker never reports an
    /// operation again after one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// What is being tracked, as the orchestrator described it at registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationSubject {
    pub action: String,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct TrackedOperation {
    pub operation_id: Uuid,
    pub subject: OperationSubject,
    pub started_at: DateTime<Utc>,
    pub check_count: u32,
    pub status: OperationStatus,
}

/// One progress or finalization notification. `terminal` is true exactly
/// once per operation lifetime.
#[derive(Clone, Debug)]
pub struct OperationReport {
    pub operation_id: Uuid,
    pub subject: OperationSubject,
    pub status: OperationStatus,
    pub check_count: u32,
    pub elapsed: Duration,
    pub terminal: bool,
}

/// Sink for tracker notifications. Implementations must not block; the
/// driver task calls them inline between timer waits.
pub trait ReportSink: Send + Sync + 'static {
    fn report(&self, report: OperationReport);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckVerdict {
    Continue,
    Complete(OperationStatus),
}

/// Decides, on each tick, whether the operation has reached a terminal
/// state. Stateless by contract: the tracked operation snapshot carries the
/// check count.
pub trait CheckPolicy: Send + Sync + 'static {
    fn evaluate(&self, operation: &TrackedOperation) -> CheckVerdict;
}

/// Stand-in completion policy: the operation completes on its n-th check
/// and succeeds with the configured probability. Mirrors what a real
/// deployment-status probe would decide once backends exist.
pub struct SimulatedCheckPolicy {
    completion_checks: u32,
    success_probability: f64,
}

impl SimulatedCheckPolicy {
    pub fn new(completion_checks: u32, success_probability: f64) -> Self {
        Self { completion_checks, success_probability }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.completion_checks, 0.9)
    }
}

impl CheckPolicy for SimulatedCheckPolicy {
    fn evaluate(&self, operation: &TrackedOperation) -> CheckVerdict {
        if operation.check_count < self.completion_checks {
            return CheckVerdict::Continue;
        }
        if rand::Rng::gen_bool(&mut rand::thread_rng(), self.success_probability) {
            CheckVerdict::Complete(OperationStatus::Succeeded)
        } else {
            CheckVerdict::Complete(OperationStatus::Failed)
        }
    }
}

struct TrackedEntry {
    operation: TrackedOperation,
    driver: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    operations: Mutex<HashMap<Uuid, TrackedEntry>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, TrackedEntry>> {
        self.operations.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct OperationTracker {
    registry: Arc<Registry>,
    policy: Arc<dyn CheckPolicy>,
    sink: Arc<dyn ReportSink>,
    check_interval: Duration,
    timeout: Duration,
}

impl OperationTracker {
    pub fn new(
        config: &TrackerConfig,
        policy: Arc<dyn CheckPolicy>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            policy,
            sink,
            check_interval: config.check_interval(),
            timeout: config.timeout(),
        }
    }

    /// Start tracking an operation. Spawns the driver task and returns the
    /// operation id immediately; all further progress flows through the
    /// sink.
    pub fn register(&self, subject: OperationSubject) -> Uuid {
        let operation_id = Uuid::new_v4();
        let operation = TrackedOperation {
            operation_id,
            subject,
            started_at: Utc::now(),
            check_count: 0,
            status: OperationStatus::Pending,
        };

        info!(
            event_name = "tracker.operation.registered",
            correlation_id = %operation.subject.correlation_id,
            operation_id = %operation_id,
            action = %operation.subject.action,
            "tracking long-running operation"
        );

        self.registry
            .lock()
            .insert(operation_id, TrackedEntry { operation, driver: None });

        let driver = tokio::spawn(drive(
            Arc::clone(&self.registry),
            operation_id,
            Arc::clone(&self.policy),
            Arc::clone(&self.sink),
            self.check_interval,
            self.timeout,
        ));

        let mut operations = self.registry.lock();
        match operations.get_mut(&operation_id) {
            Some(entry) => entry.driver = Some(driver),
            // Already finalized or cancelled before we got the lock back.
            None => driver.abort(),
        }

        operation_id
    }

    /// Current status, or `None` once the operation has been finalized and
    /// reclaimed.
    pub fn status(&self, operation_id: Uuid) -> Option<OperationStatus> {
        self.registry.lock().get(&operation_id).map(|entry| entry.operation.status)
    }

    pub fn snapshot(&self, operation_id: Uuid) -> Option<TrackedOperation> {
        self.registry.lock().get(&operation_id).map(|entry| entry.operation.clone())
    }

    pub fn active_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Stop tracking. Removes the entry, aborts the driver, and emits one
    /// terminal cancelled report. A no-op for unknown or already-finalized
    /// ids; returns whether anything was cancelled.
    pub fn cancel(&self, operation_id: Uuid) -> bool {
        let removed = self.registry.lock().remove(&operation_id);
        let Some(entry) = removed else {
            return false;
        };

        if let Some(driver) = entry.driver {
            driver.abort();
        }

        let mut operation = entry.operation;
        operation.status = OperationStatus::Cancelled;
        info!(
            event_name = "tracker.operation.cancelled",
            correlation_id = %operation.subject.correlation_id,
            operation_id = %operation_id,
            "operation tracking cancelled"
        );
        self.sink.report(finalization_report(&operation));
        true
    }
}

impl Drop for OperationTracker {
    fn drop(&mut self) {
        for entry in self.registry.lock().values() {
            if let Some(driver) = &entry.driver {
                driver.abort();
            }
        }
    }
}

async fn drive(
    registry: Arc<Registry>,
    operation_id: Uuid,
    policy: Arc<dyn CheckPolicy>,
    sink: Arc<dyn ReportSink>,
    check_interval: Duration,
    timeout: Duration,
) {
    let started = tokio::time::Instant::now();
    let deadline = started + timeout;
    let mut ticker = tokio::time::interval_at(started + check_interval, check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // When the deadline and a tick are ready in the same poll the
            // deadline wins, so timeout behavior is deterministic.
            biased;

            _ = tokio::time::sleep_until(deadline) => {
                let removed = registry.lock().remove(&operation_id);
                if let Some(entry) = removed {
                    let mut operation = entry.operation;
                    operation.status = OperationStatus::TimedOut;
                    info!(
                        event_name = "tracker.operation.timed_out",
                        correlation_id = %operation.subject.correlation_id,
                        operation_id = %operation_id,
                        check_count = operation.check_count,
                        "operation exceeded tracking deadline"
                    );
                    sink.report(finalization_report(&operation));
                }
                return;
            }

            _ = ticker.tick() => {
                let checked = {
                    let mut operations = registry.lock();
                    let Some(entry) = operations.get_mut(&operation_id) else {
                        // Cancelled from outside; nothing left to report.
                        return;
                    };
                    entry.operation.check_count += 1;
                    entry.operation.status = OperationStatus::InProgress;

                    match policy.evaluate(&entry.operation) {
                        CheckVerdict::Continue => Checked::Progress(entry.operation.clone()),
                        CheckVerdict::Complete(status) => {
                            // Remove first; the entry is gone before anyone
                            // can observe a terminal status in the registry.
                            let Some(entry) = operations.remove(&operation_id) else {
                                return;
                            };
                            let mut operation = entry.operation;
                            operation.status = status;
                            Checked::Final(operation)
                        }
                    }
                };

                match checked {
                    Checked::Progress(operation) => {
                        debug!(
                            event_name = "tracker.operation.checked",
                            correlation_id = %operation.subject.correlation_id,
                            operation_id = %operation_id,
                            check_count = operation.check_count,
                            "operation still in progress"
                        );
                        sink.report(OperationReport {
                            operation_id,
                            subject: operation.subject,
                            status: operation.status,
                            check_count: operation.check_count,
                            elapsed: started.elapsed(),
                            terminal: false,
                        });
                    }
                    Checked::Final(operation) => {
                        info!(
                            event_name = "tracker.operation.finalized",
                            correlation_id = %operation.subject.correlation_id,
                            operation_id = %operation_id,
                            status = %operation.status,
                            check_count = operation.check_count,
                            "operation reached terminal state"
                        );
                        sink.report(finalization_report(&operation));
                        return;
                    }
                }
            }
        }
    }
}

enum Checked {
    Progress(TrackedOperation),
    Final(TrackedOperation),
}

fn finalization_report(operation: &TrackedOperation) -> OperationReport {
    OperationReport {
        operation_id: operation.operation_id,
        subject: operation.subject.clone(),
        status: operation.status,
        check_count: operation.check_count,
        elapsed: Utc::now()
            .signed_duration_since(operation.started_at)
            .to_std()
            .unwrap_or_default(),
        terminal: true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use opsbot_core::config::TrackerConfig;

    use super::{
        CheckPolicy, CheckVerdict, OperationReport, OperationStatus, OperationSubject,
        OperationTracker, ReportSink, SimulatedCheckPolicy, TrackedOperation,
    };

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<OperationReport>>,
    }

    impl RecordingSink {
        fn reports(&self) -> Vec<OperationReport> {
            self.reports.lock().expect("sink lock").clone()
        }
    }

    impl ReportSink for RecordingSink {
        fn report(&self, report: OperationReport) {
            self.reports.lock().expect("sink lock").push(report);
        }
    }

    struct NeverComplete;

    impl CheckPolicy for NeverComplete {
        fn evaluate(&self, _operation: &TrackedOperation) -> CheckVerdict {
            CheckVerdict::Continue
        }
    }

    fn config(check_interval_secs: u64, timeout_secs: u64) -> TrackerConfig {
        TrackerConfig { check_interval_secs, timeout_secs, completion_checks: 3 }
    }

    fn subject() -> OperationSubject {
        OperationSubject {
            action: "deploy".to_owned(),
            version: Some("1.2.3".to_owned()),
            environment: Some("staging".to_owned()),
            correlation_id: "corr-1".to_owned(),
        }
    }

    fn tracker_with(
        config: TrackerConfig,
        policy: Arc<dyn CheckPolicy>,
    ) -> (OperationTracker, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let tracker =
            OperationTracker::new(&config, policy, Arc::clone(&sink) as Arc<dyn ReportSink>);
        (tracker, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn operation_completes_on_third_check_with_progress_reports() {
        let (tracker, sink) = tracker_with(
            config(30, 600),
            Arc::new(SimulatedCheckPolicy::new(3, 1.0)),
        );

        let id = tracker.register(subject());
        assert_eq!(tracker.status(id), Some(OperationStatus::Pending));

        tokio::time::sleep(Duration::from_secs(95)).await;

        let reports = sink.reports();
        assert_eq!(reports.len(), 3);

        assert_eq!(reports[0].check_count, 1);
        assert_eq!(reports[0].status, OperationStatus::InProgress);
        assert!(!reports[0].terminal);
        assert_eq!(reports[1].check_count, 2);
        assert!(!reports[1].terminal);

        assert_eq!(reports[2].check_count, 3);
        assert_eq!(reports[2].status, OperationStatus::Succeeded);
        assert!(reports[2].terminal);
        assert_eq!(reports[2].subject, subject());

        // Finalized operations are reclaimed.
        assert_eq!(tracker.status(id), None);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_report_before_first_interval_elapses() {
        let (tracker, sink) = tracker_with(
            config(30, 600),
            Arc::new(SimulatedCheckPolicy::new(3, 1.0)),
        );

        let id = tracker.register(subject());
        tokio::time::sleep(Duration::from_secs(29)).await;

        assert!(sink.reports().is_empty());
        assert_eq!(tracker.status(id), Some(OperationStatus::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_operation_emits_exactly_one_terminal_report() {
        let (tracker, sink) = tracker_with(config(30, 600), Arc::new(NeverComplete));

        let id = tracker.register(subject());
        tokio::time::sleep(Duration::from_secs(700)).await;

        let reports = sink.reports();
        // Ticks at 30..=570 seconds, then the deadline wins at 600.
        assert_eq!(reports.len(), 20);

        let terminal: Vec<_> = reports.iter().filter(|report| report.terminal).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].status, OperationStatus::TimedOut);
        assert_eq!(terminal[0].check_count, 19);

        assert_eq!(tracker.status(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_stops_future_reports() {
        let (tracker, sink) = tracker_with(config(30, 600), Arc::new(NeverComplete));

        let id = tracker.register(subject());
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(sink.reports().len(), 1);

        assert!(tracker.cancel(id));
        assert!(!tracker.cancel(id), "second cancel is a no-op");
        assert_eq!(tracker.status(id), None);

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].status, OperationStatus::Cancelled);
        assert!(reports[1].terminal);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sink.reports().len(), 2, "no reports after cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_of_unknown_id_is_a_no_op() {
        let (tracker, sink) = tracker_with(config(30, 600), Arc::new(NeverComplete));
        assert!(!tracker.cancel(uuid::Uuid::new_v4()));
        assert!(sink.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_operations_track_independently() {
        let (tracker, sink) = tracker_with(
            config(30, 600),
            Arc::new(SimulatedCheckPolicy::new(1, 1.0)),
        );

        let first = tracker.register(subject());
        let second = tracker.register(OperationSubject {
            action: "deploy".to_owned(),
            version: Some("2.0.0".to_owned()),
            environment: Some("production".to_owned()),
            correlation_id: "corr-2".to_owned(),
        });
        assert_ne!(first, second);
        assert_eq!(tracker.active_count(), 2);

        tokio::time::sleep(Duration::from_secs(35)).await;

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| report.terminal));
        assert!(reports.iter().any(|report| report.operation_id == first));
        assert!(reports.iter().any(|report| report.operation_id == second));
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn terminal_statuses_are_absorbing() {
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::TimedOut.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::InProgress.is_terminal());
    }
}
