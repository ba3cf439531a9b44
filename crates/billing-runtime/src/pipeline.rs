//! Aggregation pipeline coordinator.
//!
//! Runs the customer pass and the interoperator pass on their own threads
//! over the same CDR file, waits for both at a single barrier, and reports
//! progress through an `mpsc` channel of [`PipelineEvent`]s. Each pass owns
//! a private table, so the two never share mutable state.

use std::path::{Path, PathBuf};
use std::thread;

use billing_core::error::{BillingError, Result};
use billing_core::settings::BillingConfig;
use billing_data::operator::OperatorAggregator;
use billing_data::reader::{CancelFlag, IngestStats};
use billing_data::report::{render_customer_report, render_operator_report, write_report};
use billing_data::subscriber::SubscriberAggregator;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// The two independent aggregation passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassKind {
    Customer,
    Interoperator,
}

impl PassKind {
    /// Human-readable name used in notifications.
    pub fn label(self) -> &'static str {
        match self {
            PassKind::Customer => "Customer Billing",
            PassKind::Interoperator => "Interoperator Billing",
        }
    }

    fn thread_name(self) -> &'static str {
        match self {
            PassKind::Customer => "customer-pass",
            PassKind::Interoperator => "interop-pass",
        }
    }
}

/// Progress notification sent to whoever requested the run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started,
    Completed,
    Failed(String),
}

impl PipelineEvent {
    /// The line shown to the requesting client.
    pub fn message(&self) -> String {
        match self {
            PipelineEvent::Started => "Processing CDR data: started...".to_string(),
            PipelineEvent::Completed => "Processing CDR data: completed.".to_string(),
            PipelineEvent::Failed(reason) => format!("Error: {reason}"),
        }
    }
}

/// Outcome of one successful pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub kind: PassKind,
    pub stats: IngestStats,
    /// Distinct customers or operators in the table.
    pub entities: usize,
    pub report_path: PathBuf,
}

/// Outcome of a fully successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// RFC 3339 timestamp of when both passes had finished.
    pub generated_at: String,
    pub customer: PassSummary,
    pub interoperator: PassSummary,
}

/// Work handed to a pass thread. It polls the flag it is given.
pub type PassJob = Box<dyn FnOnce(&CancelFlag) -> Result<PassSummary> + Send + 'static>;

/// Starts pass threads.
///
/// The spawner must hand `cancel` to the job. [`ThreadSpawner`] is the real
/// implementation; tests substitute their own to exercise launch failures
/// and cancellation.
pub trait PassSpawner: Send + Sync {
    fn spawn(
        &self,
        kind: PassKind,
        cancel: CancelFlag,
        job: PassJob,
    ) -> std::io::Result<thread::JoinHandle<Result<PassSummary>>>;
}

/// Spawns each pass on a named OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl PassSpawner for ThreadSpawner {
    fn spawn(
        &self,
        kind: PassKind,
        cancel: CancelFlag,
        job: PassJob,
    ) -> std::io::Result<thread::JoinHandle<Result<PassSummary>>> {
        thread::Builder::new()
            .name(kind.thread_name().to_string())
            .spawn(move || job(&cancel))
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Coordinates one aggregation run per call to [`Pipeline::run`].
///
/// Tables are built from scratch on every run, so repeated runs over an
/// unchanged input produce identical reports.
pub struct Pipeline {
    config: BillingConfig,
    spawner: Box<dyn PassSpawner>,
}

impl Pipeline {
    pub fn new(config: BillingConfig) -> Self {
        Self::with_spawner(config, ThreadSpawner)
    }

    pub fn with_spawner(config: BillingConfig, spawner: impl PassSpawner + 'static) -> Self {
        Self {
            config,
            spawner: Box::new(spawner),
        }
    }

    /// Run both passes and wait for them.
    ///
    /// Sends [`PipelineEvent::Started`] before launching and
    /// [`PipelineEvent::Completed`] or [`PipelineEvent::Failed`] once both
    /// passes have been joined. If `events` is closed while the passes are
    /// running, both are cancelled and still awaited before returning.
    pub async fn run(&self, events: mpsc::Sender<PipelineEvent>) -> Result<RunSummary> {
        notify(&events, PipelineEvent::Started).await;
        info!(input = %self.config.input_path.display(), "processing CDR data");

        let cancel = CancelFlag::new();

        let customer = match self.launch(PassKind::Customer, &cancel) {
            Ok(handle) => handle,
            Err(e) => {
                notify(&events, PipelineEvent::Failed(e.to_string())).await;
                return Err(e);
            }
        };

        let interoperator = match self.launch(PassKind::Interoperator, &cancel) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "waiting for the customer pass after launch failure");
                let waited = tokio::task::spawn_blocking(move || customer.join()).await;
                if !matches!(waited, Ok(Ok(_))) {
                    warn!("customer pass did not finish cleanly");
                }
                notify(&events, PipelineEvent::Failed(e.to_string())).await;
                return Err(e);
            }
        };

        let mut barrier =
            tokio::task::spawn_blocking(move || (customer.join(), interoperator.join()));

        let joined = tokio::select! {
            joined = &mut barrier => joined,
            _ = events.closed() => {
                warn!("requester disconnected; cancelling both passes");
                cancel.cancel();
                barrier.await
            }
        };

        let (customer, interoperator) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                let err = BillingError::JoinFailed {
                    pass: format!("aggregation barrier ({e})"),
                };
                notify(&events, PipelineEvent::Failed(err.to_string())).await;
                return Err(err);
            }
        };

        let customer = match take_outcome(PassKind::Customer, customer) {
            Ok(outcome) => outcome,
            Err(e) => {
                notify(&events, PipelineEvent::Failed(e.to_string())).await;
                return Err(e);
            }
        };
        let interoperator = match take_outcome(PassKind::Interoperator, interoperator) {
            Ok(outcome) => outcome,
            Err(e) => {
                notify(&events, PipelineEvent::Failed(e.to_string())).await;
                return Err(e);
            }
        };

        match (customer, interoperator) {
            (Ok(customer), Ok(interoperator)) => {
                info!(
                    customers = customer.entities,
                    operators = interoperator.entities,
                    rejected = customer.stats.rejected,
                    "processing completed"
                );
                notify(&events, PipelineEvent::Completed).await;
                Ok(RunSummary {
                    generated_at: Utc::now().to_rfc3339(),
                    customer,
                    interoperator,
                })
            }
            (customer, interoperator) => {
                let reasons: Vec<String> = [customer.err(), interoperator.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect();
                let reason = reasons.join("; ");
                warn!(%reason, "processing failed");
                notify(&events, PipelineEvent::Failed(reason.clone())).await;
                Err(BillingError::PassesFailed(reason))
            }
        }
    }

    fn launch(
        &self,
        kind: PassKind,
        cancel: &CancelFlag,
    ) -> Result<thread::JoinHandle<Result<PassSummary>>> {
        let config = self.config.clone();
        let job: PassJob = match kind {
            PassKind::Customer => {
                Box::new(move |cancel: &CancelFlag| run_customer_pass(&config, cancel))
            }
            PassKind::Interoperator => {
                Box::new(move |cancel: &CancelFlag| run_interoperator_pass(&config, cancel))
            }
        };

        self.spawner
            .spawn(kind, cancel.clone(), job)
            .map_err(|source| BillingError::LaunchFailed {
                pass: kind.label().to_string(),
                source,
            })
    }
}

// ── Passes ────────────────────────────────────────────────────────────────────

/// Build the subscriber table from the input file and write `CB.txt`.
///
/// The table is dropped when this returns. A missing input still replaces
/// `CB.txt` with an empty report before the error is returned.
pub fn run_customer_pass(config: &BillingConfig, cancel: &CancelFlag) -> Result<PassSummary> {
    let mut aggregator = SubscriberAggregator::new(config.customer_buckets);
    let report_path = config.customer_report_path();
    let stats = match aggregator.ingest(&config.input_path, cancel) {
        Err(e @ BillingError::InputMissing { .. }) => {
            let empty = render_customer_report(aggregator.table());
            reset_report(PassKind::Customer, &report_path, &empty);
            return Err(e);
        }
        other => other?,
    };
    finish_pass(
        PassKind::Customer,
        stats,
        aggregator.len(),
        report_path,
        || render_customer_report(aggregator.table()),
    )
}

/// Build the operator table from the input file and write `IOSB.txt`.
pub fn run_interoperator_pass(
    config: &BillingConfig,
    cancel: &CancelFlag,
) -> Result<PassSummary> {
    let mut aggregator = OperatorAggregator::new(config.operator_buckets);
    let report_path = config.operator_report_path();
    let stats = match aggregator.ingest(&config.input_path, cancel) {
        Err(e @ BillingError::InputMissing { .. }) => {
            let empty = render_operator_report(aggregator.table());
            reset_report(PassKind::Interoperator, &report_path, &empty);
            return Err(e);
        }
        other => other?,
    };
    finish_pass(
        PassKind::Interoperator,
        stats,
        aggregator.len(),
        report_path,
        || render_operator_report(aggregator.table()),
    )
}

fn finish_pass(
    kind: PassKind,
    stats: IngestStats,
    entities: usize,
    report_path: PathBuf,
    render: impl FnOnce() -> String,
) -> Result<PassSummary> {
    if stats.cancelled {
        return Err(BillingError::Cancelled {
            pass: kind.label().to_string(),
        });
    }

    write_report(&report_path, &render())?;
    debug!(pass = kind.label(), path = %report_path.display(), entities, "report written");

    Ok(PassSummary {
        kind,
        stats,
        entities,
        report_path,
    })
}

/// Overwrite the previous run's report with a title-only one.
fn reset_report(kind: PassKind, path: &Path, empty: &str) {
    match write_report(path, empty) {
        Ok(()) => debug!(pass = kind.label(), path = %path.display(), "report reset"),
        Err(e) => warn!(pass = kind.label(), error = %e, "could not reset report"),
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Unwrap a joined thread result. A panicked pass is fatal to the run.
fn take_outcome(
    kind: PassKind,
    joined: thread::Result<Result<PassSummary>>,
) -> Result<Result<PassSummary>> {
    joined.map_err(|_| BillingError::JoinFailed {
        pass: kind.label().to_string(),
    })
}

async fn notify(events: &mpsc::Sender<PipelineEvent>, event: PipelineEvent) {
    if let Err(e) = events.send(event).await {
        debug!(event = ?e.0, "pipeline event dropped; requester gone");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use billing_data::report::{CUSTOMER_REPORT_TITLE, OPERATOR_REPORT_TITLE};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const CDR: &str = "\
9876543210|Airtel|1|MTC|120|0|0|9123456780|1
9876543210|Airtel|1|GPRS|0|500|50||2
9123456780|Jio|2|MOC|42|0|0|9876543210|1
not a record
9123456780|Jio||SMS-MO|0|0|0|9876543210|1
";

    fn setup(contents: Option<&str>) -> (TempDir, BillingConfig) {
        let dir = TempDir::new().expect("tempdir");
        let input = dir.path().join("data.cdr");
        if let Some(contents) = contents {
            std::fs::write(&input, contents).expect("write input");
        }
        let config = BillingConfig {
            input_path: input,
            output_dir: dir.path().join("Output"),
            ..Default::default()
        };
        (dir, config)
    }

    async fn drain(mut rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("report exists")
    }

    /// Fails to launch the given pass and spawns the other normally.
    struct FailingSpawner(PassKind);

    impl PassSpawner for FailingSpawner {
        fn spawn(
            &self,
            kind: PassKind,
            cancel: CancelFlag,
            job: PassJob,
        ) -> std::io::Result<thread::JoinHandle<Result<PassSummary>>> {
            if kind == self.0 {
                Err(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "thread limit reached",
                ))
            } else {
                ThreadSpawner.spawn(kind, cancel, job)
            }
        }
    }

    /// Replaces the given pass with one that panics.
    struct PanickingSpawner(PassKind);

    impl PassSpawner for PanickingSpawner {
        fn spawn(
            &self,
            kind: PassKind,
            cancel: CancelFlag,
            job: PassJob,
        ) -> std::io::Result<thread::JoinHandle<Result<PassSummary>>> {
            if kind == self.0 {
                Ok(thread::spawn(|| panic!("pass blew up")))
            } else {
                ThreadSpawner.spawn(kind, cancel, job)
            }
        }
    }

    /// Holds each pass back until the run is cancelled, or gives up after
    /// five seconds and runs it anyway.
    struct CancelGatedSpawner;

    impl PassSpawner for CancelGatedSpawner {
        fn spawn(
            &self,
            _kind: PassKind,
            cancel: CancelFlag,
            job: PassJob,
        ) -> std::io::Result<thread::JoinHandle<Result<PassSummary>>> {
            Ok(thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(5);
                while !cancel.is_cancelled() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(5));
                }
                job(&cancel)
            }))
        }
    }

    #[tokio::test]
    async fn test_run_writes_both_reports() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline = Pipeline::new(config.clone());
        let (tx, rx) = mpsc::channel(8);

        let summary = pipeline.run(tx).await.expect("run succeeds");
        let events = drain(rx).await;

        assert_eq!(events, vec![PipelineEvent::Started, PipelineEvent::Completed]);
        assert_eq!(summary.customer.entities, 2);
        assert_eq!(summary.interoperator.entities, 2);
        assert_eq!(summary.customer.stats.accepted, 3);
        assert_eq!(summary.customer.stats.rejected, 2);
        assert_eq!(summary.interoperator.stats, summary.customer.stats);

        let cb = read(&config.customer_report_path());
        assert!(cb.contains("Customer ID: 9876543210 (Airtel)"));
        assert!(cb.contains("Incoming voice call durations: 120.00"));
        let iosb = read(&config.operator_report_path());
        assert!(iosb.contains("Operator Brand: Airtel (1)"));
        assert!(iosb.contains("Operator Brand: Jio (2)"));
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline = Pipeline::new(config.clone());

        let (tx, _rx) = mpsc::channel(8);
        pipeline.run(tx).await.expect("first run");
        let first = (
            read(&config.customer_report_path()),
            read(&config.operator_report_path()),
        );

        let (tx, _rx) = mpsc::channel(8);
        pipeline.run(tx).await.expect("second run");
        let second = (
            read(&config.customer_report_path()),
            read(&config.operator_report_path()),
        );

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_input_fails_both_passes() {
        let (_dir, config) = setup(None);
        let pipeline = Pipeline::new(config.clone());
        let (tx, rx) = mpsc::channel(8);

        let err = pipeline.run(tx).await.unwrap_err();
        let events = drain(rx).await;

        assert!(matches!(err, BillingError::PassesFailed(_)));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], PipelineEvent::Started);
        match &events[1] {
            PipelineEvent::Failed(reason) => assert!(reason.contains("Error opening CDR file")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            read(&config.customer_report_path()),
            format!("{CUSTOMER_REPORT_TITLE}\n")
        );
        assert_eq!(
            read(&config.operator_report_path()),
            format!("{OPERATOR_REPORT_TITLE}\n")
        );
    }

    #[tokio::test]
    async fn test_missing_input_clears_previous_reports() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline = Pipeline::new(config.clone());

        let (tx, _rx) = mpsc::channel(8);
        pipeline.run(tx).await.expect("first run");
        assert!(read(&config.customer_report_path()).contains("Customer ID: 9876543210"));

        std::fs::remove_file(&config.input_path).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        assert!(pipeline.run(tx).await.is_err());

        let customers = read(&config.customer_report_path());
        let operators = read(&config.operator_report_path());
        assert!(!customers.contains("Customer ID:"));
        assert!(!operators.contains("Operator Brand:"));
        assert!(customers.starts_with(CUSTOMER_REPORT_TITLE));
        assert!(operators.starts_with(OPERATOR_REPORT_TITLE));
    }

    #[tokio::test]
    async fn test_one_pass_failing_does_not_stop_the_other() {
        let (_dir, config) = setup(Some(CDR));
        // A directory squatting on IOSB.txt makes only the interoperator
        // report unwritable.
        std::fs::create_dir_all(config.operator_report_path().join("squatter")).unwrap();
        let pipeline = Pipeline::new(config.clone());
        let (tx, rx) = mpsc::channel(8);

        let err = pipeline.run(tx).await.unwrap_err();
        let events = drain(rx).await;

        match err {
            BillingError::PassesFailed(reason) => {
                assert!(reason.contains("IOSB.txt"));
                assert!(!reason.contains("CB.txt"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(events.last(), Some(PipelineEvent::Failed(_))));
        assert!(read(&config.customer_report_path()).contains("Customer ID: 9123456780 (Jio)"));
    }

    #[tokio::test]
    async fn test_launch_failure_waits_for_sibling() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline =
            Pipeline::with_spawner(config.clone(), FailingSpawner(PassKind::Interoperator));
        let (tx, rx) = mpsc::channel(8);

        let err = pipeline.run(tx).await.unwrap_err();
        let events = drain(rx).await;

        assert!(matches!(err, BillingError::LaunchFailed { ref pass, .. } if pass == "Interoperator Billing"));
        assert_eq!(events[0], PipelineEvent::Started);
        assert!(events[1]
            .message()
            .starts_with("Error: Failed to start Interoperator Billing processing thread"));
        // The customer pass was already running and must have finished.
        assert!(config.customer_report_path().exists());
        assert!(!config.operator_report_path().exists());
    }

    #[tokio::test]
    async fn test_first_launch_failure_starts_nothing() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline = Pipeline::with_spawner(config.clone(), FailingSpawner(PassKind::Customer));
        let (tx, _rx) = mpsc::channel(8);

        let err = pipeline.run(tx).await.unwrap_err();
        assert!(matches!(err, BillingError::LaunchFailed { .. }));
        assert!(!config.operator_report_path().exists());
    }

    #[tokio::test]
    async fn test_panicking_pass_is_a_join_failure() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline =
            Pipeline::with_spawner(config.clone(), PanickingSpawner(PassKind::Customer));
        let (tx, rx) = mpsc::channel(8);

        let err = pipeline.run(tx).await.unwrap_err();
        let events = drain(rx).await;

        assert!(matches!(err, BillingError::JoinFailed { ref pass } if pass == "Customer Billing"));
        assert!(matches!(events.last(), Some(PipelineEvent::Failed(_))));
        // The sibling was still joined before the error surfaced.
        assert!(config.operator_report_path().exists());
    }

    #[tokio::test]
    async fn test_disconnected_requester_cancels_passes() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline = Pipeline::with_spawner(config.clone(), CancelGatedSpawner);
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        match pipeline.run(tx).await {
            Err(BillingError::PassesFailed(reason)) => {
                assert!(reason.contains("Customer Billing processing was cancelled"));
                assert!(reason.contains("Interoperator Billing processing was cancelled"));
            }
            Ok(_) => panic!("passes ran to completion without seeing the cancel"),
            Err(other) => panic!("unexpected error {other}"),
        }
        assert!(!config.customer_report_path().exists());
        assert!(!config.operator_report_path().exists());
    }

    #[tokio::test]
    async fn test_connected_requester_does_not_cancel() {
        let (_dir, config) = setup(Some(CDR));
        let pipeline = Pipeline::new(config.clone());
        let (tx, rx) = mpsc::channel(8);

        let summary = pipeline.run(tx).await.expect("run");
        drop(rx);
        assert!(!summary.customer.stats.cancelled);
        assert!(!summary.interoperator.stats.cancelled);
    }

    #[test]
    fn test_event_messages() {
        assert_eq!(
            PipelineEvent::Started.message(),
            "Processing CDR data: started..."
        );
        assert_eq!(
            PipelineEvent::Completed.message(),
            "Processing CDR data: completed."
        );
        assert_eq!(
            PipelineEvent::Failed("boom".to_string()).message(),
            "Error: boom"
        );
    }

    #[test]
    fn test_run_summary_serializes() {
        let (_dir, config) = setup(Some(CDR));
        let cancel = CancelFlag::new();
        let summary = RunSummary {
            generated_at: "2024-01-01T00:00:00+00:00".to_string(),
            customer: run_customer_pass(&config, &cancel).unwrap(),
            interoperator: run_interoperator_pass(&config, &cancel).unwrap(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["customer"]["kind"], "Customer");
        assert_eq!(json["interoperator"]["entities"], 2);
        assert_eq!(json["customer"]["stats"]["rejected"], 2);
    }
}
