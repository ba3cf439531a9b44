//! Streaming of generated reports to a line-oriented consumer.
//!
//! [`stream_report`] spawns a producer task and hands back the receiving end
//! of a channel. The sequence is finite and cannot be restarted; dropping the
//! receiver stops the producer at its next send.

use std::path::{Path, PathBuf};
use std::time::Duration;

use billing_core::settings::BillingConfig;
use billing_data::report::{
    CUSTOMER_BLOCK_LINES, CUSTOMER_HEADER_PREFIX, OPERATOR_BLOCK_LINES, OPERATOR_HEADER_PREFIX,
};
use regex::Regex;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const END_OF_FILE: &str = "=== End of File ===";
pub const PROCESS_FIRST_NOTE: &str =
    "Note: Please process the CDR data first (option 1 from secondary menu).";

// ── Public types ──────────────────────────────────────────────────────────────

/// Which generated report to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Customer,
    Interoperator,
}

impl ReportKind {
    pub fn banner(self) -> &'static str {
        match self {
            ReportKind::Customer => "=== Customer Billing File Content ===",
            ReportKind::Interoperator => "=== Interoperator Billing File Content ===",
        }
    }

    pub fn path(self, config: &BillingConfig) -> PathBuf {
        match self {
            ReportKind::Customer => config.customer_report_path(),
            ReportKind::Interoperator => config.operator_report_path(),
        }
    }

    fn block_lines(self) -> usize {
        match self {
            ReportKind::Customer => CUSTOMER_BLOCK_LINES,
            ReportKind::Interoperator => OPERATOR_BLOCK_LINES,
        }
    }
}

/// What to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportRequest {
    /// Every line of the report.
    Full(ReportKind),
    /// One block of the customer report.
    Subscriber(u64),
    /// One block of the interoperator report, matched by id or by brand
    /// name ignoring case.
    Operator(String),
}

impl ReportRequest {
    pub fn kind(&self) -> ReportKind {
        match self {
            ReportRequest::Full(kind) => *kind,
            ReportRequest::Subscriber(_) => ReportKind::Customer,
            ReportRequest::Operator(_) => ReportKind::Interoperator,
        }
    }
}

/// Flow control for full dumps: sleep for `pause` after every `every_lines`
/// lines sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub every_lines: usize,
    pub pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            every_lines: 10,
            pause: Duration::from_millis(10),
        }
    }
}

impl From<&BillingConfig> for Pacing {
    fn from(config: &BillingConfig) -> Self {
        Self {
            every_lines: config.pace_every_lines.max(1),
            pause: Duration::from_millis(config.pace_millis),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Stream the report at `path` according to `request`.
///
/// Must be called from within a tokio runtime.
pub fn stream_report(
    path: PathBuf,
    request: ReportRequest,
    pacing: Pacing,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let sink = Sink(tx);
        if produce(&sink, &path, &request, pacing).await.is_err() {
            debug!(path = %path.display(), "report consumer went away; stream aborted");
        }
    });

    rx
}

// ── Private implementation ────────────────────────────────────────────────────

/// The consumer dropped its receiver.
#[derive(Debug)]
struct SinkClosed;

struct Sink(mpsc::Sender<String>);

impl Sink {
    async fn line(&self, line: impl Into<String>) -> Result<(), SinkClosed> {
        self.0.send(line.into()).await.map_err(|_| SinkClosed)
    }
}

async fn produce(
    sink: &Sink,
    path: &Path,
    request: &ReportRequest,
    pacing: Pacing,
) -> Result<(), SinkClosed> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            sink.line(format!("Error opening file: {e}")).await?;
            return sink.line(PROCESS_FIRST_NOTE).await;
        }
    };
    let mut lines = BufReader::new(file).lines();

    match request {
        ReportRequest::Full(kind) => dump(sink, &mut lines, *kind, pacing).await,
        ReportRequest::Subscriber(msisdn) => {
            let re = Regex::new(&format!(
                r"^{}(\d+) \(",
                regex::escape(CUSTOMER_HEADER_PREFIX)
            ))
            .expect("regex is valid");
            let target = msisdn.to_string();
            let found = forward_block(sink, &mut lines, ReportKind::Customer, |line| {
                re.captures(line).is_some_and(|c| c[1] == target)
            })
            .await?;
            if !found {
                sink.line(format!("Customer with MSISDN {msisdn} not found."))
                    .await?;
            }
            Ok(())
        }
        ReportRequest::Operator(key) => {
            let re = Regex::new(&format!(
                r"^{}(.*) \(([^()]*)\)$",
                regex::escape(OPERATOR_HEADER_PREFIX)
            ))
            .expect("regex is valid");
            let key = key.trim();
            let found = forward_block(sink, &mut lines, ReportKind::Interoperator, |line| {
                re.captures(line)
                    .is_some_and(|c| &c[2] == key || c[1].eq_ignore_ascii_case(key))
            })
            .await?;
            if !found {
                sink.line(format!("Operator {key} not found.")).await?;
            }
            Ok(())
        }
    }
}

async fn dump(
    sink: &Sink,
    lines: &mut Lines<BufReader<File>>,
    kind: ReportKind,
    pacing: Pacing,
) -> Result<(), SinkClosed> {
    sink.line(kind.banner()).await?;

    let mut sent = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "report read failed mid-stream");
                break;
            }
        };
        sink.line(line).await?;
        sent += 1;
        if pacing.every_lines > 0 && sent % pacing.every_lines == 0 {
            tokio::time::sleep(pacing.pause).await;
        }
    }

    sink.line(END_OF_FILE).await
}

/// Scan for the first header accepted by `is_target` and forward it with the
/// rest of its block. Returns whether a block was found.
async fn forward_block(
    sink: &Sink,
    lines: &mut Lines<BufReader<File>>,
    kind: ReportKind,
    is_target: impl Fn(&str) -> bool,
) -> Result<bool, SinkClosed> {
    // Read errors end the scan as "not found"; nothing partial has been sent.
    while let Ok(Some(line)) = lines.next_line().await {
        if !is_target(&line) {
            continue;
        }
        sink.line(line).await?;
        for _ in 1..kind.block_lines() {
            match lines.next_line().await {
                Ok(Some(line)) => sink.line(line).await?,
                _ => break,
            }
        }
        return Ok(true);
    }
    Ok(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
