//! CDR file reading shared by both aggregation passes.
//!
//! Each pass opens the input file on its own and feeds every accepted
//! [`CallRecord`] to a callback. Malformed lines are counted and skipped,
//! never surfaced as errors.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use billing_core::error::{BillingError, Result};
use billing_core::models::CallRecord;
use billing_core::parser::parse_line;
use serde::Serialize;
use tracing::debug;

// ── CancelFlag ────────────────────────────────────────────────────────────────

/// Shared flag telling running passes to stop at the next line.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── IngestStats ───────────────────────────────────────────────────────────────

/// Line counters for one pass over the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Non-blank lines seen.
    pub lines_read: u64,
    /// Lines that parsed and were applied.
    pub accepted: u64,
    /// Lines dropped by the parser or unreadable.
    pub rejected: u64,
    /// The pass stopped early because it was cancelled.
    pub cancelled: bool,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Read `path` line by line and hand every parsed record to `apply`.
///
/// Returns [`BillingError::InputMissing`] when the file cannot be opened.
/// A raised `cancel` flag ends the read before the next line.
pub fn for_each_record(
    path: &Path,
    cancel: &CancelFlag,
    mut apply: impl FnMut(&CallRecord),
) -> Result<IngestStats> {
    let file = std::fs::File::open(path).map_err(|source| BillingError::InputMissing {
        path: path.to_path_buf(),
        source,
    })?;

    let reader = BufReader::new(file);
    let mut stats = IngestStats::default();

    for line_result in reader.lines() {
        if cancel.is_cancelled() {
            debug!(path = %path.display(), "read cancelled");
            stats.cancelled = true;
            break;
        }

        let line = match line_result {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                stats.lines_read += 1;
                stats.rejected += 1;
                continue;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "stopping read on I/O error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        stats.lines_read += 1;
        match parse_line(&line) {
            Ok(record) => {
                apply(&record);
                stats.accepted += 1;
            }
            Err(e) => {
                debug!(line = stats.lines_read, reason = %e, "skipping CDR line");
                stats.rejected += 1;
            }
        }
    }

    Ok(stats)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
