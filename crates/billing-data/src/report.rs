//! Text rendering of the aggregation tables.
//!
//! Both reports walk their table in bucket order, then chain order, so the
//! same input always produces the same bytes. Files are written to a
//! temporary sibling and renamed into place, so readers never see a
//! half-written report.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use billing_core::error::{BillingError, Result};
use billing_core::models::{CustomerAccount, OperatorAccount};

use crate::table::ChainedTable;

pub const CUSTOMER_REPORT_TITLE: &str = "#Customers Data Base:";
pub const OPERATOR_REPORT_TITLE: &str = "#Operators Data Base:";

/// Closes every entity block in both reports.
pub const BLOCK_SEPARATOR: &str = "----------------------------------------";

pub const CUSTOMER_HEADER_PREFIX: &str = "Customer ID: ";
pub const OPERATOR_HEADER_PREFIX: &str = "Operator Brand: ";

/// Lines in one customer block, header and separator included.
pub const CUSTOMER_BLOCK_LINES: usize = 14;
/// Lines in one operator block, header and separator included.
pub const OPERATOR_BLOCK_LINES: usize = 7;

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Render the per-subscriber report.
pub fn render_customer_report(table: &ChainedTable<u64, CustomerAccount>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{CUSTOMER_REPORT_TITLE}");
    for acct in table.values() {
        // Writing into a String cannot fail.
        let _ = write_customer_block(&mut out, acct);
    }
    out
}

fn write_customer_block(out: &mut String, c: &CustomerAccount) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(
        out,
        "{CUSTOMER_HEADER_PREFIX}{} ({})",
        c.subscriber_id, c.operator_name
    )?;
    writeln!(out, "* Services within the mobile operator *")?;
    writeln!(out, "Incoming voice call durations: {:.2}", c.in_voice_within)?;
    writeln!(out, "Outgoing voice call durations: {:.2}", c.out_voice_within)?;
    writeln!(out, "Incoming SMS messages: {}", c.sms_in_within)?;
    writeln!(out, "Outgoing SMS messages: {}", c.sms_out_within)?;
    writeln!(out, "* Services outside the mobile operator *")?;
    writeln!(out, "Incoming voice call durations: {:.2}", c.in_voice_outside)?;
    writeln!(out, "Outgoing voice call durations: {:.2}", c.out_voice_outside)?;
    writeln!(out, "Incoming SMS messages: {}", c.sms_in_outside)?;
    writeln!(out, "Outgoing SMS messages: {}", c.sms_out_outside)?;
    writeln!(out, "* Internet use *")?;
    writeln!(
        out,
        "MB downloaded: {:.2} | MB uploaded: {:.2}",
        c.download, c.upload
    )?;
    writeln!(out, "{BLOCK_SEPARATOR}")
}

/// Render the per-operator settlement report.
pub fn render_operator_report(table: &ChainedTable<String, OperatorAccount>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{OPERATOR_REPORT_TITLE}");
    for acct in table.values() {
        let _ = write_operator_block(&mut out, acct);
    }
    out
}

fn write_operator_block(out: &mut String, o: &OperatorAccount) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(
        out,
        "{OPERATOR_HEADER_PREFIX}{} ({})",
        o.operator_name, o.operator_id
    )?;
    writeln!(out, "Incoming voice call durations: {:.2}", o.in_voice)?;
    writeln!(out, "Outgoing voice call durations: {:.2}", o.out_voice)?;
    writeln!(out, "Incoming SMS messages: {}", o.sms_in)?;
    writeln!(out, "Outgoing SMS messages: {}", o.sms_out)?;
    writeln!(
        out,
        "MB downloaded: {:.2} | MB uploaded: {:.2}",
        o.download, o.upload
    )?;
    writeln!(out, "{BLOCK_SEPARATOR}")
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// Atomically replace `path` with `contents`, creating parent directories.
pub fn write_report(path: &Path, contents: &str) -> Result<()> {
    let to_err = |source| BillingError::ReportWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }

    let tmp = temp_path(path);
    std::fs::write(&tmp, contents).map_err(to_err)?;
    std::fs::rename(&tmp, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp);
        to_err(source)
    })?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
