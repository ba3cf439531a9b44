use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BillingError, Result};

/// File name of the per-subscriber report.
pub const CUSTOMER_REPORT_FILE: &str = "CB.txt";
/// File name of the per-operator settlement report.
pub const OPERATOR_REPORT_FILE: &str = "IOSB.txt";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Aggregate call-detail records into customer and interoperator billing reports
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cdr-billing",
    about = "Aggregate call-detail records into customer and interoperator billing reports",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Command,

    /// CDR input file
    #[arg(long, global = true, env = "CDR_BILLING_INPUT")]
    pub input: Option<PathBuf>,

    /// Directory the reports are written to
    #[arg(long, global = true, env = "CDR_BILLING_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.cdr-billing/config.json)
    #[arg(long, global = true, env = "CDR_BILLING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Process the CDR data into both reports
    Process {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the customer billing report, or one subscriber's block
    Customers {
        /// Only show the block for this MSISDN
        #[arg(long)]
        msisdn: Option<u64>,
    },
    /// Print the interoperator billing report, or one operator's block
    Operators {
        /// Only show the block for this operator id or brand name
        #[arg(long)]
        operator: Option<String>,
    },
}

impl Settings {
    /// Log level after applying `--debug`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    /// Load the config file and apply CLI overrides on top of it.
    ///
    /// CLI values always win over file values.
    pub fn resolve_config(&self) -> Result<BillingConfig> {
        let path = self.config.clone().unwrap_or_else(BillingConfig::config_path);
        let mut config = BillingConfig::load_from(&path);

        if let Some(input) = &self.input {
            config.input_path = input.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

// ── BillingConfig ──────────────────────────────────────────────────────────────

/// Engine configuration, persisted as JSON.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BillingConfig {
    /// CDR file read by both aggregation passes.
    pub input_path: PathBuf,
    /// Directory holding `CB.txt` and `IOSB.txt`.
    pub output_dir: PathBuf,
    /// Bucket count of the subscriber table.
    pub customer_buckets: usize,
    /// Bucket count of the operator table.
    pub operator_buckets: usize,
    /// Full report dumps pause after this many lines.
    pub pace_every_lines: usize,
    /// Length of each pause, in milliseconds.
    pub pace_millis: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data").join("data.cdr"),
            output_dir: PathBuf::from("Output"),
            customer_buckets: 1000,
            operator_buckets: 1000,
            pace_every_lines: 10,
            pace_millis: 10,
        }
    }
}

impl BillingConfig {
    /// Default config location: `~/.cdr-billing/config.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".cdr-billing").join("config.json")
    }

    /// Load from `path`, falling back to defaults when the file is absent or
    /// cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                Self::default()
            }
        }
    }

    /// Atomically write the config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.customer_buckets == 0 || self.operator_buckets == 0 {
            return Err(BillingError::Config(
                "bucket count must be positive".to_string(),
            ));
        }
        if self.pace_every_lines == 0 {
            return Err(BillingError::Config(
                "pace_every_lines must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn customer_report_path(&self) -> PathBuf {
        self.output_dir.join(CUSTOMER_REPORT_FILE)
    }

    pub fn operator_report_path(&self) -> PathBuf {
        self.output_dir.join(OPERATOR_REPORT_FILE)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
