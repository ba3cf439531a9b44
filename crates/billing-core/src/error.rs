use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the billing engine.
#[derive(Error, Debug)]
pub enum BillingError {
    /// The CDR input file could not be opened or read.
    #[error("Error opening CDR file '{path}': {source}")]
    InputMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A report file could not be created, written or moved into place.
    #[error("Error creating output file '{path}': {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An aggregation pass could not be started.
    #[error("Failed to start {pass} processing thread: {source}")]
    LaunchFailed {
        pass: String,
        #[source]
        source: std::io::Error,
    },

    /// An aggregation pass terminated without handing back its outcome.
    #[error("{pass} processing thread could not be joined")]
    JoinFailed { pass: String },

    /// A pass stopped early because its caller went away.
    #[error("{pass} processing was cancelled")]
    Cancelled { pass: String },

    /// One or more passes finished with an error.
    #[error("Processing failed: {0}")]
    PassesFailed(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reason a single CDR line was rejected by the parser.
///
/// These never escape an aggregation pass; they are only counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected at least 9 fields, found {0}")]
    TooFewFields(usize),

    #[error("field '{field}' is empty")]
    EmptyField { field: &'static str },

    #[error("field '{field}' is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("counterpart operator is missing")]
    MissingCounterpart,
}

/// Convenience alias used throughout the billing crates.
pub type Result<T> = std::result::Result<T, BillingError>;
