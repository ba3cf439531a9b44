//! Runtime layer for the CDR billing engine.
//!
//! Coordinates the two concurrent aggregation passes and serves the
//! generated reports back to callers.

pub mod pipeline;
pub mod report_access;

pub use billing_core as core;
pub use billing_data as data;
