//! Aggregation layer for the CDR billing engine.
//!
//! Reads CDR files, folds the records into the subscriber and operator
//! tables, and renders those tables into the text reports.

pub mod operator;
pub mod reader;
pub mod report;
pub mod subscriber;
pub mod table;

pub use billing_core as core;
