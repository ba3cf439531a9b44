//! Core types for the CDR billing engine.
//!
//! Holds the record model, the line parser, the error types and the
//! configuration layer shared by the data and runtime crates.

pub mod error;
pub mod models;
pub mod parser;
pub mod settings;
