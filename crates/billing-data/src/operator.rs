//! Per-operator settlement aggregation.

use std::path::Path;

use billing_core::error::Result;
use billing_core::models::{CallRecord, OperatorAccount};
use tracing::debug;

use crate::reader::{for_each_record, CancelFlag, IngestStats};
use crate::table::ChainedTable;

/// Builds one [`OperatorAccount`] per operator id from a record stream.
#[derive(Debug)]
pub struct OperatorAggregator {
    table: ChainedTable<String, OperatorAccount>,
}

impl OperatorAggregator {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            table: ChainedTable::new(bucket_count),
        }
    }

    pub fn apply(&mut self, record: &CallRecord) {
        self.table
            .get_or_insert_with(record.operator_id.clone(), || OperatorAccount::open(record))
            .apply(record);
    }

    pub fn ingest(&mut self, path: &Path, cancel: &CancelFlag) -> Result<IngestStats> {
        let stats = for_each_record(path, cancel, |record| self.apply(record))?;
        debug!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            operators = self.table.len(),
            "operator pass ingested"
        );
        Ok(stats)
    }

    pub fn account(&self, operator_id: &str) -> Option<&OperatorAccount> {
        self.table.get(&operator_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &ChainedTable<String, OperatorAccount> {
        &self.table
    }
}
