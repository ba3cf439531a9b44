//! Per-subscriber usage aggregation.

use std::path::Path;

use billing_core::error::Result;
use billing_core::models::{CallRecord, CustomerAccount};
use tracing::debug;

use crate::reader::{for_each_record, CancelFlag, IngestStats};
use crate::table::ChainedTable;

/// Builds one [`CustomerAccount`] per MSISDN from a record stream.
///
/// An aggregator is good for one pass; construct a fresh one per run.
#[derive(Debug)]
pub struct SubscriberAggregator {
    table: ChainedTable<u64, CustomerAccount>,
}

impl SubscriberAggregator {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            table: ChainedTable::new(bucket_count),
        }
    }

    /// Apply one record, opening the subscriber's account on first sight.
    pub fn apply(&mut self, record: &CallRecord) {
        self.table
            .get_or_insert_with(record.subscriber_id, || CustomerAccount::open(record))
            .apply(record);
    }

    /// Apply every record in the CDR file at `path`.
    pub fn ingest(&mut self, path: &Path, cancel: &CancelFlag) -> Result<IngestStats> {
        let stats = for_each_record(path, cancel, |record| self.apply(record))?;
        debug!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            customers = self.table.len(),
            "subscriber pass ingested"
        );
        Ok(stats)
    }

    pub fn account(&self, subscriber_id: u64) -> Option<&CustomerAccount> {
        self.table.get(&subscriber_id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &ChainedTable<u64, CustomerAccount> {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::parser::parse_line;

    fn feed(agg: &mut SubscriberAggregator, lines: &[&str]) {
        for line in lines {
            if let Ok(record) = parse_line(line) {
                agg.apply(&record);
            }
        }
    }

    #[test]
    fn test_incoming_voice_within_operator() {
        let mut agg = SubscriberAggregator::new(1000);
        feed(&mut agg, &["9876543210|Airtel|1|MTC|120|0|0|9123456780|1"]);

        let acct = agg.account(9876543210).unwrap();
        assert_eq!(acct.in_voice_within, 120.0);
        assert_eq!(acct.in_voice_outside, 0.0);
        assert_eq!(acct.out_voice_within + acct.out_voice_outside, 0.0);
    }

    #[test]
    fn test_data_session_without_counterpart_subscriber() {
        let mut agg = SubscriberAggregator::new(1000);
        feed(&mut agg, &["9876543210|Airtel|1|GPRS|0|500|50||2"]);

        let acct = agg.account(9876543210).unwrap();
        assert_eq!(acct.download, 500.0);
        assert_eq!(acct.upload, 50.0);
    }

    #[test]
    fn test_totals_accumulate_across_records() {
        let mut agg = SubscriberAggregator::new(1000);
        feed(
            &mut agg,
            &[
                "111|Airtel|1|MOC|30|0|0|222|1",
                "111|Airtel|1|MOC|45.5|0|0|333|2",
                "111|Airtel|1|MOC|15|0|0|444|1",
                "111|Airtel|1|SMS-MT|0|0|0|222|2",
                "222|Airtel|1|SMS-MO|0|0|0|111|1",
            ],
        );

        assert_eq!(agg.len(), 2);
        let acct = agg.account(111).unwrap();
        assert_eq!(acct.out_voice_within, 45.0);
        assert_eq!(acct.out_voice_outside, 45.5);
        assert_eq!(acct.sms_in_outside, 1);
        assert_eq!(agg.account(222).unwrap().sms_out_within, 1);
    }

    #[test]
    fn test_first_sight_operator_is_kept() {
        let mut agg = SubscriberAggregator::new(1000);
        feed(
            &mut agg,
            &[
                "111|Airtel|1|MOC|30|0|0|222|1",
                "111|Vodafone|3|MOC|30|0|0|222|1",
            ],
        );
        let acct = agg.account(111).unwrap();
        assert_eq!(acct.operator_name, "Airtel");
        assert_eq!(acct.operator_id, "1");
    }

    #[test]
    fn test_empty_operator_id_leaves_table_untouched() {
        let mut agg = SubscriberAggregator::new(1000);
        feed(&mut agg, &["111|Airtel||MOC|30|0|0|222|1"]);
        assert!(agg.is_empty());
    }

    #[test]
    fn test_unknown_call_type_still_opens_account() {
        let mut agg = SubscriberAggregator::new(1000);
        feed(&mut agg, &["555|Airtel|1|USSD|30|0|0|222|1"]);
        let acct = agg.account(555).unwrap();
        assert_eq!(acct.in_voice_within + acct.out_voice_within, 0.0);
    }
}
