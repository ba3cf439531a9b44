use serde::{Deserialize, Serialize};

/// The kind of telecom event a CDR line describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    /// Mobile originated call (outgoing voice).
    Moc,
    /// Mobile terminated call (incoming voice).
    Mtc,
    /// Outgoing SMS.
    SmsMo,
    /// Incoming SMS.
    SmsMt,
    /// Data session.
    Gprs,
    /// Any call type the engine does not bill. Kept so the record still
    /// counts as accepted.
    Unknown(String),
}

impl CallType {
    /// Resolve a raw call-type token, ignoring ASCII case.
    pub fn from_token(token: &str) -> Self {
        let t = token.trim();
        if t.eq_ignore_ascii_case("MOC") {
            CallType::Moc
        } else if t.eq_ignore_ascii_case("MTC") {
            CallType::Mtc
        } else if t.eq_ignore_ascii_case("SMS-MO") {
            CallType::SmsMo
        } else if t.eq_ignore_ascii_case("SMS-MT") {
            CallType::SmsMt
        } else if t.eq_ignore_ascii_case("GPRS") {
            CallType::Gprs
        } else {
            CallType::Unknown(t.to_string())
        }
    }
}

/// One parsed CDR line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// MSISDN of the subscriber the record is billed to.
    pub subscriber_id: u64,
    pub operator_name: String,
    /// Never empty; the parser rejects records without one.
    pub operator_id: String,
    pub call_type: CallType,
    /// Call duration in seconds.
    pub duration: f64,
    pub bytes_down: f64,
    pub bytes_up: f64,
    /// Absent when the line carried two adjacent delimiters in its place.
    pub counterpart_subscriber: Option<u64>,
    pub counterpart_operator: String,
}

impl CallRecord {
    /// `true` when both parties belong to the same operator.
    ///
    /// Ids are compared as integers when both are numeric, so `1` and `01`
    /// match; otherwise the raw text must be equal.
    pub fn is_same_operator(&self) -> bool {
        match (
            self.operator_id.parse::<i64>(),
            self.counterpart_operator.parse::<i64>(),
        ) {
            (Ok(own), Ok(other)) => own == other,
            _ => self.operator_id == self.counterpart_operator,
        }
    }
}

/// Usage totals for one subscriber, split by within/outside operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerAccount {
    pub subscriber_id: u64,
    /// Operator name at first sight.
    pub operator_name: String,
    /// Operator id at first sight.
    pub operator_id: String,

    pub in_voice_within: f64,
    pub out_voice_within: f64,
    pub in_voice_outside: f64,
    pub out_voice_outside: f64,

    pub sms_in_within: u32,
    pub sms_out_within: u32,
    pub sms_in_outside: u32,
    pub sms_out_outside: u32,

    pub download: f64,
    pub upload: f64,
}

impl CustomerAccount {
    /// Open an empty account from the first record seen for a subscriber.
    pub fn open(record: &CallRecord) -> Self {
        Self {
            subscriber_id: record.subscriber_id,
            operator_name: record.operator_name.clone(),
            operator_id: record.operator_id.clone(),
            ..Default::default()
        }
    }

    /// Add one record's contribution to exactly one accumulator.
    pub fn apply(&mut self, record: &CallRecord) {
        let same = record.is_same_operator();
        match record.call_type {
            CallType::Moc if same => self.out_voice_within += record.duration,
            CallType::Moc => self.out_voice_outside += record.duration,
            CallType::Mtc if same => self.in_voice_within += record.duration,
            CallType::Mtc => self.in_voice_outside += record.duration,
            CallType::SmsMo if same => self.sms_out_within += 1,
            CallType::SmsMo => self.sms_out_outside += 1,
            CallType::SmsMt if same => self.sms_in_within += 1,
            CallType::SmsMt => self.sms_in_outside += 1,
            CallType::Gprs => {
                self.download += record.bytes_down;
                self.upload += record.bytes_up;
            }
            CallType::Unknown(_) => {}
        }
    }
}

/// Settlement totals for one operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorAccount {
    pub operator_id: String,
    /// First sight wins.
    pub operator_name: String,
    pub in_voice: f64,
    pub out_voice: f64,
    pub sms_in: u32,
    pub sms_out: u32,
    pub download: f64,
    pub upload: f64,
}

impl OperatorAccount {
    pub fn open(record: &CallRecord) -> Self {
        Self {
            operator_id: record.operator_id.clone(),
            operator_name: record.operator_name.clone(),
            ..Default::default()
        }
    }

    /// Add one record's contribution. Operator totals have no
    /// within/outside axis.
    pub fn apply(&mut self, record: &CallRecord) {
        match record.call_type {
            CallType::Moc => self.out_voice += record.duration,
            CallType::Mtc => self.in_voice += record.duration,
            CallType::SmsMo => self.sms_out += 1,
            CallType::SmsMt => self.sms_in += 1,
            CallType::Gprs => {
                self.download += record.bytes_down;
                self.upload += record.bytes_up;
            }
            CallType::Unknown(_) => {}
        }
    }
}
