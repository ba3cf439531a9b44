//! CDR line parser.
//!
//! Line layout, pipe-delimited:
//!
//! ```text
//! MSISDN|OPERATOR NAME|OPERATOR ID|CALL TYPE|DURATION|DOWNLOAD|UPLOAD|THIRD PARTY MSISDN|THIRD PARTY OPERATOR
//! ```
//!
//! Data sessions usually carry no third-party MSISDN, which shows up as two
//! adjacent delimiters (`...|50||2`). That field is then left as `None` and
//! the counterpart operator is read from the following position. The
//! counterpart operator itself is always required.

use crate::error::ParseError;
use crate::models::{CallRecord, CallType};

/// Number of delimited positions a CDR line must have.
pub const FIELD_COUNT: usize = 9;

pub const DELIMITER: char = '|';

/// Parse one raw CDR line.
///
/// Positions past the ninth are ignored. The line is rejected when it has
/// fewer than nine positions, when any of the first seven is empty or not
/// numeric where a number is expected, or when the counterpart operator is
/// empty.
///
/// # Examples
///
/// ```
/// use billing_core::models::CallType;
/// use billing_core::parser::parse_line;
///
/// let rec = parse_line("9876543210|Airtel|1|GPRS|0|500|50||2").unwrap();
/// assert_eq!(rec.call_type, CallType::Gprs);
/// assert_eq!(rec.counterpart_subscriber, None);
/// assert_eq!(rec.counterpart_operator, "2");
/// ```
pub fn parse_line(line: &str) -> Result<CallRecord, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
    if fields.len() < FIELD_COUNT {
        return Err(ParseError::TooFewFields(fields.len()));
    }

    let subscriber_id = parse_id(fields[0], "subscriber id")?;
    let operator_name = required(fields[1], "operator name")?;
    let operator_id = required(fields[2], "operator id")?;
    let call_type = CallType::from_token(required(fields[3], "call type")?);
    let duration = parse_amount(fields[4], "duration")?;
    let bytes_down = parse_amount(fields[5], "bytes down")?;
    let bytes_up = parse_amount(fields[6], "bytes up")?;

    let counterpart_subscriber = match fields[7] {
        "" => None,
        raw => Some(parse_id(raw, "counterpart subscriber id")?),
    };
    // An empty subscriber slot still leaves eight tokens; an empty operator
    // slot never does.
    let counterpart_operator = match fields[8] {
        "" => return Err(ParseError::MissingCounterpart),
        raw => raw.to_string(),
    };

    Ok(CallRecord {
        subscriber_id,
        operator_name: operator_name.to_string(),
        operator_id: operator_id.to_string(),
        call_type,
        duration,
        bytes_down,
        bytes_up,
        counterpart_subscriber,
        counterpart_operator,
    })
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ParseError> {
    if value.is_empty() {
        Err(ParseError::EmptyField { field })
    } else {
        Ok(value)
    }
}

fn parse_id(value: &str, field: &'static str) -> Result<u64, ParseError> {
    required(value, field)?
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn parse_amount(value: &str, field: &'static str) -> Result<f64, ParseError> {
    match required(value, field)?.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}
