//! Interchange data model
//!
//! Typed records shared by the HL7 and ASTM codecs. Every optional field is a
//! `String` defaulting to empty so fixed-position encoding stays stable; the
//! generators substitute protocol defaults (e.g. gender `U`) where a standard
//! requires a value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Patient demographics carried in an HL7 PID segment / ASTM P record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientInfo {
    /// Practice/hospital assigned patient identifier
    pub patient_id: String,
    /// Assigning authority for the identifier
    pub assigning_authority: String,
    /// Identifier type code (e.g. "MR")
    pub id_type: String,
    /// Family name
    pub last_name: String,
    /// Given name
    pub first_name: String,
    pub middle_name: String,
    /// Name suffix (e.g. "JR")
    pub suffix: String,
    /// Date of birth, `YYYYMMDD`
    pub dob: String,
    /// Gender code: `M`/`F`/`U`/`O`
    pub gender: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
}

/// Test order carried in HL7 ORC/OBR segments / an ASTM O record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderInfo {
    /// Specimen/sample identifier
    pub specimen_id: String,
    pub placer_order_number: String,
    pub filler_order_number: String,
    /// Local (instrument) test code
    pub test_code: String,
    pub test_name: String,
    /// LOINC code, empty when the test has no LOINC mapping
    pub loinc_code: String,
    /// Priority: `R` routine, `S` stat, `A` ASAP
    pub priority: String,
    pub ordering_provider: String,
    /// Requested/ordered timestamp, `YYYYMMDDHHMMSS`
    pub requested_datetime: String,
    /// Specimen collection timestamp, `YYYYMMDDHHMMSS`
    pub collection_datetime: String,
    /// Report type: `F` final, `P` preliminary
    pub report_type: String,
}

/// A single measured result (HL7 OBX segment / ASTM R record)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationResult {
    pub test_code: String,
    pub test_name: String,
    pub loinc_code: String,
    /// Stringified value, numeric or text
    pub value: String,
    pub units: String,
    pub reference_range: String,
    /// `N`/`H`/`L`/`HH`/`LL`/`A` or empty
    pub abnormal_flag: String,
    /// `F` final, `P` preliminary, `C` corrected, `X` cannot be obtained
    pub result_status: String,
    pub operator_id: String,
    /// Completion timestamp, `YYYYMMDDHHMMSS`
    pub result_datetime: String,
}

/// Free-text annotation (ASTM C record), e.g. microscopy findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentRecord {
    /// `I` instrument, `L` laboratory
    pub source: String,
    pub text: String,
    /// Comment type, `G` generic
    pub kind: String,
}

/// Header/sender metadata recovered by the parsers
///
/// Covers both the HL7 MSH segment and the ASTM H record; fields that only
/// exist in one standard stay empty for the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageHeader {
    pub sending_app: String,
    pub sending_facility: String,
    pub receiving_app: String,
    pub receiving_facility: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// HL7 message type (e.g. `ORU^R01`)
    pub message_type: String,
    pub control_id: String,
    /// `P` production, `T` test
    pub processing_id: String,
    pub version: String,
    pub timestamp: String,
    /// Raw delimiter/encoding definition field
    pub delimiters: String,
}

/// ASTM L record contents; defaults for HL7 messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminatorInfo {
    pub sequence: String,
    /// `N` normal, `Q` request info, `I` instrument error
    pub code: String,
}

/// Structured mirror of one inbound message, produced by either parser
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedMessage {
    pub header: MessageHeader,
    pub patient: PatientInfo,
    pub orders: Vec<OrderInfo>,
    pub observations: Vec<ObservationResult>,
    pub comments: Vec<CommentRecord>,
    pub terminator: TerminatorInfo,
}

/// Errors a codec parse can report
///
/// Short or partially populated records are never errors; missing fields
/// come back as empty strings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty message")]
    Empty,

    #[error("message contains no recognizable records")]
    NoRecords,
}

/// Split a delimited record into fields
pub(crate) fn split_fields(record: &str, delimiter: char) -> Vec<&str> {
    record.split(delimiter).collect()
}

/// Positional field access that never fails: out-of-range yields ""
pub(crate) fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

/// Positional component access on a `^`-separated field
pub(crate) fn component(field: &str, index: usize) -> &str {
    field.split('^').nth(index).unwrap_or("")
}
