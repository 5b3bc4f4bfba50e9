//! ASTM record generation
//!
//! Builds H/P/O/R/C/L record sequences from typed records. Field positions
//! follow E1394-97; unused positions are kept as empty fields so downstream
//! positional parsers stay aligned.

use chrono::Local;

use super::{
    frame, universal_test_id, DELIMITER_DEFINITION, FIELD_DELIMITER, PROTOCOL_VERSION,
    RECORD_SEPARATOR,
};
use crate::message::{ObservationResult, OrderInfo, PatientInfo};

/// Parameters for a generated ASTM message
#[derive(Debug, Clone)]
pub struct AstmOptions {
    /// Sending device/system ID (H record field 5)
    pub sender_id: String,
    /// Receiving system ID (H record field 10)
    pub receiver_id: String,
    /// Free-text comments, one C record each
    pub comments: Vec<String>,
    /// Wrap the message in STX/ETX/checksum framing
    pub include_framing: bool,
}

impl Default for AstmOptions {
    fn default() -> Self {
        Self {
            sender_id: "IVD_DEVICE".to_string(),
            receiver_id: String::new(),
            comments: Vec::new(),
            include_framing: false,
        }
    }
}

/// E1394 message generator
///
/// Stateless: record sequence numbers restart at 1 for each record family in
/// every generated message.
#[derive(Debug, Default)]
pub struct AstmGenerator;

impl AstmGenerator {
    /// Create a generator
    pub fn new() -> Self {
        Self
    }

    fn timestamp() -> String {
        Local::now().format("%Y%m%d%H%M%S").to_string()
    }

    /// Generate a complete message: H, P, O, R per result, C per comment,
    /// then exactly one L record, `\r\n`-joined
    pub fn generate(
        &self,
        patient: &PatientInfo,
        order: &OrderInfo,
        results: &[ObservationResult],
        options: &AstmOptions,
    ) -> String {
        let timestamp = Self::timestamp();

        let mut records = vec![
            header_record(options, &timestamp),
            patient_record(patient, 1),
            order_record(order, 1, &timestamp),
        ];
        for (idx, result) in results.iter().enumerate() {
            records.push(result_record(result, idx + 1, &timestamp));
        }
        for (idx, comment) in options.comments.iter().enumerate() {
            records.push(comment_record(comment, idx + 1));
        }
        records.push(terminator_record(1));

        let body = records.join(RECORD_SEPARATOR);
        if options.include_framing {
            frame(&body)
        } else {
            body
        }
    }

    /// Convenience wrapper: one result, no comments, no framing
    pub fn generate_single_result(
        &self,
        patient: &PatientInfo,
        order: &OrderInfo,
        result: &ObservationResult,
        sender_id: &str,
    ) -> String {
        let options = AstmOptions {
            sender_id: sender_id.to_string(),
            ..Default::default()
        };
        self.generate(patient, order, std::slice::from_ref(result), &options)
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

fn join(fields: &[&str]) -> String {
    fields.join(&FIELD_DELIMITER.to_string())
}

/// H: header, 14 fields
fn header_record(options: &AstmOptions, timestamp: &str) -> String {
    let sender = format!("{}^{}", options.sender_id, PROTOCOL_VERSION);
    join(&[
        "H",
        DELIMITER_DEFINITION,
        "",
        "",
        &sender,
        "",
        "",
        "",
        "",
        &options.receiver_id,
        "",
        "P",
        "1",
        timestamp,
    ])
}

/// P: patient, 35 fields
fn patient_record(patient: &PatientInfo, sequence: usize) -> String {
    let name = format!(
        "{}^{}^{}",
        patient.last_name, patient.first_name, patient.middle_name
    );
    let address = if patient.street.is_empty() && patient.city.is_empty() {
        String::new()
    } else {
        format!(
            "{}^^{}^{}^{}",
            patient.street, patient.city, patient.state, patient.zip
        )
    };
    let sequence = sequence.to_string();

    let mut fields: Vec<&str> = vec![
        "P",
        &sequence,
        &patient.patient_id,
        "",
        "",
        &name,
        "",
        &patient.dob,
        or_default(&patient.gender, "U"),
        "",
        &address,
        "",
        &patient.phone,
        "",
    ];
    // Special/practice/admission fields 15..35 are unused by this device
    fields.resize(35, "");
    join(&fields)
}

/// O: order, 31 fields
fn order_record(order: &OrderInfo, sequence: usize, timestamp: &str) -> String {
    let test_id = universal_test_id(&order.test_code, &order.test_name);
    let requested = or_default(&order.requested_datetime, timestamp);
    let sequence = sequence.to_string();

    let mut fields: Vec<&str> = vec![
        "O",
        &sequence,
        &order.specimen_id,
        "",
        &test_id,
        or_default(&order.priority, "R"),
        requested,
        &order.collection_datetime,
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        &order.ordering_provider,
    ];
    fields.resize(25, "");
    fields.push(or_default(&order.report_type, "F"));
    fields.resize(31, "");
    join(&fields)
}

/// R: result, 14 fields
fn result_record(result: &ObservationResult, sequence: usize, timestamp: &str) -> String {
    let test_id = universal_test_id(&result.test_code, &result.test_name);
    let completed = or_default(&result.result_datetime, timestamp);
    let sequence = sequence.to_string();

    join(&[
        "R",
        &sequence,
        &test_id,
        &result.value,
        &result.units,
        &result.reference_range,
        &result.abnormal_flag,
        "",
        or_default(&result.result_status, "F"),
        "",
        &result.operator_id,
        "",
        completed,
        "",
    ])
}

/// C: comment, 5 fields, instrument-sourced generic text
fn comment_record(text: &str, sequence: usize) -> String {
    let sequence = sequence.to_string();
    join(&["C", &sequence, "I", text, "G"])
}

/// L: terminator, normal completion
fn terminator_record(sequence: usize) -> String {
    let sequence = sequence.to_string();
    join(&["L", &sequence, "N"])
}
