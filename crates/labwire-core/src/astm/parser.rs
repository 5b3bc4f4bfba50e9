//! ASTM record parsing
//!
//! Routes on the leading record-type character; short records never fail.
//! Framing is stripped before record splitting; the frame checksum is not
//! re-validated (see `strip_frame`).

use super::strip_frame;
use crate::message::{
    component, field, split_fields, CodecError, CommentRecord, MessageHeader, ObservationResult,
    OrderInfo, ParsedMessage, PatientInfo, TerminatorInfo,
};

/// Parse an inbound ASTM message into its structured mirror
///
/// Records may be separated by `\r\n`, `\r`, or `\n`. Multiple O and R
/// records accumulate in arrival order.
pub fn parse_message(input: &str) -> Result<ParsedMessage, CodecError> {
    if input.trim().is_empty() {
        return Err(CodecError::Empty);
    }

    let body = strip_frame(input);
    let mut parsed = ParsedMessage::default();
    let mut recognized = 0usize;

    for record in body.split(['\r', '\n']) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        let fields = split_fields(record, '|');
        match record.chars().next() {
            Some('H') => {
                parsed.header = parse_header(&fields);
                recognized += 1;
            }
            Some('P') => {
                parsed.patient = parse_patient(&fields);
                recognized += 1;
            }
            Some('O') => {
                parsed.orders.push(parse_order(&fields));
                recognized += 1;
            }
            Some('R') => {
                parsed.observations.push(parse_result(&fields));
                recognized += 1;
            }
            Some('C') => {
                parsed.comments.push(parse_comment(&fields));
                recognized += 1;
            }
            Some('L') => {
                parsed.terminator = TerminatorInfo {
                    sequence: field(&fields, 1).to_string(),
                    code: field(&fields, 2).to_string(),
                };
                recognized += 1;
            }
            _ => {}
        }
    }

    if recognized == 0 {
        return Err(CodecError::NoRecords);
    }
    Ok(parsed)
}

fn parse_header(fields: &[&str]) -> MessageHeader {
    // Field 5: sender^version
    let sender_field = field(fields, 4);

    MessageHeader {
        delimiters: field(fields, 1).to_string(),
        control_id: field(fields, 2).to_string(),
        sender_id: component(sender_field, 0).to_string(),
        version: component(sender_field, 1).to_string(),
        receiver_id: field(fields, 9).to_string(),
        processing_id: field(fields, 11).to_string(),
        timestamp: field(fields, 13).to_string(),
        ..Default::default()
    }
}

fn parse_patient(fields: &[&str]) -> PatientInfo {
    // Field 6: last^first^middle
    let name_field = field(fields, 5);
    // Field 11: street^^city^state^zip
    let address_field = field(fields, 10);

    PatientInfo {
        patient_id: field(fields, 2).to_string(),
        last_name: component(name_field, 0).to_string(),
        first_name: component(name_field, 1).to_string(),
        middle_name: component(name_field, 2).to_string(),
        dob: field(fields, 7).to_string(),
        gender: field(fields, 8).to_string(),
        street: component(address_field, 0).to_string(),
        city: component(address_field, 2).to_string(),
        state: component(address_field, 3).to_string(),
        zip: component(address_field, 4).to_string(),
        phone: field(fields, 12).to_string(),
        ..Default::default()
    }
}

fn parse_order(fields: &[&str]) -> OrderInfo {
    // Field 5: ^^^code^name
    let test_field = field(fields, 4);

    OrderInfo {
        specimen_id: field(fields, 2).to_string(),
        test_code: component(test_field, 3).to_string(),
        test_name: component(test_field, 4).to_string(),
        priority: field(fields, 5).to_string(),
        requested_datetime: field(fields, 6).to_string(),
        collection_datetime: field(fields, 7).to_string(),
        ordering_provider: field(fields, 16).to_string(),
        report_type: field(fields, 25).to_string(),
        ..Default::default()
    }
}

fn parse_result(fields: &[&str]) -> ObservationResult {
    // Field 3: ^^^code^name
    let test_field = field(fields, 2);

    ObservationResult {
        test_code: component(test_field, 3).to_string(),
        test_name: component(test_field, 4).to_string(),
        value: field(fields, 3).to_string(),
        units: field(fields, 4).to_string(),
        reference_range: field(fields, 5).to_string(),
        abnormal_flag: field(fields, 6).to_string(),
        result_status: field(fields, 8).to_string(),
        operator_id: field(fields, 10).to_string(),
        result_datetime: field(fields, 12).to_string(),
        ..Default::default()
    }
}

fn parse_comment(fields: &[&str]) -> CommentRecord {
    CommentRecord {
        source: field(fields, 2).to_string(),
        text: field(fields, 3).to_string(),
        kind: field(fields, 4).to_string(),
    }
}
