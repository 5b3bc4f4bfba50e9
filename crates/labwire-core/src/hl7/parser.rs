//! HL7 message parsing
//!
//! Positional extraction that never fails on short segments: missing fields
//! and components come back as empty strings. Unknown segment types are
//! skipped.

use super::unescape_text;
use crate::message::{
    component, field, split_fields, CodecError, MessageHeader, ObservationResult, OrderInfo,
    ParsedMessage, PatientInfo,
};

/// Parse an inbound HL7 message into its structured mirror
///
/// Segments may be separated by `\r`, `\n`, or `\r\n`.
pub fn parse_message(input: &str) -> Result<ParsedMessage, CodecError> {
    if input.trim().is_empty() {
        return Err(CodecError::Empty);
    }

    let mut parsed = ParsedMessage::default();
    let mut recognized = 0usize;
    // ORC order numbers are held until the matching OBR arrives
    let mut orc_placer = String::new();
    let mut orc_filler = String::new();
    let mut saw_orc = false;
    let mut saw_obr = false;

    for segment in input.split(['\r', '\n']) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let fields = split_fields(segment, '|');
        match field(&fields, 0) {
            "MSH" => {
                parsed.header = parse_msh(&fields);
                recognized += 1;
            }
            "PID" => {
                parsed.patient = parse_pid(&fields);
                recognized += 1;
            }
            "ORC" => {
                orc_placer = field(&fields, 2).to_string();
                orc_filler = field(&fields, 3).to_string();
                saw_orc = true;
                recognized += 1;
            }
            "OBR" => {
                parsed.orders.push(parse_obr(&fields, &orc_placer, &orc_filler));
                saw_obr = true;
                recognized += 1;
            }
            "OBX" => {
                parsed.observations.push(parse_obx(&fields));
                recognized += 1;
            }
            _ => {}
        }
    }

    if recognized == 0 {
        return Err(CodecError::NoRecords);
    }
    if saw_orc && !saw_obr {
        parsed.orders.push(OrderInfo {
            placer_order_number: orc_placer,
            filler_order_number: orc_filler,
            ..Default::default()
        });
    }

    Ok(parsed)
}

fn parse_msh(fields: &[&str]) -> MessageHeader {
    MessageHeader {
        delimiters: field(fields, 1).to_string(),
        sending_app: field(fields, 2).to_string(),
        sending_facility: field(fields, 3).to_string(),
        receiving_app: field(fields, 4).to_string(),
        receiving_facility: field(fields, 5).to_string(),
        timestamp: field(fields, 6).to_string(),
        message_type: field(fields, 8).to_string(),
        control_id: field(fields, 9).to_string(),
        processing_id: field(fields, 10).to_string(),
        version: field(fields, 11).to_string(),
        ..Default::default()
    }
}

fn parse_pid(fields: &[&str]) -> PatientInfo {
    // PID-3: id^^^assigning-authority^id-type
    let id_field = field(fields, 3);
    // PID-5: last^first^middle^suffix
    let name_field = field(fields, 5);
    // PID-11: street^^city^state^zip^country
    let address_field = field(fields, 11);

    PatientInfo {
        patient_id: component(id_field, 0).to_string(),
        assigning_authority: component(id_field, 3).to_string(),
        id_type: component(id_field, 4).to_string(),
        last_name: unescape_text(component(name_field, 0)),
        first_name: unescape_text(component(name_field, 1)),
        middle_name: unescape_text(component(name_field, 2)),
        suffix: component(name_field, 3).to_string(),
        dob: field(fields, 7).to_string(),
        gender: field(fields, 8).to_string(),
        street: unescape_text(component(address_field, 0)),
        city: unescape_text(component(address_field, 2)),
        state: component(address_field, 3).to_string(),
        zip: component(address_field, 4).to_string(),
        country: component(address_field, 5).to_string(),
        phone: field(fields, 13).to_string(),
    }
}

fn parse_obr(fields: &[&str], orc_placer: &str, orc_filler: &str) -> OrderInfo {
    let (loinc_code, test_code, test_name) = split_identifier(field(fields, 4), true);
    let placer = non_empty_or(field(fields, 2), orc_placer);
    let filler = non_empty_or(field(fields, 3), orc_filler);

    OrderInfo {
        // In this profile the placer number doubles as the sample id on the
        // wire (OBR-2 falls back to the specimen id on generation)
        specimen_id: placer.clone(),
        placer_order_number: placer,
        filler_order_number: filler,
        loinc_code,
        test_code,
        test_name,
        priority: field(fields, 5).to_string(),
        collection_datetime: field(fields, 7).to_string(),
        ordering_provider: field(fields, 16).to_string(),
        ..Default::default()
    }
}

fn parse_obx(fields: &[&str]) -> ObservationResult {
    let (loinc_code, test_code, test_name) = split_identifier(field(fields, 3), false);

    ObservationResult {
        loinc_code,
        test_code,
        test_name,
        value: unescape_text(field(fields, 5)),
        units: field(fields, 6).to_string(),
        reference_range: field(fields, 7).to_string(),
        abnormal_flag: field(fields, 8).to_string(),
        result_status: field(fields, 11).to_string(),
        result_datetime: field(fields, 14).to_string(),
        operator_id: field(fields, 15).to_string(),
    }
}

/// Split a coded identifier back into (loinc, local code, name)
///
/// When component 3 is `LN` the first component is a LOINC code and the
/// local code sits in component 4 (OBR only); otherwise the first component
/// is the local code itself.
fn split_identifier(id: &str, with_local: bool) -> (String, String, String) {
    let first = component(id, 0);
    let name = unescape_text(component(id, 1));
    if component(id, 2) == "LN" {
        let local = if with_local { component(id, 3) } else { "" };
        (first.to_string(), local.to_string(), name)
    } else {
        (String::new(), first.to_string(), name)
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "MSH|^~\\&|LIMS|ABC_Hospital|EMR|XYZ_Clinic|20251215113500||ORU^R01|MSG12345|P|2.5\r\
PID|1||P1234567^^^ABC_Hospital^MR||EVERYMAN^ADAM^^JR||19800101|M|||123 Main St^^Anytown^CA^90210^USA\r\
ORC|RE|L7890|||NW\r\
OBR|1|L7890||1498-5^Red Cell Count^LN^RBC|||20251215103000\r\
OBX|1|NM|1498-5^Red Cell Count^LN||4.56|x10(6)/uL|4.20-5.90|H|||F";

    #[test]
    fn parses_full_message() {
        let parsed = parse_message(SAMPLE).unwrap();

        assert_eq!(parsed.header.message_type, "ORU^R01");
        assert_eq!(parsed.header.control_id, "MSG12345");
        assert_eq!(parsed.header.version, "2.5");
        assert_eq!(parsed.header.sending_facility, "ABC_Hospital");

        assert_eq!(parsed.patient.patient_id, "P1234567");
        assert_eq!(parsed.patient.last_name, "EVERYMAN");
        assert_eq!(parsed.patient.suffix, "JR");
        assert_eq!(parsed.patient.city, "Anytown");

        assert_eq!(parsed.orders.len(), 1);
        let order = &parsed.orders[0];
        assert_eq!(order.placer_order_number, "L7890");
        assert_eq!(order.loinc_code, "1498-5");
        assert_eq!(order.test_code, "RBC");
        assert_eq!(order.test_name, "Red Cell Count");

        assert_eq!(parsed.observations.len(), 1);
        let obs = &parsed.observations[0];
        assert_eq!(obs.value, "4.56");
        assert_eq!(obs.units, "x10(6)/uL");
        assert_eq!(obs.reference_range, "4.20-5.90");
        assert_eq!(obs.abnormal_flag, "H");
        assert_eq!(obs.result_status, "F");
    }

    #[test]
    fn tolerates_newline_separators() {
        let parsed = parse_message(&SAMPLE.replace('\r', "\n")).unwrap();
        assert_eq!(parsed.observations.len(), 1);

        let parsed = parse_message(&SAMPLE.replace('\r', "\r\n")).unwrap();
        assert_eq!(parsed.observations.len(), 1);
    }

    #[test]
    fn unknown_segments_are_skipped() {
        let input = format!("{SAMPLE}\rZZZ|custom|stuff\rNTE|1||note");
        let parsed = parse_message(&input).unwrap();
        assert_eq!(parsed.observations.len(), 1);
    }

    #[test]
    fn short_segments_yield_empty_fields() {
        let parsed = parse_message("MSH|^~\\&\rPID|1\rOBX|1").unwrap();
        assert_eq!(parsed.patient.patient_id, "");
        assert_eq!(parsed.observations.len(), 1);
        assert_eq!(parsed.observations[0].value, "");
    }

    #[test]
    fn identifier_without_ln_is_a_local_code() {
        let parsed =
            parse_message("OBX|1|NM|RBC^Red Cell Count||4.56|x10(6)/uL").unwrap();
        let obs = &parsed.observations[0];
        assert_eq!(obs.loinc_code, "");
        assert_eq!(obs.test_code, "RBC");
        assert_eq!(obs.test_name, "Red Cell Count");
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(parse_message("").unwrap_err(), CodecError::Empty);
        assert_eq!(parse_message("  \r\n ").unwrap_err(), CodecError::Empty);
    }

    #[test]
    fn unrecognized_input_is_an_error() {
        assert_eq!(
            parse_message("not an hl7 message").unwrap_err(),
            CodecError::NoRecords
        );
    }
}
