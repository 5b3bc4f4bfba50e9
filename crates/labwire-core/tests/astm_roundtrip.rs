//! ASTM generate/parse round-trip coverage

use labwire_core::astm::{checksum, parse_message, AstmGenerator, AstmOptions};
use labwire_core::message::{ObservationResult, OrderInfo, PatientInfo};
use pretty_assertions::assert_eq;

fn sample_patient() -> PatientInfo {
    PatientInfo {
        patient_id: "PAT12345".to_string(),
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        middle_name: "M".to_string(),
        dob: "19850615".to_string(),
        gender: "M".to_string(),
        street: "123 Main St".to_string(),
        city: "Boston".to_string(),
        state: "MA".to_string(),
        zip: "02101".to_string(),
        phone: "+1234567890".to_string(),
        ..Default::default()
    }
}

fn sample_order() -> OrderInfo {
    OrderInfo {
        specimen_id: "SAMPLE001".to_string(),
        test_code: "MALARIA".to_string(),
        test_name: "Malaria Parasite Detection".to_string(),
        priority: "R".to_string(),
        ordering_provider: "Dr. Smith".to_string(),
        requested_datetime: "20251215120000".to_string(),
        report_type: "F".to_string(),
        ..Default::default()
    }
}

fn sample_results() -> Vec<ObservationResult> {
    vec![
        ObservationResult {
            test_code: "MALARIA".to_string(),
            test_name: "Malaria Result".to_string(),
            value: "Positive".to_string(),
            reference_range: "Negative".to_string(),
            abnormal_flag: "A".to_string(),
            result_status: "F".to_string(),
            operator_id: "TECH01".to_string(),
            result_datetime: "20251215120500".to_string(),
            ..Default::default()
        },
        ObservationResult {
            test_code: "SPECIES".to_string(),
            test_name: "Parasite Species".to_string(),
            value: "Plasmodium falciparum".to_string(),
            result_status: "F".to_string(),
            result_datetime: "20251215120500".to_string(),
            ..Default::default()
        },
    ]
}

#[test]
fn roundtrip_recovers_specimen_results_and_comments() {
    let generator = AstmGenerator::new();
    let options = AstmOptions {
        sender_id: "IVD_DEVICE_001".to_string(),
        receiver_id: "LIS".to_string(),
        comments: vec!["Ring forms and gametocytes observed".to_string()],
        include_framing: false,
    };
    let message = generator.generate(&sample_patient(), &sample_order(), &sample_results(), &options);
    let parsed = parse_message(&message).unwrap();

    assert_eq!(parsed.header.sender_id, "IVD_DEVICE_001");
    assert_eq!(parsed.header.receiver_id, "LIS");
    assert_eq!(parsed.header.version, "E1394-97");

    assert_eq!(parsed.orders.len(), 1);
    assert_eq!(parsed.orders[0].specimen_id, "SAMPLE001");
    assert_eq!(parsed.orders[0].test_code, "MALARIA");
    assert_eq!(parsed.orders[0].test_name, "Malaria Parasite Detection");
    assert_eq!(parsed.orders[0].ordering_provider, "Dr. Smith");
    assert_eq!(parsed.orders[0].report_type, "F");

    assert_eq!(parsed.observations.len(), 2);
    assert_eq!(parsed.observations[0].value, "Positive");
    assert_eq!(parsed.observations[0].reference_range, "Negative");
    assert_eq!(parsed.observations[0].abnormal_flag, "A");
    assert_eq!(parsed.observations[0].operator_id, "TECH01");
    assert_eq!(parsed.observations[0].result_datetime, "20251215120500");
    assert_eq!(parsed.observations[1].test_code, "SPECIES");
    assert_eq!(parsed.observations[1].value, "Plasmodium falciparum");

    assert_eq!(parsed.comments.len(), 1);
    assert_eq!(parsed.comments[0].text, "Ring forms and gametocytes observed");

    assert_eq!(parsed.terminator.code, "N");
}

#[test]
fn roundtrip_recovers_patient_demographics() {
    let generator = AstmGenerator::new();
    let patient = sample_patient();
    let message = generator.generate(
        &patient,
        &sample_order(),
        &sample_results(),
        &AstmOptions::default(),
    );
    let parsed = parse_message(&message).unwrap();

    assert_eq!(parsed.patient.patient_id, patient.patient_id);
    assert_eq!(parsed.patient.last_name, patient.last_name);
    assert_eq!(parsed.patient.first_name, patient.first_name);
    assert_eq!(parsed.patient.middle_name, patient.middle_name);
    assert_eq!(parsed.patient.dob, patient.dob);
    assert_eq!(parsed.patient.gender, patient.gender);
    assert_eq!(parsed.patient.street, patient.street);
    assert_eq!(parsed.patient.city, patient.city);
    assert_eq!(parsed.patient.state, patient.state);
    assert_eq!(parsed.patient.zip, patient.zip);
    assert_eq!(parsed.patient.phone, patient.phone);
}

#[test]
fn framed_roundtrip_recovers_the_same_message() {
    let generator = AstmGenerator::new();
    let framed_options = AstmOptions {
        include_framing: true,
        comments: vec!["note".to_string()],
        ..Default::default()
    };
    let plain_options = AstmOptions {
        include_framing: false,
        comments: vec!["note".to_string()],
        ..Default::default()
    };

    let framed = generator.generate(
        &sample_patient(),
        &sample_order(),
        &sample_results(),
        &framed_options,
    );
    let plain = generator.generate(
        &sample_patient(),
        &sample_order(),
        &sample_results(),
        &plain_options,
    );

    let from_framed = parse_message(&framed).unwrap();
    let from_plain = parse_message(&plain).unwrap();

    assert_eq!(from_framed.observations, from_plain.observations);
    assert_eq!(from_framed.comments, from_plain.comments);
    assert_eq!(from_framed.terminator, from_plain.terminator);
}

#[test]
fn frame_checksum_matches_byte_sum_mod_256() {
    let generator = AstmGenerator::new();
    let options = AstmOptions {
        include_framing: true,
        ..Default::default()
    };
    let framed = generator.generate(
        &sample_patient(),
        &sample_order(),
        &sample_results(),
        &options,
    );

    let etx = framed.find('\x03').unwrap();
    let body = &framed[1..etx - 1];
    let carried = &framed[etx + 1..etx + 3];

    // Independent recomputation of the documented formula
    let expected: u32 = body
        .bytes()
        .map(u32::from)
        .chain(std::iter::once(u32::from(b'\r')))
        .sum::<u32>()
        % 256;
    assert_eq!(carried, format!("{expected:02X}"));
    assert_eq!(carried, checksum(body));
}

#[test]
fn sequence_numbers_restart_per_message() {
    let generator = AstmGenerator::new();
    let message = generator.generate(
        &sample_patient(),
        &sample_order(),
        &sample_results(),
        &AstmOptions::default(),
    );
    // Two consecutive messages carry identical sequence numbering
    let second = generator.generate(
        &sample_patient(),
        &sample_order(),
        &sample_results(),
        &AstmOptions::default(),
    );

    let sequences = |msg: &str| -> Vec<String> {
        msg.split("\r\n")
            .filter(|r| r.starts_with('R'))
            .map(|r| r.split('|').nth(1).unwrap_or("").to_string())
            .collect()
    };
    assert_eq!(sequences(&message), vec!["1", "2"]);
    assert_eq!(sequences(&second), vec!["1", "2"]);
}
