//! Generate a sample result report in both interchange formats and parse it
//! back.
//!
//! Run with: cargo run --example generate_report

use labwire_core::astm::{self, AstmGenerator, AstmOptions};
use labwire_core::hl7::{self, Hl7Generator, Hl7Options};
use labwire_core::message::{ObservationResult, OrderInfo, PatientInfo};

fn main() {
    let patient = PatientInfo {
        patient_id: "P1234567".to_string(),
        first_name: "ADAM".to_string(),
        last_name: "EVERYMAN".to_string(),
        dob: "19800101".to_string(),
        gender: "M".to_string(),
        street: "123 Main St".to_string(),
        city: "Anytown".to_string(),
        state: "CA".to_string(),
        zip: "90210".to_string(),
        country: "USA".to_string(),
        ..Default::default()
    };

    let order = OrderInfo {
        specimen_id: "SAMPLE001".to_string(),
        placer_order_number: "L7890".to_string(),
        test_code: "MALARIA".to_string(),
        test_name: "Malaria Parasite Detection".to_string(),
        ordering_provider: "Dr. Smith".to_string(),
        ..Default::default()
    };

    let observations = vec![
        ObservationResult {
            test_code: "MALARIA".to_string(),
            test_name: "Malaria Result".to_string(),
            value: "Positive".to_string(),
            reference_range: "Negative".to_string(),
            abnormal_flag: "A".to_string(),
            ..Default::default()
        },
        ObservationResult {
            test_code: "SPECIES".to_string(),
            test_name: "Parasite Species".to_string(),
            value: "Plasmodium falciparum".to_string(),
            ..Default::default()
        },
    ];

    let mut hl7_generator = Hl7Generator::new();
    let hl7_message =
        hl7_generator.generate(&patient, &order, &observations, &Hl7Options::default());
    println!("Generated HL7 message:");
    println!("{}", hl7_message.replace('\r', "\n"));

    let astm_generator = AstmGenerator::new();
    let options = AstmOptions {
        sender_id: "IVD_DEVICE_001".to_string(),
        comments: vec!["Ring forms and gametocytes observed".to_string()],
        ..Default::default()
    };
    let astm_message = astm_generator.generate(&patient, &order, &observations, &options);
    println!("\nGenerated ASTM message:");
    println!("{astm_message}");

    match hl7::parse_message(&hl7_message) {
        Ok(parsed) => {
            println!("\nParsed back from HL7:");
            for obs in &parsed.observations {
                println!("  {}: {} {}", obs.test_name, obs.value, obs.units);
            }
        }
        Err(e) => println!("HL7 parse failed: {e}"),
    }

    match astm::parse_message(&astm_message) {
        Ok(parsed) => {
            println!("\nParsed back from ASTM:");
            for obs in &parsed.observations {
                println!("  {}: {}", obs.test_name, obs.value);
            }
            for comment in &parsed.comments {
                println!("  comment: {}", comment.text);
            }
        }
        Err(e) => println!("ASTM parse failed: {e}"),
    }
}
