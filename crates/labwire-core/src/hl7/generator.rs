//! HL7 message generation
//!
//! Builds ORU^R01 messages from typed patient/order/observation records.

use chrono::Local;

use super::{
    escape_text, universal_identifier, ENCODING_CHARACTERS, FIELD_SEPARATOR, MESSAGE_TYPE,
    SEGMENT_SEPARATOR, VERSION,
};
use crate::message::{ObservationResult, OrderInfo, PatientInfo};

/// Header parameters for a generated message
#[derive(Debug, Clone)]
pub struct Hl7Options {
    pub sending_app: String,
    pub sending_facility: String,
    pub receiving_app: String,
    pub receiving_facility: String,
    /// Message control ID; when `None` the generator's own counter supplies
    /// `MSG<n>`
    pub control_id: Option<String>,
}

impl Default for Hl7Options {
    fn default() -> Self {
        Self {
            sending_app: "LIMS".to_string(),
            sending_facility: "ABC_Hospital".to_string(),
            receiving_app: "EMR".to_string(),
            receiving_facility: "XYZ_Clinic".to_string(),
            control_id: None,
        }
    }
}

/// ORU^R01 message generator
///
/// Control IDs are sequenced per generator instance starting at `MSG1`; they
/// are not unique across instances or restarts. Callers needing stronger
/// guarantees pass [`Hl7Options::control_id`].
#[derive(Debug)]
pub struct Hl7Generator {
    next_control_id: u32,
}

impl Hl7Generator {
    /// Create a generator with a fresh control-id sequence
    pub fn new() -> Self {
        Self { next_control_id: 1 }
    }

    fn timestamp() -> String {
        Local::now().format("%Y%m%d%H%M%S").to_string()
    }

    fn next_control_id(&mut self) -> String {
        let id = format!("MSG{}", self.next_control_id);
        self.next_control_id += 1;
        id
    }

    /// Generate a complete ORU^R01 message
    ///
    /// Segments are `\r`-joined with no trailing separator.
    pub fn generate(
        &mut self,
        patient: &PatientInfo,
        order: &OrderInfo,
        observations: &[ObservationResult],
        options: &Hl7Options,
    ) -> String {
        let timestamp = Self::timestamp();
        let control_id = options
            .control_id
            .clone()
            .unwrap_or_else(|| self.next_control_id());

        let mut segments = vec![
            msh_segment(options, &timestamp, &control_id),
            pid_segment(patient),
            orc_segment(order),
            obr_segment(order, &timestamp),
        ];
        for (idx, obs) in observations.iter().enumerate() {
            segments.push(obx_segment(obs, idx + 1));
        }

        segments.join(&SEGMENT_SEPARATOR.to_string())
    }
}

impl Default for Hl7Generator {
    fn default() -> Self {
        Self::new()
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

fn join_fields(fields: &[&str]) -> String {
    fields.join(&FIELD_SEPARATOR.to_string())
}

/// MSH: message header with fixed type `ORU^R01` and version `2.5`
fn msh_segment(options: &Hl7Options, timestamp: &str, control_id: &str) -> String {
    join_fields(&[
        "MSH",
        ENCODING_CHARACTERS,
        or_default(&options.sending_app, "LIMS"),
        or_default(&options.sending_facility, "ABC_Hospital"),
        or_default(&options.receiving_app, "EMR"),
        or_default(&options.receiving_facility, "XYZ_Clinic"),
        timestamp,
        "",
        MESSAGE_TYPE,
        control_id,
        "P",
        VERSION,
    ])
}

/// PID: patient identification
fn pid_segment(patient: &PatientInfo) -> String {
    let patient_id_full = format!(
        "{}^^^{}^{}",
        patient.patient_id,
        or_default(&patient.assigning_authority, "ABC_Hospital"),
        or_default(&patient.id_type, "MR"),
    );
    let name = [
        escape_text(&patient.last_name),
        escape_text(&patient.first_name),
        escape_text(&patient.middle_name),
        patient.suffix.clone(),
    ]
    .join("^");
    let address = [
        escape_text(&patient.street),
        String::new(),
        escape_text(&patient.city),
        patient.state.clone(),
        patient.zip.clone(),
        patient.country.clone(),
    ]
    .join("^");

    join_fields(&[
        "PID",
        "1",
        "",
        &patient_id_full,
        "",
        &name,
        "",
        &patient.dob,
        or_default(&patient.gender, "U"),
        "",
        "",
        &address,
        "",
        &patient.phone,
    ])
}

/// ORC: common order, observations-to-follow
fn orc_segment(order: &OrderInfo) -> String {
    join_fields(&[
        "ORC",
        "RE",
        &order.placer_order_number,
        &order.filler_order_number,
        "",
        "NW",
    ])
}

/// OBR: observation request
fn obr_segment(order: &OrderInfo, timestamp: &str) -> String {
    let service_id =
        universal_identifier(&order.loinc_code, &order.test_code, &order.test_name, true);
    let observation_dt = or_default(
        or_default(&order.collection_datetime, &order.requested_datetime),
        timestamp,
    );

    join_fields(&[
        "OBR",
        "1",
        or_default(&order.placer_order_number, &order.specimen_id),
        &order.filler_order_number,
        &service_id,
        &order.priority,
        "",
        observation_dt,
    ])
}

/// OBX: one observation result, `set_id` is the 1-based index
fn obx_segment(obs: &ObservationResult, set_id: usize) -> String {
    let identifier = universal_identifier(&obs.loinc_code, &obs.test_code, &obs.test_name, false);
    let value_type = if obs.value.parse::<f64>().is_ok() {
        "NM"
    } else {
        "ST"
    };
    let set_id = set_id.to_string();

    join_fields(&[
        "OBX",
        &set_id,
        value_type,
        &identifier,
        "",
        &escape_text(&obs.value),
        &obs.units,
        &obs.reference_range,
        &obs.abnormal_flag,
        "",
        "",
        or_default(&obs.result_status, "F"),
        "",
        "",
        &obs.result_datetime,
        &obs.operator_id,
    ])
}
