//! End-to-end orchestrator scenarios over loopback TCP

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use labwire_core::config::InterchangeConfig;
use labwire_core::exchange::{Exchange, LogDirection};
use labwire_core::hl7::{self, Hl7Options};
use labwire_core::message::{ObservationResult, OrderInfo, ParsedMessage, PatientInfo};
use labwire_core::transport::{ConnectParams, LanMode, LanParams, TransportStatus};
use pretty_assertions::assert_eq;

fn lan_server_config(protocol: &str) -> InterchangeConfig {
    InterchangeConfig {
        interface: "LAN".to_string(),
        protocol: protocol.to_string(),
        ..Default::default()
    }
}

fn server_params() -> ConnectParams {
    ConnectParams::Lan(LanParams {
        host: "127.0.0.1".to_string(),
        port: 0,
        timeout: Duration::from_secs(5),
        mode: LanMode::Server,
    })
}

fn bound_port(exchange: &Exchange) -> u16 {
    match exchange.status().transport {
        Some(TransportStatus::Lan(status)) => status.bound_port.expect("server should be bound"),
        other => panic!("expected lan transport status, got {other:?}"),
    }
}

fn wait_connected(exchange: &Exchange, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if exchange.is_connected() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

fn sample_patient() -> PatientInfo {
    PatientInfo {
        patient_id: "P1234567".to_string(),
        first_name: "ADAM".to_string(),
        last_name: "EVERYMAN".to_string(),
        dob: "19800101".to_string(),
        gender: "M".to_string(),
        ..Default::default()
    }
}

fn sample_order() -> OrderInfo {
    OrderInfo {
        specimen_id: "SAMPLE001".to_string(),
        placer_order_number: "L7890".to_string(),
        test_code: "CBC".to_string(),
        test_name: "Complete Blood Count".to_string(),
        collection_datetime: "20251215103000".to_string(),
        ..Default::default()
    }
}

fn sample_observations() -> Vec<ObservationResult> {
    vec![
        ObservationResult {
            test_code: "RBC".to_string(),
            test_name: "Red Cell Count".to_string(),
            value: "4.56".to_string(),
            units: "x10(6)/uL".to_string(),
            reference_range: "4.20-5.90".to_string(),
            ..Default::default()
        },
        ObservationResult {
            test_code: "WBC".to_string(),
            test_name: "White Cell Count".to_string(),
            value: "11.2".to_string(),
            units: "x10(3)/uL".to_string(),
            abnormal_flag: "H".to_string(),
            ..Default::default()
        },
    ]
}

#[test]
fn hl7_over_lan_server_end_to_end() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("labwire_core=debug")
        .try_init();

    let mut exchange = Exchange::new(lan_server_config("HL7"));
    assert!(exchange.connect(&server_params()));

    let port = bound_port(&exchange);
    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(wait_connected(&exchange, Duration::from_secs(3)));

    // Outbound: generate and send a two-observation report
    let sent = exchange.send_hl7(
        &sample_patient(),
        &sample_order(),
        &sample_observations(),
        &Hl7Options::default(),
    );
    assert!(sent);

    // The test client reads the byte stream off the wire
    client
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    let mut wire = Vec::new();
    let mut buf = [0u8; 4096];
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                wire.extend_from_slice(&buf[..n]);
                if wire.windows(5).any(|w| w == b"OBX|2") {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    // Fed back through the parser, the stream yields the same two
    // observation values in the same order
    let parsed = hl7::parse_message(&String::from_utf8_lossy(&wire)).unwrap();
    assert_eq!(parsed.observations.len(), 2);
    assert_eq!(parsed.observations[0].value, "4.56");
    assert_eq!(parsed.observations[0].units, "x10(6)/uL");
    assert_eq!(parsed.observations[1].value, "11.2");
    assert_eq!(parsed.observations[1].abnormal_flag, "H");
    assert_eq!(parsed.header.message_type, "ORU^R01");

    // The outgoing bytes were logged
    let log = exchange.message_log(None);
    assert!(log
        .iter()
        .any(|r| r.direction == LogDirection::Sent && r.protocol == "HL7"));

    exchange.disconnect();
}

#[test]
fn inbound_bytes_are_parsed_and_delivered() {
    let mut exchange = Exchange::new(lan_server_config("HL7"));
    let (msg_tx, msg_rx) = mpsc::channel::<(Vec<u8>, Option<ParsedMessage>)>();
    exchange.on_message(move |raw, parsed| {
        let _ = msg_tx.send((raw.to_vec(), parsed.cloned()));
    });

    assert!(exchange.connect(&server_params()));
    let port = bound_port(&exchange);
    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(wait_connected(&exchange, Duration::from_secs(3)));

    let inbound = "MSH|^~\\&|EMR|XYZ_Clinic|LIMS|ABC_Hospital|20251215113500||ORU^R01|MSG9|P|2.5\rOBX|1|NM|GLU^Glucose||5.4|mmol/L|3.9-6.1|N|||F";
    client.write_all(inbound.as_bytes()).unwrap();

    let (raw, parsed) = msg_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("message callback should fire");
    assert_eq!(raw, inbound.as_bytes());
    let parsed = parsed.expect("inbound HL7 should parse");
    assert_eq!(parsed.observations.len(), 1);
    assert_eq!(parsed.observations[0].value, "5.4");

    // Inbound traffic is logged with direction=received
    let log = exchange.message_log(None);
    assert!(log
        .iter()
        .any(|r| r.direction == LogDirection::Received && r.protocol == "HL7"));

    exchange.disconnect();
}

#[test]
fn unparseable_inbound_bytes_still_reach_the_callback() {
    let mut exchange = Exchange::new(lan_server_config("HL7"));
    let (msg_tx, msg_rx) = mpsc::channel::<(Vec<u8>, bool)>();
    exchange.on_message(move |raw, parsed| {
        let _ = msg_tx.send((raw.to_vec(), parsed.is_some()));
    });

    assert!(exchange.connect(&server_params()));
    let port = bound_port(&exchange);
    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(wait_connected(&exchange, Duration::from_secs(3)));

    client.write_all(b"garbage that is not hl7").unwrap();

    let (raw, parsed_some) = msg_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("message callback should fire even for unparseable bytes");
    assert_eq!(raw, b"garbage that is not hl7");
    assert!(!parsed_some);

    exchange.disconnect();
}

#[test]
fn protocol_mismatch_is_refused_and_reported() {
    let mut exchange = Exchange::new(lan_server_config("ASTM"));
    let (err_tx, err_rx) = mpsc::channel::<String>();
    exchange.on_error(move |error, _context| {
        let _ = err_tx.send(error.to_string());
    });

    assert!(exchange.connect(&server_params()));
    let port = bound_port(&exchange);
    let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(wait_connected(&exchange, Duration::from_secs(3)));

    let sent = exchange.send_hl7(
        &sample_patient(),
        &sample_order(),
        &sample_observations(),
        &Hl7Options::default(),
    );
    assert!(!sent);

    let error = err_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("mismatch should be reported");
    assert!(error.contains("protocol mismatch"));

    // Nothing was generated or logged as sent
    assert!(exchange
        .message_log(None)
        .iter()
        .all(|r| r.direction != LogDirection::Sent));

    exchange.disconnect();
}

#[test]
fn status_callback_tracks_connection_lifecycle() {
    let mut exchange = Exchange::new(lan_server_config("HL7"));
    let (status_tx, status_rx) = mpsc::channel::<(bool, String)>();
    exchange.on_status(move |connected, detail| {
        let _ = status_tx.send((connected, detail.to_string()));
    });

    assert!(exchange.connect(&server_params()));
    let port = bound_port(&exchange);
    let client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(wait_connected(&exchange, Duration::from_secs(3)));

    // Peer accepted: a connected status arrives
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut saw_connected = false;
    while Instant::now() < deadline {
        if let Ok((true, _)) = status_rx.recv_timeout(Duration::from_millis(200)) {
            saw_connected = true;
            break;
        }
    }
    assert!(saw_connected);

    exchange.disconnect();
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut saw_disconnected = false;
    while Instant::now() < deadline {
        if let Ok((false, _)) = status_rx.recv_timeout(Duration::from_millis(200)) {
            saw_disconnected = true;
            break;
        }
    }
    assert!(saw_disconnected);
    drop(client);
}

#[test]
fn astm_send_over_lan() {
    use labwire_core::astm::{self, AstmOptions};

    let mut exchange = Exchange::new(lan_server_config("ASTM"));
    assert!(exchange.connect(&server_params()));
    let port = bound_port(&exchange);
    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(wait_connected(&exchange, Duration::from_secs(3)));

    let options = AstmOptions {
        comments: vec!["QC within limits".to_string()],
        ..Default::default()
    };
    assert!(exchange.send_astm(
        &sample_patient(),
        &sample_order(),
        &sample_observations(),
        &options,
    ));

    client
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    let mut wire = Vec::new();
    let mut buf = [0u8; 4096];
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                wire.extend_from_slice(&buf[..n]);
                if wire.windows(5).any(|w| w == b"L|1|N") {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let parsed = astm::parse_message(&String::from_utf8_lossy(&wire)).unwrap();
    assert_eq!(parsed.observations.len(), 2);
    assert_eq!(parsed.observations[0].value, "4.56");
    assert_eq!(parsed.comments.len(), 1);
    assert_eq!(parsed.terminator.code, "N");

    exchange.disconnect();
}
