//! ASTM E1394 codec
//!
//! Generates and parses H/P/O/R/C/L record sequences, with optional
//! STX/ETX/checksum framing for link-level transfer.

mod generator;
mod parser;

pub use generator::{AstmGenerator, AstmOptions};
pub use parser::parse_message;

/// Field delimiter
pub const FIELD_DELIMITER: char = '|';

/// Repeat delimiter
pub const REPEAT_DELIMITER: char = '\\';

/// Component delimiter
pub const COMPONENT_DELIMITER: char = '^';

/// Escape delimiter
pub const ESCAPE_DELIMITER: char = '&';

/// Delimiter definition carried in H record field 2: repeat, component, escape
pub const DELIMITER_DEFINITION: &str = "\\^&";

/// Protocol version announced in the H record
pub const PROTOCOL_VERSION: &str = "E1394-97";

/// Start-of-text frame character
pub const STX: char = '\x02';

/// End-of-text frame character
pub const ETX: char = '\x03';

/// Record separator between H/P/O/R/C/L
pub const RECORD_SEPARATOR: &str = "\r\n";

/// Frame checksum: sum of the byte values of `body` plus the CR that
/// precedes ETX, modulo 256, as two uppercase hex digits
pub fn checksum(body: &str) -> String {
    let sum = body
        .bytes()
        .chain(std::iter::once(b'\r'))
        .fold(0u32, |acc, b| (acc + u32::from(b)) % 256);
    format!("{sum:02X}")
}

/// Wrap a record sequence in STX/ETX framing with a trailing checksum
pub fn frame(body: &str) -> String {
    format!("{STX}{body}\r{ETX}{}\r\n", checksum(body))
}

/// Strip STX and everything from the first ETX onward, if framing is present
///
/// The checksum is not re-validated here; peers in the field send frames the
/// instrument must accept as-is.
pub(crate) fn strip_frame(message: &str) -> &str {
    let message = message.strip_prefix(STX).unwrap_or(message);
    match message.find(ETX) {
        Some(pos) => &message[..pos],
        None => message,
    }
}

/// Universal test identifier: three empty leading components before
/// `code^name`, the fixed shape the parser relies on
pub(crate) fn universal_test_id(test_code: &str, test_name: &str) -> String {
    format!("^^^{test_code}^{test_name}")
}
