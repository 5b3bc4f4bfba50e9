//! HL7 v2.x codec
//!
//! Generates and parses ORU^R01 observation-report messages: one MSH, one
//! PID, one ORC, one OBR, then one OBX per observation, `\r`-separated.
//! Only the segment subset needed for a single-order result report is
//! implemented.

mod generator;
mod parser;

pub use generator::{Hl7Generator, Hl7Options};
pub use parser::parse_message;

/// Segment separator between MSH/PID/ORC/OBR/OBX
pub const SEGMENT_SEPARATOR: char = '\r';

/// Field separator within a segment
pub const FIELD_SEPARATOR: char = '|';

/// Component separator within a field
pub const COMPONENT_SEPARATOR: char = '^';

/// MSH-2 encoding characters: component, repetition, escape, subcomponent
pub const ENCODING_CHARACTERS: &str = "^~\\&";

/// Fixed message type for observation reports
pub const MESSAGE_TYPE: &str = "ORU^R01";

/// Fixed HL7 version carried in MSH-12
pub const VERSION: &str = "2.5";

/// Escape HL7 delimiter characters in free-text field content
///
/// `\` must be replaced first so escape introducers are not re-escaped.
pub fn escape_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    text.replace('\\', "\\E\\")
        .replace('|', "\\F\\")
        .replace('^', "\\S\\")
        .replace('&', "\\T\\")
        .replace('~', "\\R\\")
}

/// Invert [`escape_text`]
pub fn unescape_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    text.replace("\\F\\", "|")
        .replace("\\S\\", "^")
        .replace("\\T\\", "&")
        .replace("\\R\\", "~")
        .replace("\\E\\", "\\")
}

/// Build a coded universal identifier with trailing-empty trimming
///
/// Components are `[loinc-or-code, name, "LN" when a LOINC is present]`,
/// optionally followed by the local code and name (OBR-4 carries those,
/// OBX-3 does not). Trailing empty components are dropped, so a test with no
/// LOINC encodes as `code^name` with no dangling `^`.
pub(crate) fn universal_identifier(
    loinc_code: &str,
    test_code: &str,
    test_name: &str,
    with_local: bool,
) -> String {
    let has_loinc = !loinc_code.is_empty();
    let mut parts: Vec<String> = vec![
        if has_loinc { loinc_code } else { test_code }.to_string(),
        escape_text(test_name),
        if has_loinc { "LN" } else { "" }.to_string(),
    ];
    if with_local {
        parts.push(if has_loinc { test_code } else { "" }.to_string());
    }
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts.join("^")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escape_roundtrip() {
        let raw = "A|B^C&D~E\\F";
        let escaped = escape_text(raw);
        assert!(!escaped.contains('|'));
        assert!(!escaped.contains('^'));
        assert!(!escaped.contains('~'));
        assert_eq!(unescape_text(&escaped), raw);
    }

    #[test]
    fn escape_empty_is_empty() {
        assert_eq!(escape_text(""), "");
        assert_eq!(unescape_text(""), "");
    }

    #[test]
    fn identifier_without_loinc_has_no_trailing_components() {
        let id = universal_identifier("", "RBC", "Red Cell Count", false);
        assert_eq!(id, "RBC^Red Cell Count");

        let id = universal_identifier("", "RBC", "Red Cell Count", true);
        assert_eq!(id, "RBC^Red Cell Count");
    }

    #[test]
    fn identifier_with_loinc_carries_ln_and_local_code() {
        let id = universal_identifier("1498-5", "RBC", "Red Cell Count", false);
        assert_eq!(id, "1498-5^Red Cell Count^LN");

        let id = universal_identifier("1498-5", "RBC", "Red Cell Count", true);
        assert_eq!(id, "1498-5^Red Cell Count^LN^RBC");
    }

    #[test]
    fn identifier_trims_when_name_missing() {
        let id = universal_identifier("", "WBC", "", false);
        assert_eq!(id, "WBC");
    }
}
