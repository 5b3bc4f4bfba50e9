//! Interchange configuration
//!
//! The configuration source is a small JSON key-value document (`interface`,
//! `protocol`, `communication`, `id`). The core only reads it; persistence
//! and editing belong to the surrounding application. Interface and protocol
//! values stay raw strings here and are validated where they are used, so an
//! unknown value fails at transport construction / send time rather than at
//! load time.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Selected interchange protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolKind {
    Hl7,
    Astm,
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HL7" => Ok(ProtocolKind::Hl7),
            "ASTM" => Ok(ProtocolKind::Astm),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Hl7 => write!(f, "HL7"),
            ProtocolKind::Astm => write!(f, "ASTM"),
        }
    }
}

/// The utilities configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterchangeConfig {
    /// Transport selection: `USB`, `Serial`, or `LAN`
    pub interface: String,
    /// Protocol selection: `HL7` or `ASTM`
    pub protocol: String,
    /// Communication mode label (pass-through for the application)
    pub communication: String,
    /// Sample-id assignment mode label (pass-through for the application)
    pub id: String,
}

impl Default for InterchangeConfig {
    fn default() -> Self {
        Self {
            interface: "USB".to_string(),
            protocol: "HL7".to_string(),
            communication: "Internal".to_string(),
            id: "Auto Seq".to_string(),
        }
    }
}

impl InterchangeConfig {
    /// Load from a JSON file; a missing or unreadable document falls back to
    /// defaults with a warning rather than failing the caller
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InterchangeConfig>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), ?config, "configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid configuration, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "no configuration found, using defaults");
                Self::default()
            }
        }
    }

    /// Parsed protocol selection
    pub fn protocol_kind(&self) -> Result<ProtocolKind, String> {
        ProtocolKind::from_str(&self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = InterchangeConfig::default();
        assert_eq!(config.interface, "USB");
        assert_eq!(config.protocol, "HL7");
        assert_eq!(config.communication, "Internal");
        assert_eq!(config.id, "Auto Seq");
    }

    #[test]
    fn protocol_kind_parses_known_values() {
        assert_eq!("HL7".parse::<ProtocolKind>(), Ok(ProtocolKind::Hl7));
        assert_eq!("ASTM".parse::<ProtocolKind>(), Ok(ProtocolKind::Astm));
        assert_eq!(" ASTM ".parse::<ProtocolKind>(), Ok(ProtocolKind::Astm));
        assert!("FHIR".parse::<ProtocolKind>().is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = InterchangeConfig::load(Path::new("/nonexistent/utilities_config.json"));
        assert_eq!(config, InterchangeConfig::default());
    }

    #[test]
    fn load_reads_document_and_fills_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"interface": "LAN", "protocol": "ASTM"}}"#).unwrap();

        let config = InterchangeConfig::load(file.path());
        assert_eq!(config.interface, "LAN");
        assert_eq!(config.protocol, "ASTM");
        // Unspecified keys keep their defaults
        assert_eq!(config.communication, "Internal");
    }

    #[test]
    fn load_invalid_json_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();

        let config = InterchangeConfig::load(file.path());
        assert_eq!(config, InterchangeConfig::default());
    }
}
