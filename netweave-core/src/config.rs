//! Config - Load a network intent from a JSON file

use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::intent::{BastionSpec, NetworkIntent, SubnetLayout};

/// Intent as written on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentFile {
    pub name: String,
    pub ipv4_base: String,
    pub zones: Vec<String>,
    #[serde(default)]
    pub layout: SubnetLayout,
    #[serde(default)]
    pub bastion: BastionSpec,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid intent file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid IPv4 base '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },
}

impl IntentFile {
    pub fn into_intent(self) -> Result<NetworkIntent, ConfigError> {
        let base: Ipv4Net = self
            .ipv4_base
            .parse()
            .map_err(|e: ipnet::AddrParseError| ConfigError::InvalidCidr {
                value: self.ipv4_base.clone(),
                reason: e.to_string(),
            })?;
        Ok(NetworkIntent::new(self.name, base, self.zones)
            .with_layout(self.layout)
            .with_bastion(self.bastion))
    }
}

/// Parse an intent from JSON text
pub fn parse_intent(content: &str) -> Result<NetworkIntent, ConfigError> {
    let file: IntentFile = serde_json::from_str(content)?;
    file.into_intent()
}

/// Read and parse an intent file
pub fn load_intent(path: &Path) -> Result<NetworkIntent, ConfigError> {
    debug!("loading intent from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_intent(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_intent() {
        let intent = parse_intent(
            r#"{"name": "demo", "ipv4_base": "10.0.0.0/16", "zones": ["ap-northeast-1a"]}"#,
        )
        .unwrap();

        assert_eq!(intent.name_prefix(), "demo");
        assert_eq!(intent.ipv4_base().to_string(), "10.0.0.0/16");
        assert_eq!(intent.zones(), ["ap-northeast-1a".to_string()]);
        assert_eq!(intent.layout(), &SubnetLayout::default());
        assert_eq!(intent.bastion().ssh_port, 22);
    }

    #[test]
    fn parse_overrides() {
        let intent = parse_intent(
            r#"{
                "name": "demo",
                "ipv4_base": "10.1.0.0/16",
                "zones": ["a", "c"],
                "layout": {"private_offset": 101},
                "bastion": {"instance_type": "t3.small", "ssh_port": 2222}
            }"#,
        )
        .unwrap();

        assert_eq!(intent.layout().public_offset, 1);
        assert_eq!(intent.layout().private_offset, 101);
        assert_eq!(intent.bastion().instance_type, "t3.small");
        assert_eq!(intent.bastion().ssh_port, 2222);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse_intent(
            r#"{"name": "demo", "ipv4_base": "10.0.0.0/16", "zones": [], "region": "x"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn invalid_base_is_rejected() {
        let err = parse_intent(r#"{"name": "demo", "ipv4_base": "10.0.0.0", "zones": ["a"]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCidr { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name": "demo", "ipv4_base": "10.0.0.0/16", "zones": ["a"]}}"#
        )
        .unwrap();

        let intent = load_intent(file.path()).unwrap();
        assert_eq!(intent.name_prefix(), "demo");
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_intent(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
