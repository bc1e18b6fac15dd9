//! Intent - The declarative input a topology is synthesised from

use std::collections::HashSet;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{SynthesisError, SynthesisResult};

/// Where subnets sit inside the base block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubnetLayout {
    /// Position of the first public subnet (third octet for a /16 base)
    pub public_offset: u32,
    /// Position of the first private subnet
    pub private_offset: u32,
    /// Prefix length of every subnet
    pub prefix: u8,
}

impl Default for SubnetLayout {
    fn default() -> Self {
        Self {
            public_offset: 1,
            private_offset: 11,
            prefix: crate::allocator::SUBNET_PREFIX,
        }
    }
}

/// Bastion host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BastionSpec {
    pub instance_type: String,
    /// Orchestrator parameter holding the machine image id
    pub image_parameter: String,
    pub ssh_port: u16,
}

impl Default for BastionSpec {
    fn default() -> Self {
        Self {
            instance_type: "t3.micro".to_string(),
            image_parameter: "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2"
                .to_string(),
            ssh_port: 22,
        }
    }
}

/// Declarative description of one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIntent {
    name_prefix: String,
    ipv4_base: Ipv4Net,
    zones: Vec<String>,
    layout: SubnetLayout,
    bastion: BastionSpec,
}

impl NetworkIntent {
    pub fn new(name_prefix: impl Into<String>, ipv4_base: Ipv4Net, zones: Vec<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            ipv4_base,
            zones,
            layout: SubnetLayout::default(),
            bastion: BastionSpec::default(),
        }
    }

    pub fn with_layout(mut self, layout: SubnetLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_bastion(mut self, bastion: BastionSpec) -> Self {
        self.bastion = bastion;
        self
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub fn ipv4_base(&self) -> Ipv4Net {
        self.ipv4_base
    }

    pub fn zones(&self) -> &[String] {
        &self.zones
    }

    pub fn layout(&self) -> &SubnetLayout {
        &self.layout
    }

    pub fn bastion(&self) -> &BastionSpec {
        &self.bastion
    }

    /// Check the intent before anything is derived from it
    pub fn validate(&self) -> SynthesisResult<()> {
        if self.name_prefix.trim().is_empty() {
            return Err(SynthesisError::InvalidIntent(
                "name prefix must not be empty".to_string(),
            ));
        }
        if self.zones.is_empty() {
            return Err(SynthesisError::InvalidIntent(
                "at least one availability zone is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            if zone.trim().is_empty() {
                return Err(SynthesisError::InvalidIntent(
                    "availability zone names must not be empty".to_string(),
                ));
            }
            if !seen.insert(zone.as_str()) {
                return Err(SynthesisError::InvalidIntent(format!(
                    "availability zone '{}' is listed more than once",
                    zone
                )));
            }
        }

        if self.ipv4_base != self.ipv4_base.trunc() {
            return Err(SynthesisError::InvalidIntent(format!(
                "base block {} has host bits set",
                self.ipv4_base
            )));
        }
        Ok(())
    }
}

/// Short zone label used in resource ids
/// - "ap-northeast-1a" -> "1a"
/// - "a" -> "a"
pub fn zone_suffix(zone: &str) -> &str {
    zone.rsplit('-').next().unwrap_or(zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(zones: &[&str]) -> NetworkIntent {
        NetworkIntent::new(
            "demo",
            "10.0.0.0/16".parse().unwrap(),
            zones.iter().map(|z| z.to_string()).collect(),
        )
    }

    #[test]
    fn valid_intent() {
        assert!(intent(&["ap-northeast-1a", "ap-northeast-1c"]).validate().is_ok());
    }

    #[test]
    fn empty_zone_list_is_rejected() {
        let err = intent(&[]).validate().unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidIntent(_)));
    }

    #[test]
    fn repeated_zone_is_rejected() {
        let err = intent(&["a", "c", "a"]).validate().unwrap_err();
        assert!(err.to_string().contains("'a' is listed more than once"));
    }

    #[test]
    fn blank_prefix_is_rejected() {
        let intent = NetworkIntent::new(" ", "10.0.0.0/16".parse().unwrap(), vec!["a".into()]);
        assert!(intent.validate().is_err());
    }

    #[test]
    fn base_with_host_bits_is_rejected() {
        let intent = NetworkIntent::new("demo", "10.0.3.0/16".parse().unwrap(), vec!["a".into()]);
        assert!(intent.validate().is_err());
    }

    #[test]
    fn zone_suffix_strips_region() {
        assert_eq!(zone_suffix("ap-northeast-1a"), "1a");
        assert_eq!(zone_suffix("us-east-1c"), "1c");
        assert_eq!(zone_suffix("a"), "a");
    }

    #[test]
    fn defaults_match_reference_sizing() {
        let layout = SubnetLayout::default();
        assert_eq!((layout.public_offset, layout.private_offset, layout.prefix), (1, 11, 24));
        assert_eq!(BastionSpec::default().ssh_port, 22);
    }
}
