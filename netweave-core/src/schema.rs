//! Schema - Attribute types and per-kind attribute sets
//!
//! Every node is checked against the schema of its kind before it enters the
//! graph, so a plan never carries a malformed literal to the orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use ipnet::{Ipv4Net, Ipv6Net};

use crate::resource::{ResourceKind, Value};

/// Address family of a CIDR attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// Shape an attribute value must have
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrType {
    Text,
    Flag,
    /// Integer within an inclusive range
    Integer { min: i64, max: i64 },
    /// One of a fixed set of strings
    OneOf(&'static [&'static str]),
    /// CIDR block with no host bits set
    Cidr(IpFamily),
    ListOf(Box<AttrType>),
}

pub const PORT: AttrType = AttrType::Integer { min: 0, max: 65535 };

/// "-1" is every protocol
pub const PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "-1"];

impl AttrType {
    pub fn list_of(inner: AttrType) -> Self {
        AttrType::ListOf(Box::new(inner))
    }

    /// Check a value, describing the problem on failure
    pub fn check(&self, value: &Value) -> Result<(), String> {
        // Symbolic scalars become strings once the orchestrator resolves them
        if value.is_symbolic() && !matches!(value, Value::List(_) | Value::Map(_)) {
            return match self {
                AttrType::Text | AttrType::OneOf(_) | AttrType::Cidr(_) => Ok(()),
                _ => Err(format!("expected {}, got unresolved {}", self, value)),
            };
        }

        match (self, value) {
            (AttrType::Text, Value::String(_)) | (AttrType::Flag, Value::Bool(_)) => Ok(()),
            (AttrType::Integer { min, max }, Value::Int(n)) => {
                if (*min..=*max).contains(n) {
                    Ok(())
                } else {
                    Err(format!("{} is outside {}..={}", n, min, max))
                }
            }
            (AttrType::OneOf(allowed), Value::String(s)) => {
                if allowed.iter().any(|a| *a == s.as_str()) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not one of {}", s, allowed.join(", ")))
                }
            }
            (AttrType::Cidr(family), Value::String(s)) => check_cidr(*family, s),
            (AttrType::ListOf(inner), Value::List(items)) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| {
                    inner.check(item).map_err(|p| format!("item {}: {}", i, p))
                }),
            _ => Err(format!("expected {}, got {}", self, value)),
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::Text => f.write_str("text"),
            AttrType::Flag => f.write_str("flag"),
            AttrType::Integer { min, max } => write!(f, "integer in {}..={}", min, max),
            AttrType::OneOf(allowed) => write!(f, "one of {}", allowed.join("|")),
            AttrType::Cidr(IpFamily::V4) => f.write_str("IPv4 CIDR"),
            AttrType::Cidr(IpFamily::V6) => f.write_str("IPv6 CIDR"),
            AttrType::ListOf(inner) => write!(f, "list of {}", inner),
        }
    }
}

fn check_cidr(family: IpFamily, text: &str) -> Result<(), String> {
    let (parsed, truncated) = match family {
        IpFamily::V4 => text
            .parse::<Ipv4Net>()
            .map(|net| (net.to_string(), net.trunc().to_string())),
        IpFamily::V6 => text
            .parse::<Ipv6Net>()
            .map(|net| (net.to_string(), net.trunc().to_string())),
    }
    .map_err(|e| format!("'{}' is not a CIDR block: {}", text, e))?;

    if parsed != truncated {
        return Err(format!("'{}' has host bits set, network is {}", text, truncated));
    }
    Ok(())
}

/// Problem with one attribute of a node
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributeError {
    #[error("'{0}' is required")]
    Missing(String),

    #[error("'{0}' is not an attribute of this kind")]
    Unexpected(String),

    #[error("'{attribute}': {problem}")]
    Invalid { attribute: String, problem: String },
}

/// One attribute of a kind
#[derive(Debug, Clone)]
pub struct AttrSpec {
    pub name: &'static str,
    pub ty: AttrType,
    pub required: bool,
    pub doc: Option<&'static str>,
}

impl AttrSpec {
    pub fn required(name: &'static str, ty: AttrType) -> Self {
        Self {
            name,
            ty,
            required: true,
            doc: None,
        }
    }

    pub fn optional(name: &'static str, ty: AttrType) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    pub fn doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }
}

/// Attribute set accepted for one resource kind
#[derive(Debug, Clone)]
pub struct KindSchema {
    pub kind: ResourceKind,
    pub summary: &'static str,
    attrs: Vec<AttrSpec>,
}

impl KindSchema {
    pub fn new(kind: ResourceKind, summary: &'static str) -> Self {
        Self {
            kind,
            summary,
            attrs: Vec::new(),
        }
    }

    pub fn with(mut self, spec: AttrSpec) -> Self {
        self.attrs.push(spec);
        self
    }

    pub fn attrs(&self) -> &[AttrSpec] {
        &self.attrs
    }

    pub fn spec(&self, name: &str) -> Option<&AttrSpec> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Check a node's attributes, reporting every problem found
    pub fn check(&self, attributes: &BTreeMap<String, Value>) -> Result<(), Vec<AttributeError>> {
        let missing = self
            .attrs
            .iter()
            .filter(|spec| spec.required && !attributes.contains_key(spec.name))
            .map(|spec| AttributeError::Missing(spec.name.to_string()));

        let invalid = attributes.iter().filter_map(|(name, value)| {
            let Some(spec) = self.spec(name) else {
                return Some(AttributeError::Unexpected(name.clone()));
            };
            spec.ty.check(value).err().map(|problem| AttributeError::Invalid {
                attribute: name.clone(),
                problem,
            })
        });

        let problems: Vec<AttributeError> = missing.chain(invalid).collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NodeId;

    #[test]
    fn text_and_flag() {
        assert!(AttrType::Text.check(&Value::string("demo")).is_ok());
        assert!(AttrType::Text.check(&Value::Int(42)).is_err());
        assert!(AttrType::Flag.check(&Value::Bool(false)).is_ok());
        assert_eq!(
            AttrType::Flag.check(&Value::string("yes")).unwrap_err(),
            "expected flag, got \"yes\""
        );
    }

    #[test]
    fn protocol_set() {
        let protocol = AttrType::OneOf(PROTOCOLS);
        assert!(protocol.check(&Value::string("tcp")).is_ok());
        assert!(protocol.check(&Value::string("-1")).is_ok());
        assert!(protocol.check(&Value::string("sctp")).is_err());
    }

    #[test]
    fn port_range() {
        assert!(PORT.check(&Value::Int(22)).is_ok());
        assert!(PORT.check(&Value::Int(65535)).is_ok());
        assert_eq!(
            PORT.check(&Value::Int(65536)).unwrap_err(),
            "65536 is outside 0..=65535"
        );
        assert!(PORT.check(&Value::Int(-1)).is_err());
    }

    #[test]
    fn unresolved_values_only_fill_string_slots() {
        let vpc = NodeId::new("demo-vpc");
        let reference = Value::reference(&vpc, "id");

        assert!(AttrType::Text.check(&reference).is_ok());
        assert!(AttrType::Cidr(IpFamily::V6).check(&reference).is_ok());
        assert!(AttrType::Flag.check(&reference).is_err());
        assert!(PORT.check(&Value::Region).is_err());
    }

    #[test]
    fn list_items_are_checked() {
        let ids = AttrType::list_of(AttrType::Text);
        let sg = NodeId::new("demo-sg");
        assert!(ids.check(&Value::List(vec![Value::reference(&sg, "id")])).is_ok());

        let problem = ids
            .check(&Value::List(vec![Value::string("sg-1"), Value::Int(1)]))
            .unwrap_err();
        assert!(problem.starts_with("item 1:"));
    }

    #[test]
    fn cidr_blocks() {
        let v4 = AttrType::Cidr(IpFamily::V4);
        assert!(v4.check(&Value::string("10.0.0.0/16")).is_ok());
        assert!(v4.check(&Value::string("0.0.0.0/0")).is_ok());
        assert!(v4.check(&Value::string("10.0.0.0")).is_err());
        assert!(v4.check(&Value::string("10.0.0.0/33")).is_err());
        assert!(v4.check(&Value::string("10.0.0.256/16")).is_err());
        assert_eq!(
            v4.check(&Value::string("10.0.1.5/24")).unwrap_err(),
            "'10.0.1.5/24' has host bits set, network is 10.0.1.0/24"
        );

        let v6 = AttrType::Cidr(IpFamily::V6);
        assert!(v6.check(&Value::string("::/0")).is_ok());
        assert!(v6.check(&Value::string("2001:db8:1:2::/64")).is_ok());
        assert!(v6.check(&Value::string("2001:db8::1/64")).is_err());
        assert!(v6.check(&Value::string("10.0.0.0/16")).is_err());
    }

    #[test]
    fn kind_schema_reports_every_problem() {
        let schema = KindSchema::new(ResourceKind::KeyPair, "test")
            .with(AttrSpec::required("key_name", AttrType::Text))
            .with(AttrSpec::optional("port", PORT));

        let mut attrs = BTreeMap::new();
        attrs.insert("key_name".to_string(), Value::string("demo"));
        attrs.insert("port".to_string(), Value::Int(22));
        assert!(schema.check(&attrs).is_ok());

        attrs.remove("key_name");
        attrs.insert("colour".to_string(), Value::string("red"));
        attrs.insert("port".to_string(), Value::Bool(true));
        let problems = schema.check(&attrs).unwrap_err();
        assert_eq!(
            problems,
            vec![
                AttributeError::Missing("key_name".to_string()),
                AttributeError::Unexpected("colour".to_string()),
                AttributeError::Invalid {
                    attribute: "port".to_string(),
                    problem: "expected integer in 0..=65535, got true".to_string(),
                },
            ]
        );
    }
}
