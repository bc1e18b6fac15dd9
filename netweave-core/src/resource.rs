//! Resource - Nodes of a topology and their attribute values

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of resource a node asks the orchestrator to manage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    /// Provider-assigned IPv6 block associated with a network
    Ipv6CidrBlock,
    InternetGateway,
    GatewayAttachment,
    RouteTable,
    Route,
    Subnet,
    /// Subnet to route table association
    SubnetAssociation,
    SecurityGroup,
    SecurityRule,
    Instance,
    KeyPair,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 12] = [
        ResourceKind::Network,
        ResourceKind::Ipv6CidrBlock,
        ResourceKind::InternetGateway,
        ResourceKind::GatewayAttachment,
        ResourceKind::RouteTable,
        ResourceKind::Route,
        ResourceKind::Subnet,
        ResourceKind::SubnetAssociation,
        ResourceKind::SecurityGroup,
        ResourceKind::SecurityRule,
        ResourceKind::Instance,
        ResourceKind::KeyPair,
    ];

    /// Kind name as written in plans (e.g., "subnet_association")
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Ipv6CidrBlock => "ipv6_cidr_block",
            ResourceKind::InternetGateway => "internet_gateway",
            ResourceKind::GatewayAttachment => "gateway_attachment",
            ResourceKind::RouteTable => "route_table",
            ResourceKind::Route => "route",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SubnetAssociation => "subnet_association",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::SecurityRule => "security_rule",
            ResourceKind::Instance => "instance",
            ResourceKind::KeyPair => "key_pair",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unique identifier for a node within one graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Attribute value of a node
///
/// Literal variants are known at planning time. The remaining variants are
/// symbolic: the orchestrator resolves them once the nodes they mention
/// have been provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Attribute of another node (e.g., the network's "id")
    Ref { node: NodeId, attribute: String },
    /// Element `index` of a list-valued expression
    Select { index: usize, list: Box<Value> },
    /// `count` consecutive blocks of length `prefix` cut from `block`, in address order
    Cidr {
        block: Box<Value>,
        count: usize,
        prefix: u8,
    },
    /// String concatenation of the parts
    Join(Vec<Value>),
    /// Named parameter owned by the orchestrator (e.g., a machine image id)
    Parameter(String),
    /// Region the orchestrator deploys into
    Region,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn reference(node: &NodeId, attribute: impl Into<String>) -> Self {
        Value::Ref {
            node: node.clone(),
            attribute: attribute.into(),
        }
    }

    pub fn select(index: usize, list: Value) -> Self {
        Value::Select {
            index,
            list: Box::new(list),
        }
    }

    /// Returns true if this value cannot be known before provisioning
    pub fn is_symbolic(&self) -> bool {
        match self {
            Value::String(_) | Value::Int(_) | Value::Bool(_) => false,
            Value::List(items) => items.iter().any(Value::is_symbolic),
            Value::Map(map) => map.values().any(Value::is_symbolic),
            Value::Ref { .. }
            | Value::Select { .. }
            | Value::Cidr { .. }
            | Value::Join(_)
            | Value::Parameter(_)
            | Value::Region => true,
        }
    }

    /// Collect every (node, attribute) pair this value reads
    pub fn references(&self) -> Vec<(&NodeId, &str)> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<(&'a NodeId, &'a str)>) {
        match self {
            Value::Ref { node, attribute } => refs.push((node, attribute.as_str())),
            Value::Select { list, .. } => list.collect_references(refs),
            Value::Cidr { block, .. } => block.collect_references(refs),
            Value::List(items) | Value::Join(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.collect_references(refs);
                }
            }
            Value::String(_)
            | Value::Int(_)
            | Value::Bool(_)
            | Value::Parameter(_)
            | Value::Region => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Map(map) => {
                let entries: Vec<String> =
                    map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Ref { node, attribute } => write!(f, "{}.{}", node, attribute),
            Value::Select { index, list } => write!(f, "select({}, {})", index, list),
            Value::Cidr {
                block,
                count,
                prefix,
            } => write!(f, "cidr({}, {}, /{})", block, count, prefix),
            Value::Join(parts) => {
                let parts: Vec<String> = parts.iter().map(|v| v.to_string()).collect();
                write!(f, "join({})", parts.join(", "))
            }
            Value::Parameter(name) => write!(f, "parameter({})", name),
            Value::Region => write!(f, "region"),
        }
    }
}

/// A resource description in the dependency graph
///
/// Nodes are built with the `with_*` methods and never change after they
/// are added to a graph. Dependencies live on the graph, not on the node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: NodeId,
    pub kind: ResourceKind,
    pub attributes: BTreeMap<String, Value>,
}

impl ResourceNode {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            kind,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Every (node, attribute) pair read by this node's attributes
    pub fn references(&self) -> Vec<(&NodeId, &str)> {
        self.attributes
            .values()
            .flat_map(|value| value.references())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_values_are_not_symbolic() {
        assert!(!Value::string("10.0.0.0/16").is_symbolic());
        assert!(!Value::List(vec![Value::Int(22), Value::Bool(true)]).is_symbolic());
    }

    #[test]
    fn nested_reference_is_symbolic() {
        let vpc = NodeId::new("demo-vpc");
        let value = Value::List(vec![Value::string("a"), Value::reference(&vpc, "id")]);
        assert!(value.is_symbolic());
        assert!(Value::Region.is_symbolic());
    }

    #[test]
    fn references_are_collected_through_expressions() {
        let vpc = NodeId::new("demo-vpc");
        let key = NodeId::new("demo-key");
        let slices = Value::Cidr {
            block: Box::new(Value::select(0, Value::reference(&vpc, "ipv6_cidr_blocks"))),
            count: 256,
            prefix: 64,
        };
        let node = ResourceNode::new(ResourceKind::Subnet, "demo-subnet")
            .with_attribute("ipv6_cidr_block", Value::select(3, slices))
            .with_attribute(
                "note",
                Value::Join(vec![Value::string("key "), Value::reference(&key, "key_name")]),
            );

        let mut refs = node.references();
        refs.sort();
        assert_eq!(refs, vec![(&key, "key_name"), (&vpc, "ipv6_cidr_blocks")]);
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(ResourceKind::SubnetAssociation.name(), "subnet_association");
        assert_eq!(ResourceKind::Ipv6CidrBlock.to_string(), "ipv6_cidr_block");
        assert_eq!(ResourceKind::ALL.len(), 12);
    }

    #[test]
    fn value_serializes_with_type_tag() {
        let vpc = NodeId::new("demo-vpc");
        let json = serde_json::to_value(Value::reference(&vpc, "id")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "ref", "value": {"node": "demo-vpc", "attribute": "id"}})
        );

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::reference(&vpc, "id"));
    }
}
