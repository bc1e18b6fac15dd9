//! Resolve - Turn symbolic values into concrete ones
//!
//! Resolution needs the values an orchestrator reports after provisioning,
//! so it never runs during synthesis. Orchestrator implementations use it
//! for attribute values and the plan uses it to render outputs.

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use ipnet::Ipv6Net;

use crate::orchestrator::Deployment;
use crate::resource::{NodeId, Value};

/// Resolution error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("No state reported for '{0}'")]
    MissingState(NodeId),

    #[error("'{node}' reported no attribute '{attribute}'")]
    MissingAttribute { node: NodeId, attribute: String },

    #[error("Expected a list, got {0}")]
    NotAList(String),

    #[error("Index {index} out of range for list of {len}")]
    SelectOutOfRange { index: usize, len: usize },

    #[error("Invalid CIDR '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("No /{prefix} slice at index {index} in {block} (requested {count} slices)")]
    SliceUnavailable {
        block: Ipv6Net,
        index: usize,
        count: usize,
        prefix: u8,
    },

    #[error("No value reported for parameter '{0}'")]
    MissingParameter(String),

    #[error("Deployment does not name a region")]
    MissingRegion,

    #[error("Cannot render {0} as a string")]
    NotAString(String),
}

/// The `index`-th of `count` blocks of length `prefix` cut from `super_block`
///
/// Fails if `index` is not below `count` or the block is too small to hold a
/// slice at that position.
pub fn resolve_ipv6_slice(
    super_block: Ipv6Net,
    index: usize,
    count: usize,
    prefix: u8,
) -> Result<Ipv6Net, ResolveError> {
    let unavailable = || ResolveError::SliceUnavailable {
        block: super_block,
        index,
        count,
        prefix,
    };

    let block = super_block.trunc();
    if index >= count || prefix > 128 || prefix < block.prefix_len() {
        return Err(unavailable());
    }
    let capacity_bits = u32::from(prefix - block.prefix_len());
    if capacity_bits < 128 && (index as u128) >= (1u128 << capacity_bits) {
        return Err(unavailable());
    }

    let offset = if prefix == 0 {
        0
    } else {
        (index as u128) << (128 - u32::from(prefix))
    };
    let start = u128::from(block.network()) + offset;
    Ipv6Net::new(Ipv6Addr::from(start), prefix).map_err(|_| unavailable())
}

/// Resolve a value against a deployment
pub fn resolve(value: &Value, deployment: &Deployment) -> Result<Value, ResolveError> {
    match value {
        Value::String(_) | Value::Int(_) | Value::Bool(_) => Ok(value.clone()),
        Value::List(items) => items
            .iter()
            .map(|item| resolve(item, deployment))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| resolve(v, deployment).map(|v| (k.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Map),
        Value::Ref { node, attribute } => {
            if deployment.state(node).is_none() {
                return Err(ResolveError::MissingState(node.clone()));
            }
            let reported = deployment.attribute(node, attribute).ok_or_else(|| {
                ResolveError::MissingAttribute {
                    node: node.clone(),
                    attribute: attribute.clone(),
                }
            })?;
            resolve(&reported, deployment)
        }
        // Only the selected slice is cut, the rest of the block may be unusable
        Value::Select { index, list } => match list.as_ref() {
            Value::Cidr {
                block,
                count,
                prefix,
            } => {
                let block = resolve_ipv6_block(block, deployment)?;
                resolve_ipv6_slice(block, *index, *count, *prefix)
                    .map(|net| Value::String(net.to_string()))
            }
            other => match resolve(other, deployment)? {
                Value::List(items) => {
                    let len = items.len();
                    items
                        .into_iter()
                        .nth(*index)
                        .ok_or(ResolveError::SelectOutOfRange { index: *index, len })
                }
                other => Err(ResolveError::NotAList(other.to_string())),
            },
        },
        Value::Cidr {
            block,
            count,
            prefix,
        } => {
            let block = resolve_ipv6_block(block, deployment)?;
            (0..*count)
                .map(|i| {
                    resolve_ipv6_slice(block, i, *count, *prefix)
                        .map(|net| Value::String(net.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        Value::Join(parts) => {
            let mut joined = String::new();
            for part in parts {
                joined.push_str(&resolve_to_string(part, deployment)?);
            }
            Ok(Value::String(joined))
        }
        Value::Parameter(name) => deployment
            .parameters
            .get(name)
            .map(|v| Value::String(v.clone()))
            .ok_or_else(|| ResolveError::MissingParameter(name.clone())),
        Value::Region => deployment
            .region
            .as_ref()
            .map(|r| Value::String(r.clone()))
            .ok_or(ResolveError::MissingRegion),
    }
}

/// Resolve a value and render it as a plain string
pub fn resolve_to_string(value: &Value, deployment: &Deployment) -> Result<String, ResolveError> {
    match resolve(value, deployment)? {
        Value::String(s) => Ok(s),
        Value::Int(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ResolveError::NotAString(other.to_string())),
    }
}

/// Resolve every attribute of a resource
pub fn resolve_attributes(
    attributes: &BTreeMap<String, Value>,
    deployment: &Deployment,
) -> Result<BTreeMap<String, Value>, ResolveError> {
    attributes
        .iter()
        .map(|(k, v)| resolve(v, deployment).map(|v| (k.clone(), v)))
        .collect()
}

fn resolve_ipv6_block(block: &Value, deployment: &Deployment) -> Result<Ipv6Net, ResolveError> {
    let text = resolve_to_string(block, deployment)?;
    text.parse().map_err(|e: ipnet::AddrParseError| ResolveError::InvalidCidr {
        value: text.clone(),
        reason: e.to_string(),
    })
}
