//! Error - Failures that abort topology synthesis
//!
//! Every variant is raised synchronously while planning. A build that hits
//! any of them returns no graph at all.

use crate::resource::NodeId;
use crate::schema::AttributeError;

/// Synthesis error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Address space exhausted: {0}")]
    AddressExhaustion(String),

    #[error("Address ranges overlap: {first} and {second}")]
    OverlappingRanges { first: String, second: String },

    #[error("Duplicate resource id '{0}'")]
    DuplicateId(NodeId),

    #[error("Unknown resource '{0}'")]
    UnknownNode(NodeId),

    #[error("Dependency {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("Address plan mismatch: {0}")]
    PlanMismatch(String),

    #[error("'{consumer}' reads {attribute} without depending on '{producer}'")]
    UnorderedReference {
        consumer: NodeId,
        producer: NodeId,
        attribute: String,
    },

    #[error("Invalid attributes for '{id}': {}", join_problems(errors))]
    Schema {
        id: NodeId,
        errors: Vec<AttributeError>,
    },
}

fn join_problems(errors: &[AttributeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;
