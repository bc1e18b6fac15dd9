//! Netweave Core - Dual-stack network topology synthesis
//!
//! Turns a network intent (name prefix, IPv4 base block, availability zones)
//! into a dependency graph of cloud resources and flattens it into a Plan an
//! orchestrator can provision.

pub mod allocator;
pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod intent;
pub mod orchestrator;
pub mod plan;
pub mod resolve;
pub mod resource;
pub mod schema;
pub mod schemas;
