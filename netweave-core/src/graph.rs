//! Graph - Dependency graph of resource nodes
//!
//! Nodes are kept in insertion order and edges in sorted sets, so two graphs
//! built by the same sequence of calls are identical.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{SynthesisError, SynthesisResult};
use crate::resource::{NodeId, ResourceKind, ResourceNode};

/// A child resource the provider creates on its own next to a declared node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitChild {
    pub kind: ResourceKind,
    pub id: NodeId,
}

/// Directed acyclic graph of resource nodes
///
/// An edge `from -> to` means `from` may only be provisioned after `to`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    nodes: BTreeMap<NodeId, ResourceNode>,
    /// Insertion order of node ids
    order: Vec<NodeId>,
    /// Node -> nodes it depends on
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Node -> nodes that depend on it
    reverse_edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    implicit_children: BTreeMap<NodeId, Vec<ImplicitChild>>,
    /// (node, attribute) -> node whose provisioning makes the attribute known
    deferred: BTreeMap<(NodeId, String), NodeId>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Add a node
    pub fn add_node(&mut self, node: ResourceNode) -> SynthesisResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(SynthesisError::DuplicateId(node.id));
        }
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Record that `from` depends on `to`
    ///
    /// Adding an edge that already exists is a no-op. On error the graph is
    /// left unchanged.
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId) -> SynthesisResult<()> {
        self.require(from)?;
        self.require(to)?;

        if from == to || self.depends_on(to, from) {
            return Err(SynthesisError::Cycle {
                from: from.clone(),
                to: to.clone(),
            });
        }

        self.edges.entry(from.clone()).or_default().insert(to.clone());
        self.reverse_edges
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
        Ok(())
    }

    /// Direct dependencies of a node
    pub fn dependencies_of(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.edges.get(id).into_iter().flatten()
    }

    /// Nodes that depend directly on this node
    pub fn dependents_of(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.reverse_edges.get(id).into_iter().flatten()
    }

    /// All (from, to) edges, sorted
    pub fn edges(&self) -> Vec<(&NodeId, &NodeId)> {
        self.edges
            .iter()
            .flat_map(|(from, deps)| deps.iter().map(move |to| (from, to)))
            .collect()
    }

    /// Check whether `from` reaches `to` through dependency edges
    pub fn depends_on(&self, from: &NodeId, to: &NodeId) -> bool {
        let mut visited = HashSet::new();
        self.depends_on_util(from, to, &mut visited)
    }

    fn depends_on_util<'a>(
        &'a self,
        node: &'a NodeId,
        target: &NodeId,
        visited: &mut HashSet<&'a NodeId>,
    ) -> bool {
        if !visited.insert(node) {
            return false;
        }
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if dep == target || self.depends_on_util(dep, target, visited) {
                    return true;
                }
            }
        }
        false
    }

    /// Nodes ordered so that every node comes after its dependencies
    ///
    /// Among nodes that are ready at the same time, the one added first
    /// comes first.
    pub fn topological_order(&self) -> Vec<&ResourceNode> {
        let position: BTreeMap<&NodeId, usize> =
            self.order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut remaining: BTreeMap<&NodeId, usize> = self
            .order
            .iter()
            .map(|id| (id, self.edges.get(id).map_or(0, BTreeSet::len)))
            .collect();
        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(id, _)| position[id])
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(next) = ready.pop_first() {
            let id = &self.order[next];
            sorted.push(&self.nodes[id]);
            for dependent in self.dependents_of(id) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(position[dependent]);
                    }
                }
            }
        }
        sorted
    }

    /// Record a child the provider synthesises next to `parent`
    pub fn attach_implicit_child(
        &mut self,
        parent: &NodeId,
        kind: ResourceKind,
    ) -> SynthesisResult<()> {
        self.require(parent)?;
        let children = self.implicit_children.entry(parent.clone()).or_default();
        if !children.iter().any(|c| c.kind == kind) {
            children.push(ImplicitChild {
                kind,
                id: NodeId::new(format!("{}/{}", parent, kind)),
            });
        }
        Ok(())
    }

    /// Detach the provider's implicit child of `kind` from `parent`
    ///
    /// Does nothing if there is no such child. Returns whether a child was
    /// removed.
    pub fn remove_implicit_child(&mut self, parent: &NodeId, kind: ResourceKind) -> bool {
        let Some(children) = self.implicit_children.get_mut(parent) else {
            return false;
        };
        let before = children.len();
        children.retain(|c| c.kind != kind);
        let removed = children.len() != before;
        if children.is_empty() {
            self.implicit_children.remove(parent);
        }
        removed
    }

    pub fn implicit_children(&self, parent: &NodeId) -> &[ImplicitChild] {
        self.implicit_children
            .get(parent)
            .map_or(&[], |v| v.as_slice())
    }

    /// Declare that `node.attribute` is only known once `producer` is provisioned
    pub fn defer_attribute(
        &mut self,
        node: &NodeId,
        attribute: impl Into<String>,
        producer: &NodeId,
    ) -> SynthesisResult<()> {
        self.require(node)?;
        self.require(producer)?;
        self.deferred
            .insert((node.clone(), attribute.into()), producer.clone());
        Ok(())
    }

    /// Node whose provisioning makes `node.attribute` known, if deferred
    pub fn producer_of(&self, node: &NodeId, attribute: &str) -> Option<&NodeId> {
        self.deferred.get(&(node.clone(), attribute.to_string()))
    }

    /// Check that every symbolic reference is safe to resolve
    ///
    /// Each referenced node must exist and be a transitive dependency of the
    /// reader. Deferred attributes additionally require a dependency on their
    /// producer.
    pub fn validate(&self) -> SynthesisResult<()> {
        for node in self.nodes() {
            for (target, attribute) in node.references() {
                self.check_reference(&node.id, target, attribute)?;
            }
        }
        Ok(())
    }

    /// Check one reference from `consumer` to `target.attribute`
    pub fn check_reference(
        &self,
        consumer: &NodeId,
        target: &NodeId,
        attribute: &str,
    ) -> SynthesisResult<()> {
        self.require(target)?;
        if consumer == target {
            return Err(SynthesisError::Cycle {
                from: consumer.clone(),
                to: target.clone(),
            });
        }
        if !self.depends_on(consumer, target) {
            return Err(SynthesisError::UnorderedReference {
                consumer: consumer.clone(),
                producer: target.clone(),
                attribute: format!("{}.{}", target, attribute),
            });
        }
        if let Some(producer) = self.producer_of(target, attribute)
            && !self.depends_on(consumer, producer)
        {
            return Err(SynthesisError::UnorderedReference {
                consumer: consumer.clone(),
                producer: producer.clone(),
                attribute: format!("{}.{}", target, attribute),
            });
        }
        Ok(())
    }

    fn require(&self, id: &NodeId) -> SynthesisResult<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(SynthesisError::UnknownNode(id.clone()))
        }
    }
}
