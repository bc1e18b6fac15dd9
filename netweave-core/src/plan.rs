//! Plan - What is handed to the orchestrator
//!
//! A Plan is the dependency graph flattened into a provisioning order. Each
//! planned resource maps 1:1 to one orchestrator-managed resource and carries
//! its declared predecessors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::orchestrator::Deployment;
use crate::resolve::{ResolveError, resolve_to_string};
use crate::resource::{NodeId, ResourceKind, Value};

/// One resource request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub id: NodeId,
    pub kind: ResourceKind,
    pub attributes: BTreeMap<String, Value>,
    pub depends_on: Vec<NodeId>,
    /// Provider-synthesised children that are kept
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implicit_children: Vec<ResourceKind>,
}

/// An operator-facing value rendered after provisioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Plan containing resources in provisioning order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    resources: Vec<PlannedResource>,
    #[serde(default)]
    outputs: Vec<Output>,
}

impl Plan {
    /// Flatten a graph into topological order
    pub fn from_graph(graph: &DependencyGraph, outputs: Vec<Output>) -> Self {
        let resources = graph
            .topological_order()
            .into_iter()
            .map(|node| PlannedResource {
                id: node.id.clone(),
                kind: node.kind,
                attributes: node.attributes.clone(),
                depends_on: graph.dependencies_of(&node.id).cloned().collect(),
                implicit_children: graph
                    .implicit_children(&node.id)
                    .iter()
                    .map(|c| c.kind)
                    .collect(),
            })
            .collect();

        Self { resources, outputs }
    }

    pub fn resources(&self) -> &[PlannedResource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn get(&self, id: &NodeId) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for resource in &self.resources {
            *summary.by_kind.entry(resource.kind).or_default() += 1;
            summary.create += 1;
        }
        summary
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render every output against what the orchestrator reported
    pub fn render_outputs(
        &self,
        deployment: &Deployment,
    ) -> Result<Vec<(String, String)>, ResolveError> {
        self.outputs
            .iter()
            .map(|output| {
                resolve_to_string(&output.value, deployment).map(|v| (output.name.clone(), v))
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct PlanSummary {
    pub create: usize,
    pub by_kind: BTreeMap<ResourceKind, usize>,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self
            .by_kind
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind))
            .collect();
        write!(f, "Plan: {} to create", self.create)?;
        if !kinds.is_empty() {
            write!(f, " ({})", kinds.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ProvisionedState;
    use crate::resource::ResourceNode;

    fn id(s: &str) -> NodeId {
        NodeId::new(s)
    }

    fn sample_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph
            .add_node(
                ResourceNode::new(ResourceKind::Subnet, "subnet")
                    .with_attribute("vpc_id", Value::reference(&id("vpc"), "id")),
            )
            .unwrap();
        graph
            .add_node(ResourceNode::new(ResourceKind::Network, "vpc"))
            .unwrap();
        graph.add_edge(&id("subnet"), &id("vpc")).unwrap();
        graph
            .attach_implicit_child(&id("subnet"), ResourceKind::RouteTable)
            .unwrap();
        graph
    }

    #[test]
    fn empty_plan() {
        let plan = Plan::from_graph(&DependencyGraph::new(), vec![]);
        assert!(plan.is_empty());
        assert_eq!(plan.summary().create, 0);
    }

    #[test]
    fn plan_is_in_dependency_order() {
        let plan = Plan::from_graph(&sample_graph(), vec![]);

        let ids: Vec<&str> = plan.resources().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["vpc", "subnet"]);

        let subnet = plan.get(&id("subnet")).unwrap();
        assert_eq!(subnet.depends_on, vec![id("vpc")]);
        assert_eq!(subnet.implicit_children, vec![ResourceKind::RouteTable]);
    }

    #[test]
    fn plan_summary() {
        let summary = Plan::from_graph(&sample_graph(), vec![]).summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.by_kind[&ResourceKind::Subnet], 1);
        assert_eq!(
            summary.to_string(),
            "Plan: 2 to create (1 network, 1 subnet)"
        );
    }

    #[test]
    fn plan_json_omits_empty_implicit_children() {
        let plan = Plan::from_graph(&sample_graph(), vec![]);
        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();

        let vpc = &json["resources"][0];
        assert_eq!(vpc["kind"], "network");
        assert!(vpc.get("implicit_children").is_none());
        assert_eq!(json["resources"][1]["implicit_children"][0], "route_table");
    }

    #[test]
    fn render_outputs() {
        let key = id("key");
        let plan = Plan::from_graph(
            &DependencyGraph::new(),
            vec![Output::new(
                "command",
                Value::Join(vec![
                    Value::string("fetch /ec2/keypair/"),
                    Value::reference(&key, "key_pair_id"),
                    Value::string(" --region "),
                    Value::Region,
                ]),
            )],
        );

        let mut state = ProvisionedState::new("demo-key");
        state
            .attributes
            .insert("key_pair_id".to_string(), Value::string("key-0abc"));
        let deployment = Deployment::new("ap-northeast-1").with_state(key, state);

        let rendered = plan.render_outputs(&deployment).unwrap();
        assert_eq!(
            rendered,
            vec![(
                "command".to_string(),
                "fetch /ec2/keypair/key-0abc --region ap-northeast-1".to_string()
            )]
        );
    }
}
