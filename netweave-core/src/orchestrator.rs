//! Orchestrator - Trait for the engine that provisions a Plan
//!
//! Provisioning is not done here. An orchestrator takes a Plan, creates
//! resources in dependency order, resolves symbolic values as their producers
//! complete, and reports what it created as a Deployment.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::plan::Plan;
use crate::resource::{NodeId, Value};

/// Error type for Orchestrator operations
#[derive(Debug)]
pub struct OrchestratorError {
    pub message: String,
    pub node: Option<NodeId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref node) = self.node {
            write!(f, "[{}] {}", node, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl OrchestratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            node: None,
            cause: None,
        }
    }

    pub fn for_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the orchestrator reports for one provisioned node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedState {
    /// Provider identifier (e.g., vpc-xxx, subnet-xxx)
    pub identifier: String,
    /// Attributes known after provisioning
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl ProvisionedState {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Result of provisioning a Plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub region: Option<String>,
    /// Orchestrator-owned parameter values (e.g., machine image ids)
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub states: BTreeMap<NodeId, ProvisionedState>,
}

impl Deployment {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, node: NodeId, state: ProvisionedState) -> Self {
        self.states.insert(node, state);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn state(&self, node: &NodeId) -> Option<&ProvisionedState> {
        self.states.get(node)
    }

    /// Reported attribute of a node; "id" falls back to the identifier
    pub fn attribute(&self, node: &NodeId, attribute: &str) -> Option<Value> {
        let state = self.states.get(node)?;
        match state.attributes.get(attribute) {
            Some(value) => Some(value.clone()),
            None if attribute == "id" => Some(Value::String(state.identifier.clone())),
            None => None,
        }
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }
}

/// Engine that provisions a Plan
///
/// Implementations must provision a resource only after everything in its
/// `depends_on` has been provisioned, resolve symbolic attributes after
/// their producers complete, and report a state for every resource.
pub trait Orchestrator: Send + Sync {
    /// Name of this Orchestrator (e.g., "cloudformation")
    fn name(&self) -> &'static str;

    /// Provision every resource of the plan
    fn submit<'a>(&'a self, plan: &'a Plan) -> BoxFuture<'a, OrchestratorResult<Deployment>>;
}

/// Orchestrator implementation for Box<dyn Orchestrator>
impl Orchestrator for Box<dyn Orchestrator> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn submit<'a>(&'a self, plan: &'a Plan) -> BoxFuture<'a, OrchestratorResult<Deployment>> {
        (**self).submit(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TopologyBuilder;
    use crate::graph::DependencyGraph;
    use crate::intent::NetworkIntent;
    use crate::resolve::resolve_attributes;
    use crate::resource::{ResourceKind, ResourceNode};

    // Orchestrator that provisions instantly and names resources after their kind
    struct MockOrchestrator;

    impl Orchestrator for MockOrchestrator {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn submit<'a>(&'a self, plan: &'a Plan) -> BoxFuture<'a, OrchestratorResult<Deployment>> {
            Box::pin(async move {
                let mut deployment = Deployment::new("ap-northeast-1");
                for (i, resource) in plan.resources().iter().enumerate() {
                    for dep in &resource.depends_on {
                        if deployment.state(dep).is_none() {
                            return Err(OrchestratorError::new(format!(
                                "dependency {} not provisioned",
                                dep
                            ))
                            .for_node(resource.id.clone()));
                        }
                    }
                    deployment.states.insert(
                        resource.id.clone(),
                        ProvisionedState::new(format!("{}-{}", resource.kind, i)),
                    );
                }
                Ok(deployment)
            })
        }
    }

    fn plan() -> Plan {
        let mut graph = DependencyGraph::new();
        graph
            .add_node(ResourceNode::new(ResourceKind::Subnet, "subnet"))
            .unwrap();
        graph
            .add_node(ResourceNode::new(ResourceKind::Network, "vpc"))
            .unwrap();
        graph
            .add_edge(&NodeId::new("subnet"), &NodeId::new("vpc"))
            .unwrap();
        Plan::from_graph(&graph, vec![])
    }

    #[tokio::test]
    async fn mock_orchestrator_reports_every_node() {
        let orchestrator: Box<dyn Orchestrator> = Box::new(MockOrchestrator);
        let deployment = orchestrator.submit(&plan()).await.unwrap();

        assert_eq!(orchestrator.name(), "mock");
        assert_eq!(deployment.states.len(), 2);
        assert_eq!(
            deployment.attribute(&NodeId::new("vpc"), "id"),
            Some(Value::string("network-0"))
        );
        assert_eq!(deployment.attribute(&NodeId::new("vpc"), "arn"), None);
    }

    #[test]
    fn error_display_names_node() {
        let err = OrchestratorError::new("quota exceeded").for_node(NodeId::new("demo-vpc"));
        assert_eq!(err.to_string(), "[demo-vpc] quota exceeded");
    }

    #[test]
    fn deployment_from_json() {
        let deployment = Deployment::from_json(
            r#"{
                "region": "ap-northeast-1",
                "states": {
                    "demo-bastion-key-pair": {
                        "identifier": "demo-bastion-key-pair",
                        "attributes": {
                            "key_pair_id": {"type": "string", "value": "key-0123"}
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(deployment.region.as_deref(), Some("ap-northeast-1"));
        assert_eq!(
            deployment.attribute(&NodeId::new("demo-bastion-key-pair"), "key_pair_id"),
            Some(Value::string("key-0123"))
        );
    }

    // Provisions in plan order, resolving attributes against what is already up
    struct ResolvingOrchestrator;

    impl Orchestrator for ResolvingOrchestrator {
        fn name(&self) -> &'static str {
            "resolving"
        }

        fn submit<'a>(&'a self, plan: &'a Plan) -> BoxFuture<'a, OrchestratorResult<Deployment>> {
            Box::pin(async move {
                let mut deployment = Deployment::new("ap-northeast-1").with_parameter(
                    "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2",
                    "ami-0456",
                );
                for resource in plan.resources() {
                    let attributes = match resolve_attributes(&resource.attributes, &deployment)
                    {
                        Ok(attributes) => attributes,
                        Err(e) => {
                            return Err(OrchestratorError::new("unresolved attribute")
                                .for_node(resource.id.clone())
                                .with_cause(e));
                        }
                    };

                    let mut state = ProvisionedState::new(format!("{}-id", resource.id));
                    state.attributes = attributes;
                    match resource.kind {
                        ResourceKind::Ipv6CidrBlock => {
                            let vpc = match resource.attributes.get("vpc_id") {
                                Some(Value::Ref { node, .. }) => node.clone(),
                                _ => return Err(OrchestratorError::new("no vpc_id")),
                            };
                            if let Some(vpc_state) = deployment.states.get_mut(&vpc) {
                                vpc_state.attributes.insert(
                                    "ipv6_cidr_blocks".to_string(),
                                    Value::List(vec![Value::string("2406:da14:abc:de00::/56")]),
                                );
                            }
                        }
                        ResourceKind::KeyPair => {
                            state = state.with_attribute("key_pair_id", Value::string("key-0abc"));
                        }
                        _ => {}
                    }
                    deployment.states.insert(resource.id.clone(), state);
                }
                Ok(deployment)
            })
        }
    }

    #[tokio::test]
    async fn provision_synthesised_topology() {
        let intent = NetworkIntent::new(
            "demo",
            "10.0.0.0/16".parse().unwrap(),
            vec!["ap-northeast-1a".to_string(), "ap-northeast-1c".to_string()],
        );
        let plan = TopologyBuilder::new(&intent).build().unwrap().plan();
        let deployment = ResolvingOrchestrator.submit(&plan).await.unwrap();

        let ipv6 = |name: &str| {
            deployment
                .state(&NodeId::new(name))
                .and_then(|s| s.attributes.get("ipv6_cidr_block"))
                .cloned()
        };
        assert_eq!(
            ipv6("demo-app-public-subnet-1a"),
            Some(Value::string("2406:da14:abc:de00::/64"))
        );
        assert_eq!(
            ipv6("demo-app-public-subnet-1c"),
            Some(Value::string("2406:da14:abc:de01::/64"))
        );
        assert_eq!(
            ipv6("demo-app-private-subnet-1a"),
            Some(Value::string("2406:da14:abc:de02::/64"))
        );
        assert_eq!(
            ipv6("demo-app-private-subnet-1c"),
            Some(Value::string("2406:da14:abc:de03::/64"))
        );

        let bastion = deployment.state(&NodeId::new("demo-bastion")).unwrap();
        assert_eq!(bastion.attributes["image_id"], Value::string("ami-0456"));
        assert_eq!(
            bastion.attributes["subnet_id"],
            Value::string("demo-app-public-subnet-1a-id")
        );

        let outputs = plan.render_outputs(&deployment).unwrap();
        assert_eq!(
            outputs,
            vec![(
                "demo-get-bastion-key-command".to_string(),
                "aws ssm get-parameter --name /ec2/keypair/key-0abc --region ap-northeast-1 \
                 --with-decryption --query Parameter.Value --output text"
                    .to_string()
            )]
        );
    }
}
