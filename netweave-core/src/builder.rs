//! Builder - Assemble the dependency graph for one network intent
//!
//! The builder owns the only mutable graph during synthesis and threads it
//! through every step explicitly. Any failure drops the partial graph, so
//! callers either get a complete, validated topology or an error.

use log::{debug, info};

use crate::allocator::{AddressPlan, IPV6_SLICE_COUNT, IPV6_SLICE_PREFIX, Role};
use crate::error::{SynthesisError, SynthesisResult};
use crate::graph::DependencyGraph;
use crate::intent::{NetworkIntent, zone_suffix};
use crate::plan::{Output, Plan};
use crate::resource::{NodeId, ResourceKind, ResourceNode, Value};
use crate::schemas::schema_for;

/// Attribute of the network that only exists once its IPv6 block is associated
pub const IPV6_BLOCKS_ATTRIBUTE: &str = "ipv6_cidr_blocks";

/// Children the provider creates on its own for a declared node
pub trait ImplicitChildren {
    fn children_of(&self, node: &ResourceNode) -> Vec<ResourceKind>;
}

/// Provider behaviour: every subnet gets a default route table and an
/// association with it
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderDefaults;

impl ImplicitChildren for ProviderDefaults {
    fn children_of(&self, node: &ResourceNode) -> Vec<ResourceKind> {
        match node.kind {
            ResourceKind::Subnet => vec![ResourceKind::SubnetAssociation, ResourceKind::RouteTable],
            _ => Vec::new(),
        }
    }
}

/// Execution contexts where the provider synthesises nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImplicitChildren;

impl ImplicitChildren for NoImplicitChildren {
    fn children_of(&self, _node: &ResourceNode) -> Vec<ResourceKind> {
        Vec::new()
    }
}

/// A synthesised topology
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub graph: DependencyGraph,
    pub outputs: Vec<Output>,
}

impl Topology {
    pub fn plan(&self) -> Plan {
        Plan::from_graph(&self.graph, self.outputs.clone())
    }
}

struct NetworkNodes {
    vpc: NodeId,
    ipv6_block: NodeId,
    /// Every IPv6 slice of the network's block
    ipv6_slices: Value,
}

struct RouteTables {
    public: NodeId,
    private: NodeId,
}

/// Builds the topology of one intent
pub struct TopologyBuilder<'a> {
    intent: &'a NetworkIntent,
    implicit: &'a dyn ImplicitChildren,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(intent: &'a NetworkIntent) -> Self {
        Self {
            intent,
            implicit: &ProviderDefaults,
        }
    }

    pub fn with_implicit_children(mut self, implicit: &'a dyn ImplicitChildren) -> Self {
        self.implicit = implicit;
        self
    }

    /// Build the topology, computing the address plan from the intent
    pub fn build(&self) -> SynthesisResult<Topology> {
        self.intent.validate()?;
        let plan = AddressPlan::for_intent(self.intent)?;
        self.build_with_plan(&plan)
    }

    /// Build the topology from a precomputed address plan
    pub fn build_with_plan(&self, plan: &AddressPlan) -> SynthesisResult<Topology> {
        self.intent.validate()?;

        let mut graph = DependencyGraph::new();
        let network = self.add_network(&mut graph)?;
        let tables = self.add_routing(&mut graph, &network)?;
        let public = self.add_subnets(&mut graph, plan, Role::Public, &network, &tables.public)?;
        self.add_subnets(&mut graph, plan, Role::Private, &network, &tables.private)?;
        let outputs = self.add_bastion(&mut graph, &network, &public)?;

        graph.validate()?;
        for output in &outputs {
            for (target, _) in output.value.references() {
                if !graph.contains(target) {
                    return Err(SynthesisError::UnknownNode(target.clone()));
                }
            }
        }

        info!(
            "synthesised {} resources for {} across {} zones",
            graph.len(),
            self.intent.name_prefix(),
            self.intent.zones().len()
        );
        Ok(Topology { graph, outputs })
    }

    fn id(&self, suffix: &str) -> String {
        format!("{}-{}", self.intent.name_prefix(), suffix)
    }

    /// Validate a node, add it with an edge to every node it references, and
    /// attach the provider's implicit children
    fn insert(&self, graph: &mut DependencyGraph, node: ResourceNode) -> SynthesisResult<NodeId> {
        schema_for(node.kind)
            .check(&node.attributes)
            .map_err(|errors| SynthesisError::Schema {
                id: node.id.clone(),
                errors,
            })?;

        let id = node.id.clone();
        let targets: Vec<NodeId> = node.references().into_iter().map(|(t, _)| t.clone()).collect();
        let kinds = self.implicit.children_of(&node);

        debug!("adding {} {}", node.kind, id);
        graph.add_node(node)?;
        for target in &targets {
            graph.add_edge(&id, target)?;
        }
        for kind in kinds {
            graph.attach_implicit_child(&id, kind)?;
        }
        Ok(id)
    }

    fn add_network(&self, graph: &mut DependencyGraph) -> SynthesisResult<NetworkNodes> {
        let vpc_name = self.id("vpc");
        let vpc = self.insert(
            graph,
            ResourceNode::new(ResourceKind::Network, vpc_name.clone())
                .with_attribute("name", Value::string(vpc_name))
                .with_attribute(
                    "cidr_block",
                    Value::string(self.intent.ipv4_base().to_string()),
                )
                .with_attribute("enable_dns_hostnames", Value::Bool(true))
                .with_attribute("enable_dns_support", Value::Bool(true)),
        )?;

        let ipv6_block = self.insert(
            graph,
            ResourceNode::new(ResourceKind::Ipv6CidrBlock, self.id("ipv6-cidr"))
                .with_attribute("vpc_id", Value::reference(&vpc, "id"))
                .with_attribute("amazon_provided_ipv6_cidr_block", Value::Bool(true)),
        )?;
        graph.defer_attribute(&vpc, IPV6_BLOCKS_ATTRIBUTE, &ipv6_block)?;

        let ipv6_slices = Value::Cidr {
            block: Box::new(Value::select(
                0,
                Value::reference(&vpc, IPV6_BLOCKS_ATTRIBUTE),
            )),
            count: IPV6_SLICE_COUNT,
            prefix: IPV6_SLICE_PREFIX,
        };

        Ok(NetworkNodes {
            vpc,
            ipv6_block,
            ipv6_slices,
        })
    }

    fn add_routing(
        &self,
        graph: &mut DependencyGraph,
        network: &NetworkNodes,
    ) -> SynthesisResult<RouteTables> {
        let igw_name = self.id("igw");
        let igw = self.insert(
            graph,
            ResourceNode::new(ResourceKind::InternetGateway, igw_name.clone())
                .with_attribute("name", Value::string(igw_name)),
        )?;
        let attachment = self.insert(
            graph,
            ResourceNode::new(ResourceKind::GatewayAttachment, self.id("igw-attachment"))
                .with_attribute("vpc_id", Value::reference(&network.vpc, "id"))
                .with_attribute("internet_gateway_id", Value::reference(&igw, "id")),
        )?;

        let public = self.add_route_table(graph, network, Role::Public)?;

        // Routes through the gateway fail until it is attached
        let default_route = self.insert(
            graph,
            ResourceNode::new(ResourceKind::Route, self.id("route-public"))
                .with_attribute("route_table_id", Value::reference(&public, "id"))
                .with_attribute("destination_cidr_block", Value::string("0.0.0.0/0"))
                .with_attribute("gateway_id", Value::reference(&igw, "id")),
        )?;
        graph.add_edge(&default_route, &attachment)?;

        let v6_route = self.insert(
            graph,
            ResourceNode::new(ResourceKind::Route, self.id("route-v6-public"))
                .with_attribute("route_table_id", Value::reference(&public, "id"))
                .with_attribute("destination_ipv6_cidr_block", Value::string("::/0"))
                .with_attribute("gateway_id", Value::reference(&igw, "id")),
        )?;
        graph.add_edge(&v6_route, &attachment)?;

        let private = self.add_route_table(graph, network, Role::Private)?;
        Ok(RouteTables { public, private })
    }

    fn add_route_table(
        &self,
        graph: &mut DependencyGraph,
        network: &NetworkNodes,
        role: Role,
    ) -> SynthesisResult<NodeId> {
        let name = self.id(&format!("route-table-{}", role));
        self.insert(
            graph,
            ResourceNode::new(ResourceKind::RouteTable, name.clone())
                .with_attribute("vpc_id", Value::reference(&network.vpc, "id"))
                .with_attribute("name", Value::string(name)),
        )
    }

    /// Check one role's slice of the address plan against the declared zones
    ///
    /// Runs before the pass emits anything, so a mismatch never leaves half a
    /// pass in the graph.
    fn checked_pass(&self, plan: &AddressPlan, role: Role) -> SynthesisResult<Vec<(String, usize)>> {
        let declared = self.intent.zones().len();
        if plan.zone_count() != declared {
            return Err(SynthesisError::PlanMismatch(format!(
                "address plan covers {} zones but the intent declares {}",
                plan.zone_count(),
                declared
            )));
        }

        let first = match role {
            Role::Public => 0,
            Role::Private => declared,
        };
        let bound = 2 * declared;
        let slices: Vec<_> = plan.ipv6_assignments(role).collect();
        if slices.len() != declared {
            return Err(SynthesisError::PlanMismatch(format!(
                "{} {} IPv6 slices for {} zones",
                slices.len(),
                role,
                declared
            )));
        }

        let mut pass = Vec::with_capacity(declared);
        for (zone, slice) in slices.into_iter().enumerate() {
            if slice.index >= IPV6_SLICE_COUNT {
                return Err(SynthesisError::AddressExhaustion(format!(
                    "IPv6 slice {} requested but the block is cut into {}",
                    slice.index, IPV6_SLICE_COUNT
                )));
            }
            if slice.index >= bound {
                return Err(SynthesisError::PlanMismatch(format!(
                    "{} slice {} for zone {} is outside the {} slices of {} zones",
                    role, slice.index, zone, bound, declared
                )));
            }
            if slice.zone != zone || slice.index != first + zone {
                return Err(SynthesisError::PlanMismatch(format!(
                    "{} subnet in zone {} got IPv6 slice {}, expected {}",
                    role,
                    zone,
                    slice.index,
                    first + zone
                )));
            }
            let cidr = plan.ipv4(role, zone).ok_or_else(|| {
                SynthesisError::PlanMismatch(format!("no IPv4 range for {} zone {}", role, zone))
            })?;
            pass.push((cidr.to_string(), slice.index));
        }
        Ok(pass)
    }

    fn add_subnets(
        &self,
        graph: &mut DependencyGraph,
        plan: &AddressPlan,
        role: Role,
        network: &NetworkNodes,
        route_table: &NodeId,
    ) -> SynthesisResult<Vec<NodeId>> {
        let pass = self.checked_pass(plan, role)?;
        let mut subnets = Vec::with_capacity(pass.len());

        for (zone, (cidr, slice)) in self.intent.zones().iter().zip(pass) {
            let suffix = zone_suffix(zone);
            let name = self.id(&format!("app-{}-subnet-{}", role, suffix));

            let mut node = ResourceNode::new(ResourceKind::Subnet, name.clone())
                .with_attribute("vpc_id", Value::reference(&network.vpc, "id"))
                .with_attribute("cidr_block", Value::string(cidr))
                .with_attribute(
                    "ipv6_cidr_block",
                    Value::select(slice, network.ipv6_slices.clone()),
                )
                .with_attribute("availability_zone", Value::string(zone.clone()))
                .with_attribute("assign_ipv6_address_on_creation", Value::Bool(true))
                .with_attribute("name", Value::string(name));
            if role == Role::Public {
                node = node.with_attribute("map_public_ip_on_launch", Value::Bool(true));
            }

            let subnet = self.insert(graph, node)?;
            // The IPv6 block is only known once the association completes
            graph.add_edge(&subnet, &network.ipv6_block)?;

            for kind in [ResourceKind::SubnetAssociation, ResourceKind::RouteTable] {
                if graph.remove_implicit_child(&subnet, kind) {
                    debug!("removed implicit {} of {}", kind, subnet);
                }
            }
            let association = self.insert(
                graph,
                ResourceNode::new(
                    ResourceKind::SubnetAssociation,
                    self.id(&format!("route-association-{}-{}", role, suffix)),
                )
                .with_attribute("subnet_id", Value::reference(&subnet, "id"))
                .with_attribute("route_table_id", Value::reference(route_table, "id")),
            )?;
            debug!("associated {} with {} via {}", subnet, route_table, association);

            subnets.push(subnet);
        }
        Ok(subnets)
    }

    fn add_bastion(
        &self,
        graph: &mut DependencyGraph,
        network: &NetworkNodes,
        public_subnets: &[NodeId],
    ) -> SynthesisResult<Vec<Output>> {
        let bastion = self.intent.bastion();
        let first_subnet = public_subnets.first().ok_or_else(|| {
            SynthesisError::PlanMismatch("no public subnet to place the bastion in".to_string())
        })?;

        let key_name = self.id("bastion-key-pair");
        let key_pair = self.insert(
            graph,
            ResourceNode::new(ResourceKind::KeyPair, key_name.clone())
                .with_attribute("key_name", Value::string(key_name)),
        )?;

        let sg_name = self.id("bastion-sg");
        let security_group = self.insert(
            graph,
            ResourceNode::new(ResourceKind::SecurityGroup, sg_name.clone())
                .with_attribute("vpc_id", Value::reference(&network.vpc, "id"))
                .with_attribute(
                    "group_description",
                    Value::string(format!(
                        "security group for bastion instance in {}",
                        self.intent.name_prefix()
                    )),
                )
                .with_attribute("group_name", Value::string(sg_name.clone()))
                .with_attribute("name", Value::string(sg_name)),
        )?;

        let port = Value::Int(i64::from(bastion.ssh_port));
        for (suffix, source_key, source) in [
            ("bastion-sg-ingress-ssh", "cidr_ip", "0.0.0.0/0"),
            ("bastion-sg-ingress-v6-ssh", "cidr_ipv6", "::/0"),
        ] {
            self.insert(
                graph,
                ResourceNode::new(ResourceKind::SecurityRule, self.id(suffix))
                    .with_attribute("group_id", Value::reference(&security_group, "id"))
                    .with_attribute(source_key, Value::string(source))
                    .with_attribute("ip_protocol", Value::string("tcp"))
                    .with_attribute("from_port", port.clone())
                    .with_attribute("to_port", port.clone()),
            )?;
        }

        let instance_name = self.id("bastion");
        self.insert(
            graph,
            ResourceNode::new(ResourceKind::Instance, instance_name.clone())
                .with_attribute("subnet_id", Value::reference(first_subnet, "id"))
                .with_attribute(
                    "availability_zone",
                    Value::string(self.intent.zones()[0].clone()),
                )
                .with_attribute(
                    "image_id",
                    Value::Parameter(bastion.image_parameter.clone()),
                )
                .with_attribute("instance_type", Value::string(bastion.instance_type.clone()))
                .with_attribute(
                    "security_group_ids",
                    Value::List(vec![Value::reference(&security_group, "id")]),
                )
                .with_attribute("key_name", Value::reference(&key_pair, "key_name"))
                .with_attribute("name", Value::string(instance_name)),
        )?;

        let command = Value::Join(vec![
            Value::string("aws ssm get-parameter --name /ec2/keypair/"),
            Value::reference(&key_pair, "key_pair_id"),
            Value::string(" --region "),
            Value::Region,
            Value::string(" --with-decryption --query Parameter.Value --output text"),
        ]);
        Ok(vec![
            Output::new(self.id("get-bastion-key-command"), command)
                .with_description("Fetch the bastion's private key"),
        ])
    }
}
