//! Attribute sets for every resource kind

use crate::resource::ResourceKind;
use crate::schema::{AttrSpec, AttrType, IpFamily, KindSchema, PORT, PROTOCOLS};

const IPV4: AttrType = AttrType::Cidr(IpFamily::V4);
const IPV6: AttrType = AttrType::Cidr(IpFamily::V6);

fn name_tag() -> AttrSpec {
    AttrSpec::required("name", AttrType::Text).doc("Name tag")
}

fn id_of(name: &'static str) -> AttrSpec {
    AttrSpec::required(name, AttrType::Text)
}

fn network() -> KindSchema {
    KindSchema::new(ResourceKind::Network, "Virtual network")
        .with(name_tag())
        .with(AttrSpec::required("cidr_block", IPV4).doc("IPv4 base block"))
        .with(AttrSpec::optional("enable_dns_support", AttrType::Flag))
        .with(AttrSpec::optional("enable_dns_hostnames", AttrType::Flag))
}

fn ipv6_cidr_block() -> KindSchema {
    KindSchema::new(
        ResourceKind::Ipv6CidrBlock,
        "Provider-assigned IPv6 block associated with a network",
    )
    .with(id_of("vpc_id"))
    .with(AttrSpec::required("amazon_provided_ipv6_cidr_block", AttrType::Flag))
}

fn internet_gateway() -> KindSchema {
    KindSchema::new(ResourceKind::InternetGateway, "Internet gateway").with(name_tag())
}

fn gateway_attachment() -> KindSchema {
    KindSchema::new(
        ResourceKind::GatewayAttachment,
        "Attaches an internet gateway to a network",
    )
    .with(id_of("vpc_id"))
    .with(id_of("internet_gateway_id"))
}

fn route_table() -> KindSchema {
    KindSchema::new(ResourceKind::RouteTable, "Route table")
        .with(name_tag())
        .with(id_of("vpc_id"))
}

fn route() -> KindSchema {
    KindSchema::new(ResourceKind::Route, "Route in a route table")
        .with(id_of("route_table_id"))
        .with(id_of("gateway_id"))
        .with(AttrSpec::optional("destination_cidr_block", IPV4))
        .with(AttrSpec::optional("destination_ipv6_cidr_block", IPV6))
}

fn subnet() -> KindSchema {
    KindSchema::new(ResourceKind::Subnet, "Dual-stack subnet in one zone")
        .with(name_tag())
        .with(id_of("vpc_id"))
        .with(AttrSpec::required("cidr_block", IPV4))
        .with(AttrSpec::optional("ipv6_cidr_block", IPV6).doc("One /64 of the network's block"))
        .with(AttrSpec::required("availability_zone", AttrType::Text))
        .with(AttrSpec::optional("map_public_ip_on_launch", AttrType::Flag))
        .with(AttrSpec::optional("assign_ipv6_address_on_creation", AttrType::Flag))
}

fn subnet_association() -> KindSchema {
    KindSchema::new(
        ResourceKind::SubnetAssociation,
        "Binds a subnet to a route table",
    )
    .with(id_of("subnet_id"))
    .with(id_of("route_table_id"))
}

fn security_group() -> KindSchema {
    KindSchema::new(ResourceKind::SecurityGroup, "Security group")
        .with(name_tag())
        .with(id_of("vpc_id"))
        .with(AttrSpec::required("group_name", AttrType::Text))
        .with(AttrSpec::required("group_description", AttrType::Text))
}

fn security_rule() -> KindSchema {
    KindSchema::new(ResourceKind::SecurityRule, "Inbound rule of a security group")
        .with(id_of("group_id"))
        .with(AttrSpec::required("ip_protocol", AttrType::OneOf(PROTOCOLS)))
        .with(AttrSpec::required("from_port", PORT))
        .with(AttrSpec::required("to_port", PORT))
        .with(AttrSpec::optional("cidr_ip", IPV4).doc("IPv4 source"))
        .with(AttrSpec::optional("cidr_ipv6", IPV6).doc("IPv6 source"))
}

fn instance() -> KindSchema {
    KindSchema::new(ResourceKind::Instance, "Compute instance")
        .with(name_tag())
        .with(id_of("subnet_id"))
        .with(AttrSpec::optional("availability_zone", AttrType::Text))
        .with(AttrSpec::required("image_id", AttrType::Text))
        .with(AttrSpec::required("instance_type", AttrType::Text))
        .with(AttrSpec::optional(
            "security_group_ids",
            AttrType::list_of(AttrType::Text),
        ))
        .with(AttrSpec::optional("key_name", AttrType::Text))
}

fn key_pair() -> KindSchema {
    KindSchema::new(
        ResourceKind::KeyPair,
        "SSH key pair whose private half the provider stores",
    )
    .with(AttrSpec::required("key_name", AttrType::Text))
}

/// Attribute set of a resource kind
pub fn schema_for(kind: ResourceKind) -> KindSchema {
    match kind {
        ResourceKind::Network => network(),
        ResourceKind::Ipv6CidrBlock => ipv6_cidr_block(),
        ResourceKind::InternetGateway => internet_gateway(),
        ResourceKind::GatewayAttachment => gateway_attachment(),
        ResourceKind::RouteTable => route_table(),
        ResourceKind::Route => route(),
        ResourceKind::Subnet => subnet(),
        ResourceKind::SubnetAssociation => subnet_association(),
        ResourceKind::SecurityGroup => security_group(),
        ResourceKind::SecurityRule => security_rule(),
        ResourceKind::Instance => instance(),
        ResourceKind::KeyPair => key_pair(),
    }
}

pub fn all_schemas() -> Vec<KindSchema> {
    ResourceKind::ALL.into_iter().map(schema_for).collect()
}
