//! Allocator - Subnet addressing for a network intent
//!
//! IPv4 ranges are computed eagerly from the base block. IPv6 ranges are
//! cut from a block the provider assigns during provisioning, so only the
//! positional slice index of every subnet is decided here.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{SynthesisError, SynthesisResult};
use crate::intent::NetworkIntent;

/// Prefix length of every IPv4 subnet in the reference sizing
pub const SUBNET_PREFIX: u8 = 24;
/// Number of slices the IPv6 block is cut into
pub const IPV6_SLICE_COUNT: usize = 256;
/// Prefix length of every IPv6 slice
pub const IPV6_SLICE_PREFIX: u8 = 64;

/// Subnet role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Public,
    Private,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Public => "public",
            Role::Private => "private",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of one subnet's block inside the provider-assigned IPv6 block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceAssignment {
    pub role: Role,
    pub zone: usize,
    pub index: usize,
}

/// IPv4 ranges keyed by (role, zone index)
pub type Ipv4Allocation = BTreeMap<(Role, usize), Ipv4Net>;

/// Allocate one /24 per zone and role from `base`
///
/// Zone `i` gets the `offset_public + i`-th /24 as its public subnet and the
/// `offset_private + i`-th /24 as its private subnet. For a /16 base that is
/// the third octet.
pub fn allocate_ipv4(
    base: Ipv4Net,
    zone_count: usize,
    offset_public: u32,
    offset_private: u32,
) -> SynthesisResult<Ipv4Allocation> {
    allocate_ipv4_with_prefix(base, zone_count, offset_public, offset_private, SUBNET_PREFIX)
}

/// Same as [`allocate_ipv4`] with an explicit subnet prefix length
pub fn allocate_ipv4_with_prefix(
    base: Ipv4Net,
    zone_count: usize,
    offset_public: u32,
    offset_private: u32,
    prefix: u8,
) -> SynthesisResult<Ipv4Allocation> {
    let base = base.trunc();
    let mut allocation = BTreeMap::new();

    for (role, offset) in [(Role::Public, offset_public), (Role::Private, offset_private)] {
        for zone in 0..zone_count {
            let position = u64::from(offset) + zone as u64;
            let subnet = nth_subnet(base, prefix, position).ok_or_else(|| {
                SynthesisError::AddressExhaustion(format!(
                    "{} subnet for zone {} (position {}) does not fit in {} at /{}",
                    role, zone, position, base, prefix
                ))
            })?;
            allocation.insert((role, zone), subnet);
        }
    }

    check_disjoint(&allocation)?;
    Ok(allocation)
}

/// The `position`-th block of length `prefix` inside `base`
fn nth_subnet(base: Ipv4Net, prefix: u8, position: u64) -> Option<Ipv4Net> {
    if prefix > 32 || prefix < base.prefix_len() {
        return None;
    }
    let capacity = 1u64 << (prefix - base.prefix_len());
    if position >= capacity {
        return None;
    }
    let step = 1u64 << (32 - prefix);
    let start = u64::from(u32::from(base.network())) + position * step;
    let start = u32::try_from(start).ok()?;
    Ipv4Net::new(Ipv4Addr::from(start), prefix).ok()
}

fn check_disjoint(allocation: &Ipv4Allocation) -> SynthesisResult<()> {
    let ranges: Vec<&Ipv4Net> = allocation.values().collect();
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            if a.contains(&b.network()) || b.contains(&a.network()) {
                return Err(SynthesisError::OverlappingRanges {
                    first: a.to_string(),
                    second: b.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Hand out IPv6 slice indices: `[0, n)` to public subnets, `[n, 2n)` to
/// private subnets, each in zone order
///
/// The orchestrator slices positionally, so this order must match the order
/// subnets are declared in.
pub fn allocate_ipv6_indices(zone_count: usize) -> Vec<SliceAssignment> {
    let public = (0..zone_count).map(|zone| SliceAssignment {
        role: Role::Public,
        zone,
        index: zone,
    });
    let private = (0..zone_count).map(|zone| SliceAssignment {
        role: Role::Private,
        zone,
        index: zone_count + zone,
    });
    public.chain(private).collect()
}

/// Addressing for every subnet of one intent
#[derive(Debug, Clone, PartialEq)]
pub struct AddressPlan {
    zone_count: usize,
    ipv4: Ipv4Allocation,
    ipv6: Vec<SliceAssignment>,
}

impl AddressPlan {
    pub fn new(zone_count: usize, ipv4: Ipv4Allocation, ipv6: Vec<SliceAssignment>) -> Self {
        Self {
            zone_count,
            ipv4,
            ipv6,
        }
    }

    /// Compute the plan for an intent
    pub fn for_intent(intent: &NetworkIntent) -> SynthesisResult<Self> {
        let zone_count = intent.zones().len();
        let layout = intent.layout();
        let ipv4 = allocate_ipv4_with_prefix(
            intent.ipv4_base(),
            zone_count,
            layout.public_offset,
            layout.private_offset,
            layout.prefix,
        )?;
        Ok(Self::new(zone_count, ipv4, allocate_ipv6_indices(zone_count)))
    }

    pub fn zone_count(&self) -> usize {
        self.zone_count
    }

    pub fn ipv4(&self, role: Role, zone: usize) -> Option<Ipv4Net> {
        self.ipv4.get(&(role, zone)).copied()
    }

    pub fn ipv4_allocation(&self) -> &Ipv4Allocation {
        &self.ipv4
    }

    /// IPv6 slice assignments of one role, in the order they were handed out
    pub fn ipv6_assignments(&self, role: Role) -> impl Iterator<Item = &SliceAssignment> {
        self.ipv6.iter().filter(move |a| a.role == role)
    }

    pub fn ipv6_index(&self, role: Role, zone: usize) -> Option<usize> {
        self.ipv6_assignments(role)
            .find(|a| a.zone == zone)
            .map(|a| a.index)
    }
}
