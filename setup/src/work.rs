// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! The capability boundary for side effects on the host.

use net::{Ipv4Prefix, Mac};
use routing::NodeId;
use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;
use topology::{TopoLink, TopoNode};

/// MAC addresses allocated for the edge-facing interfaces of a client node.
pub const MACS_PER_CLIENT: usize = 2;
/// MAC addresses allocated for the two ends of an internal link.
pub const MACS_PER_LINK: usize = 2;

/// Failure reported by a [`Work`] implementation. Any failure aborts the
/// driver, which then runs its cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct WorkError(pub String);

impl WorkError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> WorkError {
        WorkError(reason.into())
    }
}

/// Side-effectful operations on the host kernel.
///
/// The driver is the only caller and invokes everything from a single
/// thread. Implementations own external state (namespaces, bridges, flow
/// tables) whose lifetime transcends the driver; the driver never assumes
/// anything about how the operations are realised.
pub trait Work {
    fn init(
        &mut self,
        ns_prefix: &str,
        ovs_dir: &Path,
        ovs_schema: &Path,
        soft_mem_cap: u64,
    ) -> Result<(), WorkError>;

    fn cleanup(&mut self) -> Result<(), WorkError>;

    /// Tear down every host namespace of a previous run; returns how many
    /// were deleted.
    fn destroy_hosts(&mut self) -> Result<u32, WorkError>;

    /// Resolve the MAC address of a remote edge node reachable on `intf`.
    fn resolve_remote_mac(&mut self, intf: &str, ip: Ipv4Addr) -> Result<Mac, WorkError>;

    /// MAC address of a local interface.
    fn local_mac(&mut self, intf: &str) -> Result<Mac, WorkError>;

    /// Create the root namespace with its two addresses.
    fn add_root(&mut self, addr_a: Ipv4Addr, addr_b: Ipv4Addr) -> Result<(), WorkError>;

    /// Move an edge interface into the root namespace; returns its port.
    fn add_edge_interface(&mut self, intf: &str) -> Result<u32, WorkError>;

    /// Install the flows that steer an edge's virtual subnet to its port.
    fn add_edge_routes(
        &mut self,
        vsubnet: Ipv4Prefix,
        port: u32,
        local_mac: Mac,
        remote_mac: Mac,
    ) -> Result<(), WorkError>;

    /// Create the namespace for a simulated node.
    fn add_host(
        &mut self,
        id: NodeId,
        addr: Ipv4Addr,
        macs: &[Mac; MACS_PER_CLIENT],
        node: &TopoNode,
    ) -> Result<(), WorkError>;

    /// Apply shaping for a client's link to itself.
    fn set_self_link(&mut self, id: NodeId, link: &TopoLink) -> Result<(), WorkError>;

    /// Connect two node namespaces with a virtual ethernet pair.
    fn add_link(
        &mut self,
        source: NodeId,
        target: NodeId,
        source_addr: Ipv4Addr,
        target_addr: Ipv4Addr,
        macs: &[Mac; MACS_PER_LINK],
        link: &TopoLink,
    ) -> Result<(), WorkError>;

    /// Install the routes serving a client's subnet through its edge port.
    fn add_client_routes(
        &mut self,
        id: NodeId,
        macs: &[Mac; MACS_PER_CLIENT],
        subnet: Ipv4Prefix,
        edge_port: u32,
    ) -> Result<(), WorkError>;

    /// Install one hop of the static route between two client subnets.
    fn add_internal_routes(
        &mut self,
        from: NodeId,
        to: NodeId,
        from_addr: Ipv4Addr,
        to_addr: Ipv4Addr,
        source_subnet: Ipv4Prefix,
        dest_subnet: Ipv4Prefix,
    ) -> Result<(), WorkError>;

    /// Verify that the host can accommodate the topology before building it.
    fn ensure_scaling(
        &mut self,
        worst_case_links: u64,
        nodes: NodeId,
        clients: NodeId,
    ) -> Result<(), WorkError>;
}
