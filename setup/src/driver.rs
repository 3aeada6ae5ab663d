// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! The setup driver orchestrating edge completion, topology ingestion,
//! address assignment, and route construction.

use crate::errors::SetupError;
use crate::params::{GraphmlParams, SetupParams, TopologySource};
use crate::work::{MACS_PER_CLIENT, MACS_PER_LINK, Work};
use net::{FragmentIter, Ipv4HostIter, Ipv4Prefix, Mac, MacAllocator};
use routing::{NodeId, RoutePlanner};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::net::Ipv4Addr;
use topology::{GraphError, ReaderOptions, TopoLink, TopoNode, TopologySink, parse_graphml};
use tracing::{debug, error, info, warn};

/// A fully specified edge node, after completion of the configured fields.
#[derive(Debug, Clone)]
struct Edge {
    ip: Ipv4Addr,
    intf: String,
    mac: Mac,
    vsubnet: Ipv4Prefix,
}

/// Planning state of one simulated node.
#[derive(Debug, Clone)]
struct NodeState {
    addr: Ipv4Addr,
    client: bool,
    client_subnet: Option<Ipv4Prefix>,
    client_macs: [Mac; MACS_PER_CLIENT],
}

/// The setup driver.
///
/// Construction completes the edge-node definitions;
/// [`Setup::setup_topology`] then performs the full planning run against the
/// configured topology source, pushing every side effect through the
/// [`Work`] capability.
pub struct Setup<W: Work> {
    params: SetupParams,
    edges: Vec<Edge>,
    work: W,
}

fn reserved_prefixes() -> [Ipv4Prefix; 3] {
    // Interface addresses are drawn from the full IPv4 space: the node
    // namespaces are never connected to the Internet, so publicly routable
    // ranges are usable. Only these blocks stay off limits.
    ["0.0.0.0/8", "127.0.0.0/8", "255.255.255.255/32"].map(|s| s.parse().expect("Bad prefix"))
}

fn graph_error(err: GraphError<SetupError>) -> SetupError {
    match err {
        GraphError::Sink(err) => err,
        other => SetupError::Graph(other.to_string()),
    }
}

impl<W: Work> Setup<W> {
    /// Initialise the work backend and complete the edge-node definitions.
    ///
    /// # Errors
    /// Fails when no edge nodes are configured, when an edge node cannot be
    /// completed, or when the backend fails. The backend is cleaned up on
    /// every failure after its successful initialisation.
    pub fn new(params: SetupParams, mut work: W) -> Result<Setup<W>, SetupError> {
        work.init(
            &params.ns_prefix,
            &params.ovs_dir,
            &params.ovs_schema,
            params.soft_mem_cap,
        )?;

        match complete_edges(&params, &mut work) {
            Ok(edges) => {
                for edge in &edges {
                    info!(
                        "Configured edge node: IP {}, interface {}, MAC {}, client subnet {}",
                        edge.ip, edge.intf, edge.mac, edge.vsubnet
                    );
                }
                Ok(Setup {
                    params,
                    edges,
                    work,
                })
            }
            Err(err) => {
                if let Err(cleanup_err) = work.cleanup() {
                    warn!("cleanup after a failed setup also failed: {cleanup_err}");
                }
                Err(err)
            }
        }
    }

    /// Tear down any virtual network left behind by a previous run.
    ///
    /// # Errors
    /// Fails when the backend fails.
    pub fn destroy_network(&mut self) -> Result<(), SetupError> {
        info!(
            "Destroying any existing virtual network with namespace prefix '{}'",
            self.params.ns_prefix
        );
        let deleted = self.work.destroy_hosts()?;
        if deleted > 0 {
            info!("Destroyed an existing virtual network with {deleted} hosts");
        }
        Ok(())
    }

    /// Build the emulated network for the configured topology.
    ///
    /// # Errors
    /// Fails on invalid topology input, address-space exhaustion, or any
    /// backend failure; the first error aborts the run.
    pub fn setup_topology(&mut self, gml: &GraphmlParams) -> Result<(), SetupError> {
        // Interface addresses come from the whole IPv4 space minus the
        // reserved blocks and every edge node's virtual subnet
        let mut avoid = reserved_prefixes().to_vec();
        avoid.extend(self.edges.iter().map(|edge| edge.vsubnet));
        let mut addrs = Ipv4HostIter::new(Ipv4Prefix::root(), false, &avoid);

        let mut root_addr = || {
            addrs.next().ok_or_else(|| {
                error!(
                    "The edge node subnets completely fill the unreserved IPv4 space. Some addresses must be left for internal networking interfaces in the emulator."
                );
                SetupError::AddressSpaceExhausted
            })
        };
        let root_a = root_addr()?;
        let root_b = root_addr()?;
        self.work.add_root(root_a, root_b)?;

        // Move all interfaces associated with edge nodes into the root
        // namespace, de-duplicated by name. Linear scans are fine here; the
        // number of edge nodes is typically less than ten.
        let mut edge_ports = vec![0u32; self.edges.len()];
        for i in 0..self.edges.len() {
            if let Some(j) = (0..i).find(|&j| self.edges[j].intf == self.edges[i].intf) {
                edge_ports[i] = edge_ports[j];
                continue;
            }
            let edge = &self.edges[i];
            let port = self.work.add_edge_interface(&edge.intf)?;
            let local_mac = self.work.local_mac(&edge.intf)?;
            self.work
                .add_edge_routes(edge.vsubnet, port, local_mac, edge.mac)?;
            edge_ports[i] = port;
        }

        // Topology ingestion
        info!(
            "Reading network topology in GraphML format from {}",
            self.params.source
        );
        let options = ReaderOptions {
            client_type: gml.client_type.clone(),
            weight_key: gml.weight_key.clone(),
        };
        let mut ingest = Ingest {
            work: &mut self.work,
            edge_count: self.edges.len(),
            client_default: gml.client_type.is_none(),
            finished_nodes: false,
            ignore_nodes: false,
            ignore_edges: false,
            nodes: Vec::new(),
            index: HashMap::new(),
            client_count: 0,
            addrs,
            macs: MacAllocator::new(),
            planner: None,
        };

        let passes = if gml.two_pass { 2 } else { 1 };
        if passes > 1 {
            if matches!(self.params.source, TopologySource::Stdin) {
                error!(
                    "Cannot perform two passes when reading a GraphML file from stdin. Either ensure that all nodes appear before edges, or read from a file."
                );
                return Err(SetupError::TwoPassUnseekable);
            }
            ingest.ignore_edges = true;
        }
        for pass in (1..=passes).rev() {
            match &self.params.source {
                TopologySource::File(path) => {
                    let file = BufReader::new(File::open(path)?);
                    parse_graphml(file, &mut ingest, &options).map_err(graph_error)?;
                }
                TopologySource::Memory(doc) => {
                    parse_graphml(doc.as_bytes(), &mut ingest, &options).map_err(graph_error)?;
                }
                TopologySource::Stdin => {
                    let stdin = std::io::stdin();
                    parse_graphml(stdin.lock(), &mut ingest, &options).map_err(graph_error)?;
                }
            }
            if pass == 2 {
                // Pretend that we've reached the end of the node section in
                // a sorted file, and ignore any further nodes rather than
                // raising an error
                ingest.finished_nodes = true;
                ingest.ignore_nodes = true;
                ingest.ignore_edges = false;
            }
        }

        // Host and link construction is finished. Now we set up routing
        info!("Setting up static routing for the network");
        let Ingest {
            mut nodes,
            client_count,
            planner,
            ..
        } = ingest;
        let Some(mut planner) = planner else {
            error!("Network topology did not contain any links");
            return Err(SetupError::NoLinks);
        };
        planner.plan();

        // Assign a fragment of its edge's virtual subnet to every client
        debug!(
            "Assigning {client_count} client nodes to {} edge nodes",
            self.edges.len()
        );
        let clients_per_edge = f64::from(client_count) / self.edges.len() as f64;
        let mut subnets = ClientSubnets::new(&self.edges, clients_per_edge);
        for (id, node) in nodes.iter_mut().enumerate() {
            if !node.client {
                continue;
            }
            let (subnet, edge_idx) = subnets.next_subnet()?;
            node.client_subnet = Some(subnet);
            debug!("Assigned client node {id} to subnet {subnet} owned by edge {edge_idx}");
            self.work
                .add_client_routes(id as NodeId, &node.client_macs, subnet, edge_ports[edge_idx])?;
        }

        // Build routes between every pair of client nodes
        debug!("Adding static routes along paths for all client node pairs");
        let mut seen_unroutable = false;
        for start in 0..nodes.len() {
            if !nodes[start].client {
                continue;
            }
            for end in (start + 1)..nodes.len() {
                if !nodes[end].client {
                    continue;
                }
                let Some(path) = planner.route(start as NodeId, end as NodeId) else {
                    if !seen_unroutable {
                        warn!(
                            "Topology contains unconnected client nodes (e.g., {start} to {end} is unroutable)"
                        );
                        seen_unroutable = true;
                    }
                    continue;
                };
                if path.len() < 2 {
                    error!(
                        "BUG: route from client {start} to {end} has {} steps",
                        path.len()
                    );
                    continue;
                }
                let source_subnet = nodes[start]
                    .client_subnet
                    .ok_or(SetupError::Bug("client node without a subnet"))?;
                let dest_subnet = nodes[end]
                    .client_subnet
                    .ok_or(SetupError::Bug("client node without a subnet"))?;
                for hop in path.windows(2) {
                    let (prev, next) = (hop[0], hop[1]);
                    debug!("Hop for {start} => {end}: {prev} => {next}");
                    self.work.add_internal_routes(
                        prev,
                        next,
                        nodes[prev as usize].addr,
                        nodes[next as usize].addr,
                        source_subnet,
                        dest_subnet,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Release the work backend.
    ///
    /// # Errors
    /// Fails when the backend cleanup fails.
    pub fn cleanup(mut self) -> Result<(), SetupError> {
        self.work.cleanup()?;
        Ok(())
    }

    /// Access the work backend.
    pub fn work(&self) -> &W {
        &self.work
    }

    /// Consume the driver, returning the work backend.
    pub fn into_work(self) -> W {
        self.work
    }
}

fn complete_edges<W: Work>(params: &SetupParams, work: &mut W) -> Result<Vec<Edge>, SetupError> {
    if params.edges.is_empty() {
        error!("No edge nodes were specified.");
        return Err(SetupError::NoEdgeNodes);
    }

    // Complete definitions for edge nodes by filling in default or missing
    // data
    let mut completed = Vec::with_capacity(params.edges.len());
    for spec in &params.edges {
        let intf = match (&spec.intf, &params.defaults.intf) {
            (Some(intf), _) => intf.clone(),
            (None, Some(intf)) => intf.clone(),
            (None, None) => {
                error!(
                    "No interface was specified for edge node with IP {}. Either specify an interface, or specify a default if all edge nodes are behind the same one.",
                    spec.ip
                );
                return Err(SetupError::EdgeInterfaceUnspecified(spec.ip));
            }
        };
        let mac = match spec.mac {
            Some(mac) => mac,
            None => work.resolve_remote_mac(&intf, spec.ip).map_err(|err| {
                error!(
                    "Could not locate the MAC address for edge node with IP {} on interface '{intf}'. Verify that the host is online, or configure the MAC address manually.",
                    spec.ip
                );
                err
            })?,
        };
        completed.push((spec.ip, intf, mac, spec.vsubnet));
    }

    // Automatically provide client subnets to unconfigured edge nodes
    let pending = completed.iter().filter(|(.., v)| v.is_none()).count();
    if pending > 0 {
        let global = params.defaults.global_vsubnet;
        let mut frags = FragmentIter::new(global, pending as u32).map_err(|_| {
            error!(
                "The virtual client subnet {global} is not large enough to provision {pending} edge nodes. Either increase the subnet size or decrease the number of edge nodes."
            );
            SetupError::VirtualSubnetTooSmall {
                subnet: global,
                edges: pending,
            }
        })?;
        for entry in &mut completed {
            if entry.3.is_none() {
                entry.3 = Some(
                    frags
                        .next()
                        .ok_or(SetupError::Bug("virtual subnet fragment iterator ended early"))?,
                );
            }
        }
    }

    // TODO scan for subnet overlaps

    let mut edges = Vec::with_capacity(completed.len());
    for (ip, intf, mac, vsubnet) in completed {
        let Some(vsubnet) = vsubnet else {
            return Err(SetupError::Bug("edge node without a virtual subnet"));
        };
        edges.push(Edge {
            ip,
            intf,
            mac,
            vsubnet,
        });
    }
    Ok(edges)
}

/// Ingestion state; receives the records emitted by the GraphML reader.
struct Ingest<'a, W: Work> {
    work: &'a mut W,
    edge_count: usize,
    /// Client flag for nodes that are only ever mentioned by links.
    client_default: bool,

    finished_nodes: bool,
    ignore_nodes: bool,
    ignore_edges: bool,

    nodes: Vec<NodeState>,
    /// External id to dense index; append-only.
    index: HashMap<String, usize>,
    client_count: u32,

    addrs: Ipv4HostIter,
    macs: MacAllocator,
    planner: Option<RoutePlanner>,
}

impl<W: Work> Ingest<'_, W> {
    fn create_state(&mut self, name: &str, client: bool) -> Result<usize, SetupError> {
        let Some(addr) = self.addrs.next() else {
            error!(
                "Cannot set up all of the virtual hosts because the non-routable IPv4 address space has been exhausted. Either decrease the number of nodes in the topology, or assign fewer addresses to the edge nodes."
            );
            return Err(SetupError::AddressSpaceExhausted);
        };
        let id = self.nodes.len();
        self.nodes.push(NodeState {
            addr,
            client,
            client_subnet: None,
            client_macs: [Mac::ZERO; MACS_PER_CLIENT],
        });
        self.index.insert(name.to_owned(), id);
        debug!("GraphML node '{name}' assigned identifier {id} and IP address {addr}");
        Ok(id)
    }

    /// Allocate client MACs where needed and create the host namespace.
    fn register_host(&mut self, id: usize, node: &TopoNode) -> Result<(), SetupError> {
        if node.client {
            let mut macs = [Mac::ZERO; MACS_PER_CLIENT];
            if self.macs.take(&mut macs).is_err() {
                error!("Ran out of MAC addresses when creating a new client node.");
                return Err(SetupError::MacSpaceExhausted);
            }
            self.nodes[id].client_macs = macs;
            self.client_count += 1;
        }
        let macs = self.nodes[id].client_macs;
        self.work
            .add_host(id as NodeId, self.nodes[id].addr, &macs, node)?;
        Ok(())
    }

    /// Transition taken when the first link arrives: the node section is
    /// complete, so the scaling check runs and the planner is sized.
    fn begin_links(&mut self) -> Result<(), SetupError> {
        self.finished_nodes = true;
        info!("Host creation complete. Now adding virtual ethernet connections.");
        let node_count = self.nodes.len();
        debug!("Encountered {node_count} nodes ({} clients)", self.client_count);

        if (self.client_count as usize) < self.edge_count {
            error!(
                "There are fewer client nodes in the topology ({}) than edge nodes ({}). Either use a larger topology, or decrease the number of edge nodes.",
                self.client_count, self.edge_count
            );
            return Err(SetupError::TooFewClients {
                clients: self.client_count,
                edges: self.edge_count,
            });
        }

        let worst_case_links = (node_count as u64) * (node_count as u64);
        self.work
            .ensure_scaling(worst_case_links, node_count as NodeId, self.client_count)?;
        self.planner = Some(RoutePlanner::new(node_count as NodeId));
        Ok(())
    }

    fn link_endpoint(&mut self, name: &str) -> Result<usize, SetupError> {
        if let Some(&id) = self.index.get(name) {
            return Ok(id);
        }
        if self.ignore_nodes {
            error!("Requested existing state for unknown host '{name}'");
            return Err(SetupError::UnknownNode(name.to_owned()));
        }
        // A link may mention a node that has no <node> element of its own;
        // materialise it with the default client flag
        let id = self.create_state(name, self.client_default)?;
        let node = TopoNode {
            id: name.to_owned(),
            client: self.client_default,
            ..TopoNode::default()
        };
        self.register_host(id, &node)?;
        if let Some(planner) = self.planner.as_mut() {
            planner.grow(self.nodes.len() as NodeId);
        }
        Ok(id)
    }
}

impl<W: Work> TopologySink for Ingest<'_, W> {
    type Error = SetupError;

    fn add_node(&mut self, node: &TopoNode) -> Result<(), SetupError> {
        if self.ignore_nodes {
            return Ok(());
        }
        if self.finished_nodes {
            error!(
                "The GraphML file contains some <node> elements after the <edge> elements. To parse this file, use two-pass parsing."
            );
            return Err(SetupError::LateNode(node.id.clone()));
        }

        let id = match self.index.get(node.id.as_str()) {
            Some(&id) => id,
            None => self.create_state(&node.id, node.client)?,
        };
        self.register_host(id, node)
    }

    fn add_link(&mut self, link: &TopoLink) -> Result<(), SetupError> {
        if self.ignore_edges {
            return Ok(());
        }
        if !self.finished_nodes {
            self.begin_links()?;
        }

        let source = self.link_endpoint(&link.source)?;
        let target = self.link_endpoint(&link.target)?;

        if source == target {
            if self.nodes[source].client {
                self.work.set_self_link(source as NodeId, link)?;
            }
            return Ok(());
        }

        let mut macs = [Mac::ZERO; MACS_PER_LINK];
        if self.macs.take(&mut macs).is_err() {
            error!("Ran out of MAC addresses when adding a new virtual ethernet connection.");
            return Err(SetupError::MacSpaceExhausted);
        }
        self.work.add_link(
            source as NodeId,
            target as NodeId,
            self.nodes[source].addr,
            self.nodes[target].addr,
            &macs,
            link,
        )?;

        if link.weight < 0.0 {
            error!(
                "The link from '{}' to '{}' in the topology has negative weight {}, which is not supported.",
                link.source, link.target, link.weight
            );
            return Err(SetupError::NegativeWeight {
                edge_source: link.source.clone(),
                target: link.target.clone(),
                weight: link.weight,
            });
        }
        let planner = self
            .planner
            .as_mut()
            .ok_or(SetupError::Bug("route planner missing during link ingestion"))?;
        planner.set_weight(source as NodeId, target as NodeId, link.weight);
        planner.set_weight(target as NodeId, source as NodeId, link.weight);
        Ok(())
    }
}

/// Nested iteration over the client subnets of every edge.
///
/// Each edge's virtual subnet is fragmented into as many client subnets as
/// the edge is due; crossing to the next edge happens when the current
/// fragment iterator runs dry. Per-edge capacities come from rounded
/// cumulative markers so that they sum to the client count exactly,
/// independent of floating-point rounding.
struct ClientSubnets<'a> {
    edges: &'a [Edge],
    clients_per_edge: f64,
    edge_idx: Option<usize>,
    frags: Option<FragmentIter>,
}

impl<'a> ClientSubnets<'a> {
    fn new(edges: &'a [Edge], clients_per_edge: f64) -> ClientSubnets<'a> {
        ClientSubnets {
            edges,
            clients_per_edge,
            edge_idx: None,
            frags: None,
        }
    }

    fn next_subnet(&mut self) -> Result<(Ipv4Prefix, usize), SetupError> {
        loop {
            if let (Some(frags), Some(idx)) = (self.frags.as_mut(), self.edge_idx) {
                if let Some(subnet) = frags.next() {
                    return Ok((subnet, idx));
                }
            }

            let idx = self.edge_idx.map_or(0, |i| i + 1);
            if idx >= self.edges.len() {
                return Err(SetupError::Bug("exhausted client node subnet space"));
            }
            self.edge_idx = Some(idx);

            let prev_marker = (self.clients_per_edge * idx as f64).round_ties_even();
            let next_marker = (self.clients_per_edge * (idx + 1) as f64).round_ties_even();
            let capacity = (next_marker - prev_marker) as u32;

            let edge = &self.edges[idx];
            debug!(
                "Now allocating {capacity} client subnets for edge {} (range {})",
                edge.ip, edge.vsubnet
            );
            self.frags = Some(FragmentIter::new(edge.vsubnet, capacity).map_err(|_| {
                SetupError::EdgeSubnetTooSmall {
                    subnet: edge.vsubnet,
                    edge: edge.ip,
                    clients: capacity,
                }
            })?);
        }
    }
}
