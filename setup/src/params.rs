// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Configuration records consumed by the setup driver.

use net::{Ipv4Prefix, Mac};
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Where the GraphML topology is read from.
///
/// File and memory sources can be read multiple times and therefore support
/// two-pass parsing; standard input cannot.
#[derive(Debug, Clone)]
pub enum TopologySource {
    File(PathBuf),
    Stdin,
    Memory(String),
}

impl Display for TopologySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologySource::File(path) => write!(f, "{}", path.display()),
            TopologySource::Stdin => write!(f, "<stdin>"),
            TopologySource::Memory(_) => write!(f, "<memory>"),
        }
    }
}

/// One configured edge node. Unset fields are completed by the driver: the
/// interface falls back to the default, the MAC is resolved through the
/// `Work` capability, and the virtual subnet is carved out of the global
/// virtual subnet.
#[derive(Debug, Clone)]
pub struct EdgeNode {
    pub ip: Ipv4Addr,
    pub intf: Option<String>,
    pub mac: Option<Mac>,
    pub vsubnet: Option<Ipv4Prefix>,
}

impl EdgeNode {
    #[must_use]
    pub fn new(ip: Ipv4Addr) -> EdgeNode {
        EdgeNode {
            ip,
            intf: None,
            mac: None,
            vsubnet: None,
        }
    }

    #[must_use]
    pub fn set_intf(mut self, intf: &str) -> EdgeNode {
        self.intf = Some(intf.to_owned());
        self
    }

    #[must_use]
    pub fn set_mac(mut self, mac: Mac) -> EdgeNode {
        self.mac = Some(mac);
        self
    }

    #[must_use]
    pub fn set_vsubnet(mut self, vsubnet: Ipv4Prefix) -> EdgeNode {
        self.vsubnet = Some(vsubnet);
        self
    }
}

/// Fallbacks applied while completing [`EdgeNode`] definitions.
#[derive(Debug, Clone)]
pub struct EdgeDefaults {
    /// Interface used by edge nodes that do not name one.
    pub intf: Option<String>,
    /// Parent subnet fragmented across edge nodes without a `vsubnet`.
    pub global_vsubnet: Ipv4Prefix,
}

/// Top-level driver configuration.
#[derive(Debug, Clone)]
pub struct SetupParams {
    /// Prefix for the namespaces owned by this emulation instance.
    pub ns_prefix: String,
    pub ovs_dir: PathBuf,
    pub ovs_schema: PathBuf,
    /// Soft cap, in bytes, passed to the scaling check.
    pub soft_mem_cap: u64,
    pub source: TopologySource,
    pub edges: Vec<EdgeNode>,
    pub defaults: EdgeDefaults,
}

impl SetupParams {
    #[must_use]
    pub fn new(source: TopologySource, global_vsubnet: Ipv4Prefix) -> SetupParams {
        SetupParams {
            ns_prefix: "nm-".to_owned(),
            ovs_dir: PathBuf::from("/var/run/netmirage"),
            ovs_schema: PathBuf::from("/usr/share/openvswitch/vswitch.ovsschema"),
            soft_mem_cap: 0,
            source,
            edges: Vec::new(),
            defaults: EdgeDefaults {
                intf: None,
                global_vsubnet,
            },
        }
    }

    #[must_use]
    pub fn add_edge(mut self, edge: EdgeNode) -> SetupParams {
        self.edges.push(edge);
        self
    }

    #[must_use]
    pub fn set_default_intf(mut self, intf: &str) -> SetupParams {
        self.defaults.intf = Some(intf.to_owned());
        self
    }
}

/// Options for topology ingestion.
#[derive(Debug, Clone)]
pub struct GraphmlParams {
    /// Read the source twice: nodes on the first pass, edges on the second.
    /// Required for files whose edges precede some of their nodes.
    pub two_pass: bool,
    /// Node `type` value identifying clients; when unset every node is one.
    pub client_type: Option<String>,
    /// Edge data key carrying the routing weight.
    pub weight_key: String,
}

impl Default for GraphmlParams {
    fn default() -> GraphmlParams {
        GraphmlParams {
            two_pass: false,
            client_type: None,
            weight_key: "latency".to_owned(),
        }
    }
}
