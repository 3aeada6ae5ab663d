// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! The error results used by this library.

use crate::work::WorkError;
use net::Ipv4Prefix;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no edge nodes were specified")]
    NoEdgeNodes,

    #[error(
        "no interface was specified for edge node with IP {0} and no default interface is configured"
    )]
    EdgeInterfaceUnspecified(Ipv4Addr),

    #[error("the virtual client subnet {subnet} is not large enough to provision {edges} edge nodes")]
    VirtualSubnetTooSmall { subnet: Ipv4Prefix, edges: usize },

    #[error("the client subnet {subnet} of edge node {edge} is not large enough for {clients} client nodes")]
    EdgeSubnetTooSmall {
        subnet: Ipv4Prefix,
        edge: Ipv4Addr,
        clients: u32,
    },

    #[error("the non-routable IPv4 address space has been exhausted")]
    AddressSpaceExhausted,

    #[error("the 48-bit MAC address space has been exhausted")]
    MacSpaceExhausted,

    #[error("cannot make two parsing passes over a non-seekable topology source")]
    TwoPassUnseekable,

    #[error("node '{0}' appeared after the first edge; use two-pass parsing for unsorted files")]
    LateNode(String),

    #[error("a link references the unknown node '{0}'")]
    UnknownNode(String),

    #[error("the topology has fewer client nodes ({clients}) than edge nodes ({edges})")]
    TooFewClients { clients: u32, edges: usize },

    #[error("the topology does not contain any links")]
    NoLinks,

    #[error("the link from '{edge_source}' to '{target}' has negative weight {weight}")]
    NegativeWeight {
        edge_source: String,
        target: String,
        weight: f64,
    },

    #[error("invalid topology: {0}")]
    Graph(String),

    #[error("failed to read the topology source: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Work(#[from] WorkError),

    #[error("BUG: {0}")]
    Bug(&'static str),
}
