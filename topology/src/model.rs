// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Node and link records emitted by the reader.

/// A node of the topology with its traffic-shaping attributes.
///
/// Attribute fields keep their zero defaults when the document does not
/// provide the corresponding data key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopoNode {
    /// External identifier from the GraphML `id` attribute.
    pub id: String,
    /// Whether the node serves client traffic.
    pub client: bool,
    pub packet_loss: f64,
    pub bandwidth_up: f64,
    pub bandwidth_down: f64,
}

/// An undirected link between two topology nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopoLink {
    pub source: String,
    pub target: String,
    pub latency: f64,
    pub packet_loss: f64,
    pub jitter: f64,
    pub queue_len: u32,
    /// Routing weight, taken from the data key configured as the weight key.
    pub weight: f64,
}

/// Receiver for the records emitted during a parse.
///
/// Returning an error from either callback aborts the parse; the error is
/// handed back unchanged as [`GraphError::Sink`](crate::GraphError::Sink).
pub trait TopologySink {
    type Error: std::error::Error;

    fn add_node(&mut self, node: &TopoNode) -> Result<(), Self::Error>;
    fn add_link(&mut self, link: &TopoLink) -> Result<(), Self::Error>;
}
