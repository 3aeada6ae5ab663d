// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! The GraphML parser state machine.

use crate::model::{TopoLink, TopoNode, TopologySink};
use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;
use thiserror::Error;
use tracing::debug;

/// The namespace a GraphML document is expected to declare.
pub const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Value of a node's `type` data that marks it as a client. When unset,
    /// every node is a client.
    pub client_type: Option<String>,
    /// Name of the edge data key that carries the routing weight.
    pub weight_key: String,
}

impl Default for ReaderOptions {
    fn default() -> ReaderOptions {
        ReaderOptions {
            client_type: None,
            weight_key: "latency".to_string(),
        }
    }
}

/// Fatal conditions encountered while reading a topology document.
#[derive(Debug, Error)]
pub enum GraphError<E: std::error::Error> {
    #[error("failed to read the GraphML document: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed attribute in the GraphML document: {0}")]
    Attr(#[from] AttrError),
    #[error("the topology file is not a GraphML file")]
    NotGraphml,
    #[error("the topology file uses an unknown GraphML namespace '{0}'")]
    UnknownNamespace(String),
    #[error("the key '{name}' in the topology file has unexpected type '{ty}'")]
    KeyType { name: String, ty: String },
    #[error("topology contains a node without an identifier")]
    NodeWithoutId,
    #[error("topology contains an edge that does not specify a source node")]
    EdgeWithoutSource,
    #[error("topology contains an edge that does not specify a target node")]
    EdgeWithoutTarget,
    #[error(
        "topology contains a directed edge from '{edge_source}' to '{target}'; only undirected edges are supported"
    )]
    DirectedEdge { edge_source: String, target: String },
    #[error("topology contains a data element with no key")]
    DataWithoutKey,
    #[error(transparent)]
    Sink(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Looking for the initial graphml element
    Initial,
    /// Waiting for keys or the graph
    TopLevel,
    /// Inside the graph element
    Graph,
    /// Inside a node element
    Node,
    /// Inside an edge element
    Edge,
    /// Inside a data element
    Data,
    /// Inside an unrecognised element
    Unknown,
}

#[derive(Debug, Default)]
struct NodeKeys {
    node_type: Option<String>,
    packet_loss: Option<String>,
    bandwidth_up: Option<String>,
    bandwidth_down: Option<String>,
}

#[derive(Debug, Default)]
struct EdgeKeys {
    latency: Option<String>,
    packet_loss: Option<String>,
    jitter: Option<String>,
    queue_len: Option<String>,
    weight: Option<String>,
}

struct Parser<'a, S: TopologySink> {
    sink: &'a mut S,
    options: &'a ReaderOptions,

    mode: Mode,
    unknown_depth: u32,
    unknown_return: Mode,

    default_undirected: bool,
    node_keys: NodeKeys,
    edge_keys: EdgeKeys,

    data_key: String,
    data_value: String,
    data_return: Mode,

    node: TopoNode,
    link: TopoLink,
}

/// Parse a GraphML document, feeding records into `sink`.
///
/// # Errors
/// Fails on malformed XML, on the fatal conditions listed in [`GraphError`],
/// and when the sink rejects a record.
pub fn parse_graphml<R, S>(
    input: R,
    sink: &mut S,
    options: &ReaderOptions,
) -> Result<(), GraphError<S::Error>>
where
    R: BufRead,
    S: TopologySink,
{
    let mut reader = Reader::from_reader(input);
    let mut parser = Parser {
        sink,
        options,
        mode: Mode::Initial,
        unknown_depth: 0,
        unknown_return: Mode::Initial,
        default_undirected: false,
        node_keys: NodeKeys::default(),
        edge_keys: EdgeKeys::default(),
        data_key: String::new(),
        data_value: String::new(),
        data_return: Mode::Graph,
        node: TopoNode::default(),
        link: TopoLink::default(),
    };

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(elem) => parser.start_element(&elem)?,
            Event::Empty(elem) => {
                // A self-closing element behaves as start immediately
                // followed by end
                parser.start_element(&elem)?;
                parser.end_element()?;
            }
            Event::End(_) => parser.end_element()?,
            Event::Text(text) => parser.characters(&text.unescape()?),
            Event::CData(data) => {
                let raw = data.into_inner();
                parser.characters(&String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

impl<S: TopologySink> Parser<'_, S> {
    fn start_element(&mut self, elem: &BytesStart<'_>) -> Result<(), GraphError<S::Error>> {
        let local = elem.local_name();
        let name = local.as_ref();
        let mut unknown = false;

        match self.mode {
            Mode::Unknown => self.unknown_depth += 1,

            Mode::Initial => {
                if name != b"graphml" {
                    return Err(GraphError::NotGraphml);
                }
                for attr in elem.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"xmlns" {
                        let ns = attr.unescape_value()?;
                        if ns != GRAPHML_NS {
                            return Err(GraphError::UnknownNamespace(ns.into_owned()));
                        }
                        break;
                    }
                }
                self.mode = Mode::TopLevel;
            }

            Mode::TopLevel => {
                if name == b"key" {
                    self.record_key(elem)?;
                    // Skip over <default> and other children of the key
                    unknown = true;
                } else if name == b"graph" {
                    for attr in elem.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"edgedefault" {
                            self.default_undirected = attr.unescape_value()? == "undirected";
                            break;
                        }
                    }
                    self.mode = Mode::Graph;
                } else {
                    unknown = true;
                }
            }

            Mode::Graph => {
                if name == b"node" {
                    self.begin_node(elem)?;
                } else if name == b"edge" {
                    self.begin_edge(elem)?;
                } else {
                    unknown = true;
                }
            }

            Mode::Node | Mode::Edge => {
                if name == b"data" {
                    let mut key = None;
                    for attr in elem.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"key" {
                            key = Some(attr.unescape_value()?.into_owned());
                            break;
                        }
                    }
                    let Some(key) = key else {
                        return Err(GraphError::DataWithoutKey);
                    };
                    self.data_key = key;
                    self.data_value.clear();
                    self.data_return = self.mode;
                    self.mode = Mode::Data;
                } else {
                    unknown = true;
                }
            }

            Mode::Data => unknown = true,
        }

        if unknown {
            self.unknown_return = self.mode;
            self.mode = Mode::Unknown;
            self.unknown_depth = 0;
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), GraphError<S::Error>> {
        match self.mode {
            Mode::Unknown => {
                if self.unknown_depth == 0 {
                    self.mode = self.unknown_return;
                } else {
                    self.unknown_depth -= 1;
                }
            }
            Mode::Data => {
                self.apply_data();
                self.mode = self.data_return;
            }
            Mode::Node => {
                self.sink.add_node(&self.node).map_err(GraphError::Sink)?;
                self.mode = Mode::Graph;
            }
            Mode::Edge => {
                self.sink.add_link(&self.link).map_err(GraphError::Sink)?;
                self.mode = Mode::Graph;
            }
            Mode::Graph => self.mode = Mode::TopLevel,
            Mode::TopLevel => {
                // End of the graphml element; nothing further is interpreted
                self.mode = Mode::Unknown;
                self.unknown_depth = 0;
                self.unknown_return = Mode::Unknown;
            }
            Mode::Initial => {}
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) {
        if self.mode == Mode::Data {
            self.data_value.push_str(text);
        }
    }

    fn begin_node(&mut self, elem: &BytesStart<'_>) -> Result<(), GraphError<S::Error>> {
        let mut id = None;
        for attr in elem.attributes() {
            let attr = attr?;
            if attr.key.as_ref() == b"id" {
                id = Some(attr.unescape_value()?.into_owned());
                break;
            }
        }
        let Some(id) = id else {
            return Err(GraphError::NodeWithoutId);
        };
        self.node = TopoNode {
            id,
            client: self.options.client_type.is_none(),
            ..TopoNode::default()
        };
        self.mode = Mode::Node;
        Ok(())
    }

    fn begin_edge(&mut self, elem: &BytesStart<'_>) -> Result<(), GraphError<S::Error>> {
        let mut undirected = self.default_undirected;
        let mut source = None;
        let mut target = None;
        for attr in elem.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"directed" => undirected = attr.unescape_value()? == "false",
                b"source" => source = Some(attr.unescape_value()?.into_owned()),
                b"target" => target = Some(attr.unescape_value()?.into_owned()),
                _ => {}
            }
        }
        let Some(source) = source else {
            return Err(GraphError::EdgeWithoutSource);
        };
        let Some(target) = target else {
            return Err(GraphError::EdgeWithoutTarget);
        };
        if !undirected {
            return Err(GraphError::DirectedEdge {
                edge_source: source,
                target,
            });
        }
        self.link = TopoLink {
            source,
            target,
            ..TopoLink::default()
        };
        self.mode = Mode::Edge;
        Ok(())
    }

    fn record_key(&mut self, elem: &BytesStart<'_>) -> Result<(), GraphError<S::Error>> {
        let mut name = None;
        let mut id = None;
        let mut ty = None;
        let mut key_for = None;
        for attr in elem.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"attr.name" => name = Some(attr.unescape_value()?.into_owned()),
                b"id" => id = Some(attr.unescape_value()?.into_owned()),
                b"attr.type" => ty = Some(attr.unescape_value()?.into_owned()),
                b"for" => key_for = Some(attr.unescape_value()?.into_owned()),
                _ => {}
            }
        }
        let (Some(name), Some(id), Some(ty), Some(key_for)) = (name, id, ty, key_for) else {
            return Ok(());
        };

        let numeric = matches!(ty.as_str(), "int" | "long" | "float" | "double");
        let integral = matches!(ty.as_str(), "int" | "long");
        let stringly = ty == "string";
        let wrong_type = || GraphError::KeyType {
            name: name.clone(),
            ty: ty.clone(),
        };

        match key_for.as_str() {
            "node" => {
                if name == "type" {
                    if !stringly {
                        return Err(wrong_type());
                    }
                    self.node_keys.node_type = Some(id.clone());
                } else if name == "packetloss" {
                    if !numeric {
                        return Err(wrong_type());
                    }
                    self.node_keys.packet_loss = Some(id.clone());
                } else if name == "bandwidthup" {
                    if !numeric {
                        return Err(wrong_type());
                    }
                    self.node_keys.bandwidth_up = Some(id.clone());
                } else if name == "bandwidthdown" {
                    if !numeric {
                        return Err(wrong_type());
                    }
                    self.node_keys.bandwidth_down = Some(id.clone());
                } else {
                    return Ok(());
                }
                debug!("bound node data key '{id}' to attribute '{name}'");
            }
            "edge" => {
                // Checks are independent rather than chained: the configured
                // weight key may alias one of the standard attributes
                let mut bound = false;
                if name == "latency" {
                    if !numeric {
                        return Err(wrong_type());
                    }
                    self.edge_keys.latency = Some(id.clone());
                    bound = true;
                }
                if name == "packetloss" {
                    if !numeric {
                        return Err(wrong_type());
                    }
                    self.edge_keys.packet_loss = Some(id.clone());
                    bound = true;
                }
                if name == "jitter" {
                    if !numeric {
                        return Err(wrong_type());
                    }
                    self.edge_keys.jitter = Some(id.clone());
                    bound = true;
                }
                if name == "queue_len" {
                    if !integral {
                        return Err(wrong_type());
                    }
                    self.edge_keys.queue_len = Some(id.clone());
                    bound = true;
                }
                if name == self.options.weight_key {
                    if !numeric {
                        return Err(wrong_type());
                    }
                    self.edge_keys.weight = Some(id.clone());
                    bound = true;
                }
                if bound {
                    debug!("bound edge data key '{id}' to attribute '{name}'");
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_data(&mut self) {
        let value = self.data_value.trim();
        let key = self.data_key.as_str();
        match self.data_return {
            Mode::Node => {
                if self.node_keys.node_type.as_deref() == Some(key) {
                    if let Some(client_type) = &self.options.client_type {
                        self.node.client = value == client_type;
                    }
                } else if self.node_keys.packet_loss.as_deref() == Some(key) {
                    self.node.packet_loss = value.parse().unwrap_or_default();
                } else if self.node_keys.bandwidth_up.as_deref() == Some(key) {
                    self.node.bandwidth_up = value.parse().unwrap_or_default();
                } else if self.node_keys.bandwidth_down.as_deref() == Some(key) {
                    self.node.bandwidth_down = value.parse().unwrap_or_default();
                }
            }
            Mode::Edge => {
                if self.edge_keys.latency.as_deref() == Some(key) {
                    self.link.latency = value.parse().unwrap_or_default();
                }
                if self.edge_keys.packet_loss.as_deref() == Some(key) {
                    self.link.packet_loss = value.parse().unwrap_or_default();
                }
                if self.edge_keys.jitter.as_deref() == Some(key) {
                    self.link.jitter = value.parse().unwrap_or_default();
                }
                if self.edge_keys.queue_len.as_deref() == Some(key) {
                    self.link.queue_len = value.parse().unwrap_or_default();
                }
                if self.edge_keys.weight.as_deref() == Some(key) {
                    self.link.weight = value.parse().unwrap_or_default();
                }
            }
            _ => {}
        }
    }
}
