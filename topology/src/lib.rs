// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Streaming GraphML topology reader.
//!
//! The reader walks a GraphML document with a pull parser and drives a small
//! state machine that emits fully-populated node and link records into a
//! [`TopologySink`] as soon as their elements close. Nothing of the document
//! is buffered beyond the record currently being assembled, so arbitrarily
//! large topologies parse in constant memory.

mod model;
mod reader;

pub use model::{TopoLink, TopoNode, TopologySink};
pub use reader::{GRAPHML_NS, GraphError, ReaderOptions, parse_graphml};
