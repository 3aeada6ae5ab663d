// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Emulation setup driver.
//!
//! The driver turns a GraphML topology and a set of edge-node definitions
//! into a concrete network plan: an interface address for every simulated
//! node, MAC addresses and a client subnet for every client node, and
//! hop-by-hop forwarding entries between every pair of clients. All side
//! effects on the host go through the [`Work`] capability, so the planning
//! logic itself touches no kernel state.

pub mod driver;
pub mod errors;
pub mod params;
pub mod work;

pub use driver::Setup;
pub use errors::SetupError;
pub use params::{EdgeDefaults, EdgeNode, GraphmlParams, SetupParams, TopologySource};
pub use work::{MACS_PER_CLIENT, MACS_PER_LINK, Work, WorkError};
