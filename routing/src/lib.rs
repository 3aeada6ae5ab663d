// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! All-pairs shortest-path planning over the emulated topology.

mod planner;

pub use planner::{NodeId, RoutePlanner};
