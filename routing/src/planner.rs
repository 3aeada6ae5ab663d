// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Dense all-pairs shortest-path computation.

use tracing::debug;

/// Nodes are identified by their dense index in the planner.
pub type NodeId = u32;

const NO_HOP: NodeId = NodeId::MAX;

/// All-pairs shortest-path planner for a small dense undirected graph.
///
/// Link weights are recorded into an `n × n` matrix; [`RoutePlanner::plan`]
/// runs Floyd–Warshall and fills a successor matrix from which
/// [`RoutePlanner::route`] reconstructs hop sequences. Relaxation is strict,
/// so among equal-cost paths the one through the lowest intermediate node id
/// wins and planning is deterministic.
#[derive(Debug, Clone)]
pub struct RoutePlanner {
    nodes: usize,
    dist: Vec<f64>,
    next_hop: Vec<NodeId>,
}

impl RoutePlanner {
    #[must_use]
    pub fn new(nodes: NodeId) -> RoutePlanner {
        let n = nodes as usize;
        let mut dist = vec![f64::INFINITY; n * n];
        for i in 0..n {
            dist[i * n + i] = 0.0;
        }
        RoutePlanner {
            nodes: n,
            dist,
            next_hop: vec![NO_HOP; n * n],
        }
    }

    /// Number of nodes the planner was sized for.
    #[must_use]
    pub fn node_count(&self) -> NodeId {
        self.nodes as NodeId
    }

    /// Extend the matrices to cover `nodes` nodes, keeping recorded weights.
    /// Shrinking is not supported; a smaller count is a no-op.
    pub fn grow(&mut self, nodes: NodeId) {
        let new = nodes as usize;
        let old = self.nodes;
        if new <= old {
            return;
        }
        let mut dist = vec![f64::INFINITY; new * new];
        let mut next_hop = vec![NO_HOP; new * new];
        for i in 0..new {
            dist[i * new + i] = 0.0;
        }
        for i in 0..old {
            dist[i * new..i * new + old].copy_from_slice(&self.dist[i * old..(i + 1) * old]);
            next_hop[i * new..i * new + old]
                .copy_from_slice(&self.next_hop[i * old..(i + 1) * old]);
        }
        self.nodes = new;
        self.dist = dist;
        self.next_hop = next_hop;
    }

    /// Record the weight of a direct link. The caller records both directions
    /// of an undirected link.
    ///
    /// # Panics
    /// Panics if either node is outside the planner.
    pub fn set_weight(&mut self, from: NodeId, to: NodeId, weight: f64) {
        let n = self.nodes;
        let (s, t) = (from as usize, to as usize);
        assert!(s < n && t < n, "link endpoint outside the planner");
        self.dist[s * n + t] = weight;
        self.next_hop[s * n + t] = to;
    }

    /// Compute shortest paths between all node pairs.
    pub fn plan(&mut self) {
        let n = self.nodes;
        debug!("planning routes between all pairs of {n} nodes");
        for k in 0..n {
            for i in 0..n {
                let dik = self.dist[i * n + k];
                if dik.is_infinite() {
                    continue;
                }
                for j in 0..n {
                    let alt = dik + self.dist[k * n + j];
                    if alt < self.dist[i * n + j] {
                        self.dist[i * n + j] = alt;
                        self.next_hop[i * n + j] = self.next_hop[i * n + k];
                    }
                }
            }
        }
    }

    /// Reconstruct the node sequence `[from, …, to]` of the shortest path, or
    /// `None` when `to` is unreachable.
    #[must_use]
    pub fn route(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let n = self.nodes;
        let (s, t) = (from as usize, to as usize);
        if s >= n || t >= n {
            return None;
        }
        if s == t {
            return Some(vec![from]);
        }
        if self.dist[s * n + t].is_infinite() {
            return None;
        }

        let mut path = vec![from];
        let mut current = s;
        while current != t {
            let hop = self.next_hop[current * n + t];
            if hop == NO_HOP || path.len() > n {
                // A finite distance with no successor chain is a bug
                return None;
            }
            path.push(hop);
            current = hop as usize;
        }
        Some(path)
    }
}
