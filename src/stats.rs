//! Point-in-time statistics snapshots returned by `Pool::get_stats`
//! (`spec.md` §4.7).

use std::time::Instant;

use crate::node::BrokerUrl;

/// Per-node tuple; internally consistent (read under one node lock) even
/// though the overall `PoolStats` snapshot is not atomic across nodes.
#[derive(Clone, Debug)]
pub struct NodeStats {
    /// The node's broker URL.
    pub url: BrokerUrl,
    /// Whether the node is currently marked healthy.
    pub healthy: bool,
    /// Whether the node's client currently reports its transport open.
    pub connected: bool,
    /// Total number of successful selections of this node.
    pub total_used: u64,
    /// Total number of connect failures recorded for this node.
    pub failures: u64,
    /// The node's configured weight.
    pub weight: u32,
    /// The timestamp of the most recent successful selection, if any.
    pub last_used: Option<Instant>,
}

/// A point-in-time snapshot of the whole pool.
#[derive(Clone, Debug)]
pub struct PoolStats {
    /// Total number of configured nodes.
    pub total_nodes: usize,
    /// Number of nodes currently satisfying the healthy predicate.
    pub healthy_nodes: usize,
    /// Total `GetClient` calls since `NewPool`.
    pub total_requests: u64,
    /// Total `GetClient` calls that returned an error.
    pub total_failures: u64,
    /// Per-node statistics, in the pool's stable node index order.
    pub nodes: Vec<NodeStats>,
}
