//! The pool-level Health Prober (`spec.md` §4.4).
//!
//! A single ticker at `HealthCheckInterval` that iterates every node as a
//! safety net layered above the per-node Liveness Watcher: it catches a
//! node whose Watcher hasn't ticked yet, a node that never had a client in
//! the first place, and recovery (a node reporting connected again after
//! having been marked unhealthy).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::connector;
use crate::event::PoolEvent;
use crate::node::NodeState;

/// Start the prober loop as a background task. Returns a handle the pool
/// can abort on `Close`.
pub(crate) fn spawn(
    nodes: Arc<Vec<Arc<NodeState>>>,
    config: Arc<PoolConfig>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(nodes, config, cancel))
}

async fn run(nodes: Arc<Vec<Arc<NodeState>>>, config: Arc<PoolConfig>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(config.health_check_interval);
    // The first tick fires immediately; `Start` happens-before the first
    // Prober tick (`spec.md` §5), which this satisfies trivially since the
    // ticker is created after the Connectors have already been launched.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if cancel.is_cancelled() {
            return;
        }

        debug!(node_count = nodes.len(), "health prober tick");
        let checks = nodes
            .iter()
            .cloned()
            .map(|node| probe_node(node, config.clone(), cancel.clone()));
        futures_util::future::join_all(checks).await;
    }
}

async fn probe_node(node: Arc<NodeState>, config: Arc<PoolConfig>, cancel: CancellationToken) {
    let snapshot = node.snapshot().await;

    match snapshot.client {
        None => {
            node.set_healthy(false).await;
            connector::trigger(node, config, cancel);
        }
        Some(client) if !client.is_connected() => {
            node.set_healthy(false).await;
            connector::trigger(node, config, cancel);
        }
        Some(_) if !snapshot.healthy => {
            // Connected, but not yet marked healthy: recovery detection.
            node.set_healthy(true).await;
            info!(url = %node.url(), "health prober detected recovery");
            config
                .event_handler
                .handle(PoolEvent::NodeRecovered { url: node.url().clone() });
        }
        Some(_) => {}
    }
}
