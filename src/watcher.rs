//! The Liveness Watcher: a per-node background task tied to one connected
//! client (`spec.md` §4.3).
//!
//! Launched each time the Connector transitions a node to `Connected`.
//! Polls a fixed 10-second interval, independent of `HealthCheckInterval`
//! (the reference source hard-codes this constant; `SPEC_FULL.md` §9
//! preserves that choice rather than making it configurable). When the
//! client it was spawned for is replaced by a newer connection, this
//! Watcher's next tick sees that staleness (via `Arc::ptr_eq` against the
//! node's current client) and exits harmlessly rather than clobbering the
//! new Watcher's work.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::NodeClient;
use crate::config::PoolConfig;
use crate::connector;
use crate::event::PoolEvent;
use crate::node::NodeState;

/// Fixed poll period for the Liveness Watcher, independent of the pool's
/// configured `HealthCheckInterval`.
pub(crate) const WATCHER_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) fn spawn(
    node: Arc<NodeState>,
    client: Arc<dyn NodeClient>,
    config: Arc<PoolConfig>,
    cancel: CancellationToken,
) {
    tokio::spawn(run(node, client, config, cancel));
}

async fn run(
    node: Arc<NodeState>,
    client: Arc<dyn NodeClient>,
    config: Arc<PoolConfig>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(WATCHER_POLL_INTERVAL) => {}
        }

        if cancel.is_cancelled() {
            return;
        }

        if client.is_connected() {
            debug!(url = %node.url(), "watcher tick: node still connected");
            continue;
        }

        // The client this Watcher was spawned for has gone stale. Only act
        // if the node hasn't since moved on to a newer client — otherwise
        // this is a harmless race with the new Watcher (SPEC_FULL.md §9).
        let current = node.current_client().await;
        let still_current = current
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(c, &client));
        if !still_current {
            debug!(url = %node.url(), "watcher for stale client exiting");
            return;
        }

        node.set_healthy(false).await;
        info!(url = %node.url(), "watcher detected connection loss");
        config
            .event_handler
            .handle(PoolEvent::NodeLost { url: node.url().clone() });

        connector::trigger(node, config, cancel);
        return;
    }
}
