//! The per-node reconnection state machine (`spec.md` §4.2).
//!
//! States: `Disconnected` (no client, or client reports closed) ·
//! `Connecting` (`NodeState::try_begin_connecting` has claimed the guard) ·
//! `Connected` (`healthy = true`). The Connector does not itself bound
//! retry attempts — on failure it always arms a one-shot timer to try
//! again, for the life of the pool (`MaxReconnectAttempt` bounds only the
//! façade's own internal retry loop, see `spec.md` §9).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::event::PoolEvent;
use crate::node::NodeState;
use crate::watcher;

/// Invoke the Connector for `node`. A no-op if an attempt is already in
/// flight (I2). Spawns its own task, so callers never block on this.
pub(crate) fn trigger(node: Arc<NodeState>, config: Arc<PoolConfig>, cancel: CancellationToken) {
    if cancel.is_cancelled() {
        return;
    }
    tokio::spawn(run(node, config, cancel));
}

async fn run(node: Arc<NodeState>, config: Arc<PoolConfig>, cancel: CancellationToken) {
    if !node.try_begin_connecting() {
        debug!(url = %node.url(), "connector already in flight, skipping");
        return;
    }

    let url = node.url().clone();
    let client = config.client_factory.create(
        &url,
        config.max_reconnect_attempt,
        config.reconnect_interval,
    );

    let connect_result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            node.finish_connecting();
            return;
        }
        result = client.connect(cancel.clone()) => result,
    };

    match connect_result {
        Ok(()) => {
            // I3: close any prior client before the new one is ever visible
            // to the Selector.
            if let Some(prior) = node.take_client().await {
                if let Err(e) = prior.close().await {
                    warn!(url = %url, error = %e, "error closing prior connection during reconnect");
                }
            }
            node.install_client(client.clone()).await;
            node.finish_connecting();

            info!(url = %url, "node connected");
            config
                .event_handler
                .handle(PoolEvent::NodeConnected { url: url.clone() });

            watcher::spawn(node, client, config, cancel);
        }
        Err(e) => {
            node.record_connect_failure();
            node.set_healthy(false).await;
            node.finish_connecting();

            warn!(url = %url, error = %e, "connect attempt failed");
            config.event_handler.handle(PoolEvent::ConnectAttemptFailed {
                url: url.clone(),
                message: e.to_string(),
            });

            schedule_retry(node, config, cancel);
        }
    }
}

fn schedule_retry(node: Arc<NodeState>, config: Arc<PoolConfig>, cancel: CancellationToken) {
    let delay = config.reconnect_interval;
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                trigger(node, config, cancel);
            }
        }
    });
}
