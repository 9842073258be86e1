//! `Pool`: the process-lifetime, singleton-per-handle connection pool
//! (`spec.md` §3, §4.1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::client::NodeClient;
use crate::config::PoolConfig;
use crate::connector;
use crate::error::{Error, ErrorKind, Result};
use crate::event::PoolEvent;
use crate::node::{BrokerUrl, NodeState};
use crate::prober;
use crate::selector::{self, Candidate};
use crate::stats::{NodeStats, PoolStats};

struct PoolMembership {
    closed: bool,
}

/// A single logical handle to a cluster of broker nodes.
///
/// Construct with [`Pool::new`], bring it up with [`Pool::start`], and tear
/// it down with [`Pool::close`]. `Close` is idempotent; every other method
/// remains callable (and fails fast with
/// [`ErrorKind::PoolClosed`](crate::error::ErrorKind::PoolClosed) where
/// applicable) after the pool is closed.
pub struct Pool {
    config: Arc<PoolConfig>,
    nodes: Arc<Vec<Arc<NodeState>>>,
    /// Guards `closed`. Lock order: this lock is always acquired before any
    /// node lock, never the reverse (`spec.md` §5).
    membership: RwLock<PoolMembership>,
    round_robin: AtomicU64,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    cancel: CancellationToken,
    prober_handle: Mutex<Option<JoinHandle<()>>>,
    created_at: Instant,
}

impl Pool {
    /// Allocate `NodeState`s (each initially unhealthy, no client, weight 1)
    /// in the order of `config.urls`, without performing any I/O.
    pub fn new(config: PoolConfig) -> Self {
        let urls = config.effective_urls();
        let nodes: Vec<Arc<NodeState>> = urls
            .into_iter()
            .map(|url| Arc::new(NodeState::new(url)))
            .collect();

        Self {
            config: Arc::new(config),
            nodes: Arc::new(nodes),
            membership: RwLock::new(PoolMembership { closed: false }),
            round_robin: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            prober_handle: Mutex::new(None),
            created_at: Instant::now(),
        }
    }

    /// `Ok(true)`/`Ok(false)` reflect the membership flag; `Err` surfaces a
    /// poisoned lock as `ErrorKind::Internal` instead of panicking, per the
    /// crate's propagate-don't-panic error discipline.
    fn is_closed(&self) -> Result<bool> {
        Ok(self
            .membership
            .read()
            .map_err(|_| Error::internal("pool membership lock poisoned"))?
            .closed)
    }

    /// Launch a Connector run for every node and start the Health Prober.
    /// Returns as soon as these tasks are launched; `GetClient` will fail
    /// with `ErrNoHealthyNodes` until at least one node becomes healthy.
    pub fn start(&self) -> Result<()> {
        if self.is_closed()? {
            return Err(Error::pool_closed());
        }

        for node in self.nodes.iter() {
            connector::trigger(node.clone(), self.config.clone(), self.cancel.clone());
        }

        let handle = prober::spawn(self.nodes.clone(), self.config.clone(), self.cancel.clone());
        *self
            .prober_handle
            .lock()
            .map_err(|_| Error::internal("prober handle lock poisoned"))? = Some(handle);

        info!(node_count = self.nodes.len(), "pool started");
        self.config.event_handler.handle(PoolEvent::PoolStarted);
        Ok(())
    }

    /// Idempotent: the first call cancels every background task, stops the
    /// health-probe ticker, and asks every present client to close,
    /// aggregating any errors. Second and later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        {
            let mut guard = self
                .membership
                .write()
                .map_err(|_| Error::internal("pool membership lock poisoned"))?;
            if guard.closed {
                return Ok(());
            }
            guard.closed = true;
        }

        self.cancel.cancel();

        let prober_handle = self
            .prober_handle
            .lock()
            .map_err(|_| Error::internal("prober handle lock poisoned"))?
            .take();
        if let Some(handle) = prober_handle {
            handle.abort();
        }

        let mut failures = Vec::new();
        for node in self.nodes.iter() {
            if let Some(client) = node.take_client().await {
                if let Err(e) = client.close().await {
                    failures.push((node.url().clone(), e));
                }
            }
        }

        info!("pool closed");
        self.config.event_handler.handle(PoolEvent::PoolClosed);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::PoolClose { failures }))
        }
    }

    /// Select one healthy node's client according to the configured
    /// policy. Never blocks on I/O (`spec.md` §5).
    pub async fn get_client(&self) -> Result<Arc<dyn NodeClient>> {
        self.total_requests.fetch_add(1, Ordering::SeqCst);

        let closed = match self.is_closed() {
            Ok(closed) => closed,
            Err(e) => {
                self.total_failures.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };
        if closed {
            self.total_failures.fetch_add(1, Ordering::SeqCst);
            return Err(Error::pool_closed());
        }

        struct Healthy {
            node: Arc<NodeState>,
            client: Arc<dyn NodeClient>,
        }

        let mut healthy = Vec::new();
        let mut candidates = Vec::new();
        for node in self.nodes.iter() {
            let snapshot = node.snapshot().await;
            let Some(client) = snapshot.client else {
                continue;
            };
            if snapshot.healthy && client.is_connected() {
                candidates.push(Candidate {
                    total_used: node.total_used(),
                    weight: snapshot.weight,
                });
                healthy.push(Healthy {
                    node: node.clone(),
                    client,
                });
            }
        }

        if self.config.debug {
            trace!(
                strategy = ?self.config.strategy,
                healthy_urls = ?healthy.iter().map(|h| h.node.url().to_string()).collect::<Vec<_>>(),
                "selection candidates"
            );
        }

        let Some(idx) = selector::select(self.config.strategy, &candidates, &self.round_robin)
        else {
            self.total_failures.fetch_add(1, Ordering::SeqCst);
            return Err(Error::no_healthy_nodes());
        };

        let chosen = &healthy[idx];
        chosen.node.record_selected().await;
        Ok(chosen.client.clone())
    }

    /// Number of nodes currently satisfying the healthy predicate (I1).
    pub async fn get_healthy_node_count(&self) -> usize {
        let mut count = 0;
        for node in self.nodes.iter() {
            if node.is_healthy().await {
                count += 1;
            }
        }
        count
    }

    /// Update a node's weight, used by `WeightedRoundRobin`. A weight of
    /// zero disables the node for `WeightedRoundRobin` only; other
    /// policies are unaffected (`spec.md` §4.6).
    pub async fn set_node_weight(&self, url: &BrokerUrl, weight: u32) -> Result<()> {
        for node in self.nodes.iter() {
            if node.url() == url {
                node.set_weight(weight).await;
                return Ok(());
            }
        }
        Err(Error::node_not_found(url.clone()))
    }

    /// A point-in-time statistics snapshot. Not atomic across nodes, but
    /// each node's tuple is internally consistent.
    pub async fn get_stats(&self) -> PoolStats {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut healthy_nodes = 0;
        for node in self.nodes.iter() {
            let snapshot = node.snapshot().await;
            let connected = snapshot
                .client
                .as_deref()
                .is_some_and(NodeClient::is_connected);
            if snapshot.healthy {
                healthy_nodes += 1;
            }
            nodes.push(NodeStats {
                url: node.url().clone(),
                healthy: snapshot.healthy,
                connected,
                total_used: node.total_used(),
                failures: node.failures(),
                weight: snapshot.weight,
                last_used: snapshot.last_used,
            });
        }

        PoolStats {
            total_nodes: self.nodes.len(),
            healthy_nodes,
            total_requests: self.total_requests.load(Ordering::SeqCst),
            total_failures: self.total_failures.load(Ordering::SeqCst),
            nodes,
        }
    }

    /// How long ago this pool was constructed. Purely observational.
    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
