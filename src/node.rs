//! `NodeState`: the pool's per-URL record.
//!
//! One `NodeState` is created per configured broker URL at pool construction
//! and destroyed only when the pool is dropped (I5 in `spec.md`/`SPEC_FULL.md`
//! — the node list's length and index order never change after `NewPool`).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::client::NodeClient;

/// A broker URL, newtyped so that URL-keyed lookups can't be confused with
/// other string parameters passed around the pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub struct BrokerUrl(pub(crate) String);

impl BrokerUrl {
    /// Construct a new broker URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BrokerUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BrokerUrl {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// The fields of a `NodeState` that mutate together under one read/write
/// lock: the owned client handle, the derived `healthy` flag, the
/// configured weight, and the timestamp of the most recent successful
/// selection.
struct NodeInner {
    client: Option<Arc<dyn NodeClient>>,
    healthy: bool,
    weight: u32,
    last_used: Option<Instant>,
}

/// Per-node record tracked by the pool.
///
/// `total_used` and `failures` are atomics so statistics can be read without
/// taking the node lock (`spec.md` §5); everything else that can change
/// together lives behind `inner`.
pub struct NodeState {
    pub(crate) url: BrokerUrl,
    inner: RwLock<NodeInner>,
    /// Re-entrancy guard for the Connector (I2): at most one in-flight
    /// Connector run exists for a given node at a time.
    connecting: AtomicBool,
    total_used: AtomicU64,
    failures: AtomicU64,
}

impl fmt::Debug for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeState")
            .field("url", &self.url)
            .field("connecting", &self.connecting.load(Ordering::Relaxed))
            .field("total_used", &self.total_used.load(Ordering::Relaxed))
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

/// A point-in-time, internally-consistent view of one node's mutable state.
pub(crate) struct NodeSnapshot {
    pub(crate) client: Option<Arc<dyn NodeClient>>,
    pub(crate) healthy: bool,
    pub(crate) weight: u32,
    pub(crate) last_used: Option<Instant>,
}

impl NodeState {
    pub(crate) fn new(url: BrokerUrl) -> Self {
        Self {
            url,
            inner: RwLock::new(NodeInner {
                client: None,
                healthy: false,
                weight: 1,
                last_used: None,
            }),
            connecting: AtomicBool::new(false),
            total_used: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn url(&self) -> &BrokerUrl {
        &self.url
    }

    pub(crate) fn total_used(&self) -> u64 {
        self.total_used.load(Ordering::SeqCst)
    }

    pub(crate) fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// I2: attempt to transition Disconnected -> Connecting. Returns `true`
    /// if this call won the race and must run (and eventually clear) the
    /// attempt; `false` means another attempt is already in flight and this
    /// invocation is a no-op.
    pub(crate) fn try_begin_connecting(&self) -> bool {
        self.connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the re-entrancy guard once an attempt (success or failure) has
    /// finished.
    pub(crate) fn finish_connecting(&self) {
        self.connecting.store(false, Ordering::Release);
    }

    pub(crate) async fn snapshot(&self) -> NodeSnapshot {
        let inner = self.inner.read().await;
        NodeSnapshot {
            client: inner.client.clone(),
            healthy: inner.healthy,
            weight: inner.weight,
            last_used: inner.last_used,
        }
    }

    /// I1: true iff a client is present, the node is marked healthy, and the
    /// client itself reports its transport open.
    pub(crate) async fn is_healthy(&self) -> bool {
        let inner = self.inner.read().await;
        inner.healthy && inner.client.as_deref().is_some_and(NodeClient::is_connected)
    }

    pub(crate) async fn current_client(&self) -> Option<Arc<dyn NodeClient>> {
        self.inner.read().await.client.clone()
    }

    /// I3: take the currently-owned client (if any) out of the node,
    /// leaving it clientless. The caller is responsible for closing the
    /// returned handle before installing a replacement.
    pub(crate) async fn take_client(&self) -> Option<Arc<dyn NodeClient>> {
        let mut inner = self.inner.write().await;
        inner.healthy = false;
        inner.client.take()
    }

    /// Install a newly-connected client and mark the node healthy. Must
    /// only be called after any prior client has already been closed (I3).
    pub(crate) async fn install_client(&self, client: Arc<dyn NodeClient>) {
        let mut inner = self.inner.write().await;
        inner.client = Some(client);
        inner.healthy = true;
    }

    pub(crate) fn record_connect_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) async fn set_healthy(&self, healthy: bool) {
        let mut inner = self.inner.write().await;
        inner.healthy = healthy;
    }

    pub(crate) async fn set_weight(&self, weight: u32) {
        let mut inner = self.inner.write().await;
        inner.weight = weight;
    }

    /// Record a successful selection: bump `total_used` and stamp
    /// `last_used` under the node write lock.
    pub(crate) async fn record_selected(&self) {
        self.total_used.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.write().await;
        inner.last_used = Some(Instant::now());
    }
}
