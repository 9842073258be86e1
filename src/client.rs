//! The single-connection client façade consumed by the pool.
//!
//! This is an external collaborator: the wire-protocol codec and the actual
//! transport live behind this trait and are out of scope for the core (see
//! `spec.md` §1, §6). The pool depends only on this capability, never on a
//! concrete implementation, so any broker protocol can be fronted by
//! implementing [`NodeClient`] and handing a [`NodeClientFactory`] to
//! [`PoolConfig`](crate::config::PoolConfig).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::node::BrokerUrl;

/// One logical connection (transport + channel) to a single broker node.
///
/// Implementations must make `is_connected` a cheap, non-blocking check of
/// local state (e.g. an internal flag flipped when the transport closes) —
/// the pool's `GetClient` calls it while holding only the node's lock and
/// must never perform I/O (`spec.md` §5).
#[async_trait]
pub trait NodeClient: Send + Sync + fmt::Debug {
    /// Establish one connection and one logical channel. Implementations
    /// must internally retry up to the configured maximum reconnect
    /// attempt count, spaced by the configured reconnect interval, before
    /// giving up (`spec.md` §6); the pool's own `Connector` treats a single
    /// call to `connect` as one attempt.
    async fn connect(&self, cancel: CancellationToken) -> Result<()>;

    /// True iff the underlying connection object exists and reports itself
    /// as not-closed. Must not block on I/O.
    fn is_connected(&self) -> bool;

    /// Idempotent teardown of channel then connection.
    async fn close(&self) -> Result<()>;

    /// Publish a message to an exchange. Fails with
    /// [`ErrorKind::NotConnected`](crate::error::ErrorKind::NotConnected) if
    /// `is_connected` is false at entry.
    async fn publish_message(&self, exchange: &str, routing_key: &str, payload: &[u8])
        -> Result<()>;

    /// Declare a queue. Same not-connected precondition as `publish_message`.
    async fn declare_queue(&self, name: &str) -> Result<()>;

    /// Declare an exchange. Same not-connected precondition as
    /// `publish_message`.
    async fn declare_exchange(&self, name: &str, kind: &str) -> Result<()>;

    /// Bind a queue to an exchange. Same not-connected precondition as
    /// `publish_message`.
    async fn queue_bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;
}

/// Constructs a fresh, not-yet-connected [`NodeClient`] for a given broker
/// URL. The pool's `Connector` calls this once per connection attempt.
pub trait NodeClientFactory: Send + Sync {
    /// Build a new façade instance bound to `url`. `max_reconnect_attempt`
    /// and `reconnect_interval` are the façade's own internal retry budget
    /// (`spec.md` §6), distinct from the pool Connector's open-ended retry
    /// loop (`spec.md` §4.2).
    fn create(
        &self,
        url: &BrokerUrl,
        max_reconnect_attempt: u32,
        reconnect_interval: Duration,
    ) -> Arc<dyn NodeClient>;
}

impl<F> NodeClientFactory for F
where
    F: Fn(&BrokerUrl, u32, Duration) -> Arc<dyn NodeClient> + Send + Sync,
{
    fn create(
        &self,
        url: &BrokerUrl,
        max_reconnect_attempt: u32,
        reconnect_interval: Duration,
    ) -> Arc<dyn NodeClient> {
        self(url, max_reconnect_attempt, reconnect_interval)
    }
}
