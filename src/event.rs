//! Contains the events and functionality for monitoring a [`Pool`](crate::Pool)'s
//! internal supervision activity.
//!
//! Every transition the core describes — a node becoming healthy or
//! unhealthy, a connect attempt failing, the pool closing — is always
//! reported through `tracing`. Installing a [`PoolEventHandler`] is an
//! additional, typed hook for callers who want to react programmatically
//! (emit metrics, page an operator) without scraping log lines.

use std::fmt;

use crate::node::BrokerUrl;

/// One observable transition in the pool's supervision loop.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum PoolEvent {
    /// A node's Connector successfully established a new client.
    NodeConnected {
        /// The node that connected.
        url: BrokerUrl,
    },
    /// A node's Connector attempt failed.
    ConnectAttemptFailed {
        /// The node that failed to connect.
        url: BrokerUrl,
        /// The failure, rendered as text.
        message: String,
    },
    /// A Watcher or Prober detected that a previously healthy node's
    /// connection is no longer open.
    NodeLost {
        /// The node that was detected as unhealthy.
        url: BrokerUrl,
    },
    /// The Health Prober detected that a node reports connected again.
    NodeRecovered {
        /// The node that recovered.
        url: BrokerUrl,
    },
    /// `Start` was called and supervision tasks were launched.
    PoolStarted,
    /// `Close` ran its teardown for the first time.
    PoolClosed,
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolEvent::NodeConnected { url } => write!(f, "node {url} connected"),
            PoolEvent::ConnectAttemptFailed { url, message } => {
                write!(f, "node {url} failed to connect: {message}")
            }
            PoolEvent::NodeLost { url } => write!(f, "node {url} lost"),
            PoolEvent::NodeRecovered { url } => write!(f, "node {url} recovered"),
            PoolEvent::PoolStarted => write!(f, "pool started"),
            PoolEvent::PoolClosed => write!(f, "pool closed"),
        }
    }
}

/// Capability abstraction for reacting to [`PoolEvent`]s.
///
/// Implementations must not block; the pool invokes handlers synchronously
/// from background supervision tasks.
pub trait PoolEventHandler: Send + Sync {
    /// Handle one event. The default no-op implementation means a handler
    /// only needs to override the events it cares about, but most callers
    /// will install [`NoopEventHandler`] (the default) or their own.
    fn handle(&self, event: PoolEvent);
}

/// The default handler: every event is already covered by the always-on
/// `tracing` instrumentation emitted at the call site, so this simply drops
/// the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventHandler;

impl PoolEventHandler for NoopEventHandler {
    fn handle(&self, _event: PoolEvent) {}
}
