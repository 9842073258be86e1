//! Contains the `Error` and `Result` types that `brokerpool` uses.

use std::fmt;

use thiserror::Error;

use crate::node::BrokerUrl;

/// The result type for all fallible operations in the `brokerpool` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `brokerpool` crate. The inner
/// [`ErrorKind`] is boxed so that `Result<T, Error>` stays small to move
/// around through channels and futures.
#[derive(Debug, Error)]
#[error("{kind}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }

    pub(crate) fn pool_closed() -> Self {
        Self::new(ErrorKind::PoolClosed)
    }

    pub(crate) fn no_healthy_nodes() -> Self {
        Self::new(ErrorKind::NoHealthyNodes)
    }

    pub(crate) fn node_not_found(url: BrokerUrl) -> Self {
        Self::new(ErrorKind::NodeNotFound { url })
    }

    pub(crate) fn connect_failed(url: BrokerUrl, cause: impl fmt::Display) -> Self {
        Self::new(ErrorKind::ConnectFailed {
            url,
            message: cause.to_string(),
        })
    }

    pub(crate) fn not_connected() -> Self {
        Self::new(ErrorKind::NotConnected)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal {
            message: message.into(),
        })
    }

    /// Whether this error is the sentinel `ErrPoolClosed`.
    pub fn is_pool_closed(&self) -> bool {
        matches!(*self.kind, ErrorKind::PoolClosed)
    }

    /// Whether this error is the sentinel `ErrNoHealthyNodes`.
    pub fn is_no_healthy_nodes(&self) -> bool {
        matches!(*self.kind, ErrorKind::NoHealthyNodes)
    }

    /// Whether this error is the sentinel `ErrNodeNotFound`.
    pub fn is_node_not_found(&self) -> bool {
        matches!(*self.kind, ErrorKind::NodeNotFound { .. })
    }
}

/// The category of error produced by a `brokerpool` operation.
///
/// Stable sentinel identities, matched by the `is_*` helpers on [`Error`]
/// rather than by downcasting, so that callers can rely on equality checks
/// across crate versions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// `GetClient` was called after `Close` returned.
    #[error("the pool has been closed")]
    PoolClosed,

    /// `GetClient` found no node satisfying the healthy predicate.
    #[error("no healthy broker nodes are available")]
    NoHealthyNodes,

    /// `SetNodeWeight` was given a URL that isn't part of the pool.
    #[error("no node configured for url {url}")]
    NodeNotFound {
        /// The URL that was not found.
        url: BrokerUrl,
    },

    /// Produced inside the Connector; never reaches application callers.
    /// Logged and counted as a failure.
    #[error("failed to connect to {url}: {message}")]
    ConnectFailed {
        /// The node that failed to connect.
        url: BrokerUrl,
        /// The underlying cause, rendered as text.
        message: String,
    },

    /// A pass-through operation was attempted on a façade that is not
    /// connected.
    #[error("client is not connected")]
    NotConnected,

    /// One or more nodes failed to close cleanly during `Close`.
    #[error("{} node(s) failed to close cleanly", failures.len())]
    PoolClose {
        /// The per-node close failures, in node index order.
        failures: Vec<(BrokerUrl, Error)>,
    },

    /// An invariant that should be unreachable was violated (e.g. a lock
    /// was reported poisoned).
    #[error("internal error: {message}")]
    Internal {
        /// A description of what went wrong.
        message: String,
    },
}
