//! An in-memory [`NodeClient`] test double, following the teacher's pattern
//! of mocked establishers/connections (`cmap/test.rs`). Not gated behind
//! `#[cfg(test)]` so integration tests under `tests/` can use it too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::{NodeClient, NodeClientFactory};
use crate::error::{Error, Result};
use crate::node::BrokerUrl;

/// Per-URL knobs shared across every `MockNodeClient` instance the factory
/// creates for that URL, so that failure/latency injection survives across
/// reconnects (each Connector attempt constructs a fresh façade instance,
/// per `spec.md` §6).
///
/// Connectedness itself is *not* shared: each `MockNodeClient` instance owns
/// its own flag, since a reconnect's prior instance and new instance are
/// live concurrently for a moment (the prior is closed only after the new
/// one has already connected, per I3). `current` tracks which instance's
/// flag is the one presently registered with the node, so `drop_connection`
/// flips the right one.
#[derive(Debug)]
pub struct NodeControl {
    connect_latency: Mutex<Duration>,
    remaining_connect_failures: AtomicU32,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl NodeControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            connect_latency: Mutex::new(Duration::from_millis(0)),
            remaining_connect_failures: AtomicU32::new(0),
            current: Mutex::new(None),
        })
    }

    /// How long `connect` should simulate I/O for before succeeding or
    /// failing.
    pub fn set_connect_latency(&self, latency: Duration) {
        *self.connect_latency.lock().expect("control lock poisoned") = latency;
    }

    /// Force the next `n` connect attempts on this URL to fail before a
    /// connect is allowed to succeed.
    pub fn fail_next_connects(&self, n: u32) {
        self.remaining_connect_failures.store(n, Ordering::SeqCst);
    }

    /// Simulate the transport closing out from under a live client, the
    /// way an external network partition would (`spec.md` §8 scenario 5).
    /// Affects whichever instance most recently connected successfully.
    pub fn drop_connection(&self) {
        if let Some(flag) = self
            .current
            .lock()
            .expect("control lock poisoned")
            .as_ref()
        {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Whether the most recently connected instance for this URL currently
    /// reports itself open.
    pub fn is_live(&self) -> bool {
        self.current
            .lock()
            .expect("control lock poisoned")
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn register(&self, flag: Arc<AtomicBool>) {
        *self.current.lock().expect("control lock poisoned") = Some(flag);
    }

    fn unregister(&self, flag: &Arc<AtomicBool>) {
        let mut current = self.current.lock().expect("control lock poisoned");
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, flag)) {
            *current = None;
        }
    }
}

/// A [`NodeClientFactory`] that hands out [`MockNodeClient`]s backed by
/// per-URL [`NodeControl`] handles a test can reach back into.
#[derive(Debug, Default)]
pub struct MockNodeClientFactory {
    controls: Mutex<HashMap<BrokerUrl, Arc<NodeControl>>>,
}

impl MockNodeClientFactory {
    /// Construct an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (creating if necessary) the control handle for `url`, so tests
    /// can inject failures before or after the pool has started.
    pub fn control_for(&self, url: &BrokerUrl) -> Arc<NodeControl> {
        let mut controls = self.controls.lock().expect("factory lock poisoned");
        controls
            .entry(url.clone())
            .or_insert_with(NodeControl::new)
            .clone()
    }
}

impl NodeClientFactory for MockNodeClientFactory {
    fn create(
        &self,
        url: &BrokerUrl,
        max_reconnect_attempt: u32,
        reconnect_interval: Duration,
    ) -> Arc<dyn NodeClient> {
        Arc::new(MockNodeClient {
            url: url.clone(),
            control: self.control_for(url),
            connected: Arc::new(AtomicBool::new(false)),
            max_reconnect_attempt: max_reconnect_attempt.max(1),
            reconnect_interval,
        })
    }
}

/// An in-memory stand-in for the real wire-protocol façade. Implements the
/// internal retry loop the façade contract requires (`spec.md` §6): a
/// `connect` call retries up to `max_reconnect_attempt` times, spaced by
/// `reconnect_interval`, before giving up.
///
/// `connected` is this instance's own flag, not shared with any sibling
/// instance the factory has produced for the same URL — only `connect`
/// registers it as the URL's "current" flag with `control`, and `close`
/// unregisters it (but only if it's still current, so closing a stale prior
/// instance after a newer one has already connected can't clobber the new
/// one's state).
#[derive(Debug)]
pub struct MockNodeClient {
    url: BrokerUrl,
    control: Arc<NodeControl>,
    connected: Arc<AtomicBool>,
    max_reconnect_attempt: u32,
    reconnect_interval: Duration,
}

#[async_trait]
impl NodeClient for MockNodeClient {
    async fn connect(&self, cancel: CancellationToken) -> Result<()> {
        for attempt in 1..=self.max_reconnect_attempt {
            let latency = *self
                .control
                .connect_latency
                .lock()
                .expect("control lock poisoned");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::connect_failed(self.url.clone(), "cancelled")),
                _ = tokio::time::sleep(latency) => {}
            }

            let should_fail = self
                .control
                .remaining_connect_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    if n > 0 {
                        Some(n - 1)
                    } else {
                        None
                    }
                })
                .is_ok();

            if !should_fail {
                self.connected.store(true, Ordering::SeqCst);
                self.control.register(self.connected.clone());
                return Ok(());
            }

            if attempt == self.max_reconnect_attempt {
                return Err(Error::connect_failed(
                    self.url.clone(),
                    "forced failure injected by test",
                ));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::connect_failed(self.url.clone(), "cancelled")),
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }

        Err(Error::connect_failed(self.url.clone(), "exhausted retries"))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.control.unregister(&self.connected);
        Ok(())
    }

    async fn publish_message(
        &self,
        _exchange: &str,
        _routing_key: &str,
        _payload: &[u8],
    ) -> Result<()> {
        self.require_connected()
    }

    async fn declare_queue(&self, _name: &str) -> Result<()> {
        self.require_connected()
    }

    async fn declare_exchange(&self, _name: &str, _kind: &str) -> Result<()> {
        self.require_connected()
    }

    async fn queue_bind(&self, _queue: &str, _exchange: &str, _routing_key: &str) -> Result<()> {
        self.require_connected()
    }
}

impl MockNodeClient {
    fn require_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::not_connected())
        }
    }
}
