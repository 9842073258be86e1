//! Pool configuration.

use std::sync::Arc;
use std::time::Duration;

use derivative::Derivative;
use typed_builder::TypedBuilder;

use crate::client::NodeClientFactory;
use crate::event::{NoopEventHandler, PoolEventHandler};
use crate::node::BrokerUrl;

/// `ReconnectInterval` default: the delay the Connector waits between a
/// failed attempt and the next one.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// `HealthCheckInterval` default: the period of the pool-level Health
/// Prober.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// `MaxReconnectAttempt` default. Bounds only the single-connection
/// façade's internal retry loop, never the pool Connector's open-ended
/// retries (`spec.md` §4.2, §9 Open Questions).
pub const DEFAULT_MAX_RECONNECT_ATTEMPT: u32 = 10;

/// Fallback URL used when `PoolConfig` is built with an empty URL list.
pub const DEFAULT_URL: &str = "amqp://localhost:5672";

/// The four selection policies `GetClient` can dispatch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoadBalanceStrategy {
    /// Cycle through the healthy set in index order using a pool-global
    /// counter.
    #[default]
    RoundRobin,
    /// Uniform pick from the healthy set.
    Random,
    /// The healthy node with the smallest `total_used`; ties broken by
    /// node index.
    LeastUsed,
    /// Weighted random draw over the healthy set's configured weights;
    /// falls back to `RoundRobin` if the total weight is zero.
    WeightedRoundRobin,
}

/// Immutable pool configuration, filled in with the `spec.md` §6 defaults
/// by [`PoolConfig::builder`].
#[derive(Derivative, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
#[derivative(Debug)]
#[non_exhaustive]
pub struct PoolConfig {
    /// The ordered list of broker URLs. An empty list is replaced with
    /// `["amqp://localhost:5672"]`.
    #[builder(default_code = "vec![BrokerUrl::new(DEFAULT_URL)]")]
    pub urls: Vec<BrokerUrl>,

    /// Delay the Connector waits between a failed attempt and the next one.
    #[builder(default = DEFAULT_RECONNECT_INTERVAL)]
    pub reconnect_interval: Duration,

    /// Maximum reconnect attempt count passed through to the single-
    /// connection façade's own internal retry loop.
    #[builder(default = DEFAULT_MAX_RECONNECT_ATTEMPT)]
    pub max_reconnect_attempt: u32,

    /// Period of the pool-level Health Prober.
    #[builder(default = DEFAULT_HEALTH_CHECK_INTERVAL)]
    pub health_check_interval: Duration,

    /// The selection policy `GetClient` dispatches on.
    #[builder(default)]
    pub strategy: LoadBalanceStrategy,

    /// Raises the always-on tracing instrumentation from `debug` to
    /// `trace` granularity when set.
    #[builder(default)]
    pub debug: bool,

    /// Optional typed hook for programmatic reaction to pool events, in
    /// addition to the unconditional tracing instrumentation.
    #[derivative(Debug = "ignore")]
    #[builder(default_code = "Arc::new(NoopEventHandler) as Arc<dyn PoolEventHandler>")]
    pub event_handler: Arc<dyn PoolEventHandler>,

    /// Builds a fresh, unconnected façade instance for a given URL. There
    /// is no default: the wire protocol is an external collaborator
    /// (`spec.md` §1) the core cannot supply on its own.
    #[derivative(Debug = "ignore")]
    pub client_factory: Arc<dyn NodeClientFactory>,
}

impl PoolConfig {
    /// The effective URL list: `self.urls` unless it's empty, in which case
    /// the single default URL.
    pub(crate) fn effective_urls(&self) -> Vec<BrokerUrl> {
        if self.urls.is_empty() {
            vec![BrokerUrl::new(DEFAULT_URL)]
        } else {
            self.urls.clone()
        }
    }
}
