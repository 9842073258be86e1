//! Integration tests covering the concrete scenarios in `spec.md` §8,
//! driven against the in-memory `MockNodeClient` façade. Time is paused and
//! manually driven so these run instantly regardless of `spec.md`'s
//! wall-clock figures (10s Watcher poll, etc.).

use std::sync::Arc;
use std::time::Duration;

use brokerpool::config::{LoadBalanceStrategy, PoolConfig};
use brokerpool::node::BrokerUrl;
use brokerpool::testkit::MockNodeClientFactory;
use brokerpool::{NodeClientFactory, Pool};

async fn wait_until_healthy(pool: &Pool, n: usize, attempts: u32) {
    for _ in 0..attempts {
        if pool.get_healthy_node_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("healthy node count did not reach {n} within {attempts} polls");
}

fn fast_config(
    urls: Vec<&str>,
    strategy: LoadBalanceStrategy,
    factory: Arc<MockNodeClientFactory>,
) -> PoolConfig {
    PoolConfig::builder()
        .urls(urls.into_iter().map(BrokerUrl::new).collect::<Vec<_>>())
        .reconnect_interval(Duration::from_millis(20))
        .health_check_interval(Duration::from_millis(50))
        .strategy(strategy)
        .client_factory(factory as Arc<dyn NodeClientFactory>)
        .build()
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn single_node_happy_path() {
    let factory = Arc::new(MockNodeClientFactory::new());
    let config = fast_config(
        vec!["amqp://h:5672/"],
        LoadBalanceStrategy::RoundRobin,
        factory,
    );
    let pool = Pool::new(config);
    pool.start().unwrap();

    wait_until_healthy(&pool, 1, 10_000).await;

    for _ in 0..100 {
        pool.get_client().await.expect("expected a healthy client");
    }

    let stats = pool.get_stats().await;
    assert_eq!(stats.total_requests, 100);
    assert_eq!(stats.total_failures, 0);
    assert_eq!(stats.nodes[0].total_used, 100);

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn readiness_race_then_recovery() {
    let factory = Arc::new(MockNodeClientFactory::new());
    let control = factory.control_for(&BrokerUrl::new("amqp://h:5672/"));
    control.set_connect_latency(Duration::from_millis(50));

    let config = fast_config(
        vec!["amqp://h:5672/"],
        LoadBalanceStrategy::RoundRobin,
        factory,
    );
    let pool = Pool::new(config);
    pool.start().unwrap();

    // The connect attempt has a 50ms simulated latency and start() returns
    // as soon as the task is launched, so a call made immediately after
    // should see no healthy nodes yet.
    let err = pool.get_client().await.unwrap_err();
    assert!(err.is_no_healthy_nodes());

    wait_until_healthy(&pool, 1, 10_000).await;

    pool.get_client().await.expect("should succeed once connected");

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn round_robin_distributes_evenly() {
    let factory = Arc::new(MockNodeClientFactory::new());
    let config = fast_config(
        vec!["amqp://a/", "amqp://b/", "amqp://c/"],
        LoadBalanceStrategy::RoundRobin,
        factory,
    );
    let pool = Pool::new(config);
    pool.start().unwrap();

    wait_until_healthy(&pool, 3, 10_000).await;

    for _ in 0..30 {
        pool.get_client().await.unwrap();
    }

    let stats = pool.get_stats().await;
    let mut used: Vec<u64> = stats.nodes.iter().map(|n| n.total_used).collect();
    used.sort_unstable();
    assert_eq!(used, vec![10, 10, 10]);

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn weighted_round_robin_respects_weights() {
    let factory = Arc::new(MockNodeClientFactory::new());
    let urls = vec![
        BrokerUrl::new("amqp://a/"),
        BrokerUrl::new("amqp://b/"),
        BrokerUrl::new("amqp://c/"),
    ];
    let config = PoolConfig::builder()
        .urls(urls.clone())
        .reconnect_interval(Duration::from_millis(20))
        .health_check_interval(Duration::from_millis(50))
        .strategy(LoadBalanceStrategy::WeightedRoundRobin)
        .client_factory(factory as Arc<dyn NodeClientFactory>)
        .build();
    let pool = Pool::new(config);
    pool.start().unwrap();

    wait_until_healthy(&pool, 3, 10_000).await;

    pool.set_node_weight(&urls[0], 3).await.unwrap();
    pool.set_node_weight(&urls[1], 2).await.unwrap();
    pool.set_node_weight(&urls[2], 1).await.unwrap();

    const TOTAL: u64 = 6_000;
    for _ in 0..TOTAL {
        pool.get_client().await.unwrap();
    }

    let stats = pool.get_stats().await;
    let by_url = |url: &BrokerUrl| {
        stats
            .nodes
            .iter()
            .find(|n| &n.url == url)
            .unwrap()
            .total_used
    };

    let expected = [
        (urls[0].clone(), 3.0 / 6.0),
        (urls[1].clone(), 2.0 / 6.0),
        (urls[2].clone(), 1.0 / 6.0),
    ];
    for (url, fraction) in expected {
        let got = by_url(&url) as f64 / TOTAL as f64;
        assert!(
            (got - fraction).abs() < 0.03,
            "url {url} got fraction {got}, expected ~{fraction}"
        );
    }

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failover_to_surviving_node_and_recovery() {
    let factory = Arc::new(MockNodeClientFactory::new());
    let url_a = BrokerUrl::new("amqp://a/");
    let url_b = BrokerUrl::new("amqp://b/");
    let config = fast_config(
        vec!["amqp://a/", "amqp://b/"],
        LoadBalanceStrategy::RoundRobin,
        factory.clone(),
    );
    let pool = Pool::new(config);
    pool.start().unwrap();

    wait_until_healthy(&pool, 2, 10_000).await;

    let control_a = factory.control_for(&url_a);
    // Give the reconnect a visible window so the assertions below observe
    // the failed-over state rather than racing an instant (0-latency)
    // reconnect.
    control_a.set_connect_latency(Duration::from_millis(200));
    control_a.drop_connection();

    wait_until_healthy(&pool, 1, 10_000).await;

    let stats = pool.get_stats().await;
    let a = stats.nodes.iter().find(|n| n.url == url_a).unwrap();
    let b = stats.nodes.iter().find(|n| n.url == url_b).unwrap();
    assert!(!a.healthy);
    assert!(!a.connected);
    assert!(b.healthy);

    for _ in 0..20 {
        let client = pool.get_client().await.unwrap();
        client
            .publish_message("x", "k", b"payload")
            .await
            .unwrap();
    }
    let stats = pool.get_stats().await;
    let a = stats.nodes.iter().find(|n| n.url == url_a).unwrap();
    assert_eq!(a.total_used, 0);

    // The node was only dropped, not permanently failed, so the Connector
    // (re-armed by the Watcher) and the Prober's safety net both converge
    // on reconnecting it.
    wait_until_healthy(&pool, 2, 10_000).await;

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn close_is_idempotent_and_rejects_later_calls() {
    let factory = Arc::new(MockNodeClientFactory::new());
    let config = fast_config(
        vec!["amqp://a/", "amqp://b/", "amqp://c/"],
        LoadBalanceStrategy::RoundRobin,
        factory,
    );
    let pool = Arc::new(Pool::new(config));
    pool.start().unwrap();

    wait_until_healthy(&pool, 3, 10_000).await;

    let mut callers = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        callers.push(tokio::spawn(async move {
            loop {
                match pool.get_client().await {
                    Ok(_) => tokio::time::sleep(Duration::from_millis(1)).await,
                    Err(e) if e.is_pool_closed() => return,
                    Err(_) => tokio::time::sleep(Duration::from_millis(1)).await,
                }
            }
        }));
    }

    pool.close().await.unwrap();
    pool.close().await.unwrap();

    for caller in callers {
        caller.await.unwrap();
    }

    let err = pool.get_client().await.unwrap_err();
    assert!(err.is_pool_closed());
}
