//! 端到端测试：请求计数
//!
//! 测试场景：
//! - 同一IP的N个并发首次请求只创建一个计数窗口，计数为N
//! - 超过告警阈值不会拒绝请求
//! - 没有远程IP的请求不计数

use crate::common::*;
use rulewall::{
    cache::{CacheProvider, MemoryCacheProvider},
    config::{RateLimitSettings, WafConfig},
    engine::WafEngine,
    fact::WebRequest,
    rate_counter::RateCounter,
    rule::RuleNode,
};
use std::sync::Arc;

const CONCURRENT_REQUESTS: usize = 64;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_touch_single_window() {
    let engine = Arc::new(create_counting_engine(probe_ruleset(), 1_000));

    let handles: Vec<_> = (0..CONCURRENT_REQUESTS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .check(&request("/", "198.51.100.77", BROWSER_UA))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_allowed());
    }

    let counter = engine.rate_counter().unwrap();
    assert_eq!(
        counter.current("198.51.100.77").await.unwrap(),
        CONCURRENT_REQUESTS as u64
    );
    assert_eq!(engine.stats().total_requests, CONCURRENT_REQUESTS as u64);
}

#[tokio::test]
async fn test_threshold_only_alerts() {
    let engine = create_counting_engine(probe_ruleset(), 3);
    for _ in 0..10 {
        let decision = engine.check(&request("/home", "192.0.2.44", BROWSER_UA)).await;
        assert!(decision.is_allowed());
    }
    let counter = engine.rate_counter().unwrap();
    assert_eq!(counter.current("192.0.2.44").await.unwrap(), 10);
}

#[tokio::test]
async fn test_requests_without_ip_not_counted() {
    let provider = Arc::new(MemoryCacheProvider::new());
    let config = WafConfig::new(RuleNode::compare("Method", "Equal", "TRACE"))
        .with_rate_limit(RateLimitSettings::enabled());
    let engine: WafEngine = WafEngine::with_provider(config, provider.clone()).unwrap();

    engine.check(&WebRequest::new()).await;
    engine.check(&WebRequest::new().with_remote_ip("   ")).await;
    assert!(provider.is_empty());

    engine.check(&WebRequest::new().with_remote_ip("10.1.1.1")).await;
    assert_eq!(provider.len(), 1);
    assert_eq!(
        provider.get(&RateCounter::key("10.1.1.1")).await.unwrap(),
        Some("1".to_string())
    );
}

#[tokio::test]
async fn test_counter_shared_through_provider() {
    let provider: Arc<dyn CacheProvider> = Arc::new(MemoryCacheProvider::new());
    let settings = RateLimitSettings::enabled();
    let first = RateCounter::new(Arc::clone(&provider), &settings);
    let second = RateCounter::new(Arc::clone(&provider), &settings);

    first.touch("10.0.0.8").await.unwrap();
    second.touch("10.0.0.8").await.unwrap();
    assert_eq!(first.current("10.0.0.8").await.unwrap(), 2);
}
