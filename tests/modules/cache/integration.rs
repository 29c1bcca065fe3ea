//! 缓存集成测试

use rulewall::cache::{CacheProvider, FragmentCache, MemoryCacheProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

#[test]
fn test_fragment_concurrent_single_computation() {
    let cache: Arc<FragmentCache<Arc<String>>> = Arc::new(FragmentCache::new("test", 16));
    let computations = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|scope| {
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            scope.spawn(move || {
                let value = cache.get_or_compute("rule-1|10.0.0.0/8", TTL, || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    Arc::new("parsed".to_string())
                });
                assert_eq!(value.as_str(), "parsed");
            });
        }
    });

    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().writes(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_fragment_capacity_overflow_computes_uncached() {
    let cache: FragmentCache<usize> = FragmentCache::new("small", 2);
    assert_eq!(cache.get_or_compute("a", TTL, || 1), 1);
    assert_eq!(cache.get_or_compute("b", TTL, || 2), 2);
    assert_eq!(cache.get_or_compute("c", TTL, || 3), 3);
    assert_eq!(cache.get_or_compute("c", TTL, || 4), 4);

    assert_eq!(cache.len(), 2);
    assert!(cache.get("c").is_none());
    assert_eq!(cache.stats().uncached(), 2);
    assert_eq!(cache.get_or_compute("a", TTL, || 9), 1);
}

#[test]
fn test_fragment_expired_entries_make_room() {
    let cache: FragmentCache<usize> = FragmentCache::new("expiring", 1);
    cache.get_or_compute("old", Duration::from_millis(10), || 1);
    std::thread::sleep(Duration::from_millis(30));

    assert_eq!(cache.get_or_compute("new", TTL, || 2), 2);
    assert_eq!(cache.get("new"), Some(2));
    assert!(cache.get("old").is_none());
    assert_eq!(cache.stats().uncached(), 0);
}

#[test]
fn test_fragment_failed_computation_not_cached() {
    let cache: FragmentCache<usize> = FragmentCache::new("fallible", 8);
    let failed: Result<usize, String> =
        cache.try_get_or_compute("file", TTL, || Err("missing".to_string()));
    assert!(failed.is_err());
    assert!(cache.is_empty());

    let ok: Result<usize, String> = cache.try_get_or_compute("file", TTL, || Ok(3));
    assert_eq!(ok.unwrap(), 3);
    assert_eq!(cache.get("file"), Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_provider_get_or_add_single_factory() {
    let provider = Arc::new(MemoryCacheProvider::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|index| {
            let provider = Arc::clone(&provider);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                provider
                    .get_or_add(
                        "window",
                        Some(TTL),
                        Box::new(move || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            index.to_string()
                        }),
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_provider_concurrent_increments() {
    let provider = Arc::new(MemoryCacheProvider::new());
    provider.add("hits", "0", Some(TTL)).await.unwrap();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.increment("hits", 1).await.unwrap() })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results.sort_unstable();

    assert_eq!(results, (1..=100).collect::<Vec<i64>>());
    assert_eq!(provider.get("hits").await.unwrap(), Some("100".to_string()));
}

#[tokio::test]
async fn test_provider_add_respects_expiry() {
    let provider = MemoryCacheProvider::new();
    assert!(provider
        .add("k", "1", Some(Duration::from_millis(10)))
        .await
        .unwrap());
    assert!(!provider.add("k", "2", None).await.unwrap());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(provider.get("k").await.unwrap(), None);
    assert!(provider.add("k", "3", None).await.unwrap());
    assert_eq!(provider.get("k").await.unwrap(), Some("3".to_string()));
    assert_eq!(provider.cleanup_expired(), 0);
}

#[tokio::test]
async fn test_provider_increment_non_numeric_fails() {
    let provider = MemoryCacheProvider::new();
    provider.set("text", "abc", None).await.unwrap();
    assert!(provider.increment("text", 1).await.is_err());
}
