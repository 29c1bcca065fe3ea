//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 规则片段缓存
//!
//! 缓存由规则文本解析出的片段（IP列表、UA列表、正则、IP文件内容），
//! 条目带TTL并在访问时惰性淘汰。同一键的计算由该键的闸门串行化，
//! 同一时刻最多只有一次计算；计算期间不持有分片锁。

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::constants::DEFAULT_FRAGMENT_CAPACITY;

/// 缓存条目
#[derive(Debug, Clone)]
struct FragmentEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> FragmentEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// 缓存统计信息
#[derive(Debug, Default)]
pub struct FragmentCacheStats {
    /// 命中次数
    hits: AtomicU64,
    /// 未命中次数
    misses: AtomicU64,
    /// 过期次数
    expirations: AtomicU64,
    /// 写入次数
    writes: AtomicU64,
    /// 容量已满时未写入的计算次数
    uncached: AtomicU64,
}

impl FragmentCacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn uncached(&self) -> u64 {
        self.uncached.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// 带TTL的片段缓存
pub struct FragmentCache<V> {
    name: &'static str,
    entries: DashMap<String, FragmentEntry<V>>,
    /// 正在计算的键
    gates: DashMap<String, Arc<Mutex<()>>>,
    capacity: usize,
    stats: FragmentCacheStats,
}

impl<V: Clone> FragmentCache<V> {
    /// 创建缓存，`name` 仅用于日志
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            gates: DashMap::new(),
            capacity: capacity.max(1),
            stats: FragmentCacheStats::default(),
        }
    }

    /// 获取或计算
    pub fn get_or_compute<F>(&self, key: &str, ttl: Duration, factory: F) -> V
    where
        F: FnOnce() -> V,
    {
        match self.try_get_or_compute::<std::convert::Infallible, _>(key, ttl, || Ok(factory())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// 获取或计算；计算失败时不写入缓存并返回错误
    pub fn try_get_or_compute<E, F>(&self, key: &str, ttl: Duration, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        // 快速路径
        if let Some(value) = self.get(key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.stats.uncached.fetch_add(1, Ordering::Relaxed);
                debug!(cache = self.name, "片段缓存已满，直接计算");
                return factory();
            }
        }

        let gate = self.gate(key);
        let result = {
            let _guard = gate.lock();
            // 等待闸门期间其他线程可能已经写入
            match self.get(key) {
                Some(value) => Ok(value),
                None => factory().map(|value| {
                    self.insert(key, value.clone(), ttl);
                    value
                }),
            }
        };
        self.gates.remove_if(key, |_, current| Arc::ptr_eq(current, &gate));
        result
    }

    /// 写入（覆盖）条目
    pub fn insert(&self, key: &str, value: V, ttl: Duration) {
        let previous = self
            .entries
            .insert(key.to_string(), FragmentEntry::new(value, ttl));
        if previous.is_some_and(|entry| entry.is_expired()) {
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.gates.entry(key.to_string()).or_default().value())
    }

    /// 读取未过期的值
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// 清理过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.stats
                .expirations
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(cache = self.name, removed, "清理过期片段");
        }
        removed
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &FragmentCacheStats {
        &self.stats
    }
}

impl<V: Clone> Default for FragmentCache<V> {
    fn default() -> Self {
        Self::new("fragment", DEFAULT_FRAGMENT_CAPACITY)
    }
}
