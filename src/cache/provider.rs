//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 缓存提供者抽象
//!
//! 请求计数器等跨请求状态保存在 [`CacheProvider`] 中，宿主可以接入外部缓存；
//! [`MemoryCacheProvider`] 是进程内实现。

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::error::StorageError;

/// 值工厂，仅在键不存在时调用
pub type ValueFactory = Box<dyn FnOnce() -> String + Send>;

/// 缓存提供者接口
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// 获取值
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 设置值（覆盖）
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError>;

    /// 仅当键不存在时写入，返回是否写入
    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StorageError>;

    /// 原子自增并返回新值；键不存在时从0开始且不设置过期时间
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError>;

    /// 删除值
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// 获取值，不存在时用工厂生成并写入
    async fn get_or_add(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: ValueFactory,
    ) -> Result<String, StorageError> {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }
        let value = factory();
        if self.add(key, &value, ttl).await? {
            return Ok(value);
        }
        // 并发写入者先完成
        Ok(self.get(key).await?.unwrap_or(value))
    }
}

#[derive(Debug, Clone)]
struct ProviderEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ProviderEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() > expires_at)
            .unwrap_or(false)
    }
}

/// 内存缓存提供者
#[derive(Debug, Default)]
pub struct MemoryCacheProvider {
    data: DashMap<String, ProviderEntry>,
}

impl MemoryCacheProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清理过期条目
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.data.len())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .data
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        self.data
            .insert(key.to_string(), ProviderEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StorageError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(ProviderEntry::new(value.to_string(), ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ProviderEntry::new(value.to_string(), ttl));
                Ok(true)
            }
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
        // 在条目锁内完成读-改-写
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| ProviderEntry::new("0".to_string(), None));
        if entry.is_expired() {
            *entry = ProviderEntry::new("0".to_string(), None);
        }

        let current: i64 = entry.value.parse().map_err(|_| {
            StorageError::TypeError(format!("键 {} 的值不是整数: {}", key, entry.value))
        })?;
        let next = current.checked_add(delta).ok_or_else(|| {
            StorageError::TypeError(format!("键 {} 自增溢出", key))
        })?;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    async fn get_or_add(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: ValueFactory,
    ) -> Result<String, StorageError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    let value = factory();
                    occupied.insert(ProviderEntry::new(value.clone(), ttl));
                    Ok(value)
                } else {
                    Ok(occupied.get().value.clone())
                }
            }
            Entry::Vacant(vacant) => {
                let value = factory();
                vacant.insert(ProviderEntry::new(value.clone(), ttl));
                Ok(value)
            }
        }
    }
}
