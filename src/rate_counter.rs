//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 请求计数器
//!
//! 按远程IP在固定窗口内计数。窗口由缓存条目的过期时间实现：首次访问时以
//! 窗口长度为TTL创建计数键，之后原子自增。计数只用于告警，不会拒绝请求。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheProvider;
use crate::config::RateLimitSettings;
use crate::constants::RATE_COUNTER_KEY_PREFIX;
use crate::error::StorageError;

/// 固定窗口请求计数器
pub struct RateCounter {
    provider: Arc<dyn CacheProvider>,
    window: Duration,
    alert_threshold: u64,
}

impl RateCounter {
    pub fn new(provider: Arc<dyn CacheProvider>, settings: &RateLimitSettings) -> Self {
        Self {
            provider,
            window: Duration::from_secs(settings.window_secs),
            alert_threshold: settings.alert_threshold,
        }
    }

    /// 计数键
    pub fn key(remote_ip: &str) -> String {
        format!("{}{}", RATE_COUNTER_KEY_PREFIX, remote_ip)
    }

    /// 为该IP计一次请求，返回窗口内的计数
    pub async fn touch(&self, remote_ip: &str) -> Result<u64, StorageError> {
        let key = Self::key(remote_ip);
        if self.provider.add(&key, "0", Some(self.window)).await? {
            debug!(remote_ip, window_secs = self.window.as_secs(), "新计数窗口");
        }
        let count = self.provider.increment(&key, 1).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// 计数并在超过阈值时告警；缓存不可用时跳过
    pub async fn record(&self, remote_ip: Option<&str>) -> Option<u64> {
        let remote_ip = remote_ip.map(str::trim).filter(|ip| !ip.is_empty())?;
        match self.touch(remote_ip).await {
            Ok(count) => {
                if count > self.alert_threshold {
                    warn!(
                        remote_ip,
                        count,
                        threshold = self.alert_threshold,
                        "请求频率超过告警阈值"
                    );
                }
                Some(count)
            }
            Err(e) => {
                warn!(remote_ip, "请求计数不可用: {}", e);
                None
            }
        }
    }

    /// 当前窗口内的计数（没有计数时为0）
    pub async fn current(&self, remote_ip: &str) -> Result<u64, StorageError> {
        let value = self.provider.get(&Self::key(remote_ip)).await?;
        Ok(value
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn alert_threshold(&self) -> u64 {
        self.alert_threshold
    }
}
