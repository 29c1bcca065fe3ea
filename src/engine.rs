//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 防火墙引擎
//!
//! 请求检查的入口：可选的按IP计数，然后用当前生效的规则集求值。
//! 命中规则集的请求被拦截，其余放行。

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::cache::{CacheProvider, MemoryCacheProvider};
use crate::compiler::{CompiledPredicate, RuleCompiler};
use crate::config::{ChangeSource, ConfigChangeRecord, WafConfig};
use crate::error::{BlockInfo, Decision, RuleWallError};
use crate::fact::{RequestFact, WebRequest};
use crate::hot_reload::HotReloader;
use crate::matchers::Matchers;
use crate::rate_counter::RateCounter;
use crate::rule::RuleNode;

/// 引擎统计
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EngineStats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    /// 当前规则集代数
    pub generation: u64,
    pub ruleset_hash: String,
}

/// 防火墙引擎
///
/// 片段缓存和正则限制在创建时确定；规则集和请求计数设置可以在运行时更新。
pub struct WafEngine<F = WebRequest> {
    reloader: Arc<HotReloader<F>>,
    matchers: Arc<Matchers>,
    provider: Arc<dyn CacheProvider>,
    rate_counter: RwLock<Option<Arc<RateCounter>>>,
    config: RwLock<WafConfig>,
    total_requests: AtomicU64,
    blocked_requests: AtomicU64,
}

impl<F: RequestFact> WafEngine<F> {
    /// 使用内存缓存提供者创建引擎
    pub fn new(config: WafConfig) -> Result<Self, RuleWallError> {
        Self::with_provider(config, Arc::new(MemoryCacheProvider::new()))
    }

    /// 使用指定的缓存提供者创建引擎
    pub fn with_provider(
        config: WafConfig,
        provider: Arc<dyn CacheProvider>,
    ) -> Result<Self, RuleWallError> {
        config.validate().map_err(RuleWallError::ValidationError)?;

        let matchers = Arc::new(Matchers::new(&config.cache, &config.regex));
        let compiler = Arc::new(RuleCompiler::for_fact(Arc::clone(&matchers)));
        let reloader = Arc::new(HotReloader::new(compiler, &config.ruleset)?);
        let rate_counter = Self::build_rate_counter(&config, &provider);

        info!(
            schema = reloader.compiler().schema().name(),
            hash = %reloader.slot().load().ruleset_hash(),
            rate_limit = config.rate_limit.enabled,
            "防火墙引擎已创建"
        );

        Ok(Self {
            reloader,
            matchers,
            provider,
            rate_counter: RwLock::new(rate_counter),
            config: RwLock::new(config),
            total_requests: AtomicU64::new(0),
            blocked_requests: AtomicU64::new(0),
        })
    }

    fn build_rate_counter(
        config: &WafConfig,
        provider: &Arc<dyn CacheProvider>,
    ) -> Option<Arc<RateCounter>> {
        config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateCounter::new(Arc::clone(provider), &config.rate_limit)))
    }

    /// 检查请求
    #[instrument(level = "debug", skip_all)]
    pub async fn check(&self, fact: &F) -> Decision {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let counter = self.rate_counter.read().clone();
        if let Some(counter) = counter {
            counter.record(fact.client_ip()).await;
        }

        // 每个请求只取一次，整次求值都使用同一代规则集
        let predicate = self.reloader.slot().load();
        if !predicate.evaluate(fact) {
            return Decision::Allowed;
        }

        self.blocked_requests.fetch_add(1, Ordering::Relaxed);
        let remote_ip = fact.client_ip().map(str::to_string);
        warn!(
            generation = predicate.generation(),
            path = fact.request_path(),
            "Forbidden request from {}",
            remote_ip.as_deref().unwrap_or("unknown")
        );
        Decision::Blocked(BlockInfo {
            generation: predicate.generation(),
            remote_ip,
            path: fact.request_path().to_string(),
        })
    }

    /// 只对规则集求值，不计数
    pub fn evaluate(&self, fact: &F) -> bool {
        self.reloader.slot().load().evaluate(fact)
    }

    /// 替换规则集，返回新代数；编译失败时当前规则集保持不变
    pub fn update_ruleset(&self, ruleset: RuleNode, source: ChangeSource) -> Result<u64, RuleWallError> {
        // 持有配置写锁直到记录完成，配置与生效版本保持一致
        let mut config = self.config.write();
        let generation = self.reloader.reload(&ruleset, source)?;
        config.ruleset = ruleset;
        Ok(generation)
    }

    /// 更新配置
    ///
    /// 规则集和请求计数设置立即生效；缓存和正则设置只在创建引擎时读取。
    #[instrument(skip(self, new_config))]
    pub fn update_config(&self, new_config: WafConfig, source: ChangeSource) -> Result<u64, RuleWallError> {
        new_config.validate().map_err(RuleWallError::ValidationError)?;

        let mut config = self.config.write();
        let generation = self.reloader.reload(&new_config.ruleset, source)?;

        if config.cache != new_config.cache || config.regex != new_config.regex {
            warn!("缓存与正则设置的变更需要重建引擎后生效");
        }
        if config.rate_limit != new_config.rate_limit {
            info!(
                enabled = new_config.rate_limit.enabled,
                window_secs = new_config.rate_limit.window_secs,
                "请求计数设置已更新"
            );
            *self.rate_counter.write() = Self::build_rate_counter(&new_config, &self.provider);
        }
        *config = new_config;
        Ok(generation)
    }

    /// 订阅规则树通道，通道中的每个新规则树都会被编译并发布
    ///
    /// 通道推送的规则集只记录在变更历史中，不写回 [`WafEngine::config`]。
    pub fn subscribe(&self, receiver: watch::Receiver<RuleNode>) -> JoinHandle<()> {
        Arc::clone(&self.reloader).watch(receiver)
    }

    /// 当前生效的编译结果
    pub fn active(&self) -> Arc<CompiledPredicate<F>> {
        self.reloader.slot().load()
    }

    pub fn generation(&self) -> u64 {
        self.reloader.slot().generation()
    }

    /// 规则集变更历史
    pub fn history(&self) -> Vec<ConfigChangeRecord> {
        self.reloader.slot().history()
    }

    /// 当前配置（规则集为最近一次成功更新的版本）
    pub fn config(&self) -> WafConfig {
        self.config.read().clone()
    }

    pub fn stats(&self) -> EngineStats {
        let active = self.reloader.slot().load();
        EngineStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            blocked_requests: self.blocked_requests.load(Ordering::Relaxed),
            generation: active.generation(),
            ruleset_hash: active.ruleset_hash().to_string(),
        }
    }

    pub fn reset_stats(&self) {
        info!("重置统计信息");
        self.total_requests.store(0, Ordering::Relaxed);
        self.blocked_requests.store(0, Ordering::Relaxed);
    }

    pub fn matchers(&self) -> &Arc<Matchers> {
        &self.matchers
    }

    pub fn rate_counter(&self) -> Option<Arc<RateCounter>> {
        self.rate_counter.read().clone()
    }

    /// 清理片段缓存中的过期条目
    pub fn purge_expired(&self) -> usize {
        self.matchers.purge_expired()
    }
}
