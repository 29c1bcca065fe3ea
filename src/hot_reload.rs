//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 规则热更新
//!
//! [`PredicateSlot`] 持有当前生效的编译结果，读取无锁，替换是一次原子存储。
//! 新规则集总是先完整编译再发布，正在求值的请求继续使用它们已经取到的旧版本。
//!
//! [`HotReloader`] 负责"编译 + 发布"，也可以订阅 `tokio::sync::watch` 通道，
//! 在规则树变化时自动重载；无效的规则树只记录错误，旧版本继续生效。

use arc_swap::ArcSwap;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::compiler::{CompiledPredicate, RuleCompiler};
use crate::config::{ChangeSource, ConfigChangeRecord, ConfigHistory};
use crate::error::RuleWallError;
use crate::rule::RuleNode;

/// 发布结果
pub enum PublishOutcome<F> {
    /// 已发布，附带被替换的旧版本
    Published {
        generation: u64,
        previous: Arc<CompiledPredicate<F>>,
    },
    /// 与当前规则集哈希相同，未发布
    Unchanged { generation: u64 },
}

impl<F> PublishOutcome<F> {
    /// 发布后（或未变化时）生效的代数
    pub fn generation(&self) -> u64 {
        match self {
            PublishOutcome::Published { generation, .. } => *generation,
            PublishOutcome::Unchanged { generation } => *generation,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published { .. })
    }
}

/// 当前生效的编译结果
pub struct PredicateSlot<F> {
    active: ArcSwap<CompiledPredicate<F>>,
    generation: AtomicU64,
    /// 同时充当发布锁，保证代数与历史记录顺序一致
    history: Mutex<ConfigHistory>,
}

impl<F> PredicateSlot<F> {
    /// 以初始编译结果创建，初始代数为1
    pub fn new(initial: CompiledPredicate<F>) -> Self {
        Self::with_history(initial, ConfigHistory::default())
    }

    pub fn with_history(mut initial: CompiledPredicate<F>, mut history: ConfigHistory) -> Self {
        initial.set_generation(1);
        history.add_record(ConfigChangeRecord {
            timestamp: Utc::now(),
            old_generation: None,
            new_generation: 1,
            old_hash: None,
            new_hash: initial.ruleset_hash().to_string(),
            source: ChangeSource::Initial,
            node_count: initial.node_count(),
        });

        Self {
            active: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(1),
            history: Mutex::new(history),
        }
    }

    /// 取当前编译结果
    pub fn load(&self) -> Arc<CompiledPredicate<F>> {
        self.active.load_full()
    }

    /// 当前代数
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 发布新的编译结果
    ///
    /// 哈希与当前版本相同时不发布；比较和替换都在发布锁内完成。
    pub fn publish(&self, mut next: CompiledPredicate<F>, source: ChangeSource) -> PublishOutcome<F> {
        let mut history = self.history.lock();

        let current = self.generation.load(Ordering::Acquire);
        if self.active.load().ruleset_hash() == next.ruleset_hash() {
            return PublishOutcome::Unchanged {
                generation: current,
            };
        }

        let generation = current + 1;
        next.set_generation(generation);
        let new_hash = next.ruleset_hash().to_string();
        let node_count = next.node_count();

        let previous = self.active.swap(Arc::new(next));
        self.generation.store(generation, Ordering::Release);

        history.add_record(ConfigChangeRecord {
            timestamp: Utc::now(),
            old_generation: Some(previous.generation()),
            new_generation: generation,
            old_hash: Some(previous.ruleset_hash().to_string()),
            new_hash: new_hash.clone(),
            source,
            node_count,
        });
        drop(history);

        info!(
            generation,
            hash = %new_hash,
            nodes = node_count,
            "规则集已发布"
        );
        PublishOutcome::Published {
            generation,
            previous,
        }
    }

    /// 变更历史（按时间顺序）
    pub fn history(&self) -> Vec<ConfigChangeRecord> {
        self.history.lock().get_records().to_vec()
    }

    /// 最近一次变更
    pub fn latest_change(&self) -> Option<ConfigChangeRecord> {
        self.history.lock().get_latest().cloned()
    }
}

/// 编译并发布规则集
pub struct HotReloader<F> {
    compiler: Arc<RuleCompiler<F>>,
    slot: Arc<PredicateSlot<F>>,
}

impl<F: Send + Sync + 'static> HotReloader<F> {
    /// 编译初始规则集；初始规则集无效时返回错误
    pub fn new(compiler: Arc<RuleCompiler<F>>, initial: &RuleNode) -> Result<Self, RuleWallError> {
        let compiled = compiler.compile(initial)?;
        Ok(Self {
            compiler,
            slot: Arc::new(PredicateSlot::new(compiled)),
        })
    }

    pub fn slot(&self) -> &Arc<PredicateSlot<F>> {
        &self.slot
    }

    pub fn compiler(&self) -> &Arc<RuleCompiler<F>> {
        &self.compiler
    }

    /// 重新编译并发布，返回新代数
    ///
    /// 编译失败时不发布，当前规则集保持不变。
    #[instrument(skip(self, ruleset), fields(nodes = ruleset.node_count()))]
    pub fn reload(&self, ruleset: &RuleNode, source: ChangeSource) -> Result<u64, RuleWallError> {
        let compiled = self.compiler.compile(ruleset)?;
        let outcome = self.slot.publish(compiled, source);
        if !outcome.is_published() {
            info!("规则集未变化，跳过发布");
        }
        Ok(outcome.generation())
    }

    /// 订阅规则树通道，每次变更后重载
    ///
    /// 发送端全部关闭后任务结束。
    pub fn watch(self: Arc<Self>, mut receiver: watch::Receiver<RuleNode>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("启动规则订阅");
            while receiver.changed().await.is_ok() {
                let ruleset = receiver.borrow_and_update().clone();
                if let Err(e) = self.reload(&ruleset, ChangeSource::Watch) {
                    error!(
                        generation = self.slot.generation(),
                        "规则集无效，继续使用当前版本: {}", e
                    );
                }
            }
            info!("规则订阅通道已关闭");
        })
    }
}
