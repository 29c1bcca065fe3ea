//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! RuleWall - Rule-Tree Request Filter
//!
//! Compiles a declarative boolean rule tree into a predicate over request
//! facts and uses it to allow or block traffic.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use rulewall::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`WafEngine`] - Evaluation entry point with hot reload and rate counting
//! - [`WafConfig`] - Ruleset, rate counter, cache and regex settings
//! - [`RuleNode`] - One node of the rule tree
//! - [`Decision`] - Decision result of a request check
//! - [`RuleWallError`] - Error types
//!
//! ## Rule Compiler
//!
//! [`RuleCompiler`] turns a [`RuleNode`] tree into a [`CompiledPredicate`]
//! against a [`FactSchema`]. [`WebRequest`] is the built-in fact; hosts can
//! declare their own by implementing [`Fact`].
//!
//! ## Matchers
//!
//! IP lists (exact, CIDR, wildcard) and user-agent lists, backed by the
//! short-TTL fragment caches in [`Matchers`].
//!
//! # Examples
//!
//! ```rust
//! use rulewall::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine: WafEngine = WafEngine::new(WafConfig::default()).unwrap();
//!
//!     let request = WebRequest::new()
//!         .with_path("/wp-login.php")
//!         .with_remote_ip("203.0.113.7");
//!     assert!(engine.check(&request).await.is_blocked());
//!
//!     let request = WebRequest::new().with_user_agent("Mozilla/5.0");
//!     assert!(engine.check(&request).await.is_allowed());
//! }
//! ```
//!
//! # Features
//!
//! - **Compiled rules**: member paths, methods and literals are resolved once per ruleset
//! - **Short-circuit and eager combinators**: `AndAlso`/`OrElse` and `And`/`Or`
//! - **Collection quantifiers**: `Any`/`All` over list members
//! - **Lock-free hot reload**: in-flight requests keep the ruleset they started with
//! - **Bounded regexes**: size limits and a maximum subject length

pub mod prelude;

pub mod cache;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod fact;
pub mod hot_reload;
pub mod matchers;
pub mod methods;
pub mod operator;
pub mod rate_counter;
pub mod rule;
pub mod schema;
pub mod value;

// 重新导出常用类型
pub use cache::{CacheProvider, FragmentCache, FragmentCacheStats, MemoryCacheProvider};
pub use compiler::{CompiledPredicate, Predicate, RuleCompiler};
pub use config::{
    default_ruleset, CacheSettings, ChangeSource, ConfigChangeRecord, ConfigHistory,
    RateLimitSettings, RegexSettings, WafConfig,
};
pub use engine::{EngineStats, WafEngine};
pub use error::{BlockInfo, Decision, RuleWallError, StorageError};
pub use fact::{RequestFact, WebRequest};
pub use hot_reload::{HotReloader, PredicateSlot, PublishOutcome};
pub use matchers::{IpRuleKind, Matchers, ParsedIpRule, ParsedUaList};
pub use operator::{CompareOp, LogicalOp, NumericKind, Operator, Quantifier};
pub use rate_counter::RateCounter;
pub use rule::RuleNode;
pub use schema::{Fact, FactSchema, MethodEnv};
pub use value::{Literal, RecordType, Value, ValueType};
