//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from RuleWall,
//! allowing users to import them with a single `use rulewall::prelude::*;`
//! statement instead of importing each type individually.

// Core types
pub use crate::config::{default_ruleset, ChangeSource, RateLimitSettings, WafConfig};
pub use crate::engine::WafEngine;
pub use crate::error::{BlockInfo, Decision, RuleWallError};
pub use crate::rule::RuleNode;

// Facts
pub use crate::fact::WebRequest;
pub use crate::schema::{Fact, FactSchema, MethodEnv};
pub use crate::value::{Literal, Value, ValueType};

// Compiler
pub use crate::compiler::{CompiledPredicate, RuleCompiler};

// Cache provider
pub use crate::cache::{CacheProvider, MemoryCacheProvider};
