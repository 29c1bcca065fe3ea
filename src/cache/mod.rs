//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 缓存模块
//!
//! 提供规则片段缓存（同步，供谓词求值使用）和缓存提供者接口（异步，供请求计数器使用）。

pub mod fragment;
pub mod provider;

pub use fragment::{FragmentCache, FragmentCacheStats};
pub use provider::{CacheProvider, MemoryCacheProvider, ValueFactory};
