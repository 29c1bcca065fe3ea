//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型，以及请求检查的决策结果。

use thiserror::Error;

/// RuleWall 错误类型
#[derive(Error, Debug)]
pub enum RuleWallError {
    /// 规则配置错误（编译期），带出错节点的规则ID
    #[error("配置错误 [rule {rule_id}]: {message}")]
    ConfigError { rule_id: String, message: String },

    /// 配置校验错误（与具体规则节点无关）
    #[error("验证错误: {0}")]
    ValidationError(String),

    /// 缓存/存储错误
    #[error("存储错误: {0}")]
    StorageError(#[from] StorageError),

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON解析错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[cfg(feature = "yaml")]
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[cfg(feature = "toml-config")]
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl RuleWallError {
    /// 构造指向某个规则节点的配置错误
    pub fn config(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        RuleWallError::ConfigError {
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }

    /// 出错节点的规则ID（仅配置错误）
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            RuleWallError::ConfigError { rule_id, .. } => Some(rule_id),
            _ => None,
        }
    }
}

/// 存储错误
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),

    /// 值类型错误（例如对非数字值做自增）
    #[error("值类型错误: {0}")]
    TypeError(String),
}

/// 决策结果
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 放行
    Allowed,
    /// 拦截（请求命中了拦截规则集）
    Blocked(BlockInfo),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Blocked(_))
    }
}

/// 拦截信息
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    /// 命中规则集的代数
    pub generation: u64,
    /// 远程IP（可能为空）
    pub remote_ip: Option<String>,
    /// 请求路径
    pub path: String,
}
