//! 配置模块
//!
//! 定义防火墙的配置结构、配置变更记录与变更历史。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    DEFAULT_CONFIG_HISTORY_SIZE, DEFAULT_FRAGMENT_CAPACITY, DEFAULT_FRAGMENT_TTL_SECS,
    DEFAULT_IP_FILE_TTL_SECS, DEFAULT_RATE_ALERT_THRESHOLD, DEFAULT_RATE_WINDOW_SECS,
    DEFAULT_REGEX_DFA_SIZE_LIMIT, DEFAULT_REGEX_MAX_INPUT_LEN, DEFAULT_REGEX_SIZE_LIMIT,
};
use crate::error::RuleWallError;
use crate::rule::RuleNode;

/// 防火墙配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WafConfig {
    /// 拦截规则集，命中即拦截
    #[serde(default = "default_ruleset", alias = "Ruleset")]
    pub ruleset: RuleNode,
    #[serde(default, alias = "rateLimit", alias = "RateLimit")]
    pub rate_limit: RateLimitSettings,
    #[serde(default, alias = "Cache")]
    pub cache: CacheSettings,
    #[serde(default, alias = "Regex")]
    pub regex: RegexSettings,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            ruleset: default_ruleset(),
            rate_limit: RateLimitSettings::default(),
            cache: CacheSettings::default(),
            regex: RegexSettings::default(),
        }
    }
}

/// 默认规则集：拦截 `.php` 路径和脚本类客户端
pub fn default_ruleset() -> RuleNode {
    RuleNode::or_else(vec![
        RuleNode::method_on("Path", "EndsWith", [".php"]),
        RuleNode::is_match("UserAgent", "^(curl|java|python)"),
    ])
}

impl WafConfig {
    pub fn new(ruleset: RuleNode) -> Self {
        Self {
            ruleset,
            ..Default::default()
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitSettings) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_regex(mut self, regex: RegexSettings) -> Self {
        self.regex = regex;
        self
    }

    /// 从JSON文本加载
    pub fn from_json(text: &str) -> Result<Self, RuleWallError> {
        Ok(serde_json::from_str(text)?)
    }

    /// 从YAML文本加载
    #[cfg(feature = "yaml")]
    pub fn from_yaml(text: &str) -> Result<Self, RuleWallError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// 从TOML文本加载
    #[cfg(feature = "toml-config")]
    pub fn from_toml(text: &str) -> Result<Self, RuleWallError> {
        Ok(toml::from_str(text)?)
    }

    /// 按扩展名从文件加载（`.json` / `.yaml` / `.yml` / `.toml`）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleWallError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::from_json(&text),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Self::from_yaml(&text),
            #[cfg(feature = "toml-config")]
            "toml" => Self::from_toml(&text),
            other => Err(RuleWallError::ValidationError(format!(
                "不支持的配置文件格式: {:?}",
                other
            ))),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if self.ruleset.operator.trim().is_empty() {
            return Err("规则集根节点缺少运算符".to_string());
        }

        self.rate_limit
            .validate()
            .map_err(|e| format!("rate_limit: {}", e))?;
        self.cache.validate().map_err(|e| format!("cache: {}", e))?;
        self.regex.validate().map_err(|e| format!("regex: {}", e))?;

        Ok(())
    }

    /// 计算配置哈希值
    pub fn compute_hash(&self) -> String {
        let config_str = serde_json::to_string(self).unwrap_or_default();
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        config_str.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    /// 比较配置是否相同（基于哈希值）
    pub fn is_same_as(&self, other: &WafConfig) -> bool {
        self.compute_hash() == other.compute_hash()
    }
}

/// 请求计数配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    /// 计数窗口（秒）
    pub window_secs: u64,
    /// 窗口内超过该值时记录告警
    pub alert_threshold: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            window_secs: DEFAULT_RATE_WINDOW_SECS,
            alert_threshold: DEFAULT_RATE_ALERT_THRESHOLD,
        }
    }
}

impl RateLimitSettings {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn window_secs(mut self, window_secs: u64) -> Self {
        self.window_secs = window_secs;
        self
    }

    pub fn alert_threshold(mut self, alert_threshold: u64) -> Self {
        self.alert_threshold = alert_threshold;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.enabled {
            if self.window_secs == 0 {
                return Err("计数窗口必须大于0".to_string());
            }
            if self.alert_threshold == 0 {
                return Err("告警阈值必须大于0".to_string());
            }
        }
        Ok(())
    }
}

/// 片段缓存配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// IP/UA列表与正则的缓存TTL（秒）
    pub ttl_secs: u64,
    /// 每个缓存的最大条目数
    pub capacity: usize,
    /// IP文件的缓存TTL（秒）
    pub ip_file_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_FRAGMENT_TTL_SECS,
            capacity: DEFAULT_FRAGMENT_CAPACITY,
            ip_file_ttl_secs: DEFAULT_IP_FILE_TTL_SECS,
        }
    }
}

impl CacheSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("缓存TTL必须大于0".to_string());
        }
        if self.capacity == 0 {
            return Err("缓存容量必须大于0".to_string());
        }
        if self.ip_file_ttl_secs == 0 {
            return Err("IP文件缓存TTL必须大于0".to_string());
        }
        Ok(())
    }
}

/// 正则限制
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegexSettings {
    /// 匹配主体的最大长度，超出视为不匹配
    pub max_input_len: usize,
    /// 编译后正则的大小上限（字节）
    pub size_limit: usize,
    /// 惰性DFA缓存上限（字节）
    pub dfa_size_limit: usize,
}

impl Default for RegexSettings {
    fn default() -> Self {
        Self {
            max_input_len: DEFAULT_REGEX_MAX_INPUT_LEN,
            size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            dfa_size_limit: DEFAULT_REGEX_DFA_SIZE_LIMIT,
        }
    }
}

impl RegexSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_input_len == 0 {
            return Err("max_input_len必须大于0".to_string());
        }
        if self.size_limit == 0 || self.dfa_size_limit == 0 {
            return Err("正则大小上限必须大于0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// 变更记录
// ============================================================================

/// 配置变更来源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ChangeSource {
    /// 引擎创建时的初始规则集
    Initial,
    /// 手动触发
    Manual { operator: String },
    /// 规则订阅通道推送
    Watch,
    /// API触发
    Api,
}

/// 配置变更记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigChangeRecord {
    pub timestamp: DateTime<Utc>,
    pub old_generation: Option<u64>,
    pub new_generation: u64,
    pub old_hash: Option<String>,
    pub new_hash: String,
    pub source: ChangeSource,
    /// 新规则树的节点数
    pub node_count: usize,
}

/// 配置变更历史
#[derive(Debug, Clone)]
pub struct ConfigHistory {
    records: Vec<ConfigChangeRecord>,
    max_records: usize,
}

impl ConfigHistory {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Vec::with_capacity(max_records),
            max_records,
        }
    }

    pub fn add_record(&mut self, record: ConfigChangeRecord) {
        self.records.push(record);
        if self.records.len() > self.max_records {
            self.records.remove(0);
        }
    }

    pub fn get_records(&self) -> &[ConfigChangeRecord] {
        &self.records
    }

    pub fn get_latest(&self) -> Option<&ConfigChangeRecord> {
        self.records.last()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for ConfigHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_HISTORY_SIZE)
    }
}
