//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 匹配器模块
//!
//! IP列表与User-Agent匹配，以及为它们提供缓存的 [`Matchers`]。
//!
//! 列表文本和正则在首次使用时解析并按 `命名空间 + 文本` 缓存，命名空间是
//! 规则节点的ID。缓存归引擎实例所有。

pub mod ip;
pub mod user_agent;

use regex::{Regex, RegexBuilder};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::cache::FragmentCache;
use crate::config::{CacheSettings, RegexSettings};
use crate::constants::IP_FILE_RETRY_SECS;

pub use ip::{IpRuleKind, ParsedIpRule};
pub use user_agent::ParsedUaList;

/// 带缓存的匹配器集合
pub struct Matchers {
    ip_lists: FragmentCache<Arc<Vec<ParsedIpRule>>>,
    ua_lists: FragmentCache<Arc<ParsedUaList>>,
    regexes: FragmentCache<Option<Arc<Regex>>>,
    ip_files: FragmentCache<Arc<Vec<String>>>,
    fragment_ttl: Duration,
    ip_file_ttl: Duration,
    /// 读取失败后的重试间隔
    ip_file_retry: Duration,
    regex_settings: RegexSettings,
}

impl Matchers {
    pub fn new(cache: &CacheSettings, regex: &RegexSettings) -> Self {
        Self {
            ip_lists: FragmentCache::new("ip_lists", cache.capacity),
            ua_lists: FragmentCache::new("ua_lists", cache.capacity),
            regexes: FragmentCache::new("regexes", cache.capacity),
            ip_files: FragmentCache::new("ip_files", cache.capacity),
            fragment_ttl: Duration::from_secs(cache.ttl_secs),
            ip_file_ttl: Duration::from_secs(cache.ip_file_ttl_secs),
            ip_file_retry: Duration::from_secs(IP_FILE_RETRY_SECS.min(cache.ip_file_ttl_secs)),
            regex_settings: regex.clone(),
        }
    }

    fn key(namespace: &str, text: &str) -> String {
        format!("{}|{}", namespace, text)
    }

    /// 解析（或取缓存的）IP列表
    pub fn ip_rules(&self, namespace: &str, spec: &str) -> Arc<Vec<ParsedIpRule>> {
        self.ip_lists
            .get_or_compute(&Self::key(namespace, spec), self.fragment_ttl, || {
                Arc::new(ip::parse_ip_list(spec))
            })
    }

    /// 地址是否在IP列表中
    pub fn ip_in_list(&self, namespace: &str, address: Option<&str>, spec: &str) -> bool {
        let Some(address) = address.filter(|a| !a.trim().is_empty()) else {
            return false;
        };
        if spec.trim().is_empty() {
            return false;
        }
        ip::matches(address, &self.ip_rules(namespace, spec))
    }

    /// 解析（或取缓存的）UA列表
    pub fn ua_list(&self, namespace: &str, spec: &str) -> Arc<ParsedUaList> {
        self.ua_lists
            .get_or_compute(&Self::key(namespace, spec), self.fragment_ttl, || {
                Arc::new(ParsedUaList::parse(spec))
            })
    }

    /// 编译（或取缓存的）正则，不区分大小写；无效正则得到 `None`
    pub fn regex(&self, namespace: &str, pattern: &str) -> Option<Arc<Regex>> {
        self.regexes
            .get_or_compute(&Self::key(namespace, pattern), self.fragment_ttl, || {
                match RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .size_limit(self.regex_settings.size_limit)
                    .dfa_size_limit(self.regex_settings.dfa_size_limit)
                    .build()
                {
                    Ok(regex) => Some(Arc::new(regex)),
                    Err(e) => {
                        warn!(rule_id = namespace, pattern, "无效的正则表达式: {}", e);
                        None
                    }
                }
            })
    }

    /// 正则匹配，主体超过长度上限时视为不匹配
    pub fn is_match(&self, regex: &Regex, subject: &str) -> bool {
        subject.len() <= self.regex_settings.max_input_len && regex.is_match(subject)
    }

    /// UA匹配正则
    pub fn ua_matches(&self, namespace: &str, ua: Option<&str>, pattern: &str) -> bool {
        if pattern.trim().is_empty() {
            return false;
        }
        let regex = self.regex(namespace, pattern);
        user_agent::matches_pattern(
            ua,
            regex.as_deref(),
            self.regex_settings.max_input_len,
        )
    }

    /// 地址是否在IP文件中（每行一个地址，比较不区分大小写）
    ///
    /// 文件在TTL窗口内最多读取一次；读取失败时记为空列表，重试间隔内不再读取。
    pub fn ip_in_file(&self, namespace: &str, address: Option<&str>, path: &str) -> bool {
        let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) else {
            return false;
        };
        let key = Self::key(namespace, path);
        let loaded = self
            .ip_files
            .try_get_or_compute(&key, self.ip_file_ttl, || {
                std::fs::read_to_string(path).map(|content| {
                    Arc::new(
                        content
                            .lines()
                            .map(str::trim)
                            .filter(|line| !line.is_empty())
                            .map(str::to_string)
                            .collect::<Vec<_>>(),
                    )
                })
            });
        match loaded {
            Ok(lines) => lines.iter().any(|line| line.eq_ignore_ascii_case(address)),
            Err(e) => {
                warn!(rule_id = namespace, path, "读取IP文件失败: {}", e);
                self.ip_files
                    .insert(&key, Arc::new(Vec::new()), self.ip_file_retry);
                false
            }
        }
    }

    /// 地址是否位于 `network/prefix` 子网内；参数无效时返回 `false`
    pub fn in_subnet(address: Option<&str>, network: &str, prefix: i64) -> bool {
        let Some(address) = address.and_then(|a| a.trim().parse::<IpAddr>().ok()) else {
            return false;
        };
        let Ok(network) = network.trim().parse::<IpAddr>() else {
            return false;
        };
        let Ok(prefix) = u8::try_from(prefix) else {
            return false;
        };
        ip::in_subnet(&address, &network, prefix)
    }

    /// 清理所有缓存中的过期条目
    pub fn purge_expired(&self) -> usize {
        self.ip_lists.purge_expired()
            + self.ua_lists.purge_expired()
            + self.regexes.purge_expired()
            + self.ip_files.purge_expired()
    }

    pub fn ip_list_cache(&self) -> &FragmentCache<Arc<Vec<ParsedIpRule>>> {
        &self.ip_lists
    }

    pub fn ua_list_cache(&self) -> &FragmentCache<Arc<ParsedUaList>> {
        &self.ua_lists
    }

    pub fn regex_cache(&self) -> &FragmentCache<Option<Arc<Regex>>> {
        &self.regexes
    }

    pub fn ip_file_cache(&self) -> &FragmentCache<Arc<Vec<String>>> {
        &self.ip_files
    }

    pub fn regex_settings(&self) -> &RegexSettings {
        &self.regex_settings
    }
}

impl Default for Matchers {
    fn default() -> Self {
        Self::new(&CacheSettings::default(), &RegexSettings::default())
    }
}
