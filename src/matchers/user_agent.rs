//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! User-Agent 匹配
//!
//! 列表以逗号或分号分隔，比较不区分大小写。UA为空白或列表为空时，
//! 所有肯定形式的谓词都返回 `false`，否定形式是其补集。

use regex::Regex;

use crate::matchers::ip::split_list;

/// 解析后的UA列表（已转为小写）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUaList {
    entries: Vec<String>,
}

impl ParsedUaList {
    pub fn parse(spec: &str) -> Self {
        Self {
            entries: split_list(spec).map(str::to_lowercase).collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 对非空UA的小写形式执行检查
    fn check(&self, user_agent: Option<&str>, predicate: impl Fn(&str, &str) -> bool) -> bool {
        let Some(user_agent) = user_agent.filter(|ua| is_not_empty(Some(ua))) else {
            return false;
        };
        let lowered = user_agent.to_lowercase();
        self.entries.iter().any(|entry| predicate(&lowered, entry))
    }
}

/// UA包含任一关键字
pub fn contains_any(user_agent: Option<&str>, keywords: &ParsedUaList) -> bool {
    keywords.check(user_agent, |ua, keyword| ua.contains(keyword))
}

pub fn not_contains_any(user_agent: Option<&str>, keywords: &ParsedUaList) -> bool {
    !contains_any(user_agent, keywords)
}

/// UA与列表中某项完全相同
pub fn is_in_list(user_agent: Option<&str>, agents: &ParsedUaList) -> bool {
    agents.check(user_agent, |ua, agent| ua == agent)
}

pub fn is_not_in_list(user_agent: Option<&str>, agents: &ParsedUaList) -> bool {
    !is_in_list(user_agent, agents)
}

/// UA以任一前缀开头
pub fn starts_with_any(user_agent: Option<&str>, prefixes: &ParsedUaList) -> bool {
    prefixes.check(user_agent, |ua, prefix| ua.starts_with(prefix))
}

/// UA匹配正则；正则无效（`None`）或UA超过长度上限时不匹配
pub fn matches_pattern(user_agent: Option<&str>, regex: Option<&Regex>, max_len: usize) -> bool {
    match (user_agent, regex) {
        (Some(ua), Some(regex)) if is_not_empty(Some(ua)) && ua.len() <= max_len => {
            regex.is_match(ua)
        }
        _ => false,
    }
}

/// UA为空或全为空白
pub fn is_empty(user_agent: Option<&str>) -> bool {
    !is_not_empty(user_agent)
}

pub fn is_not_empty(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| !ua.trim().is_empty())
}
