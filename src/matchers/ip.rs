//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! IP列表匹配
//!
//! 列表格式：逗号或分号分隔，每项可以是
//! - 精确地址: `192.168.1.100`
//! - CIDR: `192.168.1.0/24`、`2001:db8::/32`
//! - 通配符: `192.168.*.*`、`10.0.1.*`

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::constants::LIST_DELIMITERS;

/// IP规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRuleKind {
    Exact,
    Cidr,
    Wildcard,
}

/// 解析后的IP规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIpRule {
    pub kind: IpRuleKind,
    /// 原始条目文本
    pub raw: String,
    pub network: Option<IpAddr>,
    pub prefix_len: Option<u8>,
}

impl ParsedIpRule {
    fn exact(raw: &str) -> Self {
        Self {
            kind: IpRuleKind::Exact,
            raw: raw.to_string(),
            network: None,
            prefix_len: None,
        }
    }

    fn wildcard(raw: &str) -> Self {
        Self {
            kind: IpRuleKind::Wildcard,
            raw: raw.to_string(),
            network: None,
            prefix_len: None,
        }
    }

    /// 解析CIDR条目，网络地址或前缀无效时返回 `None`
    fn cidr(raw: &str, slash: usize) -> Option<Self> {
        let network: IpAddr = raw[..slash].parse().ok()?;
        let prefix_len: u8 = raw[slash + 1..].parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max_prefix {
            return None;
        }
        Some(Self {
            kind: IpRuleKind::Cidr,
            raw: raw.to_string(),
            network: Some(network),
            prefix_len: Some(prefix_len),
        })
    }

    /// 检查地址是否命中本规则
    ///
    /// `text` 为候选地址的原始文本，精确匹配和通配符匹配按文本比较。
    pub fn matches(&self, address: &IpAddr, text: &str) -> bool {
        match self.kind {
            IpRuleKind::Exact => self.raw == text,
            IpRuleKind::Wildcard => match_wildcard(text, &self.raw),
            IpRuleKind::Cidr => match (self.network, self.prefix_len) {
                (Some(network), Some(prefix)) => in_subnet(address, &network, prefix),
                _ => false,
            },
        }
    }
}

/// 按分隔符拆分列表，去除空白与空项
pub fn split_list(spec: &str) -> impl Iterator<Item = &str> {
    spec.split(LIST_DELIMITERS)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

/// 解析IP列表，无效的CIDR条目被静默丢弃
pub fn parse_ip_list(spec: &str) -> Vec<ParsedIpRule> {
    split_list(spec)
        .filter_map(|entry| match entry.find('/') {
            Some(slash) if slash > 0 && slash < entry.len() - 1 => ParsedIpRule::cidr(entry, slash),
            _ if entry.contains('*') => Some(ParsedIpRule::wildcard(entry)),
            _ => Some(ParsedIpRule::exact(entry)),
        })
        .collect()
}

/// 检查候选地址是否命中任一规则（按原顺序，首个命中即返回）
///
/// 候选地址为空或无法解析时返回 `false`。
pub fn matches(address: &str, rules: &[ParsedIpRule]) -> bool {
    let text = address.trim();
    let Ok(parsed) = text.parse::<IpAddr>() else {
        return false;
    };
    rules.iter().any(|rule| rule.matches(&parsed, text))
}

/// 检查地址是否位于 `network/prefix` 子网内；地址族不同时返回 `false`
pub fn in_subnet(address: &IpAddr, network: &IpAddr, prefix: u8) -> bool {
    match (address, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => ipv4_in_cidr(ip, net, prefix),
        (IpAddr::V6(ip), IpAddr::V6(net)) => ipv6_in_cidr(ip, net, prefix),
        _ => false,
    }
}

fn ipv4_in_cidr(ip: &Ipv4Addr, network: &Ipv4Addr, prefix: u8) -> bool {
    if prefix > 32 {
        return false;
    }
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    (u32::from(*ip) & mask) == (u32::from(*network) & mask)
}

fn ipv6_in_cidr(ip: &Ipv6Addr, network: &Ipv6Addr, prefix: u8) -> bool {
    if prefix > 128 {
        return false;
    }
    let mask = if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix)
    };
    (u128::from(*ip) & mask) == (u128::from(*network) & mask)
}

/// 通配符匹配：两侧都必须恰好4段，`*` 匹配任意段
fn match_wildcard(ip: &str, pattern: &str) -> bool {
    let ip_parts: Vec<&str> = ip.split('.').collect();
    let pattern_parts: Vec<&str> = pattern.split('.').collect();
    if ip_parts.len() != 4 || pattern_parts.len() != 4 {
        return false;
    }
    ip_parts
        .iter()
        .zip(pattern_parts.iter())
        .all(|(segment, pattern)| *pattern == "*" || segment == pattern)
}
