//! 匹配器集成测试
//!
//! 通过规则集验证IP列表和UA列表的边界行为。

use crate::common::*;
use rulewall::{
    fact::WebRequest,
    matchers::{ip, user_agent, IpRuleKind, ParsedUaList},
    rule::RuleNode,
};

fn ip_request(remote_ip: &str) -> WebRequest {
    WebRequest::new().with_remote_ip(remote_ip)
}

fn ua_request(user_agent: &str) -> WebRequest {
    WebRequest::new().with_user_agent(user_agent)
}

#[test]
fn test_cidr_boundaries() {
    let engine = create_engine(RuleNode::method("IsInIpList", ["192.168.1.0/24"]));
    assert!(engine.evaluate(&ip_request("192.168.1.0")));
    assert!(engine.evaluate(&ip_request("192.168.1.255")));
    assert!(!engine.evaluate(&ip_request("192.168.0.255")));
    assert!(!engine.evaluate(&ip_request("192.168.2.0")));
    assert!(!engine.evaluate(&ip_request("::ffff:192.168.1.1")));
}

#[test]
fn test_cidr_prefix_extremes() {
    let everything = create_engine(RuleNode::method("IsInIpList", ["0.0.0.0/0"]));
    assert!(everything.evaluate(&ip_request("255.255.255.255")));
    assert!(everything.evaluate(&ip_request("1.1.1.1")));
    assert!(!everything.evaluate(&ip_request("::1")));

    let single = create_engine(RuleNode::method("IsInIpList", ["10.0.0.7/32, 2001:db8::/32"]));
    assert!(single.evaluate(&ip_request("10.0.0.7")));
    assert!(!single.evaluate(&ip_request("10.0.0.8")));
    assert!(single.evaluate(&ip_request("2001:db8:ffff::1")));
    assert!(!single.evaluate(&ip_request("2001:db9::1")));
}

#[test]
fn test_wildcard_boundaries() {
    let engine = create_engine(RuleNode::method("IsInIpList", ["10.*.0.*"]));
    assert!(engine.evaluate(&ip_request("10.200.0.1")));
    assert!(!engine.evaluate(&ip_request("10.200.1.1")));
    assert!(!engine.evaluate(&ip_request("11.0.0.1")));

    // 段数不是4的通配符永远不匹配
    let short = create_engine(RuleNode::method("IsInIpList", ["10.*.*"]));
    assert!(!short.evaluate(&ip_request("10.1.1.1")));
}

#[test]
fn test_exact_entries_case_sensitive() {
    let rules = ip::parse_ip_list("fe80::1; 10.0.0.1");
    assert!(rules.iter().all(|rule| rule.kind == IpRuleKind::Exact));
    assert!(ip::matches("fe80::1", &rules));
    assert!(!ip::matches("FE80::1", &rules));
    assert!(ip::matches("10.0.0.1", &rules));
    assert!(!ip::matches("10.0.0.10", &rules));
}

#[test]
fn test_invalid_entries_dropped() {
    let rules = ip::parse_ip_list("10.0.0.0/33, /8, 10.0.0.0/, bogus/8, , 172.16.0.0/12");
    let kinds: Vec<_> = rules.iter().map(|rule| rule.kind).collect();
    assert_eq!(kinds.iter().filter(|k| **k == IpRuleKind::Cidr).count(), 1);
    assert!(ip::matches("172.20.1.1", &rules));
    assert!(!ip::matches("10.0.0.1", &rules));
}

#[test]
fn test_not_in_list_is_complement() {
    let engine = create_engine(RuleNode::method("IsNotInIpList", ["10.0.0.0/8"]));
    assert!(engine.evaluate(&ip_request("8.8.8.8")));
    assert!(!engine.evaluate(&ip_request("10.9.9.9")));
    assert!(engine.evaluate(&WebRequest::new()));
    assert!(engine.evaluate(&ip_request("not-an-ip")));
}

#[test]
fn test_ua_lists_case_insensitive() {
    let keywords = create_engine(RuleNode::method("ContainsUserAgent", ["SemrushBot; AhrefsBot"]));
    assert!(keywords.evaluate(&ua_request("Mozilla/5.0 (compatible; semrushbot/7~bl)")));
    assert!(!keywords.evaluate(&ua_request(BROWSER_UA)));
    assert!(!keywords.evaluate(&WebRequest::new()));

    let exact = create_engine(RuleNode::method("IsInUserAgentList", ["Go-http-client/1.1"]));
    assert!(exact.evaluate(&ua_request("GO-HTTP-CLIENT/1.1")));
    assert!(!exact.evaluate(&ua_request("Go-http-client/2.0")));

    let prefix = create_engine(RuleNode::method("UserAgentStartsWith", ["wget, libwww"]));
    assert!(prefix.evaluate(&ua_request("Wget/1.21.4")));
    assert!(!prefix.evaluate(&ua_request("Mozilla/5.0 Wget")));
}

#[test]
fn test_ua_member_methods() {
    let engine = create_engine(RuleNode::or_else(vec![
        RuleNode::method_on("UserAgent", "IsEmpty", Vec::<&str>::new()),
        RuleNode::method_on("UserAgent", "MatchesPattern", ["(scan|crawl)er"]),
    ]));
    assert!(engine.evaluate(&WebRequest::new()));
    assert!(engine.evaluate(&ua_request("   ")));
    assert!(engine.evaluate(&ua_request("Site CRAWLER/1.0")));
    assert!(!engine.evaluate(&ua_request(BROWSER_UA)));

    let complement = create_engine(RuleNode::method_on(
        "UserAgent",
        "NotContainsAny",
        ["bot"],
    ));
    assert!(complement.evaluate(&WebRequest::new()));
    assert!(!complement.evaluate(&ua_request("Googlebot")));
}

#[test]
fn test_ua_helpers_direct() {
    let list = ParsedUaList::parse(" Curl ;; WGET, ");
    assert_eq!(list.entries(), &["curl".to_string(), "wget".to_string()]);
    assert!(user_agent::starts_with_any(Some("curl/8"), &list));
    assert!(!user_agent::is_in_list(Some("curl/8"), &list));
    assert!(!user_agent::contains_any(Some(""), &list));
    assert!(user_agent::is_empty(None));
}

#[test]
fn test_fragments_cached_per_rule() {
    let engine = create_engine(RuleNode::or_else(vec![
        RuleNode::method("IsInIpList", ["10.0.0.0/8"]).with_id("a"),
        RuleNode::method("IsInIpList", ["10.0.0.0/8"]).with_id("b"),
    ]));
    for _ in 0..5 {
        engine.evaluate(&ip_request("192.0.2.1"));
    }
    let stats = engine.matchers().ip_list_cache().stats();
    assert_eq!(stats.writes(), 2);
    assert_eq!(stats.hits(), 8);
}
