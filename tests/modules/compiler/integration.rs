//! 编译器集成测试
//!
//! 覆盖 `WebRequest` 上的比较、正则、数字解析、输入列表与时间字面量。

use crate::common::*;
use chrono::{Duration, Utc};
use rulewall::{
    compiler::RuleCompiler,
    error::RuleWallError,
    fact::WebRequest,
    rule::RuleNode,
    value::Literal,
};

fn compiler() -> RuleCompiler<WebRequest> {
    init_tracing();
    RuleCompiler::for_fact(default_matchers())
}

fn eval(rule: &RuleNode, request: &WebRequest) -> bool {
    compiler().compile(rule).unwrap().evaluate(request)
}

#[test]
fn test_is_match_script_clients() {
    let rule = RuleNode::is_match("UserAgent", "^(curl|java|python)");
    assert!(eval(&rule, &WebRequest::new().with_user_agent("curl/7.88.1")));
    assert!(eval(&rule, &WebRequest::new().with_user_agent("Java/11.0.2")));
    assert!(eval(&rule, &WebRequest::new().with_user_agent("Python/3.11 aiohttp")));
    assert!(!eval(&rule, &WebRequest::new().with_user_agent("Mozilla/5.0 curl")));
    assert!(!eval(&rule, &WebRequest::new()));
}

#[test]
fn test_is_match_subject_length_bound() {
    let rule = RuleNode::is_match("QueryString", "select.+from");
    let short = WebRequest::new().with_query_string("q=select * from users");
    assert!(eval(&rule, &short));

    let padded = format!("q=select * from users&pad={}", "a".repeat(16 * 1024));
    assert!(!eval(&rule, &WebRequest::new().with_query_string(padded)));
}

#[test]
fn test_negate_inverts_every_leaf_kind() {
    let request = WebRequest::new()
        .with_method("DELETE")
        .with_path("/api/7")
        .with_query_param("id", "7");
    let rules = [
        RuleNode::compare("Method", "Equal", "DELETE"),
        RuleNode::is_match("Path", "^/api/"),
        RuleNode::is_integer("Query['id']"),
        RuleNode::is_in_input("Method", ["PUT", "DELETE"]),
        RuleNode::method_on("Path", "StartsWith", ["/api"]),
        RuleNode::method_on("Query", "ContainsKey", ["id"]),
    ];
    for rule in rules {
        assert!(eval(&rule, &request), "{}", rule);
        assert!(!eval(&rule.clone().negated(), &request), "{}", rule);
    }
}

#[test]
fn test_numeric_predicates_on_query() {
    let request = WebRequest::new()
        .with_query_param("page", "12")
        .with_query_param("big", "3000000000")
        .with_query_param("ratio", "0.25")
        .with_query_param("text", "12abc")
        .with_query_param("money", "79228162514264337593543950335");

    assert!(eval(&RuleNode::is_integer("Query['page']"), &request));
    assert!(!eval(&RuleNode::is_integer("Query['big']"), &request));
    assert!(eval(&RuleNode::is_double("Query['big']"), &request));
    assert!(eval(&RuleNode::is_single("Query['ratio']"), &request));
    assert!(!eval(&RuleNode::is_integer("Query['ratio']"), &request));
    assert!(!eval(&RuleNode::is_double("Query['text']"), &request));
    assert!(eval(&RuleNode::is_decimal("Query['money']"), &request));
    assert!(!eval(&RuleNode::is_integer("Query['missing']"), &request));
}

#[test]
fn test_is_in_input_typed() {
    let rule = RuleNode::is_in_input("Authenticated", [Literal::Bool(false)]);
    assert!(eval(&rule, &WebRequest::new()));
    assert!(!eval(&rule, &WebRequest::new().with_authenticated(true)));

    let rule = RuleNode::is_in_input("Method", ["GET", "null"]);
    assert!(eval(&rule, &WebRequest::new()));
    assert!(!eval(&rule, &WebRequest::new().with_method("POST")));

    let rule = RuleNode::is_in_input("Referer", ["null"]);
    assert!(eval(&rule, &WebRequest::new()));

    let rule = RuleNode::is_in_input("Authenticated", ["maybe"]).with_id("auth");
    let error = compiler().compile(&rule).unwrap_err();
    assert_eq!(error.rule_id(), Some("auth"));
}

#[test]
fn test_relative_time_resolved_per_evaluation() {
    let compiler = compiler();
    let predicate = compiler
        .compile(&RuleNode::compare("Timestamp", "GreaterThan", "#NOW-1h"))
        .unwrap();

    let now = WebRequest::new().with_timestamp(Utc::now());
    let stale = WebRequest::new().with_timestamp(Utc::now() - Duration::hours(2));
    assert!(predicate.evaluate(&now));
    assert!(!predicate.evaluate(&stale));

    let future = compiler
        .compile(&RuleNode::compare("Timestamp", "LessThan", "#now+1Y"))
        .unwrap();
    assert!(future.evaluate(&now));
}

#[test]
fn test_absolute_time_literals() {
    let compiler = compiler();
    let request = WebRequest::new().with_timestamp(Utc::now());
    for literal in ["2024-01-01", "2024-01-01 08:30:00", "2024-01-01T08:30:00+08:00"] {
        let rule = RuleNode::compare("Timestamp", "GreaterThan", literal);
        assert!(compiler.compile(&rule).unwrap().evaluate(&request), "{}", literal);
    }
    let bad = RuleNode::compare("Timestamp", "GreaterThan", "yesterday");
    assert!(compiler.compile(&bad).is_err());
}

#[test]
fn test_member_reference_target() {
    let rule = RuleNode::compare("Referer", "Equal", "*.Headers[\"origin\"]");
    let same = WebRequest::new()
        .with_referer("https://example.com")
        .with_header("Origin", "https://example.com");
    let different = same.clone().with_header("Origin", "https://evil.test");
    assert!(eval(&rule, &same));
    assert!(!eval(&rule, &different));

    let mismatched = RuleNode::compare("Authenticated", "Equal", "*.Path");
    assert!(compiler().compile(&mismatched).is_err());
}

#[test]
fn test_config_errors() {
    let cases = [
        RuleNode::compare("Nope", "Equal", "x"),
        RuleNode::compare("Headers.Host", "Equal", "x"),
        RuleNode::method("NoSuchMethod", ["x"]),
        RuleNode::method_on("Path", "StartsWith", Vec::<&str>::new()),
        RuleNode::any("Path", vec![RuleNode::compare("Path", "Equal", "/")]),
        RuleNode::logical("OrElse", vec![]),
        RuleNode::is_integer("Authenticated"),
        RuleNode::is_in_input("Headers", ["x"]),
    ];
    for (index, case) in cases.into_iter().enumerate() {
        let rule = case.with_id(format!("case-{}", index));
        match compiler().compile(&rule) {
            Err(RuleWallError::ConfigError { rule_id, .. }) => {
                assert_eq!(rule_id, format!("case-{}", index))
            }
            other => panic!("case-{} 应当编译失败: {:?}", index, other.map(|p| p.node_count())),
        }
    }
}

#[test]
fn test_rule_ids_assigned_for_cache_namespaces() {
    let compiler = compiler();
    let rule = RuleNode::or_else(vec![
        RuleNode::method("IsInIpList", ["10.0.0.0/8"]),
        RuleNode::method("IsInIpList", ["10.0.0.0/8"]),
    ]);
    let predicate = compiler.compile(&rule).unwrap();
    predicate.evaluate(&WebRequest::new().with_remote_ip("192.0.2.1"));
    // 两个节点各自生成ID，缓存条目互不共享
    assert_eq!(compiler.matchers().ip_list_cache().len(), 2);
}

#[test]
fn test_query_values_match_after_decoding() {
    let rule = RuleNode::method_on("Query['ua']", "Contains", ["curl"]);
    assert!(eval(&rule, &WebRequest::new().with_query_string("ua=%63url%2F8.0")));

    let rule = RuleNode::compare("Query['q']", "Equal", "union select");
    assert!(eval(&rule, &WebRequest::new().with_query_string("q=union+select")));
    assert!(eval(&rule, &WebRequest::new().with_query_string("q=union%20select")));
}

#[test]
fn test_negated_invalid_regex_rejects_everything() {
    let rule = RuleNode::is_match("Path", "(unclosed").negated();
    let predicate = compiler().compile(&rule).unwrap();
    assert!(!predicate.evaluate(&WebRequest::new().with_path("/index.html")));
    assert!(!predicate.evaluate(&WebRequest::new()));
}
