//! 端到端测试：扫描探测拦截
//!
//! 测试场景：
//! - 规则集拦截 `.php` / `.env` / `/.git` 路径
//! - 默认规则集拦截脚本类客户端
//! - 配置文件加载后的规则集与代码构造的规则集行为一致

use crate::common::*;
use rulewall::{
    config::WafConfig,
    engine::WafEngine,
    error::Decision,
    fact::WebRequest,
    rule::RuleNode,
};
use std::io::Write;

#[tokio::test]
async fn test_probe_paths_blocked() {
    let engine = create_engine(probe_ruleset());

    for path in ["/index.php", "/.env", "/.git/HEAD", "/admin/config.php"] {
        let decision = engine.check(&request(path, "198.51.100.10", BROWSER_UA)).await;
        assert!(decision.is_blocked(), "{} 应当被拦截", path);
    }

    for path in ["/", "/index.html", "/static/app.js", "/php/readme", "/environment"] {
        let decision = engine.check(&request(path, "198.51.100.10", BROWSER_UA)).await;
        assert!(decision.is_allowed(), "{} 应当放行", path);
    }

    let stats = engine.stats();
    assert_eq!(stats.total_requests, 9);
    assert_eq!(stats.blocked_requests, 4);
}

#[tokio::test]
async fn test_block_info_carries_request() {
    let engine = create_engine(probe_ruleset());
    let decision = engine
        .check(&request("/.env", "203.0.113.99", BROWSER_UA))
        .await;

    let Decision::Blocked(info) = decision else {
        panic!("/.env 应当被拦截");
    };
    assert_eq!(info.remote_ip.as_deref(), Some("203.0.113.99"));
    assert_eq!(info.path, "/.env");
    assert_eq!(info.generation, engine.generation());
}

#[tokio::test]
async fn test_default_ruleset_scripted_clients() {
    let engine = create_default_engine();

    for ua in ["curl/8.4.0", "Java/17.0.2", "python-requests/2.31", "PYTHON-urllib/3.12"] {
        let req = request("/api/items", "192.0.2.1", ua);
        assert!(engine.check(&req).await.is_blocked(), "{} 应当被拦截", ua);
    }

    let allowed = [
        request("/api/items", "192.0.2.1", BROWSER_UA),
        request("/api/items", "192.0.2.1", "Wget/1.21 curl-compatible"),
        WebRequest::new().with_path("/api/items"),
    ];
    for req in &allowed {
        assert!(engine.check(req).await.is_allowed());
    }
}

#[tokio::test]
async fn test_allow_list_with_negation() {
    // 管理后台只允许内网访问
    let ruleset = RuleNode::and_also(vec![
        RuleNode::method_on("Path", "StartsWith", ["/admin"]),
        RuleNode::method("IsInIpList", ["10.0.0.0/8; 192.168.*.*"]).negated(),
    ]);
    let engine = create_engine(ruleset);

    assert!(engine
        .check(&request("/admin/users", "10.2.3.4", BROWSER_UA))
        .await
        .is_allowed());
    assert!(engine
        .check(&request("/admin/users", "192.168.50.1", BROWSER_UA))
        .await
        .is_allowed());
    assert!(engine
        .check(&request("/admin/users", "8.8.8.8", BROWSER_UA))
        .await
        .is_blocked());
    assert!(engine
        .check(&WebRequest::new().with_path("/admin"))
        .await
        .is_blocked());
    assert!(engine
        .check(&request("/public", "8.8.8.8", BROWSER_UA))
        .await
        .is_allowed());
}

#[tokio::test]
async fn test_ruleset_loaded_from_json_file() {
    let json = r#"{
        "ruleset": {
            "Operator": "OrElse",
            "Rules": [
                { "MemberName": "Path", "Operator": "EndsWith", "Inputs": [".php"] },
                { "member_name": "Method", "operator": "IsInInput", "inputs": ["TRACE", "TRACK"] },
                {
                    "operator": "AndAlso",
                    "rules": [
                        { "memberName": "Headers[\"x-forwarded-for\"]", "operator": "IsNotEmpty" },
                        { "memberName": "Headers[\"x-forwarded-for\"]", "operator": "IsInIpList", "inputs": ["0.0.0.0/8, 127.0.0.1"] }
                    ]
                }
            ]
        }
    }"#;
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let config = WafConfig::from_file(file.path()).unwrap();
    let engine: WafEngine = WafEngine::new(config).unwrap();

    assert!(engine.evaluate(&WebRequest::new().with_path("/x.php")));
    assert!(engine.evaluate(&WebRequest::new().with_method("TRACE")));
    assert!(engine.evaluate(&WebRequest::new().with_header("X-Forwarded-For", "127.0.0.1")));
    assert!(!engine.evaluate(&WebRequest::new().with_header("X-Forwarded-For", "127.0.0.2")));
    assert!(!engine.evaluate(&WebRequest::new().with_method("GET")));
}

#[tokio::test]
async fn test_ip_file_blocklist() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "203.0.113.5").unwrap();
    writeln!(file, "2001:DB8::1").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let engine = create_engine(RuleNode::method("IpInFile", [path.as_str()]));
    assert!(engine
        .check(&request("/", "203.0.113.5", BROWSER_UA))
        .await
        .is_blocked());
    assert!(engine
        .check(&request("/", "2001:db8::1", BROWSER_UA))
        .await
        .is_blocked());
    assert!(engine
        .check(&request("/", "203.0.113.6", BROWSER_UA))
        .await
        .is_allowed());
    assert_eq!(engine.matchers().ip_file_cache().stats().writes(), 1);
}
