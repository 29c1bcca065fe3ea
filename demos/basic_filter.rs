//! 基本过滤示例
//!
//! 创建引擎、检查请求、在运行时替换规则集。

use rulewall::prelude::*;

#[tokio::main]
async fn main() -> Result<(), RuleWallError> {
    tracing_subscriber::fmt::init();

    // 默认规则集：拦截 .php 探测和脚本客户端
    let config = WafConfig::default().with_rate_limit(RateLimitSettings::enabled());
    let engine: WafEngine = WafEngine::new(config)?;

    let requests = [
        WebRequest::new()
            .with_path("/wp-login.php")
            .with_remote_ip("203.0.113.7"),
        WebRequest::new()
            .with_path("/index.html")
            .with_remote_ip("198.51.100.4")
            .with_user_agent("Mozilla/5.0"),
        WebRequest::new()
            .with_path("/api/items")
            .with_remote_ip("198.51.100.4")
            .with_user_agent("curl/8.4.0"),
    ];

    for request in &requests {
        match engine.check(request).await {
            Decision::Allowed => println!("允许: {}", request.path()),
            Decision::Blocked(info) => println!("拦截: {} (代数 {})", info.path, info.generation),
        }
    }

    // 追加内网IP白名单：内网地址永远放行
    let ruleset = RuleNode::and_also(vec![
        default_ruleset(),
        RuleNode::method("IsNotInIpList", ["10.0.0.0/8, 192.168.*.*"]),
    ]);
    let generation = engine.update_ruleset(ruleset, ChangeSource::Api)?;
    println!("规则集已更新到第 {} 代", generation);

    let internal = WebRequest::new()
        .with_path("/admin.php")
        .with_remote_ip("10.1.2.3");
    println!("内网请求: {:?}", engine.check(&internal).await);

    let stats = engine.stats();
    println!(
        "总请求 {}，拦截 {}，规则集 {}",
        stats.total_requests, stats.blocked_requests, stats.ruleset_hash
    );
    Ok(())
}
