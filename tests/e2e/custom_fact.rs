//! 端到端测试：自定义事实
//!
//! 测试场景：
//! - 宿主声明的事实模式（记录列表、浮点、方法）
//! - 短路组合不会调用后续子规则，非短路组合全部求值
//! - 量词与取反组合使用
//! - 通过热更新器发布自定义事实的规则集

use crate::common::*;
use rulewall::{
    compiler::RuleCompiler,
    config::ChangeSource,
    hot_reload::HotReloader,
    rule::RuleNode,
    value::Literal,
};
use std::sync::Arc;

fn compiler() -> RuleCompiler<Order> {
    RuleCompiler::new(Arc::new(order_schema()), default_matchers())
}

fn probe() -> RuleNode {
    RuleNode::method("Probe", Vec::<Literal>::new())
}

#[test]
fn test_short_circuit_never_reaches_probe() {
    let compiler = compiler();
    let order = Order::new("alice");

    let and_also = compiler
        .compile(&RuleNode::and_also(vec![
            RuleNode::compare("Customer", "Equal", "bob"),
            probe(),
        ]))
        .unwrap();
    assert!(!and_also.evaluate(&order));

    let or_else = compiler
        .compile(&RuleNode::or_else(vec![
            RuleNode::compare("Customer", "Equal", "alice"),
            probe(),
        ]))
        .unwrap();
    assert!(or_else.evaluate(&order));

    assert_eq!(order.probe_calls(), 0);
}

#[test]
fn test_eager_combinators_evaluate_every_child() {
    let compiler = compiler();
    let order = Order::new("alice");

    let and = compiler
        .compile(&RuleNode::logical(
            "And",
            vec![RuleNode::compare("Customer", "Equal", "bob"), probe()],
        ))
        .unwrap();
    assert!(!and.evaluate(&order));
    assert_eq!(order.probe_calls(), 1);

    let or = compiler
        .compile(&(RuleNode::compare("Customer", "Equal", "alice") | probe()))
        .unwrap();
    assert!(or.evaluate(&order));
    assert_eq!(order.probe_calls(), 2);
}

#[test]
fn test_quantifiers_over_records() {
    let compiler = compiler();
    let order = Order::new("carol")
        .with_line("SKU-1", 2, 9.5)
        .with_line("SKU-2", 1, 120.0)
        .with_tag("gift");

    let expensive_line = RuleNode::any(
        "Lines",
        vec![RuleNode::compare("Price", "GreaterThanOrEqual", 100i64)],
    );
    assert!(compiler.compile(&expensive_line).unwrap().evaluate(&order));

    let all_in_stock = RuleNode::all(
        "Lines",
        vec![RuleNode::compare("Quantity", "GreaterThan", 0i64)],
    );
    assert!(compiler.compile(&all_in_stock).unwrap().evaluate(&order));

    let no_bulk = RuleNode::any(
        "Lines",
        vec![RuleNode::compare("Quantity", "GreaterThan", 10i64)],
    )
    .negated();
    assert!(compiler.compile(&no_bulk).unwrap().evaluate(&order));

    let tagged = RuleNode::method_on("Tags", "Contains", ["gift"]);
    assert!(compiler.compile(&tagged).unwrap().evaluate(&order));

    let indexed = RuleNode::method_on("Lines[1].Sku", "EndsWith", ["-2"]);
    assert!(compiler.compile(&indexed).unwrap().evaluate(&order));

    let out_of_range = RuleNode::compare("Lines[5].Quantity", "Equal", 0i64);
    assert!(compiler.compile(&out_of_range).unwrap().evaluate(&order));

    let total = RuleNode::compare("Total", "GreaterThan", "*.Lines[1].Price");
    assert!(compiler.compile(&total).unwrap().evaluate(&order));
}

#[test]
fn test_empty_lines_quantifiers() {
    let compiler = compiler();
    let order = Order::new("dave");

    let has_lines = RuleNode::any("Lines", vec![]);
    assert!(!compiler.compile(&has_lines).unwrap().evaluate(&order));

    let all_cheap = RuleNode::all(
        "Lines",
        vec![RuleNode::compare("Price", "LessThan", 1i64)],
    );
    assert!(compiler.compile(&all_cheap).unwrap().evaluate(&order));
}

#[test]
fn test_schema_errors_name_offending_node() {
    let compiler = compiler();

    let unknown_record_field = RuleNode::any(
        "Lines",
        vec![RuleNode::compare("Color", "Equal", "red").with_id("line-color")],
    );
    let error = compiler.compile(&unknown_record_field).unwrap_err();
    assert_eq!(error.rule_id(), Some("line-color"));

    let probe_with_args = RuleNode::method("Probe", ["x"]).with_id("probe-args");
    let error = compiler.compile(&probe_with_args).unwrap_err();
    assert_eq!(error.rule_id(), Some("probe-args"));

    let ordering_on_string =
        RuleNode::compare("Customer", "LessThan", "m").with_id("customer-order");
    let error = compiler.compile(&ordering_on_string).unwrap_err();
    assert_eq!(error.rule_id(), Some("customer-order"));
}

#[test]
fn test_hot_reload_custom_fact() {
    let compiler = Arc::new(compiler());
    let reloader =
        HotReloader::new(compiler, &RuleNode::compare("Customer", "Equal", "alice")).unwrap();

    let alice = Order::new("alice");
    let bob = Order::new("bob").with_line("SKU-9", 50, 1.0);
    assert!(reloader.slot().load().evaluate(&alice));
    assert!(!reloader.slot().load().evaluate(&bob));

    let bulk = RuleNode::any(
        "Lines",
        vec![RuleNode::compare("Quantity", "GreaterThanOrEqual", 50i64)],
    );
    assert_eq!(reloader.reload(&bulk, ChangeSource::Api).unwrap(), 2);
    assert!(!reloader.slot().load().evaluate(&alice));
    assert!(reloader.slot().load().evaluate(&bob));
}
