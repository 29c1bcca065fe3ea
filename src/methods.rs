//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 内置值方法
//!
//! 规则可以在字符串、列表和映射成员上调用的方法。方法表是封闭的，名字不区分大小写。
//! 接收者为 Null 时肯定形式的方法返回 `false`。

use crate::matchers::user_agent;
use crate::schema::MethodEnv;
use crate::value::{Value, ValueType};

/// 内置方法实现
pub type BuiltinFn = fn(&Value, &MethodEnv<'_>, &[Value]) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiver {
    Str,
    List,
    Map,
}

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    Str,
    /// 正则表达式，编译期校验
    Pattern,
    /// 列表元素类型
    Element,
}

/// 内置方法
pub struct BuiltinMethod {
    pub name: &'static str,
    receiver: Receiver,
    params: &'static [Param],
    pub call: BuiltinFn,
}

const STR: &[Param] = &[Param::Str];
const NONE: &[Param] = &[];

static BUILTINS: &[BuiltinMethod] = &[
    BuiltinMethod { name: "StartsWith", receiver: Receiver::Str, params: STR, call: starts_with },
    BuiltinMethod { name: "EndsWith", receiver: Receiver::Str, params: STR, call: ends_with },
    BuiltinMethod { name: "Contains", receiver: Receiver::Str, params: STR, call: contains },
    BuiltinMethod { name: "Equals", receiver: Receiver::Str, params: STR, call: equals },
    BuiltinMethod { name: "IsEmpty", receiver: Receiver::Str, params: NONE, call: is_empty },
    BuiltinMethod { name: "IsNotEmpty", receiver: Receiver::Str, params: NONE, call: is_not_empty },
    BuiltinMethod { name: "IsInIpList", receiver: Receiver::Str, params: STR, call: is_in_ip_list },
    BuiltinMethod { name: "IsNotInIpList", receiver: Receiver::Str, params: STR, call: is_not_in_ip_list },
    BuiltinMethod { name: "ContainsAny", receiver: Receiver::Str, params: STR, call: contains_any },
    BuiltinMethod { name: "NotContainsAny", receiver: Receiver::Str, params: STR, call: not_contains_any },
    BuiltinMethod { name: "IsInUserAgentList", receiver: Receiver::Str, params: STR, call: is_in_ua_list },
    BuiltinMethod { name: "IsNotInUserAgentList", receiver: Receiver::Str, params: STR, call: is_not_in_ua_list },
    BuiltinMethod { name: "StartsWithAny", receiver: Receiver::Str, params: STR, call: starts_with_any },
    BuiltinMethod { name: "MatchesPattern", receiver: Receiver::Str, params: &[Param::Pattern], call: matches_pattern },
    BuiltinMethod { name: "Contains", receiver: Receiver::List, params: &[Param::Element], call: list_contains },
    BuiltinMethod { name: "ContainsKey", receiver: Receiver::Map, params: STR, call: map_contains_key },
];

impl BuiltinMethod {
    /// 正则参数的位置
    pub fn pattern_arg(&self) -> Option<usize> {
        self.params.iter().position(|param| *param == Param::Pattern)
    }
}

/// 按接收者类型和方法名查找内置方法，返回方法及其参数类型
pub fn lookup(receiver: &ValueType, name: &str) -> Option<(&'static BuiltinMethod, Vec<ValueType>)> {
    let (kind, element) = match receiver {
        ValueType::Str => (Receiver::Str, None),
        ValueType::List(element) => (Receiver::List, Some(element.as_ref())),
        ValueType::Map(_) => (Receiver::Map, None),
        _ => return None,
    };

    let method = BUILTINS
        .iter()
        .find(|m| m.receiver == kind && m.name.eq_ignore_ascii_case(name))?;
    let params = method
        .params
        .iter()
        .map(|param| match param {
            Param::Str | Param::Pattern => ValueType::Str,
            Param::Element => element.cloned().unwrap_or(ValueType::Str),
        })
        .collect();
    Some((method, params))
}

fn str_pair<'a>(receiver: &'a Value, args: &'a [Value]) -> Option<(&'a str, &'a str)> {
    Some((receiver.as_str()?, args.first()?.as_str()?))
}

fn arg_str(args: &[Value]) -> &str {
    args.first().and_then(Value::as_str).unwrap_or("")
}

fn starts_with(receiver: &Value, _env: &MethodEnv<'_>, args: &[Value]) -> bool {
    str_pair(receiver, args).is_some_and(|(s, prefix)| s.starts_with(prefix))
}

fn ends_with(receiver: &Value, _env: &MethodEnv<'_>, args: &[Value]) -> bool {
    str_pair(receiver, args).is_some_and(|(s, suffix)| s.ends_with(suffix))
}

fn contains(receiver: &Value, _env: &MethodEnv<'_>, args: &[Value]) -> bool {
    str_pair(receiver, args).is_some_and(|(s, needle)| s.contains(needle))
}

fn equals(receiver: &Value, _env: &MethodEnv<'_>, args: &[Value]) -> bool {
    str_pair(receiver, args).is_some_and(|(s, other)| s == other)
}

fn is_empty(receiver: &Value, _env: &MethodEnv<'_>, _args: &[Value]) -> bool {
    user_agent::is_empty(receiver.as_str())
}

fn is_not_empty(receiver: &Value, _env: &MethodEnv<'_>, _args: &[Value]) -> bool {
    user_agent::is_not_empty(receiver.as_str())
}

fn is_in_ip_list(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    env.matchers
        .ip_in_list(env.rule_id, receiver.as_str(), arg_str(args))
}

fn is_not_in_ip_list(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    !is_in_ip_list(receiver, env, args)
}

fn contains_any(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    let list = env.matchers.ua_list(env.rule_id, arg_str(args));
    user_agent::contains_any(receiver.as_str(), &list)
}

fn not_contains_any(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    !contains_any(receiver, env, args)
}

fn is_in_ua_list(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    let list = env.matchers.ua_list(env.rule_id, arg_str(args));
    user_agent::is_in_list(receiver.as_str(), &list)
}

fn is_not_in_ua_list(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    !is_in_ua_list(receiver, env, args)
}

fn starts_with_any(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    let list = env.matchers.ua_list(env.rule_id, arg_str(args));
    user_agent::starts_with_any(receiver.as_str(), &list)
}

fn matches_pattern(receiver: &Value, env: &MethodEnv<'_>, args: &[Value]) -> bool {
    env.matchers
        .ua_matches(env.rule_id, receiver.as_str(), arg_str(args))
}

fn list_contains(receiver: &Value, _env: &MethodEnv<'_>, args: &[Value]) -> bool {
    match (receiver.as_list(), args.first()) {
        (Some(items), Some(needle)) => items.iter().any(|item| item.loose_eq(needle)),
        _ => false,
    }
}

fn map_contains_key(receiver: &Value, _env: &MethodEnv<'_>, args: &[Value]) -> bool {
    args.first()
        .and_then(Value::as_str)
        .is_some_and(|key| receiver.key(key).is_some())
}
