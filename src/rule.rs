//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 规则树模型
//!
//! [`RuleNode`] 是规则树的一个节点：组合节点（逻辑运算符 + 子规则）或叶子节点
//! （成员路径 + 运算符 + 目标值/参数）。规则树一经交给编译器即视为不可变，
//! 配置变更时整体替换。
//!
//! 反序列化时字段名不区分大小写并忽略下划线，`ruleId`、`RuleId`、`rule_id` 等价。

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use uuid::Uuid;

use crate::value::Literal;

/// 规则树节点
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleNode {
    /// 稳定标识，用作缓存键命名空间；为空时由 [`RuleNode::ensure_rule_ids`] 生成
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rule_id: String,
    /// 成员路径，空串表示事实本身
    #[serde(skip_serializing_if = "String::is_empty")]
    pub member_name: String,
    pub operator: String,
    /// 比较目标；`*.` 前缀表示引用同一事实上的另一个成员
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<Literal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Literal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleNode>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
}

impl RuleNode {
    fn leaf(member: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            member_name: member.into(),
            operator: operator.into(),
            ..Default::default()
        }
    }

    /// 组合节点
    pub fn logical(operator: impl Into<String>, rules: Vec<RuleNode>) -> Self {
        Self {
            operator: operator.into(),
            rules,
            ..Default::default()
        }
    }

    /// 短路与
    pub fn and_also(rules: Vec<RuleNode>) -> Self {
        Self::logical("AndAlso", rules)
    }

    /// 短路或
    pub fn or_else(rules: Vec<RuleNode>) -> Self {
        Self::logical("OrElse", rules)
    }

    /// 比较叶子
    pub fn compare(
        member: impl Into<String>,
        operator: impl Into<String>,
        target: impl Into<Literal>,
    ) -> Self {
        Self {
            target_value: Some(target.into()),
            ..Self::leaf(member, operator)
        }
    }

    /// 事实本身上的方法调用
    pub fn method<I, L>(name: impl Into<String>, inputs: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        Self::method_on("", name, inputs)
    }

    /// 成员上的方法调用
    pub fn method_on<I, L>(member: impl Into<String>, name: impl Into<String>, inputs: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Self::leaf(member, name)
        }
    }

    pub fn any(member: impl Into<String>, rules: Vec<RuleNode>) -> Self {
        Self {
            rules,
            ..Self::leaf(member, "Any")
        }
    }

    pub fn all(member: impl Into<String>, rules: Vec<RuleNode>) -> Self {
        Self {
            rules,
            ..Self::leaf(member, "All")
        }
    }

    pub fn is_match(member: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(member, "IsMatch", Literal::Text(pattern.into()))
    }

    pub fn is_in_input<I, L>(member: impl Into<String>, inputs: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        Self::method_on(member, "IsInInput", inputs)
    }

    pub fn is_integer(member: impl Into<String>) -> Self {
        Self::leaf(member, "IsInteger")
    }

    pub fn is_single(member: impl Into<String>) -> Self {
        Self::leaf(member, "IsSingle")
    }

    pub fn is_double(member: impl Into<String>) -> Self {
        Self::leaf(member, "IsDouble")
    }

    pub fn is_decimal(member: impl Into<String>) -> Self {
        Self::leaf(member, "IsDecimal")
    }

    /// 取反
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn with_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = rule_id.into();
        self
    }

    /// 为缺失或重复的规则ID生成新ID（UUID v4 简写形式）
    pub fn ensure_rule_ids(&mut self) {
        let mut seen = HashSet::new();
        self.assign_ids(&mut seen);
    }

    fn assign_ids(&mut self, seen: &mut HashSet<String>) {
        while self.rule_id.is_empty() || !seen.insert(self.rule_id.clone()) {
            self.rule_id = Uuid::new_v4().simple().to_string();
        }
        for child in &mut self.rules {
            child.assign_ids(seen);
        }
    }

    /// 节点总数
    pub fn node_count(&self) -> usize {
        1 + self.rules.iter().map(RuleNode::node_count).sum::<usize>()
    }

    /// 规则树内容哈希
    pub fn content_hash(&self) -> String {
        let tree_str = serde_json::to_string(self).unwrap_or_default();
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        tree_str.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    /// 合并为同一运算符的组合节点，同运算符且未取反的组合子节点会被展平
    fn merge(operator: &str, lhs: RuleNode, rhs: RuleNode) -> RuleNode {
        let mut rules = Vec::new();
        for side in [lhs, rhs] {
            if side.is_flattenable_into(operator) {
                rules.extend(side.rules);
            } else {
                rules.push(side);
            }
        }
        RuleNode::logical(operator, rules)
    }

    fn is_flattenable_into(&self, operator: &str) -> bool {
        !self.negate && !self.rules.is_empty() && self.operator.eq_ignore_ascii_case(operator)
    }
}

impl BitAnd for RuleNode {
    type Output = RuleNode;

    fn bitand(self, rhs: RuleNode) -> RuleNode {
        RuleNode::merge("AndAlso", self, rhs)
    }
}

impl BitOr for RuleNode {
    type Output = RuleNode;

    fn bitor(self, rhs: RuleNode) -> RuleNode {
        RuleNode::merge("Or", self, rhs)
    }
}

impl fmt::Display for RuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negation = if self.negate { "NOT " } else { "" };
        if let Some(target) = &self.target_value {
            return write!(
                f,
                "{}{} {} {}",
                negation, self.member_name, self.operator, target
            );
        }
        match self.rules.as_slice() {
            [] => {}
            [only] => {
                return write!(
                    f,
                    "{}{} {} ({})",
                    negation, self.member_name, self.operator, only
                )
            }
            many => {
                return write!(
                    f,
                    "{}{} {} ({} rules)",
                    negation,
                    self.member_name,
                    self.operator,
                    many.len()
                )
            }
        }
        if !self.inputs.is_empty() {
            return write!(
                f,
                "{}{} {} ({} inputs)",
                negation,
                self.member_name,
                self.operator,
                self.inputs.len()
            );
        }
        write!(f, "{}{} {}", negation, self.member_name, self.operator)
    }
}

// ============================================================================
// 反序列化
// ============================================================================

enum Field {
    RuleId,
    MemberName,
    Operator,
    TargetValue,
    Inputs,
    Rules,
    Negate,
    Unknown,
}

impl Field {
    fn from_key(key: &str) -> Self {
        let normalized: String = key
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "ruleid" => Field::RuleId,
            "membername" => Field::MemberName,
            "operator" => Field::Operator,
            "targetvalue" => Field::TargetValue,
            "inputs" => Field::Inputs,
            "rules" => Field::Rules,
            "negate" => Field::Negate,
            _ => Field::Unknown,
        }
    }
}

struct RuleNodeVisitor;

impl<'de> Visitor<'de> for RuleNodeVisitor {
    type Value = RuleNode;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a rule node map")
    }

    fn visit_map<A>(self, mut map: A) -> Result<RuleNode, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut node = RuleNode::default();
        let mut has_operator = false;

        while let Some(key) = map.next_key::<String>()? {
            match Field::from_key(&key) {
                Field::RuleId => {
                    node.rule_id = map.next_value::<Option<String>>()?.unwrap_or_default();
                }
                Field::MemberName => {
                    node.member_name = map.next_value::<Option<String>>()?.unwrap_or_default();
                }
                Field::Operator => {
                    node.operator = map.next_value::<Option<String>>()?.unwrap_or_default();
                    has_operator = true;
                }
                Field::TargetValue => {
                    node.target_value = map.next_value::<Option<Literal>>()?;
                }
                Field::Inputs => {
                    node.inputs = map.next_value::<Option<Vec<Literal>>>()?.unwrap_or_default();
                }
                Field::Rules => {
                    node.rules = map.next_value::<Option<Vec<RuleNode>>>()?.unwrap_or_default();
                }
                Field::Negate => {
                    node.negate = map.next_value::<Option<bool>>()?.unwrap_or_default();
                }
                Field::Unknown => {
                    map.next_value::<de::IgnoredAny>()?;
                }
            }
        }

        if !has_operator {
            return Err(de::Error::missing_field("operator"));
        }
        Ok(node)
    }
}

impl<'de> Deserialize<'de> for RuleNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RuleNodeVisitor)
    }
}
