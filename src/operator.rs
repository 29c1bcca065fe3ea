//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 运算符解析
//!
//! 规则节点的 `operator` 字符串在编译前解析为 [`Operator`]，关键字不区分大小写。
//! 无法识别的名字被视为方法调用。

use std::fmt;

/// 逻辑组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// 所有子节点都求值
    And,
    /// 短路与
    AndAlso,
    /// 所有子节点都求值
    Or,
    /// 短路或
    OrElse,
}

impl LogicalOp {
    /// 与（`And`/`AndAlso`）
    pub fn is_conjunction(self) -> bool {
        matches!(self, LogicalOp::And | LogicalOp::AndAlso)
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, LogicalOp::AndAlso | LogicalOp::OrElse)
    }
}

/// 比较
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl CompareOp {
    /// 大小比较（要求有序类型）
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Equal | CompareOp::NotEqual)
    }
}

/// 数值解析谓词
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    /// 32位有符号整数
    Integer,
    /// 32位浮点
    Single,
    /// 64位浮点
    Double,
    /// 96位定点小数
    Decimal,
}

/// 集合量词
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
}

/// 解析后的运算符
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Logical(LogicalOp),
    Compare(CompareOp),
    IsMatch,
    Numeric(NumericKind),
    IsInInput,
    Quantifier(Quantifier),
    /// 方法调用，保留原始名字
    Method(String),
}

impl Operator {
    /// 解析运算符字符串
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "and" => Operator::Logical(LogicalOp::And),
            "andalso" => Operator::Logical(LogicalOp::AndAlso),
            "or" => Operator::Logical(LogicalOp::Or),
            "orelse" => Operator::Logical(LogicalOp::OrElse),
            "equal" => Operator::Compare(CompareOp::Equal),
            "notequal" => Operator::Compare(CompareOp::NotEqual),
            "greaterthan" => Operator::Compare(CompareOp::GreaterThan),
            "greaterthanorequal" => Operator::Compare(CompareOp::GreaterThanOrEqual),
            "lessthan" => Operator::Compare(CompareOp::LessThan),
            "lessthanorequal" => Operator::Compare(CompareOp::LessThanOrEqual),
            "ismatch" => Operator::IsMatch,
            "isinteger" => Operator::Numeric(NumericKind::Integer),
            "issingle" => Operator::Numeric(NumericKind::Single),
            "isdouble" => Operator::Numeric(NumericKind::Double),
            "isdecimal" => Operator::Numeric(NumericKind::Decimal),
            "isininput" => Operator::IsInInput,
            "any" => Operator::Quantifier(Quantifier::Any),
            "all" => Operator::Quantifier(Quantifier::All),
            _ => Operator::Method(trimmed.to_string()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Logical(op) => write!(f, "{:?}", op),
            Operator::Compare(op) => write!(f, "{:?}", op),
            Operator::IsMatch => write!(f, "IsMatch"),
            Operator::Numeric(kind) => write!(f, "Is{:?}", kind),
            Operator::IsInInput => write!(f, "IsInInput"),
            Operator::Quantifier(q) => write!(f, "{:?}", q),
            Operator::Method(name) => write!(f, "{}", name),
        }
    }
}

// ============================================================================
// 数值解析
// ============================================================================

/// 96位定点小数的绝对值上限
const DECIMAL_MAX: f64 = 7.922_816_251_426_434e28;

/// 判断文本能否解析为对应数值类型（允许首尾空白，不接受千位分隔符）
pub fn parses_as(kind: NumericKind, text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    match kind {
        NumericKind::Integer => text.parse::<i32>().is_ok(),
        NumericKind::Single => parse_float(text).is_some_and(|v| (v as f32).is_finite()),
        NumericKind::Double => parse_float(text).is_some_and(f64::is_finite),
        NumericKind::Decimal => is_decimal(text),
    }
}

/// 只接受有限数值写法，拒绝 `inf`/`NaN` 等特殊记号
fn parse_float(text: &str) -> Option<f64> {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    text.parse::<f64>().ok()
}

/// 定点小数：可选符号、数字、可选小数部分，不接受指数
fn is_decimal(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return false;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return false;
    }
    body.parse::<f64>().is_ok_and(|v| v.abs() < DECIMAL_MAX)
}
