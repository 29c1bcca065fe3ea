//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 值模型
//!
//! 规则谓词在运行时处理的动态值（[`Value`]）、它们的静态类型（[`ValueType`]），
//! 以及配置中的字面量（[`Literal`]）到目标类型操作数（[`Operand`]）的转换。

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::operator::CompareOp;

/// 运行时值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(DateTime<Utc>),
    List(Arc<Vec<Value>>),
    /// 映射与记录共用同一种表示
    Map(Arc<HashMap<String, Value>>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// 构造列表值
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// 构造映射/记录值
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// 列表下标访问，越界返回 `None`
    pub fn index(&self, index: usize) -> Option<&Value> {
        match self {
            Value::List(items) => items.get(index),
            _ => None,
        }
    }

    /// 映射键访问
    ///
    /// 先精确匹配，失败后按ASCII大小写不敏感匹配（HTTP头名称不区分大小写）。
    pub fn key(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.get(key).or_else(|| {
                entries
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            }),
            _ => None,
        }
    }

    /// 相等比较：整数与浮点按数值比较，字符串按序数比较
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            _ => self == other,
        }
    }

    /// 排序比较，仅对数值与时间有定义；任一侧为 Null 时无定义
    pub fn partial_order(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// 按比较运算符求值
    pub fn compare(&self, op: CompareOp, other: &Value) -> bool {
        match op {
            CompareOp::Equal => self.loose_eq(other),
            CompareOp::NotEqual => !self.loose_eq(other),
            CompareOp::GreaterThan => self.partial_order(other) == Some(Ordering::Greater),
            CompareOp::GreaterThanOrEqual => matches!(
                self.partial_order(other),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::LessThan => self.partial_order(other) == Some(Ordering::Less),
            CompareOp::LessThanOrEqual => matches!(
                self.partial_order(other),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map(Value::Str).unwrap_or(Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

/// 值的静态类型
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Time,
    List(Box<ValueType>),
    Map(Box<ValueType>),
    Record(Arc<RecordType>),
}

impl ValueType {
    pub fn list_of(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn map_of(value: ValueType) -> Self {
        ValueType::Map(Box::new(value))
    }

    /// 成员缺失时使用的零值
    pub fn zero_value(&self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Str | ValueType::Time | ValueType::Record(_) => Value::Null,
            ValueType::List(_) => Value::List(Arc::new(Vec::new())),
            ValueType::Map(_) => Value::Map(Arc::new(HashMap::new())),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    /// 是否支持大小比较
    pub fn is_ordered(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float | ValueType::Time)
    }

    /// 是否为标量（可以与字面量比较）
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ValueType::Bool | ValueType::Int | ValueType::Float | ValueType::Str | ValueType::Time
        )
    }

    /// 两个类型的值能否互相比较
    pub fn comparable_with(&self, other: &ValueType) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "Bool"),
            ValueType::Int => write!(f, "Int"),
            ValueType::Float => write!(f, "Float"),
            ValueType::Str => write!(f, "String"),
            ValueType::Time => write!(f, "Time"),
            ValueType::List(inner) => write!(f, "List<{}>", inner),
            ValueType::Map(inner) => write!(f, "Map<String, {}>", inner),
            ValueType::Record(record) => write!(f, "{}", record.name),
        }
    }
}

/// 记录类型：具名字段的集合，值以 [`Value::Map`] 表示
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    fields: Vec<(String, ValueType)>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    pub fn field_type(&self, name: &str) -> Option<&ValueType> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ty)| ty)
    }
}

// ============================================================================
// 字面量与操作数
// ============================================================================

/// 配置中的标量字面量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Literal::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 字面量 `null`（不区分大小写）
    pub fn is_null_text(&self) -> bool {
        matches!(self, Literal::Text(s) if s.trim().eq_ignore_ascii_case("null"))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Text(s)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::Float(f)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// 相对时间单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Years,
}

/// `#NOW±N{S|M|H|D|Y}` 相对时间字面量，每次求值时基于当前时间解析
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeTime {
    pub amount: i64,
    pub unit: TimeUnit,
}

impl RelativeTime {
    /// 解析 `#NOW+5D` 形式的文本
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.get(..4)?.eq_ignore_ascii_case("#now").then(|| &text[4..])?;
        let mut chars = rest.chars();
        let negative = match chars.next()? {
            '+' => false,
            '-' => true,
            _ => return None,
        };
        let body = chars.as_str();
        let unit_char = body.chars().last()?;
        let digits = &body[..body.len() - unit_char.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let amount: i64 = digits.parse().ok()?;
        let unit = match unit_char.to_ascii_uppercase() {
            'S' => TimeUnit::Seconds,
            'M' => TimeUnit::Minutes,
            'H' => TimeUnit::Hours,
            'D' => TimeUnit::Days,
            'Y' => TimeUnit::Years,
            _ => return None,
        };
        Some(Self {
            amount: if negative { -amount } else { amount },
            unit,
        })
    }

    /// 相对给定时间点求值，溢出时返回 `None`
    pub fn resolve_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.unit {
            TimeUnit::Seconds => now.checked_add_signed(Duration::try_seconds(self.amount)?),
            TimeUnit::Minutes => now.checked_add_signed(Duration::try_minutes(self.amount)?),
            TimeUnit::Hours => now.checked_add_signed(Duration::try_hours(self.amount)?),
            TimeUnit::Days => now.checked_add_signed(Duration::try_days(self.amount)?),
            TimeUnit::Years => {
                let months = u32::try_from(self.amount.unsigned_abs().checked_mul(12)?).ok()?;
                if self.amount >= 0 {
                    now.checked_add_months(Months::new(months))
                } else {
                    now.checked_sub_months(Months::new(months))
                }
            }
        }
    }
}

/// 已转换为目标类型的操作数
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(Value),
    Now(RelativeTime),
}

impl Operand {
    /// 求值；相对时间溢出时得到 Null（任何比较都不成立）
    pub fn resolve(&self) -> Value {
        match self {
            Operand::Const(value) => value.clone(),
            Operand::Now(relative) => relative
                .resolve_from(Utc::now())
                .map(Value::Time)
                .unwrap_or(Value::Null),
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Operand::Const(_))
    }
}

/// 把字面量转换为目标类型的操作数；失败返回描述信息
pub fn convert_literal(literal: &Literal, target: &ValueType) -> Result<Operand, String> {
    if literal.is_null_text() {
        return Ok(Operand::Const(Value::Null));
    }

    let converted = match (target, literal) {
        (ValueType::Str, lit) => Value::Str(lit.to_string()),
        (ValueType::Bool, Literal::Bool(b)) => Value::Bool(*b),
        (ValueType::Bool, Literal::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(format!("无法把 '{}' 转换为 Bool", s)),
        },
        (ValueType::Int, Literal::Int(i)) => Value::Int(*i),
        // 超出 i64 范围的浮点数不截断
        (ValueType::Int, Literal::Float(f))
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
        {
            Value::Int(*f as i64)
        }
        (ValueType::Int, Literal::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("无法把 '{}' 转换为 Int", s))?,
        (ValueType::Float, Literal::Int(i)) => Value::Float(*i as f64),
        (ValueType::Float, Literal::Float(f)) => Value::Float(*f),
        (ValueType::Float, Literal::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("无法把 '{}' 转换为 Float", s))?,
        (ValueType::Time, Literal::Text(s)) => {
            if let Some(relative) = RelativeTime::parse(s) {
                return Ok(Operand::Now(relative));
            }
            parse_time(s)
                .map(Value::Time)
                .ok_or_else(|| format!("无法把 '{}' 转换为 Time", s))?
        }
        (ty, lit) => return Err(format!("无法把 '{}' 转换为 {}", lit, ty)),
    };

    Ok(Operand::Const(converted))
}

/// 解析 RFC3339 / `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DD`（后两者按UTC）
fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&t));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| Utc.from_utc_datetime(&t))
}
