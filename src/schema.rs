//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 事实模式
//!
//! [`FactSchema`] 声明规则可以引用的字段和方法。规则只能访问模式中登记的成员，
//! 成员路径在编译期完成类型检查并解析成访问器。
//!
//! # 成员路径
//!
//! - `Path`、`Client.Country`：字段与记录字段
//! - `Tags[0]`：列表下标
//! - `Headers["User-Agent"]`、`Headers['x-token']`：映射键
//!
//! 中间成员缺失（映射中没有该键、下标越界、记录为空）时得到声明类型的零值。

use ahash::AHashMap as HashMap;
use std::fmt;
use std::sync::Arc;

use crate::matchers::Matchers;
use crate::value::{Value, ValueType};

/// 成员访问器
pub type Accessor<S> = Arc<dyn Fn(&S) -> Value + Send + Sync>;

/// 方法调用器
pub type Invoker<S> = Arc<dyn Fn(&S, &MethodEnv<'_>, &[Value]) -> bool + Send + Sync>;

/// 方法调用环境
pub struct MethodEnv<'a> {
    /// 调用所在规则节点的ID，作为缓存命名空间
    pub rule_id: &'a str,
    pub matchers: &'a Matchers,
}

/// 字段定义
pub struct FieldDef<F> {
    pub ty: ValueType,
    getter: Accessor<F>,
}

/// 方法定义
pub struct MethodDef<F> {
    pub name: String,
    pub params: Vec<ValueType>,
    /// 作为正则表达式使用的参数位置
    pub pattern_arg: Option<usize>,
    invoker: Invoker<F>,
}

/// 作用域中解析出的方法签名
pub struct MethodSig<S> {
    pub params: Vec<ValueType>,
    pub pattern_arg: Option<usize>,
    pub invoker: Invoker<S>,
}

impl<F> MethodDef<F> {
    /// 直接调用（参数已按 `params` 转换）
    pub fn invoke(&self, fact: &F, env: &MethodEnv<'_>, args: &[Value]) -> bool {
        (self.invoker)(fact, env, args)
    }
}

/// 事实模式
pub struct FactSchema<F> {
    name: String,
    fields: HashMap<String, FieldDef<F>>,
    /// 键为小写方法名
    methods: HashMap<String, MethodDef<F>>,
}

impl<F: 'static> FactSchema<F> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    /// 登记字段
    pub fn field<G>(mut self, name: impl Into<String>, ty: ValueType, getter: G) -> Self
    where
        G: Fn(&F) -> Value + Send + Sync + 'static,
    {
        self.fields.insert(
            name.into(),
            FieldDef {
                ty,
                getter: Arc::new(getter),
            },
        );
        self
    }

    /// 登记返回布尔值的方法，方法名不区分大小写
    pub fn method<M>(self, name: impl Into<String>, params: Vec<ValueType>, invoker: M) -> Self
    where
        M: Fn(&F, &MethodEnv<'_>, &[Value]) -> bool + Send + Sync + 'static,
    {
        self.register(name.into(), params, None, Arc::new(invoker))
    }

    /// 登记第 `pattern_arg` 个参数为正则表达式的方法
    ///
    /// 正则在编译期校验；无效正则使节点失效，取反后也不匹配。
    pub fn pattern_method<M>(
        self,
        name: impl Into<String>,
        params: Vec<ValueType>,
        pattern_arg: usize,
        invoker: M,
    ) -> Self
    where
        M: Fn(&F, &MethodEnv<'_>, &[Value]) -> bool + Send + Sync + 'static,
    {
        self.register(name.into(), params, Some(pattern_arg), Arc::new(invoker))
    }

    fn register(
        mut self,
        name: String,
        params: Vec<ValueType>,
        pattern_arg: Option<usize>,
        invoker: Invoker<F>,
    ) -> Self {
        self.methods.insert(
            name.to_ascii_lowercase(),
            MethodDef {
                name,
                params,
                pattern_arg,
                invoker,
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef<F>> {
        self.fields.get(name)
    }

    pub fn method_def(&self, name: &str) -> Option<&MethodDef<F>> {
        self.methods.get(&name.to_ascii_lowercase())
    }

    /// 已登记的字段名（排序后）
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 读取字段值，未登记的字段得到 `None`
    pub fn get(&self, fact: &F, name: &str) -> Option<Value> {
        self.fields.get(name).map(|field| (field.getter)(fact))
    }
}

impl<F> fmt::Debug for FactSchema<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactSchema")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// 可以被规则求值的事实类型
pub trait Fact: Send + Sync + Sized + 'static {
    /// 该类型的模式
    fn schema() -> FactSchema<Self>;
}

// ============================================================================
// 成员路径
// ============================================================================

/// 路径段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
    Key(String),
}

/// 解析成员路径
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    let mut rest = path.trim();
    if rest.is_empty() {
        return Ok(segments);
    }

    let mut expect_name = !rest.starts_with('[');
    loop {
        if expect_name {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let name = rest[..end].trim();
            if name.is_empty() {
                return Err(format!("成员路径中存在空名称: {}", path));
            }
            segments.push(PathSegment::Field(name.to_string()));
            rest = &rest[end..];
        }

        if rest.is_empty() {
            break;
        }
        if let Some(after) = rest.strip_prefix('.') {
            rest = after;
            expect_name = true;
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| format!("成员路径缺少 ']': {}", path))?;
            segments.push(parse_indexer(after[..close].trim(), path)?);
            rest = &after[close + 1..];
            expect_name = false;
        } else {
            return Err(format!("成员路径格式错误: {}", path));
        }
    }

    Ok(segments)
}

fn parse_indexer(inner: &str, path: &str) -> Result<PathSegment, String> {
    for quote in ['"', '\''] {
        if inner.len() >= 2 && inner.starts_with(quote) && inner.ends_with(quote) {
            return Ok(PathSegment::Key(inner[1..inner.len() - 1].to_string()));
        }
    }
    inner
        .parse::<usize>()
        .map(PathSegment::Index)
        .map_err(|_| format!("无效的索引 '{}': {}", inner, path))
}

/// 路径段作用在某类型上得到的类型
pub fn segment_type(ty: &ValueType, segment: &PathSegment) -> Result<ValueType, String> {
    match (ty, segment) {
        (ValueType::Record(record), PathSegment::Field(name) | PathSegment::Key(name)) => record
            .field_type(name)
            .cloned()
            .ok_or_else(|| format!("类型 {} 没有成员 {}", ty, name)),
        (ValueType::Map(value), PathSegment::Key(_)) => Ok((**value).clone()),
        (ValueType::List(element), PathSegment::Index(_)) => Ok((**element).clone()),
        (_, PathSegment::Field(name)) => Err(format!("类型 {} 没有成员 {}", ty, name)),
        (_, PathSegment::Key(key)) => Err(format!("类型 {} 不支持键访问 [\"{}\"]", ty, key)),
        (_, PathSegment::Index(index)) => Err(format!("类型 {} 不支持下标访问 [{}]", ty, index)),
    }
}

/// 在访问器后追加一个路径段，缺失时得到 `zero`
fn extend<S: 'static>(base: Accessor<S>, segment: PathSegment, zero: Value) -> Accessor<S> {
    Arc::new(move |subject: &S| {
        let value = base(subject);
        let next = match &segment {
            PathSegment::Field(name) | PathSegment::Key(name) => value.key(name),
            PathSegment::Index(index) => value.index(*index),
        };
        next.cloned().unwrap_or_else(|| zero.clone())
    })
}

// ============================================================================
// 作用域
// ============================================================================

/// 编译作用域：根事实或集合元素
pub trait Scope<S>: Send + Sync {
    /// 主体本身作为值，根事实没有值形式
    fn subject(&self) -> Option<(Accessor<S>, ValueType)>;

    /// 解析第一个字段段
    fn member(&self, name: &str) -> Result<(Accessor<S>, ValueType), String>;

    /// 主体上登记的方法
    fn method(&self, name: &str) -> Option<MethodSig<S>>;

    /// 作用域描述（用于错误信息）
    fn describe(&self) -> String;
}

/// 解析成员路径为访问器与类型
pub fn resolve_member<S: 'static>(
    scope: &dyn Scope<S>,
    path: &str,
) -> Result<(Accessor<S>, ValueType), String> {
    let segments = parse_path(path)?;
    let mut iter = segments.into_iter().peekable();

    let (mut accessor, mut ty) = match iter.peek() {
        Some(PathSegment::Field(name)) => {
            let resolved = scope.member(name)?;
            iter.next();
            resolved
        }
        _ => scope
            .subject()
            .ok_or_else(|| format!("{} 本身不能作为值使用", scope.describe()))?,
    };

    for segment in iter {
        let next = segment_type(&ty, &segment)?;
        accessor = extend(accessor, segment, next.zero_value());
        ty = next;
    }

    Ok((accessor, ty))
}

/// 根事实作用域
pub struct RootScope<F> {
    schema: Arc<FactSchema<F>>,
}

impl<F> RootScope<F> {
    pub fn new(schema: Arc<FactSchema<F>>) -> Self {
        Self { schema }
    }
}

impl<F: Send + Sync + 'static> Scope<F> for RootScope<F> {
    fn subject(&self) -> Option<(Accessor<F>, ValueType)> {
        None
    }

    fn member(&self, name: &str) -> Result<(Accessor<F>, ValueType), String> {
        self.schema
            .field_def(name)
            .map(|field| (Arc::clone(&field.getter), field.ty.clone()))
            .ok_or_else(|| format!("{} 没有成员 {}", self.schema.name(), name))
    }

    fn method(&self, name: &str) -> Option<MethodSig<F>> {
        self.schema.method_def(name).map(|method| MethodSig {
            params: method.params.clone(),
            pattern_arg: method.pattern_arg,
            invoker: Arc::clone(&method.invoker),
        })
    }

    fn describe(&self) -> String {
        self.schema.name().to_string()
    }
}

/// 集合元素作用域
pub struct ElementScope {
    ty: ValueType,
}

impl ElementScope {
    pub fn new(ty: ValueType) -> Self {
        Self { ty }
    }
}

impl Scope<Value> for ElementScope {
    fn subject(&self) -> Option<(Accessor<Value>, ValueType)> {
        Some((Arc::new(|value: &Value| value.clone()), self.ty.clone()))
    }

    fn member(&self, name: &str) -> Result<(Accessor<Value>, ValueType), String> {
        let segment = PathSegment::Field(name.to_string());
        let ty = segment_type(&self.ty, &segment)?;
        let identity: Accessor<Value> = Arc::new(|value: &Value| value.clone());
        Ok((extend(identity, segment, ty.zero_value()), ty))
    }

    fn method(&self, _name: &str) -> Option<MethodSig<Value>> {
        None
    }

    fn describe(&self) -> String {
        format!("元素 {}", self.ty)
    }
}
