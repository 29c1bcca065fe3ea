//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 规则编译器
//!
//! 把 [`RuleNode`] 树递归编译为一个可重入的谓词闭包。成员路径、方法、运算符和
//! 字面量都在编译期对照事实模式解析，无法解析时返回带节点ID的
//! [`RuleWallError::ConfigError`]。求值期间不会产生错误：无效正则、空成员、
//! 无法解析的数字都视为不匹配。

use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::RuleWallError;
use crate::matchers::Matchers;
use crate::methods;
use crate::operator::{parses_as, CompareOp, LogicalOp, NumericKind, Operator, Quantifier};
use crate::rule::RuleNode;
use crate::schema::{
    resolve_member, Accessor, ElementScope, Fact, FactSchema, Invoker, MethodEnv, RootScope, Scope,
};
use crate::value::{convert_literal, Literal, Operand, Value, ValueType};

/// 谓词闭包
pub type Predicate<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// 引用同一主体上另一个成员的目标值前缀
const MEMBER_REF_PREFIX: &str = "*.";

/// 编译后的规则集
pub struct CompiledPredicate<F> {
    predicate: Predicate<F>,
    generation: u64,
    ruleset_hash: String,
    node_count: usize,
}

impl<F> CompiledPredicate<F> {
    /// 求值；`true` 表示命中规则集
    pub fn evaluate(&self, fact: &F) -> bool {
        (self.predicate)(fact)
    }

    /// 发布代数，未发布时为0
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn ruleset_hash(&self) -> &str {
        &self.ruleset_hash
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }
}

impl<F> fmt::Debug for CompiledPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPredicate")
            .field("generation", &self.generation)
            .field("ruleset_hash", &self.ruleset_hash)
            .field("node_count", &self.node_count)
            .finish()
    }
}

/// 方法参数：全部为常量时预先求值
enum BoundArgs {
    Const(Vec<Value>),
    Dynamic(Vec<Operand>),
}

impl BoundArgs {
    fn bind(operands: Vec<Operand>) -> Self {
        if operands.iter().all(Operand::is_const) {
            BoundArgs::Const(operands.iter().map(Operand::resolve).collect())
        } else {
            BoundArgs::Dynamic(operands)
        }
    }

    fn with<R>(&self, f: impl FnOnce(&[Value]) -> R) -> R {
        match self {
            BoundArgs::Const(values) => f(values),
            BoundArgs::Dynamic(operands) => {
                let values: Vec<Value> = operands.iter().map(Operand::resolve).collect();
                f(&values)
            }
        }
    }
}

/// 规则编译器
pub struct RuleCompiler<F> {
    schema: Arc<FactSchema<F>>,
    matchers: Arc<Matchers>,
}

impl<F: Fact> RuleCompiler<F> {
    /// 使用事实类型自带的模式
    pub fn for_fact(matchers: Arc<Matchers>) -> Self {
        Self::new(Arc::new(F::schema()), matchers)
    }
}

impl<F: Send + Sync + 'static> RuleCompiler<F> {
    pub fn new(schema: Arc<FactSchema<F>>, matchers: Arc<Matchers>) -> Self {
        Self { schema, matchers }
    }

    pub fn schema(&self) -> &Arc<FactSchema<F>> {
        &self.schema
    }

    pub fn matchers(&self) -> &Arc<Matchers> {
        &self.matchers
    }

    /// 编译规则树
    ///
    /// 缺失或重复的规则ID会先被补齐，因此传入的树不要求带ID。
    #[instrument(skip_all, fields(nodes = root.node_count()))]
    pub fn compile(&self, root: &RuleNode) -> Result<CompiledPredicate<F>, RuleWallError> {
        let mut tree = root.clone();
        tree.ensure_rule_ids();

        let scope = RootScope::new(Arc::clone(&self.schema));
        let predicate = self.compile_node(&tree, &scope)?;
        let compiled = CompiledPredicate {
            predicate,
            generation: 0,
            ruleset_hash: root.content_hash(),
            node_count: tree.node_count(),
        };

        debug!(
            hash = %compiled.ruleset_hash,
            nodes = compiled.node_count,
            "规则集编译完成"
        );
        Ok(compiled)
    }

    fn compile_node<S: 'static>(
        &self,
        node: &RuleNode,
        scope: &dyn Scope<S>,
    ) -> Result<Predicate<S>, RuleWallError> {
        if node.operator.trim().is_empty() {
            return Err(config_error(node, "缺少运算符"));
        }

        let operator = Operator::parse(&node.operator);
        let compiled = match (&operator, node.rules.is_empty()) {
            (Operator::Logical(op), false) => Some(self.compile_logical(*op, node, scope)?),
            (Operator::Logical(_), true) => {
                return Err(config_error(
                    node,
                    format!("逻辑运算符 {} 缺少子规则", operator),
                ))
            }
            (Operator::Quantifier(quantifier), _) => {
                Some(self.compile_quantifier(*quantifier, node, scope)?)
            }
            (_, false) => {
                return Err(config_error(
                    node,
                    format!("运算符 {} 不能包含子规则", operator),
                ))
            }
            (Operator::Compare(op), true) => Some(compile_compare(*op, node, scope)?),
            (Operator::IsMatch, true) => self.compile_is_match(node, scope)?,
            (Operator::Numeric(kind), true) => Some(compile_numeric(*kind, node, scope)?),
            (Operator::IsInInput, true) => Some(compile_is_in_input(node, scope)?),
            (Operator::Method(name), true) => self.compile_method(name, node, scope)?,
        };

        // 失效节点（正则无效）不参与取反，始终不匹配
        let Some(predicate) = compiled else {
            warn!(rule_id = %node.rule_id, operator = %operator, "规则节点已失效，按不匹配处理");
            return Ok(never());
        };

        if node.negate {
            let negated: Predicate<S> = Arc::new(move |subject: &S| !predicate(subject));
            Ok(negated)
        } else {
            Ok(predicate)
        }
    }

    fn compile_logical<S: 'static>(
        &self,
        op: LogicalOp,
        node: &RuleNode,
        scope: &dyn Scope<S>,
    ) -> Result<Predicate<S>, RuleWallError> {
        let children = node
            .rules
            .iter()
            .map(|child| self.compile_node(child, scope))
            .collect::<Result<Vec<_>, _>>()?;

        let predicate: Predicate<S> = match (op.is_conjunction(), op.is_short_circuit()) {
            (true, true) => Arc::new(move |s: &S| children.iter().all(|child| child(s))),
            (false, true) => Arc::new(move |s: &S| children.iter().any(|child| child(s))),
            // 不短路：每个子节点都会被求值
            (true, false) => Arc::new(move |s: &S| {
                children
                    .iter()
                    .fold(true, |matched, child| child(s) && matched)
            }),
            (false, false) => Arc::new(move |s: &S| {
                children
                    .iter()
                    .fold(false, |matched, child| child(s) || matched)
            }),
        };
        Ok(predicate)
    }

    fn compile_quantifier<S: 'static>(
        &self,
        quantifier: Quantifier,
        node: &RuleNode,
        scope: &dyn Scope<S>,
    ) -> Result<Predicate<S>, RuleWallError> {
        let (list, ty) = resolve(node, scope)?;
        let ValueType::List(element) = &ty else {
            return Err(config_error(
                node,
                format!("{:?} 需要列表成员，{} 的类型为 {}", quantifier, node.member_name, ty),
            ));
        };

        if node.rules.is_empty() {
            if quantifier == Quantifier::All {
                return Err(config_error(node, "All 缺少子规则"));
            }
            let predicate: Predicate<S> = Arc::new(move |s: &S| {
                list(s).as_list().is_some_and(|items| !items.is_empty())
            });
            return Ok(predicate);
        }

        let element_scope = ElementScope::new((**element).clone());
        let children = node
            .rules
            .iter()
            .map(|child| self.compile_node(child, &element_scope))
            .collect::<Result<Vec<Predicate<Value>>, _>>()?;
        let matches_element =
            move |item: &Value| children.iter().all(|child| child(item));

        let predicate: Predicate<S> = match quantifier {
            Quantifier::Any => Arc::new(move |s: &S| {
                list(s)
                    .as_list()
                    .is_some_and(|items| items.iter().any(&matches_element))
            }),
            Quantifier::All => Arc::new(move |s: &S| {
                list(s)
                    .as_list()
                    .is_some_and(|items| items.iter().all(&matches_element))
            }),
        };
        Ok(predicate)
    }

    /// 正则无效时返回 `None`
    fn compile_is_match<S: 'static>(
        &self,
        node: &RuleNode,
        scope: &dyn Scope<S>,
    ) -> Result<Option<Predicate<S>>, RuleWallError> {
        let (subject, ty) = resolve(node, scope)?;
        expect_string(node, &ty, "IsMatch")?;
        let pattern = node
            .target_value
            .as_ref()
            .filter(|literal| !literal.is_null_text())
            .map(Literal::to_string)
            .ok_or_else(|| config_error(node, "IsMatch 缺少正则表达式"))?;

        let Some(regex) = self.matchers.regex(&node.rule_id, &pattern) else {
            return Ok(None);
        };
        let matchers = Arc::clone(&self.matchers);
        let predicate: Predicate<S> = Arc::new(move |s: &S| match subject(s) {
            Value::Str(text) => matchers.is_match(&regex, &text),
            _ => false,
        });
        Ok(Some(predicate))
    }

    /// 正则参数能否编译
    fn pattern_is_valid(&self, node: &RuleNode, args: &BoundArgs, pattern_arg: Option<usize>) -> bool {
        let Some(index) = pattern_arg else {
            return true;
        };
        args.with(|values| match values.get(index).and_then(Value::as_str) {
            Some(pattern) if !pattern.trim().is_empty() => {
                self.matchers.regex(&node.rule_id, pattern).is_some()
            }
            _ => true,
        })
    }

    /// 正则参数无效时返回 `None`
    fn compile_method<S: 'static>(
        &self,
        name: &str,
        node: &RuleNode,
        scope: &dyn Scope<S>,
    ) -> Result<Option<Predicate<S>>, RuleWallError> {
        let rule_id: Arc<str> = Arc::from(node.rule_id.as_str());
        let matchers = Arc::clone(&self.matchers);

        if node.member_name.trim().is_empty() {
            if let Some(sig) = scope.method(name) {
                let args = bind_args(node, name, &sig.params)?;
                if !self.pattern_is_valid(node, &args, sig.pattern_arg) {
                    return Ok(None);
                }
                return Ok(Some(invoke_root(sig.invoker, args, rule_id, matchers)));
            }
            if scope.subject().is_none() {
                return Err(config_error(
                    node,
                    format!("{} 没有方法 {}", scope.describe(), name),
                ));
            }
        }

        let (receiver, ty) = resolve(node, scope)?;
        let (method, params) = methods::lookup(&ty, name)
            .ok_or_else(|| config_error(node, format!("类型 {} 没有方法 {}", ty, name)))?;
        let args = bind_args(node, name, &params)?;
        if !self.pattern_is_valid(node, &args, method.pattern_arg()) {
            return Ok(None);
        }
        let call = method.call;

        let predicate: Predicate<S> = Arc::new(move |s: &S| {
            let value = receiver(s);
            let env = MethodEnv {
                rule_id: &rule_id,
                matchers: &matchers,
            };
            args.with(|values| call(&value, &env, values))
        });
        Ok(Some(predicate))
    }
}

fn invoke_root<S: 'static>(
    invoker: Invoker<S>,
    args: BoundArgs,
    rule_id: Arc<str>,
    matchers: Arc<Matchers>,
) -> Predicate<S> {
    Arc::new(move |s: &S| {
        let env = MethodEnv {
            rule_id: &rule_id,
            matchers: &matchers,
        };
        args.with(|values| invoker(s, &env, values))
    })
}

fn never<S: 'static>() -> Predicate<S> {
    Arc::new(|_: &S| false)
}

fn config_error(node: &RuleNode, message: impl Into<String>) -> RuleWallError {
    RuleWallError::config(node.rule_id.clone(), message)
}

fn resolve<S: 'static>(
    node: &RuleNode,
    scope: &dyn Scope<S>,
) -> Result<(Accessor<S>, ValueType), RuleWallError> {
    resolve_member(scope, &node.member_name).map_err(|message| config_error(node, message))
}

fn expect_string(node: &RuleNode, ty: &ValueType, operator: &str) -> Result<(), RuleWallError> {
    if *ty == ValueType::Str {
        Ok(())
    } else {
        Err(config_error(
            node,
            format!("{} 只能用于字符串成员，{} 的类型为 {}", operator, node.member_name, ty),
        ))
    }
}

fn bind_args(node: &RuleNode, name: &str, params: &[ValueType]) -> Result<BoundArgs, RuleWallError> {
    if node.inputs.len() != params.len() {
        return Err(config_error(
            node,
            format!(
                "方法 {} 需要 {} 个参数，实际提供 {} 个",
                name,
                params.len(),
                node.inputs.len()
            ),
        ));
    }

    let operands = node
        .inputs
        .iter()
        .zip(params)
        .enumerate()
        .map(|(index, (input, ty))| {
            convert_literal(input, ty)
                .map_err(|message| config_error(node, format!("参数[{}]: {}", index, message)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BoundArgs::bind(operands))
}

fn compile_compare<S: 'static>(
    op: CompareOp,
    node: &RuleNode,
    scope: &dyn Scope<S>,
) -> Result<Predicate<S>, RuleWallError> {
    let (left, ty) = resolve(node, scope)?;
    if op.is_ordering() && !ty.is_ordered() {
        return Err(config_error(
            node,
            format!("{:?} 不能用于类型 {}", op, ty),
        ));
    }

    if let Some(path) = node
        .target_value
        .as_ref()
        .and_then(Literal::as_text)
        .and_then(|text| text.strip_prefix(MEMBER_REF_PREFIX))
    {
        let (right, right_ty) =
            resolve_member(scope, path).map_err(|message| config_error(node, message))?;
        if !ty.is_scalar() || !ty.comparable_with(&right_ty) {
            return Err(config_error(
                node,
                format!("无法比较 {} 与 {}", ty, right_ty),
            ));
        }
        let predicate: Predicate<S> = Arc::new(move |s: &S| left(s).compare(op, &right(s)));
        return Ok(predicate);
    }

    let operand = match &node.target_value {
        None => Operand::Const(Value::Null),
        Some(literal) => {
            convert_literal(literal, &ty).map_err(|message| config_error(node, message))?
        }
    };

    let predicate: Predicate<S> = match operand {
        Operand::Const(target) => Arc::new(move |s: &S| left(s).compare(op, &target)),
        dynamic => Arc::new(move |s: &S| left(s).compare(op, &dynamic.resolve())),
    };
    Ok(predicate)
}

fn compile_numeric<S: 'static>(
    kind: NumericKind,
    node: &RuleNode,
    scope: &dyn Scope<S>,
) -> Result<Predicate<S>, RuleWallError> {
    let (subject, ty) = resolve(node, scope)?;
    expect_string(node, &ty, &format!("Is{:?}", kind))?;
    let predicate: Predicate<S> = Arc::new(move |s: &S| {
        subject(s).as_str().is_some_and(|text| parses_as(kind, text))
    });
    Ok(predicate)
}

fn compile_is_in_input<S: 'static>(
    node: &RuleNode,
    scope: &dyn Scope<S>,
) -> Result<Predicate<S>, RuleWallError> {
    let (subject, ty) = resolve(node, scope)?;
    if !ty.is_scalar() {
        return Err(config_error(
            node,
            format!("IsInInput 不能用于类型 {}", ty),
        ));
    }
    if node.inputs.is_empty() {
        return Ok(never());
    }

    let operands = node
        .inputs
        .iter()
        .map(|input| convert_literal(input, &ty))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|message| config_error(node, message))?;

    let predicate: Predicate<S> = match BoundArgs::bind(operands) {
        BoundArgs::Const(candidates) => Arc::new(move |s: &S| {
            let value = subject(s);
            candidates.iter().any(|candidate| value.loose_eq(candidate))
        }),
        dynamic => Arc::new(move |s: &S| {
            let value = subject(s);
            dynamic.with(|candidates| candidates.iter().any(|candidate| value.loose_eq(candidate)))
        }),
    };
    Ok(predicate)
}
