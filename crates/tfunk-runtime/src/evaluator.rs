//! Expression evaluator for HCL

use std::cell::Cell;

use indexmap::IndexMap;
use tfunk_parser::{
    BinaryOp, Diagnostics, Expr, ExprKind, ForExpr, Identifier, ObjectKey, SourceMap, Span,
    SplatKind, Template, TemplatePart, Traversal, UnaryOp,
};

use crate::context::EvalContext;
use crate::convert::{convert, unify};
use crate::error::{EvalError, EvalResult};
use crate::function::{Function, FunctionError, FunctionKind};
use crate::scope::{Scope, ScopeRef};
use crate::types::Type;
use crate::value::{ArithmeticError, Attrs, Number, Value};

/// Default recursion depth limit
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Evaluate `expr` against `ctx`, reporting failures as diagnostics whose
/// ranges are resolved against `source`
pub fn evaluate(
    expr: &Expr,
    ctx: &dyn EvalContext,
    source: &SourceMap,
) -> Result<Value, Diagnostics> {
    Evaluator::new(ctx)
        .eval(expr)
        .map_err(|err| err.into_diagnostics(source))
}

/// The evaluator
pub struct Evaluator<'a> {
    ctx: &'a dyn EvalContext,
    /// Recursion depth limit
    max_depth: usize,
    /// Current recursion depth
    depth: Cell<usize>,
}

impl<'a> Evaluator<'a> {
    /// Create a new evaluator
    pub fn new(ctx: &'a dyn EvalContext) -> Self {
        Self {
            ctx,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: Cell::new(0),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Evaluate a root expression
    pub fn eval(&self, expr: &Expr) -> EvalResult<Value> {
        self.eval_expr(expr, &Scope::new())
    }

    /// Evaluate an expression in a scope
    pub fn eval_expr(&self, expr: &Expr, scope: &ScopeRef) -> EvalResult<Value> {
        // Check recursion depth
        let current_depth = self.depth.get();
        if current_depth >= self.max_depth {
            return Err(EvalError::StackOverflow.at(expr.span));
        }
        self.depth.set(current_depth + 1);
        let result = self.eval_expr_inner(expr, scope);
        self.depth.set(current_depth);
        result.map_err(|err| err.at(expr.span))
    }

    fn eval_expr_inner(&self, expr: &Expr, scope: &ScopeRef) -> EvalResult<Value> {
        match &expr.kind {
            // Literals
            ExprKind::Null => Ok(Value::null()),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(i) => Ok(Value::int(*i)),
            ExprKind::Float(f) => {
                Value::float(*f).ok_or(EvalError::Arithmetic(ArithmeticError::NonFinite))
            }
            ExprKind::Template(t) => self.eval_template(t, scope),

            ExprKind::Variable(name) => self.resolve_variable(name, scope),

            ExprKind::Tuple(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval_expr(item, scope))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::tuple(values))
            }
            ExprKind::Object(items) => {
                let mut attrs = Attrs::new();
                for item in items {
                    let key = match &item.key {
                        ObjectKey::Name(name) => name.node.clone(),
                        ObjectKey::Expr(key_expr) => {
                            let key = self.eval_expr(key_expr, scope)?;
                            self.key_string(key, "Object key must be a string.")
                                .map_err(|e| e.at(key_expr.span))?
                        }
                    };
                    let value = self.eval_expr(&item.value, scope)?;
                    attrs.insert(key, value);
                }
                Ok(Value::object(attrs))
            }

            ExprKind::GetAttr { base, name } => {
                let base = self.eval_expr(base, scope)?;
                get_attr(&base, name)
            }
            ExprKind::Index { base, key } => {
                let base = self.eval_expr(base, scope)?;
                let key_value = self.eval_expr(key, scope)?;
                index(&base, &key_value).map_err(|e| e.at(key.span))
            }
            ExprKind::Splat { base, kind, each } => {
                let base = self.eval_expr(base, scope)?;
                self.eval_splat(base, *kind, each, scope)
            }

            ExprKind::Call {
                name,
                args,
                expand_final,
            } => self.eval_call(name, args, *expand_final, expr.span, scope),

            ExprKind::Unary { op, operand } => {
                let value = self.eval_expr(operand, scope)?;
                match op {
                    UnaryOp::Not => {
                        let b = self.operand(value, &Type::Bool, operand, "unary")?;
                        Ok(Value::Bool(!b.as_bool().unwrap_or_default()))
                    }
                    UnaryOp::Neg => {
                        let n = self.operand(value, &Type::Number, operand, "unary")?;
                        let n = n.as_number().unwrap_or(Number::Int(0));
                        Ok(Value::Number(n.neg()?))
                    }
                }
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, scope),
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval_expr(condition, scope)?;
                let take_then = self.condition(cond).map_err(|e| e.at(condition.span))?;
                let (chosen, other) = if take_then {
                    (then_branch, else_branch)
                } else {
                    (else_branch, then_branch)
                };
                let value = self.eval_expr(chosen, scope)?;
                // The result takes the type both branches unify to. A branch
                // that fails to evaluate does not constrain it.
                let Ok(alternative) = self.eval_expr(other, scope) else {
                    return Ok(value);
                };
                match unify(&[value.ty(), alternative.ty()]) {
                    Some(ty) => Ok(convert(&value, &ty)?),
                    None => {
                        let (then_ty, else_ty) = if take_then {
                            (value.ty(), alternative.ty())
                        } else {
                            (alternative.ty(), value.ty())
                        };
                        Err(EvalError::InconsistentTypes(format!(
                            "The true and false result expressions must have consistent \
                             types. The given expressions are {} and {}, respectively.",
                            then_ty.friendly_name(),
                            else_ty.friendly_name()
                        )))
                    }
                }
            }

            ExprKind::For(for_expr) => self.eval_for(for_expr, scope),

            ExprKind::Parenthesized(inner) => self.eval_expr(inner, scope),
        }
    }

    fn resolve_variable(&self, name: &str, scope: &ScopeRef) -> EvalResult<Value> {
        scope
            .resolve(name)
            .or_else(|| self.ctx.variable(name))
            .cloned()
            .ok_or_else(|| EvalError::undefined_var(name))
    }

    /// Convert an operand to `ty`, rejecting null
    fn operand(&self, value: Value, ty: &Type, expr: &Expr, side: &str) -> EvalResult<Value> {
        if value.is_null() {
            return Err(EvalError::InvalidOperand(format!(
                "Unsuitable value for {} operand: argument must not be null.",
                side
            ))
            .at(expr.span));
        }
        convert(&value, ty).map_err(|err| {
            EvalError::InvalidOperand(format!(
                "Unsuitable value for {} operand: {}.",
                side, err
            ))
            .at(expr.span)
        })
    }

    fn condition(&self, value: Value) -> EvalResult<bool> {
        if value.is_null() {
            return Err(EvalError::InvalidCondition(
                "The condition value is null. Conditions must either be true or false."
                    .to_string(),
            ));
        }
        match convert(&value, &Type::Bool) {
            Ok(Value::Bool(b)) => Ok(b),
            _ => Err(EvalError::InvalidCondition(
                "The condition expression must be of type bool.".to_string(),
            )),
        }
    }

    fn key_string(&self, key: Value, type_message: &str) -> EvalResult<String> {
        if key.is_null() {
            return Err(EvalError::InvalidKey(
                "Can't use a null value as a key.".to_string(),
            ));
        }
        match convert(&key, &Type::String) {
            Ok(Value::String(s)) => Ok(s.to_string()),
            _ => Err(EvalError::InvalidKey(type_message.to_string())),
        }
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &ScopeRef,
    ) -> EvalResult<Value> {
        let lhs = self.eval_expr(left, scope)?;
        let rhs = self.eval_expr(right, scope)?;

        match op {
            BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),

            BinaryOp::And | BinaryOp::Or => {
                let a = self.operand(lhs, &Type::Bool, left, "left")?;
                let b = self.operand(rhs, &Type::Bool, right, "right")?;
                let (a, b) = (a.as_bool().unwrap_or_default(), b.as_bool().unwrap_or_default());
                Ok(Value::Bool(if op == BinaryOp::And { a && b } else { a || b }))
            }

            _ => {
                let a = self
                    .operand(lhs, &Type::Number, left, "left")?
                    .as_number()
                    .unwrap_or(Number::Int(0));
                let b = self
                    .operand(rhs, &Type::Number, right, "right")?
                    .as_number()
                    .unwrap_or(Number::Int(0));
                match op {
                    BinaryOp::Lt => Ok(Value::Bool(a < b)),
                    BinaryOp::Le => Ok(Value::Bool(a <= b)),
                    BinaryOp::Gt => Ok(Value::Bool(a > b)),
                    BinaryOp::Ge => Ok(Value::Bool(a >= b)),
                    BinaryOp::Add => Ok(Value::Number(a.add(b)?)),
                    BinaryOp::Sub => Ok(Value::Number(a.sub(b)?)),
                    BinaryOp::Mul => Ok(Value::Number(a.mul(b)?)),
                    BinaryOp::Div => Ok(Value::Number(a.div(b)?)),
                    BinaryOp::Mod => Ok(Value::Number(a.rem(b)?)),
                    BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => {
                        unreachable!("handled above")
                    }
                }
            }
        }
    }

    // =========================================================================
    // Templates
    // =========================================================================

    fn eval_template(&self, template: &Template, scope: &ScopeRef) -> EvalResult<Value> {
        // "${expr}" yields the value itself, not its string form
        if let Some(expr) = template.as_single_interpolation() {
            return self.eval_expr(expr, scope);
        }
        let mut out = String::new();
        self.render_parts(&template.parts, scope, &mut out)?;
        Ok(Value::string(out))
    }

    fn render_parts(
        &self,
        parts: &[TemplatePart],
        scope: &ScopeRef,
        out: &mut String,
    ) -> EvalResult<()> {
        for part in parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Interpolation(expr) => {
                    let value = self.eval_expr(expr, scope)?;
                    out.push_str(&template_string(&value).map_err(|e| e.at(expr.span))?);
                }
                TemplatePart::If {
                    condition,
                    then_parts,
                    else_parts,
                } => {
                    let cond = self.eval_expr(condition, scope)?;
                    if self.condition(cond).map_err(|e| e.at(condition.span))? {
                        self.render_parts(then_parts, scope, out)?;
                    } else {
                        self.render_parts(else_parts, scope, out)?;
                    }
                }
                TemplatePart::For {
                    key_var,
                    value_var,
                    collection,
                    body,
                } => {
                    let coll = self.eval_expr(collection, scope)?;
                    let pairs = iteration_pairs(&coll).map_err(|e| e.at(collection.span))?;
                    for (key, value) in pairs {
                        let child = bind_iterators(scope, key_var.as_ref(), value_var, key, value);
                        self.render_parts(body, &child, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Traversals
    // =========================================================================

    fn eval_splat(
        &self,
        base: Value,
        kind: SplatKind,
        each: &[Traversal],
        scope: &ScopeRef,
    ) -> EvalResult<Value> {
        let apply = |item: &Value| -> EvalResult<Value> {
            let mut current = item.clone();
            for step in each {
                current = match step {
                    Traversal::Attr(name) => get_attr(&current, name)?,
                    Traversal::Index(key) => {
                        let key_value = self.eval_expr(key, scope)?;
                        index(&current, &key_value).map_err(|e| e.at(key.span))?
                    }
                };
            }
            Ok(current)
        };

        match &base {
            Value::Null(_) => Ok(Value::empty_tuple()),
            Value::Tuple(items) => Ok(Value::tuple(
                items.iter().map(apply).collect::<EvalResult<_>>()?,
            )),
            Value::List { items, .. } | Value::Set { items, .. } => {
                let results: Vec<Value> = items.iter().map(apply).collect::<EvalResult<_>>()?;
                let tuple = Value::tuple(results);
                // Keep list-ness when the results share a type
                Ok(convert(&tuple, &Type::list(Type::Dynamic)).unwrap_or(tuple))
            }
            _ => {
                tracing::trace!(?kind, "splat over a non-collection value");
                Ok(Value::tuple(vec![apply(&base)?]))
            }
        }
    }

    // =========================================================================
    // For expressions
    // =========================================================================

    fn eval_for(&self, f: &ForExpr, scope: &ScopeRef) -> EvalResult<Value> {
        let coll = self.eval_expr(&f.collection, scope)?;
        let pairs = iteration_pairs(&coll).map_err(|e| e.at(f.collection.span))?;

        let mut items = Vec::new();
        let mut attrs = Attrs::new();
        let mut groups: IndexMap<String, Vec<Value>> = IndexMap::new();

        for (key, value) in pairs {
            let child = bind_iterators(scope, f.key_var.as_ref(), &f.value_var, key, value);

            if let Some(cond_expr) = &f.condition {
                let cond = self.eval_expr(cond_expr, &child)?;
                if !self.condition(cond).map_err(|e| e.at(cond_expr.span))? {
                    continue;
                }
            }

            match &f.key_expr {
                None => items.push(self.eval_expr(&f.value_expr, &child)?),
                Some(key_expr) => {
                    let key = self.eval_expr(key_expr, &child)?;
                    let key = self
                        .key_string(key, "Key expression in 'for' expression must be a string.")
                        .map_err(|e| e.at(key_expr.span))?;
                    let value = self.eval_expr(&f.value_expr, &child)?;
                    if f.group {
                        groups.entry(key).or_default().push(value);
                    } else if attrs.contains_key(&key) {
                        return Err(EvalError::DuplicateKey(key).at(key_expr.span));
                    } else {
                        attrs.insert(key, value);
                    }
                }
            }
        }

        if !f.is_object() {
            return Ok(Value::tuple(items));
        }
        if f.group {
            attrs = groups
                .into_iter()
                .map(|(k, vs)| (k, Value::tuple(vs)))
                .collect();
        }
        Ok(Value::object(attrs))
    }

    // =========================================================================
    // Function calls
    // =========================================================================

    fn eval_call(
        &self,
        name: &Identifier,
        args: &[Expr],
        expand_final: bool,
        span: Span,
        scope: &ScopeRef,
    ) -> EvalResult<Value> {
        let function = self
            .ctx
            .function(&name.node)
            .ok_or_else(|| EvalError::UnknownFunction(name.node.clone()).at(name.span))?;

        tracing::trace!(function = %name.node, args = args.len(), "calling function");

        match &function.kind {
            FunctionKind::Try => self.eval_try(&name.node, args, scope),
            FunctionKind::Can => {
                check_arity(&name.node, function, args.len())?;
                Ok(Value::Bool(self.eval_expr(&args[0], scope).is_ok()))
            }
            FunctionKind::Native(native) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push((self.eval_expr(arg, scope)?, arg.span));
                }

                if expand_final {
                    if let Some((last, last_span)) = values.pop() {
                        let items = match &last {
                            Value::List { items, .. }
                            | Value::Set { items, .. }
                            | Value::Tuple(items) => items.clone(),
                            Value::Null(_) => {
                                return Err(EvalError::InvalidExpansion(
                                    "The expanding argument (indicated by ...) must not be null."
                                        .to_string(),
                                )
                                .at(last_span))
                            }
                            _ => {
                                return Err(EvalError::InvalidExpansion(
                                    "The expanding argument (indicated by ...) must be of a tuple, list, or set type."
                                        .to_string(),
                                )
                                .at(last_span))
                            }
                        };
                        values.extend(items.iter().map(|v| (v.clone(), last_span)));
                    }
                }

                check_arity(&name.node, function, values.len()).map_err(|e| e.at(span))?;

                let mut converted = Vec::with_capacity(values.len());
                for (i, (value, arg_span)) in values.iter().enumerate() {
                    let Some(param) = function.param_for(i) else {
                        break;
                    };
                    if value.is_null() && !param.allow_null {
                        return Err(EvalError::InvalidArgument {
                            function: name.node.clone(),
                            param: param.name.clone(),
                            message: "argument must not be null".to_string(),
                        }
                        .at(*arg_span));
                    }
                    let value = convert(value, &param.ty).map_err(|err| {
                        EvalError::InvalidArgument {
                            function: name.node.clone(),
                            param: param.name.clone(),
                            message: err.to_string(),
                        }
                        .at(*arg_span)
                    })?;
                    converted.push(value);
                }

                native(&converted).map_err(|err| match err {
                    FunctionError::Failed(message) => EvalError::FunctionFailed {
                        function: name.node.clone(),
                        message,
                    }
                    .at(span),
                    FunctionError::Argument { index, message } => {
                        let param = function
                            .param_for(index)
                            .map(|p| p.name.clone())
                            .unwrap_or_default();
                        let arg_span = values.get(index).map_or(span, |(_, s)| *s);
                        EvalError::InvalidArgument {
                            function: name.node.clone(),
                            param,
                            message,
                        }
                        .at(arg_span)
                    }
                })
            }
        }
    }

    /// Evaluate the arguments of `try` in order, returning the first success
    fn eval_try(&self, name: &str, args: &[Expr], scope: &ScopeRef) -> EvalResult<Value> {
        let mut last_error = None;
        for arg in args {
            match self.eval_expr(arg, scope) {
                Ok(value) => return Ok(value),
                Err(err) => last_error = Some(err),
            }
        }
        let message = match last_error {
            Some(err) => format!("no expression succeeded: {}", err),
            None => "at least one argument is required".to_string(),
        };
        Err(EvalError::FunctionFailed {
            function: name.to_string(),
            message,
        })
    }
}

fn check_arity(name: &str, function: &Function, count: usize) -> EvalResult<()> {
    let required = function.params.len();
    if count < required {
        let qualifier = if function.variadic.is_some() {
            " at least"
        } else {
            ""
        };
        return Err(EvalError::WrongArgCount {
            function: name.to_string(),
            too_many: false,
            detail: format!(
                "Function {:?} expects{} {} argument(s). Missing value for {:?}.",
                name, qualifier, required, function.params[count].name
            ),
        });
    }
    if function.variadic.is_none() && count > required {
        return Err(EvalError::WrongArgCount {
            function: name.to_string(),
            too_many: true,
            detail: format!(
                "Function {:?} expects only {} argument(s).",
                name, required
            ),
        });
    }
    Ok(())
}

/// Bind `for` iterator variables in a child scope
fn bind_iterators(
    scope: &ScopeRef,
    key_var: Option<&Identifier>,
    value_var: &Identifier,
    key: Value,
    value: Value,
) -> ScopeRef {
    let mut bindings = vec![(value_var.node.clone(), value)];
    if let Some(key_var) = key_var {
        bindings.push((key_var.node.clone(), key));
    }
    Scope::with_locals(scope, bindings)
}

/// Key/value pairs of a collection: indices for sequences, the element
/// itself for sets, string keys for maps and objects
pub fn iteration_pairs(value: &Value) -> EvalResult<Vec<(Value, Value)>> {
    match value {
        Value::List { items, .. } | Value::Tuple(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::int(i as i64), v.clone()))
            .collect()),
        Value::Set { items, .. } => Ok(items.iter().map(|v| (v.clone(), v.clone())).collect()),
        Value::Map { entries, .. } | Value::Object(entries) => Ok(entries
            .iter()
            .map(|(k, v)| (Value::string(k.as_str()), v.clone()))
            .collect()),
        Value::Null(_) => Err(EvalError::NotIterable(
            "A null value cannot be used as the collection in a 'for' expression.".to_string(),
        )),
        other => Err(EvalError::NotIterable(format!(
            "A value of type {} cannot be used as the collection in a 'for' expression.",
            other.ty().friendly_name()
        ))),
    }
}

/// Look up an attribute of an object or map
pub fn get_attr(base: &Value, name: &Identifier) -> EvalResult<Value> {
    let result = match base {
        Value::Object(attrs) => attrs
            .get(&name.node)
            .cloned()
            .ok_or_else(|| EvalError::UnsupportedAttribute(name.node.clone())),
        Value::Map { entries, .. } => entries
            .get(&name.node)
            .cloned()
            .ok_or_else(|| EvalError::MissingMapElement(name.node.clone())),
        Value::Null(_) => Err(EvalError::NullAttribute),
        _ => Err(EvalError::UnsupportedAttribute(name.node.clone())),
    };
    result.map_err(|e| e.at(name.span))
}

/// Index a collection by key
pub fn index(base: &Value, key: &Value) -> EvalResult<Value> {
    const NO_ELEMENT: &str = "The given key does not identify an element in this collection value.";

    if key.is_null() {
        return Err(EvalError::InvalidIndex(
            "Can't use a null value as an indexing key.".to_string(),
        ));
    }

    match base {
        Value::Null(_) => Err(EvalError::NullIndex),
        Value::List { items, .. } | Value::Tuple(items) => {
            let n = match convert(key, &Type::Number) {
                Ok(Value::Number(n)) => n,
                _ => {
                    return Err(EvalError::InvalidIndex(
                        "The given key does not identify an element in this collection value: a number is required.".to_string(),
                    ))
                }
            };
            n.as_i64()
                .filter(|i| *i >= 0)
                .and_then(|i| items.get(i as usize))
                .cloned()
                .ok_or_else(|| EvalError::InvalidIndex(NO_ELEMENT.to_string()))
        }
        Value::Map { entries, .. } | Value::Object(entries) => {
            let k = match convert(key, &Type::String) {
                Ok(Value::String(s)) => s,
                _ => {
                    return Err(EvalError::InvalidIndex(
                        "The given key does not identify an element in this collection value: string required.".to_string(),
                    ))
                }
            };
            entries
                .get(&*k)
                .cloned()
                .ok_or_else(|| EvalError::InvalidIndex(NO_ELEMENT.to_string()))
        }
        Value::Set { .. } => Err(EvalError::InvalidIndex(
            "Elements of a set are identified only by their value and don't have any separate index or key to select with, so it's only possible to perform operations across all elements of the set.".to_string(),
        )),
        _ => Err(EvalError::InvalidIndex(
            "This value does not have any indices.".to_string(),
        )),
    }
}

/// String form of a value interpolated into a template
fn template_string(value: &Value) -> EvalResult<String> {
    match value {
        Value::Null(_) => Err(EvalError::InvalidTemplateValue(
            "The expression result is null. Cannot include a null value in a string template."
                .to_string(),
        )),
        Value::String(s) => Ok(s.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(EvalError::InvalidTemplateValue(format!(
            "Cannot include the given value in a string template: string required, but have {}.",
            other.ty().friendly_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::function::{Function, FunctionRegistry, Param};
    use tfunk_parser::{parse_expression, EXPRESSION_NAME};

    fn eval_with(src: &str, ctx: &Context) -> Result<Value, Diagnostics> {
        let expr = parse_expression(src)?;
        evaluate(&expr, ctx, &SourceMap::new(EXPRESSION_NAME, src))
    }

    fn eval(src: &str) -> Value {
        eval_with(src, &Context::empty()).unwrap()
    }

    fn eval_err(src: &str) -> String {
        eval_with(src, &Context::empty()).unwrap_err().to_string()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 1"), Value::int(2));
        assert_eq!(eval("4 / 2"), Value::int(2));
        assert_eq!(eval("7 / 2"), Value::float(3.5).unwrap());
        assert_eq!(eval("7 % 3"), Value::int(1));
        assert_eq!(eval("\"3\" * 2"), Value::int(6));
        assert_eq!(eval("-(2 - 5)"), Value::int(3));
    }

    #[test]
    fn test_divide_by_zero() {
        assert_eq!(
            eval_err("1 / 0"),
            "<expression>:1,1-6: Operation failed; Error during operation: divide by zero."
        );
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval("1 < 2 && 2 <= 2"), Value::Bool(true));
        assert_eq!(eval("!(1 == 1) || \"a\" != \"a\""), Value::Bool(false));
        assert_eq!(eval("[1, \"a\"] == [1, \"a\"]"), Value::Bool(true));
        assert_eq!(eval("1 == \"1\""), Value::Bool(false));
    }

    #[test]
    fn test_invalid_operand() {
        assert_eq!(
            eval_err("true + 1"),
            "<expression>:1,1-5: Invalid operand; Unsuitable value for left operand: number required."
        );
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(
            eval_err("1 + foo"),
            "<expression>:1,5-8: Unknown variable; There is no variable named \"foo\"."
        );
    }

    #[test]
    fn test_conditional_ignores_failing_branch() {
        assert_eq!(eval("true ? 1 : foo"), Value::int(1));
        assert!(eval_err("1 ? 1 : 2").contains("Incorrect condition type"));
    }

    #[test]
    fn test_conditional_unifies_branch_types() {
        assert_eq!(eval("true ? 1 : \"x\""), Value::from("1"));
        assert_eq!(eval("false ? \"x\" : true"), Value::from("true"));
        assert_eq!(eval("true ? [1] : [\"a\"]"), Value::tuple(vec![Value::from("1")]));
        assert_eq!(eval("true ? 1 : null"), Value::int(1));
        assert_eq!(
            eval_err("true ? 1 : false"),
            "<expression>:1,1-17: Inconsistent conditional result types; The true and false \
             result expressions must have consistent types. The given expressions are number \
             and bool, respectively."
        );
    }

    #[test]
    fn test_integer_overflow() {
        assert_eq!(eval("9223372036854775806 + 1"), Value::int(i64::MAX));
        assert_eq!(
            eval_err("9223372036854775807 + 1"),
            "<expression>:1,1-24: Operation failed; Error during operation: integer result is \
             out of range."
        );
        assert!(eval_err("-9223372036854775807 - 2").contains("out of range"));
        assert!(eval_err("4611686018427387904 * 2").contains("out of range"));
        assert!(eval_err("1 / 0").contains("divide by zero"));
    }

    #[test]
    fn test_templates() {
        let ctx = Context::empty().with_variable("name", Value::from("world"));
        assert_eq!(
            eval_with("\"Hello, ${name}!\"", &ctx).unwrap(),
            Value::from("Hello, world!")
        );
        assert_eq!(eval("\"${[1, 2]}\""), Value::tuple(vec![Value::int(1), Value::int(2)]));
        assert_eq!(
            eval(r#""%{ for x in [1, 2, 3] }${x}%{ endfor }""#),
            Value::from("123")
        );
        assert_eq!(
            eval(r#""%{ if 1 > 2 }big%{ else }small%{ endif }""#),
            Value::from("small")
        );
        assert!(eval_err(r#""a${null}""#).contains("Invalid template interpolation value"));
    }

    #[test]
    fn test_collections_and_traversal() {
        assert_eq!(eval("{a = 1, b = \"x\"}.b"), Value::from("x"));
        assert_eq!(eval("[10, 20, 30][1]"), Value::int(20));
        assert_eq!(eval("{a = [1, 2]}[\"a\"].1"), Value::int(2));
        assert!(eval_err("[1][5]").contains("Invalid index"));
        assert!(eval_err("{a = 1}.b").contains("Unsupported attribute"));
        assert!(eval_err("null.b").contains("Attempt to get attribute from null value"));
    }

    #[test]
    fn test_splat() {
        assert_eq!(
            eval("[{a = 1}, {a = 2}][*].a"),
            Value::tuple(vec![Value::int(1), Value::int(2)])
        );
        assert_eq!(eval("null[*]"), Value::empty_tuple());
        assert_eq!(eval("{a = 1}[*].a"), Value::tuple(vec![Value::int(1)]));
    }

    #[test]
    fn test_for_expressions() {
        assert_eq!(
            eval("[for i, v in [1, 2, 3] : v * i if v > 1]"),
            Value::tuple(vec![Value::int(2), Value::int(6)])
        );
        let obj = eval("{for s in [\"a\", \"b\"] : s => \"${s}${s}\"}");
        assert_eq!(obj.as_attrs().and_then(|a| a.get("b")), Some(&Value::from("bb")));

        assert!(eval_err("{for s in [\"a\", \"a\"] : s => s}").contains("Duplicate object key"));
    }

    #[test]
    fn test_object_for_groups() {
        let v = eval("{for k, v in {x = 1, y = 1, z = 2} : v => k...}");
        let attrs = v.as_attrs().unwrap();
        assert_eq!(
            attrs.get("1"),
            Some(&Value::tuple(vec![Value::from("x"), Value::from("y")]))
        );
        assert_eq!(attrs.get("2"), Some(&Value::tuple(vec![Value::from("z")])));
    }

    fn registry() -> Context {
        let mut functions = FunctionRegistry::new();
        functions.register(
            "upper",
            Function::native(vec![Param::new("str", Type::String)], |args| {
                Ok(Value::string(args[0].as_str().unwrap_or_default().to_uppercase()))
            }),
        );
        functions.register(
            "sum",
            Function::native(Vec::new(), |args| {
                let total = args
                    .iter()
                    .filter_map(Value::as_number)
                    .try_fold(Number::Int(0), |acc, n| acc.add(n))
                    .map_err(|e| FunctionError::failed(e.to_string()))?;
                Ok(Value::Number(total))
            })
            .with_variadic(Param::new("numbers", Type::Number)),
        );
        functions.register("try", Function::try_fn());
        functions.register("can", Function::can_fn());
        Context::new(functions)
    }

    #[test]
    fn test_function_calls() {
        let ctx = registry();
        assert_eq!(eval_with("upper(\"abc\")", &ctx).unwrap(), Value::from("ABC"));
        assert_eq!(eval_with("upper(12)", &ctx).unwrap(), Value::from("12"));
        assert_eq!(eval_with("sum(1, 2, 3)", &ctx).unwrap(), Value::int(6));
        assert_eq!(eval_with("sum([1, 2, 3]...)", &ctx).unwrap(), Value::int(6));
    }

    #[test]
    fn test_function_call_errors() {
        let ctx = registry();
        let err = eval_with("upper()", &ctx).unwrap_err().to_string();
        assert_eq!(
            err,
            "<expression>:1,1-8: Not enough function arguments; Function \"upper\" expects 1 argument(s). Missing value for \"str\"."
        );
        let err = eval_with("upper([])", &ctx).unwrap_err().to_string();
        assert!(err.starts_with("<expression>:1,7-9: Invalid function argument"));
        let err = eval_with("nope()", &ctx).unwrap_err().to_string();
        assert!(err.contains("There is no function named \"nope\"."));
    }

    #[test]
    fn test_try_and_can() {
        let ctx = registry();
        assert_eq!(eval_with("try(foo, 2)", &ctx).unwrap(), Value::int(2));
        assert_eq!(eval_with("can(foo)", &ctx).unwrap(), Value::Bool(false));
        assert_eq!(eval_with("can(1 + 1)", &ctx).unwrap(), Value::Bool(true));
        assert!(eval_with("try(foo, bar)", &ctx).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let src = format!("{}1{}", "(".repeat(64), ")".repeat(64));
        let expr = parse_expression(&src).unwrap();
        let ctx = Context::empty();
        let err = Evaluator::new(&ctx).with_max_depth(10).eval(&expr).unwrap_err();
        assert!(matches!(err.split_location().1, EvalError::StackOverflow));
    }
}
