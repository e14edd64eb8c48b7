//! Argument accessors shared by the function modules
//!
//! Arguments reach a native function already converted to the declared
//! parameter types, so these only fail when a nullable parameter is null or
//! a `dynamic` parameter holds the wrong kind of value.

use tfunk_runtime::{Attrs, Function, FunctionError, Number, Param, Type, Value};

pub(crate) fn str_arg(args: &[Value], idx: usize) -> Result<&str, FunctionError> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| FunctionError::arg(idx, "string required"))
}

pub(crate) fn num_arg(args: &[Value], idx: usize) -> Result<Number, FunctionError> {
    args.get(idx)
        .and_then(Value::as_number)
        .ok_or_else(|| FunctionError::arg(idx, "number required"))
}

/// A whole number argument
pub(crate) fn int_arg(args: &[Value], idx: usize) -> Result<i64, FunctionError> {
    num_arg(args, idx)?
        .as_i64()
        .ok_or_else(|| FunctionError::arg(idx, "a whole number is required"))
}

pub(crate) fn seq_arg(args: &[Value], idx: usize) -> Result<&[Value], FunctionError> {
    args.get(idx)
        .and_then(Value::as_sequence)
        .ok_or_else(|| FunctionError::arg(idx, "a list, set, or tuple is required"))
}

pub(crate) fn attrs_arg(args: &[Value], idx: usize) -> Result<&Attrs, FunctionError> {
    args.get(idx)
        .and_then(Value::as_attrs)
        .ok_or_else(|| FunctionError::arg(idx, "a map or object is required"))
}

/// Optional trailing argument supplied through a variadic parameter
pub(crate) fn optional(args: &[Value], idx: usize) -> Option<&Value> {
    args.get(idx).filter(|v| !v.is_null())
}

pub(crate) fn string_list(items: impl IntoIterator<Item = String>) -> Value {
    Value::list(Type::String, items.into_iter().map(Value::from).collect())
}

/// Wrap a sequence result as a list when its elements share a type,
/// otherwise as a tuple
pub(crate) fn sequence(items: Vec<Value>) -> Value {
    let tuple = Value::tuple(items);
    tfunk_runtime::convert(&tuple, &Type::list(Type::Dynamic)).unwrap_or(tuple)
}

/// A function taking one string and returning one string
pub(crate) fn string_fn(f: fn(&str) -> String) -> Function {
    Function::native(vec![Param::new("str", Type::String)], move |args| {
        Ok(Value::string(f(str_arg(args, 0)?)))
    })
}

pub(crate) fn number(n: Option<Number>) -> Result<Value, FunctionError> {
    n.map(Value::Number)
        .ok_or_else(|| FunctionError::failed("result is not a finite number"))
}
