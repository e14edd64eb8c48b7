//! Type conversion functions and the lazy `try`/`can`

use tfunk_runtime::{convert, Function, FunctionError, FunctionRegistry, Param, Type};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("tobool", to(Type::Bool));
    registry.register("tonumber", to(Type::Number));
    registry.register("tostring", to(Type::String));
    registry.register("tolist", to(Type::list(Type::Dynamic)));
    registry.register("toset", to(Type::set(Type::Dynamic)));
    registry.register("tomap", to(Type::map(Type::Dynamic)));

    registry.register("try", Function::try_fn());
    registry.register("can", Function::can_fn());
}

/// Conversion to `ty`. Nulls pass through with the target type.
fn to(ty: Type) -> Function {
    Function::native(vec![Param::new("v", Type::Dynamic).nullable()], move |args| {
        if ty.is_primitive() && !args[0].is_null() && !args[0].ty().is_primitive() {
            return Err(FunctionError::arg(
                0,
                format!("cannot convert {} to {}", args[0].ty().friendly_name(), ty.friendly_name()),
            ));
        }
        convert(&args[0], &ty).map_err(|e| FunctionError::arg(0, e.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfunk_runtime::{FunctionKind, Value};

    fn call(name: &str, arg: Value) -> Result<Value, FunctionError> {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        match &registry.get(name).unwrap().kind {
            FunctionKind::Native(f) => f(&[arg]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_primitive_conversions() {
        assert_eq!(call("tonumber", "12".into()).unwrap(), Value::int(12));
        assert_eq!(call("tobool", "true".into()).unwrap(), Value::Bool(true));
        assert_eq!(call("tostring", Value::int(5)).unwrap(), Value::from("5"));
        assert!(call("tonumber", "twelve".into()).is_err());
        assert!(call("tostring", Value::empty_tuple()).is_err());
    }

    #[test]
    fn test_collection_conversions() {
        let tuple = Value::tuple(vec![Value::from("b"), Value::from("a"), Value::from("b")]);
        assert_eq!(
            call("toset", tuple.clone()).unwrap(),
            Value::set(Type::String, vec!["a".into(), "b".into()])
        );
        assert_eq!(call("tolist", tuple).unwrap().ty(), Type::list(Type::String));
    }

    #[test]
    fn test_null_keeps_target_type() {
        assert_eq!(call("tostring", Value::null()).unwrap().ty(), Type::String);
    }
}
