//! Hash, UUID and time functions

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256, Sha512};
use tfunk_runtime::{Function, FunctionRegistry, Param, Type, Value};

use crate::args::str_arg;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("sha256", digest(|s| hex::encode(Sha256::digest(s.as_bytes()))));
    registry.register("sha512", digest(|s| hex::encode(Sha512::digest(s.as_bytes()))));
    registry.register("base64sha256", digest(|s| STANDARD.encode(Sha256::digest(s.as_bytes()))));
    registry.register("base64sha512", digest(|s| STANDARD.encode(Sha512::digest(s.as_bytes()))));

    registry.register(
        "uuid",
        Function::native(Vec::new(), |_| Ok(Value::string(uuid::Uuid::new_v4().to_string()))),
    );
    registry.register(
        "timestamp",
        Function::native(Vec::new(), |_| {
            Ok(Value::string(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)))
        }),
    );
}

fn digest(f: fn(&str) -> String) -> Function {
    Function::native(vec![Param::new("str", Type::String)], move |args| {
        Ok(Value::string(f(str_arg(args, 0)?)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfunk_runtime::FunctionKind;

    fn call(name: &str, args: &[Value]) -> Value {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        match &registry.get(name).unwrap().kind {
            FunctionKind::Native(f) => f(args).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_sha256() {
        assert_eq!(
            call("sha256", &["hello".into()]),
            Value::from("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }

    #[test]
    fn test_uuid_shape() {
        let id = call("uuid", &[]);
        let id = id.as_str().unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn test_timestamp_is_utc() {
        let ts = call("timestamp", &[]);
        assert!(ts.as_str().unwrap().ends_with('Z'));
    }
}
