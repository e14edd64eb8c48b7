//! JSON encoding of typed values
//!
//! A value is marshalled against a type descriptor. Where the descriptor is
//! `dynamic` the value's own type travels with it as
//! `{"value": ..., "type": ...}`, so [`unmarshal`] can rebuild it exactly.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value as Json;
use thiserror::Error;

use crate::types::Type;
use crate::value::{Attrs, Number, Value};

/// Error produced while encoding or decoding JSON
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("{path}: value of type {actual} does not conform to {expected}")]
    Mismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("{path}: number is not finite")]
    NonFinite { path: String },

    #[error("{path}: {message}")]
    Decode { path: String, message: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn at_root(path: &str) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.to_string()
    }
}

/// Encode `value` as compact JSON, consulting `ty`
pub fn marshal(value: &Value, ty: &Type) -> Result<Vec<u8>, SerializeError> {
    let json = to_json(value, ty)?;
    Ok(serde_json::to_vec(&json)?)
}

/// Re-indent JSON text with two spaces per level
pub fn indent(bytes: &[u8]) -> Result<Vec<u8>, SerializeError> {
    let json: Json = serde_json::from_slice(bytes)?;
    let mut out = Vec::with_capacity(bytes.len() * 2);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"  "));
    json.serialize(&mut ser)?;
    Ok(out)
}

/// Decode JSON produced by [`marshal`] with the same type descriptor
pub fn unmarshal(bytes: &[u8], ty: &Type) -> Result<Value, SerializeError> {
    let json: Json = serde_json::from_slice(bytes)?;
    from_json(&json, ty)
}

/// Convert a value into a `serde_json::Value` conforming to `ty`
pub fn to_json(value: &Value, ty: &Type) -> Result<Json, SerializeError> {
    to_json_at(value, ty, "")
}

fn to_json_at(value: &Value, ty: &Type, path: &str) -> Result<Json, SerializeError> {
    let mismatch = || SerializeError::Mismatch {
        path: at_root(path),
        expected: ty.to_string(),
        actual: value.ty().to_string(),
    };

    match (value, ty) {
        (Value::Null(_), _) => Ok(Json::Null),
        (_, Type::Dynamic) => {
            let actual = value.ty();
            let inner = to_json_at(value, &actual, path)?;
            let mut wrapper = serde_json::Map::new();
            wrapper.insert("value".to_string(), inner);
            wrapper.insert("type".to_string(), serde_json::to_value(&actual)?);
            Ok(Json::Object(wrapper))
        }
        (Value::Bool(b), Type::Bool) => Ok(Json::Bool(*b)),
        (Value::Number(n), Type::Number) => number_json(*n).ok_or_else(|| {
            SerializeError::NonFinite {
                path: at_root(path),
            }
        }),
        (Value::String(s), Type::String) => Ok(Json::String(s.to_string())),
        (Value::List { items, .. }, Type::List(et)) | (Value::Set { items, .. }, Type::Set(et)) => {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| to_json_at(item, et, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array)
        }
        (Value::Tuple(items), Type::Tuple(types)) => {
            if items.len() != types.len() {
                return Err(mismatch());
            }
            items
                .iter()
                .zip(types)
                .enumerate()
                .map(|(i, (item, t))| to_json_at(item, t, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array)
        }
        (Value::Map { entries, .. }, Type::Map(et)) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries.iter() {
                map.insert(k.clone(), to_json_at(v, et, &format!("{}[{:?}]", path, k))?);
            }
            Ok(Json::Object(map))
        }
        (Value::Object(attrs), Type::Object(attr_types)) => {
            if attrs.len() != attr_types.len() {
                return Err(mismatch());
            }
            let mut map = serde_json::Map::new();
            for (k, v) in attrs.iter() {
                let attr_ty = attr_types.get(k).ok_or_else(mismatch)?;
                map.insert(k.clone(), to_json_at(v, attr_ty, &format!("{}.{}", path, k))?);
            }
            Ok(Json::Object(map))
        }
        _ => Err(mismatch()),
    }
}

fn number_json(n: Number) -> Option<Json> {
    match n {
        Number::Int(i) => Some(Json::from(i)),
        Number::Float(f) => serde_json::Number::from_f64(f).map(Json::Number),
    }
}

/// Rebuild a value of type `ty` from JSON
pub fn from_json(json: &Json, ty: &Type) -> Result<Value, SerializeError> {
    from_json_at(json, ty, "")
}

fn from_json_at(json: &Json, ty: &Type, path: &str) -> Result<Value, SerializeError> {
    let decode = |message: String| SerializeError::Decode {
        path: at_root(path),
        message,
    };

    match (json, ty) {
        (Json::Null, t) => Ok(Value::Null(t.clone())),
        (Json::Object(wrapper), Type::Dynamic) => {
            let (Some(inner), Some(type_json)) = (wrapper.get("value"), wrapper.get("type")) else {
                return Err(decode(
                    "dynamic value must have \"value\" and \"type\" properties".to_string(),
                ));
            };
            let actual = Type::from_json(type_json).map_err(decode)?;
            from_json_at(inner, &actual, path)
        }
        (Json::Bool(b), Type::Bool) => Ok(Value::Bool(*b)),
        (Json::Number(n), Type::Number) => json_number(n)
            .map(Value::Number)
            .ok_or_else(|| decode(format!("number {} is out of range", n))),
        (Json::String(s), Type::String) => Ok(Value::string(s.as_str())),
        (Json::Array(items), Type::List(et) | Type::Set(et)) => {
            let items = items
                .iter()
                .enumerate()
                .map(|(i, item)| from_json_at(item, et, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match ty {
                Type::Set(_) => Value::set((**et).clone(), items),
                _ => Value::list((**et).clone(), items),
            })
        }
        (Json::Array(items), Type::Tuple(types)) => {
            if items.len() != types.len() {
                return Err(decode(format!(
                    "tuple of {} elements required, found {}",
                    types.len(),
                    items.len()
                )));
            }
            let items = items
                .iter()
                .zip(types)
                .enumerate()
                .map(|(i, (item, t))| from_json_at(item, t, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::tuple(items))
        }
        (Json::Object(map), Type::Map(et)) => {
            let mut entries = Attrs::new();
            for (k, v) in map {
                entries.insert(k.clone(), from_json_at(v, et, &format!("{}[{:?}]", path, k))?);
            }
            Ok(Value::map((**et).clone(), entries))
        }
        (Json::Object(map), Type::Object(attr_types)) => {
            let mut attrs = Attrs::new();
            for (name, attr_ty) in attr_types.iter() {
                let v = map
                    .get(name)
                    .ok_or_else(|| decode(format!("missing attribute {:?}", name)))?;
                attrs.insert(
                    name.clone(),
                    from_json_at(v, attr_ty, &format!("{}.{}", path, name))?,
                );
            }
            if let Some(extra) = map.keys().find(|k| attr_types.get(k).is_none()) {
                return Err(decode(format!("unsupported attribute {:?}", extra)));
            }
            Ok(Value::object(attrs))
        }
        (other, t) => Err(decode(format!(
            "{} required, found JSON {}",
            t.friendly_name(),
            json_kind(other)
        ))),
    }
}

fn json_number(n: &serde_json::Number) -> Option<Number> {
    match n.as_i64() {
        Some(i) => Some(Number::Int(i)),
        None => n.as_f64().and_then(Number::from_f64),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Build a value from arbitrary JSON, inferring tuple and object types
pub fn infer_from_json(json: &Json) -> Result<Value, SerializeError> {
    Ok(match json {
        Json::Null => Value::null(),
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => json_number(n)
            .map(Value::Number)
            .ok_or_else(|| SerializeError::Decode {
                path: "(root)".to_string(),
                message: format!("number {} is out of range", n),
            })?,
        Json::String(s) => Value::string(s.as_str()),
        Json::Array(items) => Value::tuple(
            items
                .iter()
                .map(infer_from_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Json::Object(map) => {
            let mut attrs = Attrs::new();
            for (k, v) in map {
                attrs.insert(k.clone(), infer_from_json(v)?);
            }
            Value::object(attrs)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(pairs: Vec<(&str, Value)>) -> Value {
        Value::object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_marshal_compact() {
        let v = object(vec![
            ("b", Value::tuple(vec![Value::int(1), Value::from("x")])),
            ("a", Value::Bool(true)),
        ]);
        let bytes = marshal(&v, &v.ty()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"a":true,"b":[1,"x"]}"#);
    }

    #[test]
    fn test_indent_two_spaces() {
        let out = indent(br#"{"a":[1,2],"b":{}}"#).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n  \"a\": [\n    1,\n    2\n  ],\n  \"b\": {}\n}"
        );
    }

    #[test]
    fn test_indent_is_idempotent() {
        let once = indent(br#"{"x":{"y":[true,null,1.5]}}"#).unwrap();
        let twice = indent(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dynamic_positions_carry_type() {
        let v = Value::int(3);
        let bytes = marshal(&v, &Type::Dynamic).unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            r#"{"value":3,"type":"number"}"#
        );
        assert_eq!(unmarshal(&bytes, &Type::Dynamic).unwrap(), v);
    }

    #[test]
    fn test_round_trip_through_type() {
        let v = object(vec![
            (
                "tags",
                Value::map(
                    Type::String,
                    [("env".to_string(), Value::from("dev"))].into_iter().collect(),
                ),
            ),
            (
                "ids",
                Value::set(Type::Number, vec![Value::int(3), Value::int(1)]),
            ),
            ("ratio", Value::float(0.25).unwrap()),
            ("nothing", Value::Null(Type::String)),
        ]);
        let ty = v.ty();
        let bytes = marshal(&v, &ty).unwrap();
        assert_eq!(unmarshal(&bytes, &ty).unwrap(), v);
    }

    #[test]
    fn test_nonconforming_value_is_rejected() {
        let err = marshal(&Value::from("x"), &Type::Number).unwrap_err();
        assert_eq!(
            err.to_string(),
            "(root): value of type string does not conform to number"
        );
    }

    #[test]
    fn test_infer_from_json() {
        let json: Json = serde_json::from_str(r#"{"b":[1,"two"],"a":null}"#).unwrap();
        let v = infer_from_json(&json).unwrap();
        assert_eq!(
            v.ty(),
            Type::object([
                ("a".to_string(), Type::Dynamic),
                (
                    "b".to_string(),
                    Type::Tuple(vec![Type::Number, Type::String])
                ),
            ])
        );
    }
}
