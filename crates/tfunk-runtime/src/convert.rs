//! Value conversion between types and type unification

use std::fmt;

use crate::types::Type;
use crate::value::{Attrs, Number, Value};

/// A value that cannot be converted to the requested type. `path` locates
/// the offending nested element, e.g. `.tags[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for ConvertError {}

impl ConvertError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
        }
    }

    fn required(ty: &Type) -> Self {
        Self::new(format!("{} required", ty.friendly_name()))
    }

    fn in_attr(mut self, name: &str) -> Self {
        self.path = format!(".{}{}", name, self.path);
        self
    }

    fn in_index(mut self, index: usize) -> Self {
        self.path = format!("[{}]{}", index, self.path);
        self
    }
}

/// Parse a number from its string form
pub fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::Int(i));
    }
    // Reject the spellings of non-finite floats Rust would otherwise accept
    if !s.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b)) {
        return None;
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Convert `value` to type `ty`
pub fn convert(value: &Value, ty: &Type) -> Result<Value, ConvertError> {
    match (value, ty) {
        (_, Type::Dynamic) => Ok(value.clone()),
        (Value::Null(_), t) => Ok(Value::Null(t.clone())),

        (Value::Bool(_), Type::Bool)
        | (Value::Number(_), Type::Number)
        | (Value::String(_), Type::String) => Ok(value.clone()),

        (Value::Bool(b), Type::String) => Ok(Value::string(b.to_string())),
        (Value::Number(n), Type::String) => Ok(Value::string(n.to_string())),
        (Value::String(s), Type::Number) => parse_number(s)
            .map(Value::Number)
            .ok_or_else(|| ConvertError::new("a number is required")),
        (Value::String(s), Type::Bool) => match &**s {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ConvertError::new("a bool is required")),
        },

        (Value::List { items, .. } | Value::Set { items, .. } | Value::Tuple(items), Type::List(et)) => {
            let (elem, items) = convert_elements(items, et)?;
            Ok(Value::list(elem, items))
        }
        (Value::List { items, .. } | Value::Set { items, .. } | Value::Tuple(items), Type::Set(et)) => {
            let (elem, items) = convert_elements(items, et)?;
            Ok(Value::set(elem, items))
        }
        (Value::List { items, .. } | Value::Tuple(items), Type::Tuple(types)) => {
            if items.len() != types.len() {
                return Err(ConvertError::new(format!(
                    "tuple required with exactly {} elements",
                    types.len()
                )));
            }
            let items = items
                .iter()
                .zip(types)
                .enumerate()
                .map(|(i, (v, t))| convert(v, t).map_err(|e| e.in_index(i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::tuple(items))
        }

        (Value::Map { entries, .. } | Value::Object(entries), Type::Map(et)) => {
            let values: Vec<Value> = entries.values().cloned().collect();
            let (elem, values) = convert_elements(&values, et).map_err(|mut e| {
                // Re-label index paths with the map key
                if let Some(rest) = e.path.strip_prefix('[') {
                    if let Some((idx, tail)) = rest.split_once(']') {
                        if let Some(key) = idx.parse::<usize>().ok().and_then(|i| entries.get_index(i)) {
                            e.path = format!("[{:?}]{}", key.0, tail);
                        }
                    }
                }
                e
            })?;
            let entries: Attrs = entries.keys().cloned().zip(values).collect();
            Ok(Value::map(elem, entries))
        }
        (Value::Map { entries, .. } | Value::Object(entries), Type::Object(attr_types)) => {
            let mut attrs = Attrs::new();
            for (name, attr_ty) in attr_types.iter() {
                let attr = entries
                    .get(name)
                    .ok_or_else(|| ConvertError::new(format!("attribute {:?} is required", name)))?;
                attrs.insert(
                    name.clone(),
                    convert(attr, attr_ty).map_err(|e| e.in_attr(name))?,
                );
            }
            Ok(Value::object(attrs))
        }

        (_, t) => Err(ConvertError::required(t)),
    }
}

/// Convert every element to `elem`. When `elem` contains `Dynamic`, the
/// concrete element type is found by unifying the converted elements.
fn convert_elements(items: &[Value], elem: &Type) -> Result<(Type, Vec<Value>), ConvertError> {
    let converted = items
        .iter()
        .enumerate()
        .map(|(i, v)| convert(v, elem).map_err(|e| e.in_index(i)))
        .collect::<Result<Vec<_>, _>>()?;

    if !elem.has_dynamic() {
        return Ok((elem.clone(), converted));
    }

    let types: Vec<Type> = converted.iter().map(Value::ty).collect();
    let unified =
        unify(&types).ok_or_else(|| ConvertError::new("all elements must have the same type"))?;
    let converted = converted
        .iter()
        .enumerate()
        .map(|(i, v)| convert(v, &unified).map_err(|e| e.in_index(i)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((unified, converted))
}

/// Find a single type every given type converts to, if there is one.
/// `Dynamic` entries (from untyped nulls) are ignored.
pub fn unify(types: &[Type]) -> Option<Type> {
    let concrete: Vec<&Type> = types.iter().filter(|t| **t != Type::Dynamic).collect();
    let Some(first) = concrete.first() else {
        return Some(Type::Dynamic);
    };
    if concrete.iter().all(|t| t == first) {
        return Some((*first).clone());
    }

    if concrete.iter().all(|t| t.is_primitive()) {
        // Everything primitive converts to string, but bool and number
        // do not convert to each other
        return concrete
            .iter()
            .any(|t| **t == Type::String)
            .then_some(Type::String);
    }

    if concrete.iter().all(|t| matches!(t, Type::Object(_))) {
        let names: Vec<&str> = match first {
            Type::Object(attrs) => attrs.names().collect(),
            _ => return None,
        };
        let same_shape = concrete.iter().all(|t| match t {
            Type::Object(attrs) => attrs.names().eq(names.iter().copied()),
            _ => false,
        });
        if same_shape {
            let mut attrs = Vec::new();
            for name in names {
                let attr_types: Vec<Type> = concrete
                    .iter()
                    .filter_map(|t| match t {
                        Type::Object(a) => a.get(name).cloned(),
                        _ => None,
                    })
                    .collect();
                attrs.push((name.to_string(), unify(&attr_types)?));
            }
            return Some(Type::object(attrs));
        }
    }

    if concrete
        .iter()
        .all(|t| matches!(t, Type::Object(_) | Type::Map(_)))
    {
        let elems: Vec<Type> = concrete
            .iter()
            .flat_map(|t| match t {
                Type::Object(attrs) => attrs.iter().map(|(_, t)| t.clone()).collect::<Vec<_>>(),
                Type::Map(et) => vec![(**et).clone()],
                _ => Vec::new(),
            })
            .collect();
        return unify(&elems).map(Type::map);
    }

    if concrete.iter().all(|t| matches!(t, Type::Tuple(_))) {
        let len = match first {
            Type::Tuple(ts) => ts.len(),
            _ => return None,
        };
        if concrete
            .iter()
            .all(|t| matches!(t, Type::Tuple(ts) if ts.len() == len))
        {
            let mut elems = Vec::with_capacity(len);
            for i in 0..len {
                let column: Vec<Type> = concrete
                    .iter()
                    .filter_map(|t| match t {
                        Type::Tuple(ts) => ts.get(i).cloned(),
                        _ => None,
                    })
                    .collect();
                elems.push(unify(&column)?);
            }
            return Some(Type::Tuple(elems));
        }
    }

    if concrete
        .iter()
        .all(|t| matches!(t, Type::Tuple(_) | Type::List(_)))
    {
        let elems: Vec<Type> = concrete
            .iter()
            .flat_map(|t| match t {
                Type::Tuple(ts) => ts.clone(),
                Type::List(et) => vec![(**et).clone()],
                _ => Vec::new(),
            })
            .collect();
        return unify(&elems).map(Type::list);
    }

    if concrete.iter().all(|t| matches!(t, Type::Set(_))) {
        let elems: Vec<Type> = concrete
            .iter()
            .filter_map(|t| t.element_type().cloned())
            .collect();
        return unify(&elems).map(Type::set);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_conversions() {
        assert_eq!(
            convert(&Value::int(5), &Type::String).unwrap(),
            Value::from("5")
        );
        assert_eq!(
            convert(&Value::from("2.5"), &Type::Number).unwrap(),
            Value::float(2.5).unwrap()
        );
        assert_eq!(
            convert(&Value::from("true"), &Type::Bool).unwrap(),
            Value::Bool(true)
        );
        let err = convert(&Value::from("nope"), &Type::Number).unwrap_err();
        assert_eq!(err.to_string(), "a number is required");
        assert!(parse_number("inf").is_none());
    }

    #[test]
    fn test_tuple_to_list_unifies() {
        let tuple = Value::tuple(vec![Value::int(1), Value::from("a")]);
        let list = convert(&tuple, &Type::list(Type::Dynamic)).unwrap();
        assert_eq!(list.ty(), Type::list(Type::String));
    }

    #[test]
    fn test_list_of_mixed_fails() {
        let tuple = Value::tuple(vec![Value::int(1), Value::Bool(true)]);
        let err = convert(&tuple, &Type::list(Type::Dynamic)).unwrap_err();
        assert_eq!(err.to_string(), "all elements must have the same type");
    }

    #[test]
    fn test_object_conversion_reports_path() {
        let mut attrs = Attrs::new();
        attrs.insert("a".to_string(), Value::tuple(vec![Value::Bool(true)]));
        let obj = Value::object(attrs);
        let ty = Type::object([("a".to_string(), Type::list(Type::Number))]);
        let err = convert(&obj, &ty).unwrap_err();
        assert_eq!(err.to_string(), ".a[0]: number required");
    }

    #[test]
    fn test_null_takes_target_type() {
        let v = convert(&Value::null(), &Type::String).unwrap();
        assert_eq!(v.ty(), Type::String);
        assert!(v.is_null());
    }

    #[test]
    fn test_unify_objects_to_map() {
        let a = Type::object([("x".to_string(), Type::String)]);
        let b = Type::object([("y".to_string(), Type::Number)]);
        assert_eq!(unify(&[a, b]), Some(Type::map(Type::String)));
    }
}
