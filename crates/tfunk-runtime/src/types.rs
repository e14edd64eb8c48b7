//! Type descriptors for runtime values

use std::fmt;

use indexmap::IndexMap;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

/// The exact shape of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Placeholder for "any type", decided at runtime
    Dynamic,
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Tuple(Vec<Type>),
    /// Attribute types, kept in lexical order of attribute name
    Object(ObjectType),
}

/// Attribute name to type, sorted by name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectType(IndexMap<String, Type>);

impl ObjectType {
    pub fn new(attrs: impl IntoIterator<Item = (String, Type)>) -> Self {
        let mut map: IndexMap<String, Type> = attrs.into_iter().collect();
        map.sort_keys();
        ObjectType(map)
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.0.get(name)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Type> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl std::hash::Hash for ObjectType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for (k, v) in &self.0 {
            k.hash(state);
            v.hash(state);
        }
    }
}

impl Type {
    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    pub fn set(elem: Type) -> Self {
        Type::Set(Box::new(elem))
    }

    pub fn map(elem: Type) -> Self {
        Type::Map(Box::new(elem))
    }

    pub fn object(attrs: impl IntoIterator<Item = (String, Type)>) -> Self {
        Type::Object(ObjectType::new(attrs))
    }

    pub fn empty_object() -> Self {
        Type::Object(ObjectType::default())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    /// Element type of list, set and map types
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(t) | Type::Set(t) | Type::Map(t) => Some(t),
            _ => None,
        }
    }

    /// True if this type or any nested type is `Dynamic`
    pub fn has_dynamic(&self) -> bool {
        match self {
            Type::Dynamic => true,
            Type::Bool | Type::Number | Type::String => false,
            Type::List(t) | Type::Set(t) | Type::Map(t) => t.has_dynamic(),
            Type::Tuple(ts) => ts.iter().any(Type::has_dynamic),
            Type::Object(attrs) => attrs.iter().any(|(_, t)| t.has_dynamic()),
        }
    }

    /// Human-readable type name used in error messages
    pub fn friendly_name(&self) -> String {
        match self {
            Type::Dynamic => "dynamic".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Number => "number".to_string(),
            Type::String => "string".to_string(),
            Type::List(t) => format!("list of {}", t.friendly_name()),
            Type::Set(t) => format!("set of {}", t.friendly_name()),
            Type::Map(t) => format!("map of {}", t.friendly_name()),
            Type::Tuple(_) => "tuple".to_string(),
            Type::Object(_) => "object".to_string(),
        }
    }

    /// Parse the JSON form produced by the `Serialize` impl
    pub fn from_json(json: &serde_json::Value) -> Result<Type, String> {
        use serde_json::Value as J;

        match json {
            J::String(s) => match s.as_str() {
                "bool" => Ok(Type::Bool),
                "number" => Ok(Type::Number),
                "string" => Ok(Type::String),
                "dynamic" => Ok(Type::Dynamic),
                other => Err(format!("invalid primitive type name {:?}", other)),
            },
            J::Array(parts) => {
                let (kind, arg) = match parts.as_slice() {
                    [J::String(kind), arg] => (kind.as_str(), arg),
                    _ => return Err("complex type must be a two-element array".to_string()),
                };
                match kind {
                    "list" => Ok(Type::list(Type::from_json(arg)?)),
                    "set" => Ok(Type::set(Type::from_json(arg)?)),
                    "map" => Ok(Type::map(Type::from_json(arg)?)),
                    "tuple" => match arg {
                        J::Array(elems) => Ok(Type::Tuple(
                            elems.iter().map(Type::from_json).collect::<Result<_, _>>()?,
                        )),
                        _ => Err("tuple element types must be an array".to_string()),
                    },
                    "object" => match arg {
                        J::Object(attrs) => {
                            let attrs = attrs
                                .iter()
                                .map(|(k, v)| Ok((k.clone(), Type::from_json(v)?)))
                                .collect::<Result<Vec<_>, String>>()?;
                            Ok(Type::object(attrs))
                        }
                        _ => Err("object attribute types must be an object".to_string()),
                    },
                    other => Err(format!("invalid complex type kind {:?}", other)),
                }
            }
            _ => Err("type must be a string or an array".to_string()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dynamic => f.write_str("any"),
            Type::Bool => f.write_str("bool"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::List(t) => write!(f, "list({})", t),
            Type::Set(t) => write!(f, "set({})", t),
            Type::Map(t) => write!(f, "map({})", t),
            Type::Tuple(ts) => {
                f.write_str("tuple([")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str("])")
            }
            Type::Object(attrs) => {
                f.write_str("object({")?;
                for (i, (name, t)) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", name, t)?;
                }
                f.write_str("})")
            }
        }
    }
}

/// Types serialize as `"string"`, `["list","number"]`,
/// `["object",{"a":"string"}]` and so on
impl Serialize for Type {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Type::Dynamic => serializer.serialize_str("dynamic"),
            Type::Bool => serializer.serialize_str("bool"),
            Type::Number => serializer.serialize_str("number"),
            Type::String => serializer.serialize_str("string"),
            Type::List(t) => serialize_pair(serializer, "list", t.as_ref()),
            Type::Set(t) => serialize_pair(serializer, "set", t.as_ref()),
            Type::Map(t) => serialize_pair(serializer, "map", t.as_ref()),
            Type::Tuple(ts) => serialize_pair(serializer, "tuple", ts),
            Type::Object(attrs) => serialize_pair(serializer, "object", &attrs.0),
        }
    }
}

fn serialize_pair<S, T>(serializer: S, kind: &str, arg: &T) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut seq = serializer.serialize_seq(Some(2))?;
    seq.serialize_element(kind)?;
    seq.serialize_element(arg)?;
    seq.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_json_form() {
        let ty = Type::object([
            ("b".to_string(), Type::list(Type::Number)),
            ("a".to_string(), Type::String),
        ]);
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(json, r#"["object",{"a":"string","b":["list","number"]}]"#);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(Type::from_json(&parsed).unwrap(), ty);
    }

    #[test]
    fn test_friendly_name() {
        assert_eq!(Type::map(Type::String).friendly_name(), "map of string");
        assert_eq!(Type::Tuple(vec![]).friendly_name(), "tuple");
    }

    #[test]
    fn test_invalid_type_json() {
        let json = serde_json::json!(["list"]);
        assert!(Type::from_json(&json).is_err());
    }
}
