//! Runtime value types

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::types::Type;

/// Attribute or key/value storage for objects and maps, sorted by key
pub type Attrs = IndexMap<String, Value>;

/// A number: an exact 64-bit integer or a finite 64-bit float
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Build from a float. Integral floats that fit an `i64` become `Int`;
    /// non-finite values are rejected.
    pub fn from_f64(f: f64) -> Option<Number> {
        if !f.is_finite() {
            return None;
        }
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Some(Number::Int(f as i64))
        } else {
            Some(Number::Float(f))
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// The value as an integer, if it has no fractional part
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(i),
            Number::Float(_) => None,
        }
    }

    pub fn add(self, other: Number) -> Result<Number, ArithmeticError> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                a.checked_add(b).map(Number::Int).ok_or(ArithmeticError::Overflow)
            }
            (a, b) => finite(a.as_f64() + b.as_f64()),
        }
    }

    pub fn sub(self, other: Number) -> Result<Number, ArithmeticError> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                a.checked_sub(b).map(Number::Int).ok_or(ArithmeticError::Overflow)
            }
            (a, b) => finite(a.as_f64() - b.as_f64()),
        }
    }

    pub fn mul(self, other: Number) -> Result<Number, ArithmeticError> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                a.checked_mul(b).map(Number::Int).ok_or(ArithmeticError::Overflow)
            }
            (a, b) => finite(a.as_f64() * b.as_f64()),
        }
    }

    /// Division always produces the exact quotient, normalized
    pub fn div(self, other: Number) -> Result<Number, ArithmeticError> {
        if other.as_f64() == 0.0 {
            return Err(ArithmeticError::DivideByZero);
        }
        match (self, other) {
            (Number::Int(a), Number::Int(b)) if a.checked_rem(b) == Some(0) => {
                a.checked_div(b).map(Number::Int).ok_or(ArithmeticError::Overflow)
            }
            (a, b) => finite(a.as_f64() / b.as_f64()),
        }
    }

    /// Remainder with the sign of the dividend
    pub fn rem(self, other: Number) -> Result<Number, ArithmeticError> {
        if other.as_f64() == 0.0 {
            return Err(ArithmeticError::DivideByZero);
        }
        match (self, other) {
            // i64::MIN % -1 overflows, but the remainder is zero
            (Number::Int(a), Number::Int(b)) => Ok(Number::Int(a.checked_rem(b).unwrap_or(0))),
            (a, b) => finite(a.as_f64() % b.as_f64()),
        }
    }

    pub fn neg(self) -> Result<Number, ArithmeticError> {
        match self {
            Number::Int(i) => i.checked_neg().map(Number::Int).ok_or(ArithmeticError::Overflow),
            Number::Float(f) => finite(-f),
        }
    }
}

fn finite(f: f64) -> Result<Number, ArithmeticError> {
    Number::from_f64(f).ok_or(ArithmeticError::NonFinite)
}

/// Failure of an arithmetic operation on [`Number`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("divide by zero")]
    DivideByZero,
    #[error("integer result is out of range")]
    Overflow,
    #[error("result is not a finite number")]
    NonFinite,
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number::Int(i)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Normalization keeps equal numbers in the same representation
        match self {
            Number::Int(i) => i.hash(state),
            Number::Float(f) => f.to_bits().hash(state),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(n) => write!(f, "{}", n),
        }
    }
}

/// The core runtime value type
#[derive(Debug, Clone)]
pub enum Value {
    /// Null of a particular type
    Null(Type),

    Bool(bool),

    Number(Number),

    /// String (shared, immutable)
    String(Arc<str>),

    /// Homogeneous ordered sequence
    List { elem: Type, items: Arc<Vec<Value>> },

    /// Homogeneous unique elements, kept in canonical sorted order
    Set { elem: Type, items: Arc<Vec<Value>> },

    /// Homogeneous string-keyed mapping, sorted by key
    Map { elem: Type, entries: Arc<Attrs> },

    /// Fixed-length heterogeneous sequence, the type of `[...]` literals
    Tuple(Arc<Vec<Value>>),

    /// Fixed-shape record, the type of `{...}` literals, sorted by name
    Object(Arc<Attrs>),
}

impl Value {
    pub fn null() -> Self {
        Value::Null(Type::Dynamic)
    }

    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn int(i: i64) -> Self {
        Value::Number(Number::Int(i))
    }

    /// Create a number from a float, `None` if it is not finite
    pub fn float(f: f64) -> Option<Self> {
        Number::from_f64(f).map(Value::Number)
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::new(items))
    }

    pub fn empty_tuple() -> Self {
        Value::tuple(Vec::new())
    }

    /// Create a list. Elements must already conform to `elem`.
    pub fn list(elem: Type, items: Vec<Value>) -> Self {
        Value::List {
            elem,
            items: Arc::new(items),
        }
    }

    /// Create a set, sorting and deduplicating the elements
    pub fn set(elem: Type, mut items: Vec<Value>) -> Self {
        items.sort();
        items.dedup();
        Value::Set {
            elem,
            items: Arc::new(items),
        }
    }

    /// Create a map, sorting entries by key
    pub fn map(elem: Type, mut entries: Attrs) -> Self {
        entries.sort_keys();
        Value::Map {
            elem,
            entries: Arc::new(entries),
        }
    }

    /// Create an object, sorting attributes by name
    pub fn object(mut attrs: Attrs) -> Self {
        attrs.sort_keys();
        Value::Object(Arc::new(attrs))
    }

    pub fn empty_object() -> Self {
        Value::Object(Arc::new(Attrs::new()))
    }

    /// Exact type descriptor of this value
    pub fn ty(&self) -> Type {
        match self {
            Value::Null(t) => t.clone(),
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List { elem, .. } => Type::list(elem.clone()),
            Value::Set { elem, .. } => Type::set(elem.clone()),
            Value::Map { elem, .. } => Type::map(elem.clone()),
            Value::Tuple(items) => Type::Tuple(items.iter().map(Value::ty).collect()),
            Value::Object(attrs) => {
                Type::object(attrs.iter().map(|(k, v)| (k.clone(), v.ty())))
            }
        }
    }

    /// Short kind name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null(_) => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List { .. } => "list",
            Value::Set { .. } => "set",
            Value::Map { .. } => "map",
            Value::Tuple(_) => "tuple",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list, set or tuple
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List { items, .. } | Value::Set { items, .. } | Value::Tuple(items) => {
                Some(items)
            }
            _ => None,
        }
    }

    /// Entries of a map or object
    pub fn as_attrs(&self) -> Option<&Attrs> {
        match self {
            Value::Map { entries, .. } => Some(entries),
            Value::Object(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// Number of elements, entries or characters
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            _ => self
                .as_sequence()
                .map(<[Value]>::len)
                .or_else(|| self.as_attrs().map(Attrs::len)),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null(_) => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::List { .. } => 4,
            Value::Set { .. } => 5,
            Value::Map { .. } => 6,
            Value::Tuple(_) => 7,
            Value::Object(_) => 8,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::int(i)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List { items, .. } | Value::Set { items, .. } | Value::Tuple(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map { entries, .. } | Value::Object(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?} = {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Structural equality. Nulls are equal to each other whatever their type.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null(_), Value::Null(_)) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List { items: a, .. }, Value::List { items: b, .. })
            | (Value::Set { items: a, .. }, Value::Set { items: b, .. })
            | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map { entries: a, .. }, Value::Map { entries: b, .. })
            | (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_rank().hash(state);
        match self {
            Value::Null(_) => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => n.hash(state),
            Value::String(s) => s.hash(state),
            Value::List { items, .. } | Value::Set { items, .. } | Value::Tuple(items) => {
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Value::Map { entries, .. } | Value::Object(entries) => {
                for (k, v) in entries.iter() {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonical total order, used for set element ordering
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List { items: a, .. }, Value::List { items: b, .. })
            | (Value::Set { items: a, .. }, Value::Set { items: b, .. })
            | (Value::Tuple(a), Value::Tuple(b)) => a.iter().cmp(b.iter()),
            (Value::Map { entries: a, .. }, Value::Map { entries: b, .. })
            | (Value::Object(a), Value::Object(b)) => a.iter().cmp(b.iter()),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}
