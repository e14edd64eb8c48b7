//! HCL Runtime
//!
//! This crate provides the value model, type conversion and evaluation
//! engine for HCL expressions, plus the JSON encoding of evaluated values.

pub mod context;
pub mod convert;
pub mod error;
pub mod evaluator;
pub mod function;
pub mod json;
pub mod scope;
pub mod types;
pub mod value;

pub use context::{Context, EvalContext};
pub use convert::{convert, unify, ConvertError};
pub use error::{EvalError, EvalResult};
pub use evaluator::{evaluate, Evaluator};
pub use function::{Function, FunctionError, FunctionKind, FunctionRegistry, NativeFn, Param};
pub use json::{indent, marshal, unmarshal, SerializeError};
pub use scope::{Scope, ScopeRef};
pub use types::{ObjectType, Type};
pub use value::{ArithmeticError, Attrs, Number, Value};
