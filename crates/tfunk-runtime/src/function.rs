//! Function signatures and the function registry

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::types::Type;
use crate::value::Value;

/// Native function implementation. Arguments arrive already converted to
/// the declared parameter types.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync>;

/// Error raised by a native function
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    /// The call failed as a whole
    #[error("{0}")]
    Failed(String),

    /// One argument was unacceptable
    #[error("{message}")]
    Argument { index: usize, message: String },
}

impl FunctionError {
    pub fn failed(message: impl Into<String>) -> Self {
        FunctionError::Failed(message.into())
    }

    pub fn arg(index: usize, message: impl Into<String>) -> Self {
        FunctionError::Argument {
            index,
            message: message.into(),
        }
    }
}

/// A declared function parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub allow_null: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            allow_null: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.allow_null = true;
        self
    }
}

/// How a function is invoked
#[derive(Clone)]
pub enum FunctionKind {
    Native(NativeFn),
    /// `try(...)`: arguments are evaluated lazily, the first that succeeds wins
    Try,
    /// `can(expr)`: true when the argument evaluates without error
    Can,
}

/// A callable function with its signature
#[derive(Clone)]
pub struct Function {
    pub params: Vec<Param>,
    pub variadic: Option<Param>,
    pub kind: FunctionKind,
}

impl Function {
    /// Create a native function with fixed parameters
    pub fn native<F>(params: Vec<Param>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        Self {
            params,
            variadic: None,
            kind: FunctionKind::Native(Arc::new(f)),
        }
    }

    /// Accept any number of extra arguments matching `param`
    pub fn with_variadic(mut self, param: Param) -> Self {
        self.variadic = Some(param);
        self
    }

    pub fn try_fn() -> Self {
        Self {
            params: Vec::new(),
            variadic: Some(Param::new("expressions", Type::Dynamic).nullable()),
            kind: FunctionKind::Try,
        }
    }

    pub fn can_fn() -> Self {
        Self {
            params: vec![Param::new("expression", Type::Dynamic).nullable()],
            variadic: None,
            kind: FunctionKind::Can,
        }
    }

    /// Parameter specification for the argument at `index`
    pub fn param_for(&self, index: usize) -> Option<&Param> {
        self.params.get(index).or(self.variadic.as_ref())
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FunctionKind::Native(_) => "native",
            FunctionKind::Try => "try",
            FunctionKind::Can => "can",
        };
        f.debug_struct("Function")
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .field("kind", &kind)
            .finish()
    }
}

/// Function registry, keyed by function name
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Function>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, function: Function) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
