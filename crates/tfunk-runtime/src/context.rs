//! Evaluation contexts: where expressions look up variables and functions

use indexmap::IndexMap;

use crate::function::{Function, FunctionRegistry};
use crate::value::Value;

/// The two capabilities an expression needs from its surroundings
pub trait EvalContext {
    /// Resolve a root variable such as `local` or `var`
    fn variable(&self, name: &str) -> Option<&Value>;

    /// Resolve a function by name
    fn function(&self, name: &str) -> Option<&Function>;
}

/// A concrete context holding variables and a function registry
#[derive(Debug, Clone, Default)]
pub struct Context {
    variables: IndexMap<String, Value>,
    functions: FunctionRegistry,
}

impl Context {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self {
            variables: IndexMap::new(),
            functions,
        }
    }

    /// A context with no variables and no functions
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }
}

impl EvalContext for Context {
    fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }
}
