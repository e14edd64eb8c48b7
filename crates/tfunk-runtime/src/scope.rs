//! Lexical scopes for iterator variables

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;

/// Reference to a scope (shared, immutable)
pub type ScopeRef = Arc<Scope>;

/// Bindings introduced by `for` expressions and template `for` directives.
/// Names not bound here fall through to the evaluation context.
#[derive(Debug, Default)]
pub struct Scope {
    locals: HashMap<String, Value>,
    parent: Option<ScopeRef>,
}

impl Scope {
    /// Create a new root scope
    pub fn new() -> ScopeRef {
        Arc::new(Self::default())
    }

    /// Create a child scope with additional local bindings
    pub fn with_locals(parent: &ScopeRef, bindings: Vec<(String, Value)>) -> ScopeRef {
        Arc::new(Self {
            locals: bindings.into_iter().collect(),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Resolve an identifier in this scope or its parents
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        if let Some(v) = self.locals.get(name) {
            return Some(v);
        }
        self.parent.as_ref().and_then(|p| p.resolve(name))
    }
}
