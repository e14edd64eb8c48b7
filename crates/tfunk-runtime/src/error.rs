//! Runtime error types

use thiserror::Error;
use tfunk_parser::{Diagnostic, Diagnostics, SourceMap, Span};

use crate::convert::ConvertError;
use crate::value::ArithmeticError;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Evaluation error
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("Unknown variable: {0}")]
    UndefinedVariable(String),

    #[error("Unsupported attribute: {0}")]
    UnsupportedAttribute(String),

    #[error("Missing map element: {0}")]
    MissingMapElement(String),

    #[error("Attempt to get attribute from null value")]
    NullAttribute,

    #[error("Attempt to index null value")]
    NullIndex,

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Invalid operand: {0}")]
    InvalidOperand(String),

    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    #[error("Call to unknown function: {0}")]
    UnknownFunction(String),

    #[error("Wrong number of arguments to {function}: {detail}")]
    WrongArgCount {
        function: String,
        too_many: bool,
        detail: String,
    },

    #[error("Invalid value for {param:?} parameter of {function}: {message}")]
    InvalidArgument {
        function: String,
        param: String,
        message: String,
    },

    #[error("Call to function {function:?} failed: {message}")]
    FunctionFailed { function: String, message: String },

    #[error("Invalid expanding argument value: {0}")]
    InvalidExpansion(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("Circular reference detected: {0}")]
    CircularReference(String),

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Inconsistent conditional result types: {0}")]
    InconsistentTypes(String),

    #[error("Incorrect condition type: {0}")]
    InvalidCondition(String),

    #[error("Invalid template interpolation value: {0}")]
    InvalidTemplateValue(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Duplicate object key: {0}")]
    DuplicateKey(String),

    #[error("Iteration over non-iterable value: {0}")]
    NotIterable(String),

    #[error("Invalid conversion: {0}")]
    Conversion(#[from] ConvertError),

    /// An error tied to the source range of the expression that raised it
    #[error("{source}")]
    Located {
        span: Span,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        EvalError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(name: impl Into<String>) -> Self {
        EvalError::UndefinedVariable(name.into())
    }

    /// Attach a source span unless one is already attached
    pub fn at(self, span: Span) -> Self {
        match self {
            EvalError::Located { .. } => self,
            other => EvalError::Located {
                span,
                source: Box::new(other),
            },
        }
    }

    /// Strip the location wrapper, returning the span if present
    pub fn split_location(&self) -> (Option<Span>, &EvalError) {
        match self {
            EvalError::Located { span, source } => {
                let (inner_span, inner) = source.split_location();
                (inner_span.or(Some(*span)), inner)
            }
            other => (None, other),
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            EvalError::UndefinedVariable(_) => "Unknown variable",
            EvalError::UnsupportedAttribute(_) => "Unsupported attribute",
            EvalError::MissingMapElement(_) => "Missing map element",
            EvalError::NullAttribute => "Attempt to get attribute from null value",
            EvalError::NullIndex => "Attempt to index null value",
            EvalError::InvalidIndex(_) => "Invalid index",
            EvalError::InvalidOperand(_) => "Invalid operand",
            EvalError::TypeError { .. } => "Incorrect value type",
            EvalError::UnknownFunction(_) => "Call to unknown function",
            EvalError::WrongArgCount { too_many: true, .. } => "Too many function arguments",
            EvalError::WrongArgCount { .. } => "Not enough function arguments",
            EvalError::InvalidArgument { .. } => "Invalid function argument",
            EvalError::FunctionFailed { .. } => "Error in function call",
            EvalError::InvalidExpansion(_) => "Invalid expanding argument value",
            EvalError::Arithmetic(_) => "Operation failed",
            EvalError::CircularReference(_) => "Circular reference",
            EvalError::StackOverflow => "Expression too complex",
            EvalError::InvalidCondition(_) => "Incorrect condition type",
            EvalError::InconsistentTypes(_) => "Inconsistent conditional result types",
            EvalError::InvalidTemplateValue(_) => "Invalid template interpolation value",
            EvalError::InvalidKey(_) => "Incorrect key type",
            EvalError::DuplicateKey(_) => "Duplicate object key",
            EvalError::NotIterable(_) => "Iteration over non-iterable value",
            EvalError::Conversion(_) => "Unsuitable value type",
            EvalError::Located { source, .. } => source.summary(),
        }
    }

    fn detail(&self) -> String {
        match self {
            EvalError::UndefinedVariable(name) => {
                format!("There is no variable named {:?}.", name)
            }
            EvalError::UnsupportedAttribute(name) => {
                format!("This object does not have an attribute named {:?}.", name)
            }
            EvalError::MissingMapElement(key) => {
                format!("This map does not have an element with the key {:?}.", key)
            }
            EvalError::NullAttribute => {
                "This value is null, so it does not have any attributes.".to_string()
            }
            EvalError::NullIndex => "This value is null, so it does not have any indices.".to_string(),
            EvalError::InvalidIndex(msg)
            | EvalError::InvalidOperand(msg)
            | EvalError::InvalidCondition(msg)
            | EvalError::InconsistentTypes(msg)
            | EvalError::InvalidTemplateValue(msg)
            | EvalError::InvalidKey(msg)
            | EvalError::NotIterable(msg)
            | EvalError::InvalidExpansion(msg) => msg.clone(),
            EvalError::TypeError { expected, actual } => {
                format!("A value of type {} is required, but got {}.", expected, actual)
            }
            EvalError::UnknownFunction(name) => {
                format!("There is no function named {:?}.", name)
            }
            EvalError::WrongArgCount { detail, .. } => detail.clone(),
            EvalError::InvalidArgument { param, message, .. } => {
                format!("Invalid value for {:?} parameter: {}.", param, sentence(message))
            }
            EvalError::FunctionFailed { function, message } => {
                format!("Call to function {:?} failed: {}.", function, sentence(message))
            }
            EvalError::Arithmetic(err) => format!("Error during operation: {}.", err),
            EvalError::CircularReference(what) => {
                format!("The value of {} depends on itself.", what)
            }
            EvalError::StackOverflow => {
                "The expression is nested too deeply to evaluate.".to_string()
            }
            EvalError::DuplicateKey(key) => format!(
                "Two different items produced the key {:?} in this 'for' expression. \
                 If duplicates are expected, use the ellipsis (...) after the value \
                 expression to enable grouping by key.",
                key
            ),
            EvalError::Conversion(err) => format!("{}.", err),
            EvalError::Located { source, .. } => source.detail(),
        }
    }

    /// Convert into a diagnostic, resolving spans against `source`
    pub fn to_diagnostic(&self, source: &SourceMap) -> Diagnostic {
        let (span, inner) = self.split_location();
        let mut diag = Diagnostic::error(inner.summary()).with_detail(inner.detail());
        if let Some(span) = span {
            diag = diag.with_subject(source.range(span));
        }
        diag
    }

    pub fn into_diagnostics(self, source: &SourceMap) -> Diagnostics {
        self.to_diagnostic(source).into()
    }
}

/// A message about to be closed with a period, minus the one it may already end with
fn sentence(message: &str) -> &str {
    message.trim_end().trim_end_matches('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_span_wins() {
        let err = EvalError::undefined_var("foo")
            .at(Span::new(4, 7))
            .at(Span::new(0, 10));
        let map = SourceMap::new("<expression>", "1 + foo + 1");
        let diag = err.to_diagnostic(&map);
        assert_eq!(
            diag.to_string(),
            "<expression>:1,5-8: Unknown variable; There is no variable named \"foo\"."
        );
    }

    #[test]
    fn test_nested_failure_has_single_period() {
        let inner = EvalError::FunctionFailed {
            function: "upper".to_string(),
            message: "boom".to_string(),
        };
        let outer = EvalError::FunctionFailed {
            function: "try".to_string(),
            message: inner.detail(),
        };
        assert_eq!(
            outer.detail(),
            "Call to function \"try\" failed: Call to function \"upper\" failed: boom."
        );
        let err = EvalError::InvalidArgument {
            function: "element".to_string(),
            param: "index".to_string(),
            message: "must not be negative.".to_string(),
        };
        assert_eq!(err.detail(), "Invalid value for \"index\" parameter: must not be negative.");
    }

    #[test]
    fn test_argument_count_summary() {
        let err = EvalError::WrongArgCount {
            function: "upper".to_string(),
            too_many: true,
            detail: "Function \"upper\" expects only 1 argument(s).".to_string(),
        };
        assert_eq!(err.summary(), "Too many function arguments");
    }
}
