//! HCL Parser
//!
//! This crate provides a parser for the HCL native syntax: standalone
//! expressions, templates and configuration file bodies. It uses pest for
//! parsing and produces an AST with byte spans, plus the diagnostics type
//! shared with the evaluator.

pub mod ast;
pub mod diagnostic;
pub mod error;
pub mod parser;

pub use ast::*;
pub use diagnostic::{Diagnostic, Diagnostics, Pos, Range, Severity, SourceMap, EXPRESSION_NAME};
pub use error::{ParseError, ParseResult};
pub use parser::{parse_body, parse_expression, parse_expression_named, parse_template};
