//! Parser error types

use pest::error::{Error as PestError, ErrorVariant, InputLocation};
use thiserror::Error;

use crate::ast::Span;
use crate::diagnostic::{Diagnostic, SourceMap};
use crate::parser::Rule;

/// Result type for parse operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Parse error type
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<PestError<Rule>>),

    #[error("Invalid number literal: {text}")]
    InvalidNumber { text: String, span: Span },

    #[error("Integer literal out of range: {text}")]
    IntegerOutOfRange { text: String, span: Span },

    #[error("Invalid escape sequence: {text}")]
    InvalidEscape { text: String, span: Span },

    #[error("Invalid template directive: {message}")]
    InvalidDirective { message: String, span: Span },

    #[error("Invalid block label: {message}")]
    InvalidLabel { message: String, span: Span },

    #[error("Unexpected newline")]
    UnexpectedNewline { span: Span },

    #[error("Missing newline after argument or block")]
    MissingNewline { span: Span },

    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
}

impl From<PestError<Rule>> for ParseError {
    fn from(err: PestError<Rule>) -> Self {
        ParseError::Syntax(Box::new(err))
    }
}

impl ParseError {
    /// Convert into a diagnostic positioned within `source`
    pub fn to_diagnostic(&self, source: &SourceMap, summary: &str) -> Diagnostic {
        match self {
            ParseError::Syntax(err) => {
                let span = match err.location {
                    InputLocation::Pos(p) => Span::new(p, p),
                    InputLocation::Span((s, e)) => Span::new(s, e),
                };
                Diagnostic::error(summary)
                    .with_detail(syntax_detail(&err.variant))
                    .with_subject(source.range(span))
            }
            ParseError::InvalidNumber { text, span } => Diagnostic::error("Invalid number literal")
                .with_detail(format!("Failed to recognize the value of \"{}\" as a number.", text))
                .with_subject(source.range(*span)),
            ParseError::IntegerOutOfRange { text, span } => {
                Diagnostic::error("Invalid number literal")
                    .with_detail(format!(
                        "The integer {} does not fit in 64 bits; write it as a float to \
                         allow rounding.",
                        text
                    ))
                    .with_subject(source.range(*span))
            }
            ParseError::InvalidEscape { text, span } => {
                Diagnostic::error("Invalid escape sequence")
                    .with_detail(format!("The sequence \"{}\" is not a valid escape.", text))
                    .with_subject(source.range(*span))
            }
            ParseError::InvalidDirective { message, span } => {
                Diagnostic::error("Invalid template directive")
                    .with_detail(message.clone())
                    .with_subject(source.range(*span))
            }
            ParseError::InvalidLabel { message, span } => Diagnostic::error("Invalid block label")
                .with_detail(message.clone())
                .with_subject(source.range(*span)),
            ParseError::UnexpectedNewline { span } => Diagnostic::error(summary)
                .with_detail(
                    "An expression may only continue on the next line inside brackets \
                     or parentheses.",
                )
                .with_subject(source.range(*span)),
            ParseError::MissingNewline { span } => {
                Diagnostic::error("Missing newline after argument or block")
                    .with_detail("Each argument and block definition must end with a newline.")
                    .with_subject(source.range(*span))
            }
            ParseError::UnexpectedToken(token) => {
                Diagnostic::error(summary).with_detail(format!("Unexpected {}.", token))
            }
        }
    }
}

/// Detail line for a syntax error, naming what was expected in words
fn syntax_detail(variant: &ErrorVariant<Rule>) -> String {
    match variant {
        ErrorVariant::ParsingError {
            positives,
            negatives,
        } => {
            let detail = match (describe_rules(positives), describe_rules(negatives)) {
                (Some(expected), Some(found)) => {
                    format!("unexpected {}; expected {}", found, expected)
                }
                (Some(expected), None) => format!("expected {}", expected),
                (None, Some(found)) => format!("unexpected {}", found),
                (None, None) => "unknown parsing error".to_string(),
            };
            format!("{}.", capitalize(&detail))
        }
        ErrorVariant::CustomError { message } => capitalize(message),
    }
}

/// Describe `rules` as an English list, each description once
fn describe_rules(rules: &[Rule]) -> Option<String> {
    let mut names: Vec<&str> = Vec::new();
    for rule in rules {
        let name = describe_rule(rule);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    match names.as_slice() {
        [] => None,
        [one] => Some(one.to_string()),
        [first, second] => Some(format!("{} or {}", first, second)),
        [rest @ .., last] => Some(format!("{}, or {}", rest.join(", "), last)),
    }
}

/// Human-readable names for grammar rules in syntax error messages
pub(crate) fn describe_rule(rule: &Rule) -> &'static str {
    match rule {
        Rule::EOI => "end of input",
        Rule::expression
        | Rule::binary_expr
        | Rule::unary_expr
        | Rule::unary_op
        | Rule::postfix_expr
        | Rule::primary
        | Rule::standalone_expression => "the start of an expression",
        Rule::binary_op => "an operator",
        Rule::conditional_tail => "a conditional",
        Rule::get_attr | Rule::attr_splat | Rule::legacy_index => "an attribute access",
        Rule::index | Rule::full_splat => "an index",
        Rule::function_call => "a function call",
        Rule::call_args => "function arguments",
        Rule::ellipsis => "\"...\"",
        Rule::identifier | Rule::variable => "an identifier",
        Rule::config_file | Rule::body | Rule::attribute | Rule::block => {
            "an attribute or block definition"
        }
        Rule::block_label => "a block label",
        Rule::parenthesized => "a parenthesized expression",
        Rule::tuple | Rule::for_tuple => "a tuple",
        Rule::object | Rule::for_object => "an object",
        Rule::object_elem => "an object attribute",
        Rule::for_intro => "a for expression",
        Rule::for_cond => "a for expression condition",
        Rule::number => "a number",
        Rule::true_lit | Rule::false_lit => "a boolean",
        Rule::null_lit => "null",
        Rule::kw_for => "\"for\"",
        Rule::kw_in => "\"in\"",
        Rule::kw_if => "\"if\"",
        Rule::kw_else => "\"else\"",
        Rule::kw_endif => "\"endif\"",
        Rule::kw_endfor => "\"endfor\"",
        Rule::template | Rule::heredoc => "a string",
        Rule::template_interp => "an interpolation",
        Rule::template_if
        | Rule::template_else
        | Rule::template_endif
        | Rule::template_for
        | Rule::template_endfor => "a template directive",
        Rule::strip_marker => "\"~\"",
        Rule::heredoc_newline => "a newline",
        _ => "template content",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_descriptions_are_deduplicated() {
        let rules = [Rule::get_attr, Rule::index, Rule::attr_splat, Rule::full_splat];
        assert_eq!(
            describe_rules(&rules).as_deref(),
            Some("an attribute access or an index")
        );
        let rules = [Rule::number, Rule::identifier, Rule::template, Rule::heredoc];
        assert_eq!(
            describe_rules(&rules).as_deref(),
            Some("a number, an identifier, or a string")
        );
        assert_eq!(describe_rules(&[]), None);
    }

    #[test]
    fn test_syntax_detail() {
        let variant = ErrorVariant::ParsingError {
            positives: vec![Rule::expression, Rule::primary],
            negatives: vec![],
        };
        assert_eq!(syntax_detail(&variant), "Expected the start of an expression.");
    }
}
