//! Parser implementation: converts pest output to AST

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::diagnostic::{Diagnostics, SourceMap, EXPRESSION_NAME};
use crate::error::{describe_rule, ParseError, ParseResult};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct HclParser;

/// Parse a standalone expression given on the command line
pub fn parse_expression(source: &str) -> Result<Expr, Diagnostics> {
    parse_expression_named(source, EXPRESSION_NAME)
}

/// Parse a standalone expression, attributing diagnostics to `filename`
pub fn parse_expression_named(source: &str, filename: &str) -> Result<Expr, Diagnostics> {
    try_parse_expression(source).map_err(|err| {
        let map = SourceMap::new(filename, source);
        err.to_diagnostic(&map, "Invalid expression").into()
    })
}

/// Parse a configuration file body
pub fn parse_body(source: &str, filename: &str) -> Result<Body, Diagnostics> {
    try_parse_body(source).map_err(|err| {
        let map = SourceMap::new(filename, source);
        err.to_diagnostic(&map, "Invalid configuration syntax").into()
    })
}

/// Parse bare template text, as read by `templatefile`
pub fn parse_template(source: &str, filename: &str) -> Result<Template, Diagnostics> {
    try_parse_template(source).map_err(|err| {
        let map = SourceMap::new(filename, source);
        err.to_diagnostic(&map, "Invalid template").into()
    })
}

fn try_parse_expression(source: &str) -> ParseResult<Expr> {
    let mut pairs = HclParser::parse(Rule::standalone_expression, source)?;
    let pair = next_pair(&mut pairs, "input")?;
    // standalone_expression is SOI ~ expression ~ EOI
    let inner = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::expression)
        .ok_or_else(|| ParseError::UnexpectedToken("end of input".to_string()))?;
    build_expression(inner)
}

fn try_parse_body(source: &str) -> ParseResult<Body> {
    let mut pairs = HclParser::parse(Rule::config_file, source)?;
    let pair = next_pair(&mut pairs, "input")?;
    let inner = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::body)
        .ok_or_else(|| ParseError::UnexpectedToken("end of input".to_string()))?;
    build_body(inner)
}

fn try_parse_template(source: &str) -> ParseResult<Template> {
    let mut pairs = HclParser::parse(Rule::template_file, source)?;
    let pair = next_pair(&mut pairs, "input")?;
    let span = span_from_pair(&pair);
    let mut tokens = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::template_file_chars => push_literal(&mut tokens, inner.as_str()),
            Rule::EOI => {}
            _ => tokens.push(build_template_token(inner)?),
        }
    }
    finish_template(tokens, span)
}

// =============================================================================
// Helper functions
// =============================================================================

fn span_from_pair(pair: &Pair<Rule>) -> Span {
    let pest_span = pair.as_span();
    Span::new(pest_span.start(), pest_span.end())
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, context: &str) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::UnexpectedToken(format!("end of {}", context)))
}

fn build_identifier(pair: Pair<Rule>) -> Identifier {
    debug_assert_eq!(pair.as_rule(), Rule::identifier);
    Spanned::new(pair.as_str().to_string(), span_from_pair(&pair))
}

fn unexpected(pair: &Pair<Rule>) -> ParseError {
    let rule = describe_rule(&pair.as_rule());
    ParseError::UnexpectedToken(format!("{} \"{}\"", rule, pair.as_str()))
}

/// Byte offset of the first newline between `start` and `end`, if any.
/// `pair` must cover both offsets.
fn newline_between(pair: &Pair<Rule>, start: usize, end: usize) -> Option<usize> {
    let base = pair.as_span().start();
    pair.as_str()
        .get(start - base..end - base)
        .and_then(|gap| gap.find('\n'))
        .map(|at| start + at)
}

/// Outside brackets an attribute's expression may not span lines
fn check_single_line(pair: &Pair<Rule>) -> ParseResult<()> {
    if matches!(
        pair.as_rule(),
        Rule::tuple
            | Rule::object
            | Rule::parenthesized
            | Rule::function_call
            | Rule::index
            | Rule::for_tuple
            | Rule::for_object
            | Rule::template
            | Rule::heredoc
    ) {
        return Ok(());
    }
    let mut prev_end: Option<usize> = None;
    for child in pair.clone().into_inner() {
        let start = child.as_span().start();
        if let Some(at) = prev_end.and_then(|end| newline_between(pair, end, start)) {
            return Err(ParseError::UnexpectedNewline {
                span: Span::new(at, at + 1),
            });
        }
        check_single_line(&child)?;
        prev_end = Some(child.as_span().end());
    }
    Ok(())
}

// =============================================================================
// Bodies
// =============================================================================

fn build_body(pair: Pair<Rule>) -> ParseResult<Body> {
    debug_assert_eq!(pair.as_rule(), Rule::body);
    let span = span_from_pair(&pair);

    let mut items = Vec::new();
    let mut prev_end: Option<usize> = None;
    for inner in pair.clone().into_inner() {
        let start = inner.as_span().start();
        if let Some(end) = prev_end {
            if newline_between(&pair, end, start).is_none() {
                return Err(ParseError::MissingNewline {
                    span: Span::new(end, start),
                });
            }
        }
        prev_end = Some(inner.as_span().end());
        match inner.as_rule() {
            Rule::attribute => items.push(BodyItem::Attribute(build_attribute(inner)?)),
            Rule::block => items.push(BodyItem::Block(build_block(inner)?)),
            _ => return Err(unexpected(&inner)),
        }
    }

    Ok(Body { items, span })
}

fn build_attribute(pair: Pair<Rule>) -> ParseResult<Attribute> {
    debug_assert_eq!(pair.as_rule(), Rule::attribute);
    let span = span_from_pair(&pair);
    check_single_line(&pair)?;
    let mut inner = pair.into_inner();

    let name = build_identifier(next_pair(&mut inner, "attribute")?);
    let value = build_expression(next_pair(&mut inner, "attribute")?)?;

    Ok(Attribute { name, value, span })
}

fn build_block(pair: Pair<Rule>) -> ParseResult<Block> {
    debug_assert_eq!(pair.as_rule(), Rule::block);
    let span = span_from_pair(&pair);

    let mut ident = None;
    let mut labels = Vec::new();
    let mut body = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => ident = Some(build_identifier(inner)),
            Rule::block_label => labels.push(build_block_label(inner)?),
            Rule::body => body = Some(build_body(inner)?),
            _ => return Err(unexpected(&inner)),
        }
    }

    let ident = ident.ok_or_else(|| ParseError::UnexpectedToken("block without a type".into()))?;
    Ok(Block {
        ident,
        labels,
        body: body.unwrap_or_default(),
        span,
    })
}

fn build_block_label(pair: Pair<Rule>) -> ParseResult<Spanned<String>> {
    debug_assert_eq!(pair.as_rule(), Rule::block_label);
    let span = span_from_pair(&pair);
    let inner = next_pair(&mut pair.into_inner(), "block label")?;

    match inner.as_rule() {
        Rule::identifier => Ok(build_identifier(inner)),
        Rule::template => {
            let template = build_template(inner)?;
            let text = template.as_literal().ok_or_else(|| ParseError::InvalidLabel {
                message: "Block labels may not contain template sequences.".to_string(),
                span,
            })?;
            Ok(Spanned::new(text, span))
        }
        _ => Err(unexpected(&inner)),
    }
}

// =============================================================================
// Expressions
// =============================================================================

fn build_expression(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::expression);
    let span = span_from_pair(&pair);
    let mut inner = pair.into_inner();

    let condition = build_binary_expr(next_pair(&mut inner, "expression")?)?;
    let Some(tail) = inner.next() else {
        return Ok(condition);
    };

    debug_assert_eq!(tail.as_rule(), Rule::conditional_tail);
    let mut branches = tail.into_inner();
    let then_branch = build_expression(next_pair(&mut branches, "conditional")?)?;
    let else_branch = build_expression(next_pair(&mut branches, "conditional")?)?;

    Ok(Expr::new(
        ExprKind::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        },
        span,
    ))
}

fn build_binary_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::binary_expr);
    let mut inner = pair.into_inner();

    let first = build_unary_expr(next_pair(&mut inner, "expression")?)?;

    let mut ops_and_exprs = Vec::new();
    while let Some(op_pair) = inner.next() {
        let op = parse_binary_op(&op_pair)?;
        let operand = build_unary_expr(next_pair(&mut inner, "operand")?)?;
        ops_and_exprs.push((op, operand));
    }

    Ok(build_expr_with_precedence(first, ops_and_exprs))
}

/// Fold a flat `a op b op c ...` list into a tree. Every operator is
/// left-associative, so each precedence level is reduced left to right,
/// tightest level first.
fn build_expr_with_precedence(left: Expr, ops_and_exprs: Vec<(BinaryOp, Expr)>) -> Expr {
    let mut exprs: Vec<Expr> = Vec::with_capacity(ops_and_exprs.len() + 1);
    let mut ops: Vec<BinaryOp> = Vec::with_capacity(ops_and_exprs.len());
    exprs.push(left);
    for (op, expr) in ops_and_exprs {
        ops.push(op);
        exprs.push(expr);
    }

    for precedence in (1..=BinaryOp::MAX_PRECEDENCE).rev() {
        let mut i = 0;
        while i < ops.len() {
            let op = ops[i];
            if op.precedence() == precedence {
                let left_expr = exprs.remove(i);
                let right_expr = exprs.remove(i);
                let span = left_expr.span.merge(right_expr.span);

                let combined = Expr::new(
                    ExprKind::Binary {
                        op,
                        left: Box::new(left_expr),
                        right: Box::new(right_expr),
                    },
                    span,
                );
                exprs.insert(i, combined);
                ops.remove(i);
            } else {
                i += 1;
            }
        }
    }

    debug_assert_eq!(exprs.len(), 1);
    debug_assert!(ops.is_empty());

    // A non-empty list always reduces to exactly one node
    exprs.swap_remove(0)
}

fn parse_binary_op(pair: &Pair<Rule>) -> ParseResult<BinaryOp> {
    let op = match pair.as_str() {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        other => return Err(ParseError::UnexpectedToken(format!("operator \"{}\"", other))),
    };
    Ok(op)
}

fn build_unary_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::unary_expr);

    let mut ops = Vec::new();
    let mut operand = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unary_op => {
                let op = if inner.as_str() == "!" {
                    UnaryOp::Not
                } else {
                    UnaryOp::Neg
                };
                ops.push((op, span_from_pair(&inner)));
            }
            Rule::postfix_expr => operand = Some(build_postfix_expr(inner)?),
            _ => return Err(unexpected(&inner)),
        }
    }

    let mut expr =
        operand.ok_or_else(|| ParseError::UnexpectedToken("operator without operand".into()))?;
    // Prefix operators apply innermost first
    for (op, op_span) in ops.into_iter().rev() {
        let span = op_span.merge(expr.span);
        expr = Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(expr),
            },
            span,
        );
    }
    Ok(expr)
}

fn build_postfix_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::postfix_expr);
    let mut inner = pair.into_inner();

    let mut expr = build_primary(next_pair(&mut inner, "expression")?)?;

    for postfix in inner {
        let span = expr.span.merge(span_from_pair(&postfix));
        let base = Box::new(expr);
        expr = match postfix.as_rule() {
            Rule::get_attr => match build_traversal(postfix)? {
                Traversal::Attr(name) => Expr::new(ExprKind::GetAttr { base, name }, span),
                Traversal::Index(key) => Expr::new(
                    ExprKind::Index {
                        base,
                        key: Box::new(key),
                    },
                    span,
                ),
            },
            Rule::index => {
                let key = build_expression(next_pair(&mut postfix.into_inner(), "index")?)?;
                Expr::new(
                    ExprKind::Index {
                        base,
                        key: Box::new(key),
                    },
                    span,
                )
            }
            Rule::attr_splat | Rule::full_splat => {
                let kind = if postfix.as_rule() == Rule::attr_splat {
                    SplatKind::Attr
                } else {
                    SplatKind::Full
                };
                let each = postfix
                    .into_inner()
                    .map(build_traversal)
                    .collect::<ParseResult<Vec<_>>>()?;
                Expr::new(ExprKind::Splat { base, kind, each }, span)
            }
            _ => return Err(unexpected(&postfix)),
        };
    }

    Ok(expr)
}

/// Build one `.name`, `.0` or `[key]` step
fn build_traversal(pair: Pair<Rule>) -> ParseResult<Traversal> {
    match pair.as_rule() {
        Rule::get_attr => {
            let inner = next_pair(&mut pair.into_inner(), "attribute access")?;
            match inner.as_rule() {
                Rule::identifier => Ok(Traversal::Attr(build_identifier(inner))),
                Rule::legacy_index => {
                    let span = span_from_pair(&inner);
                    let index: i64 =
                        inner
                            .as_str()
                            .parse()
                            .map_err(|_| ParseError::InvalidNumber {
                                text: inner.as_str().to_string(),
                                span,
                            })?;
                    Ok(Traversal::Index(Expr::new(ExprKind::Int(index), span)))
                }
                _ => Err(unexpected(&inner)),
            }
        }
        Rule::index => {
            let key = build_expression(next_pair(&mut pair.into_inner(), "index")?)?;
            Ok(Traversal::Index(key))
        }
        _ => Err(unexpected(&pair)),
    }
}

fn build_primary(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::primary);
    let inner = next_pair(&mut pair.into_inner(), "expression")?;
    let span = span_from_pair(&inner);

    match inner.as_rule() {
        Rule::null_lit => Ok(Expr::new(ExprKind::Null, span)),
        Rule::true_lit => Ok(Expr::new(ExprKind::Bool(true), span)),
        Rule::false_lit => Ok(Expr::new(ExprKind::Bool(false), span)),
        Rule::number => build_number(&inner),
        Rule::template => {
            let template = build_template(inner)?;
            Ok(Expr::new(ExprKind::Template(template), span))
        }
        Rule::heredoc => {
            let template = build_heredoc(inner)?;
            Ok(Expr::new(ExprKind::Template(template), span))
        }
        Rule::variable => {
            let name = next_pair(&mut inner.into_inner(), "variable")?;
            Ok(Expr::new(ExprKind::Variable(name.as_str().to_string()), span))
        }
        Rule::parenthesized => {
            let expr = build_expression(next_pair(&mut inner.into_inner(), "parentheses")?)?;
            Ok(Expr::new(ExprKind::Parenthesized(Box::new(expr)), span))
        }
        Rule::function_call => build_function_call(inner),
        Rule::tuple => {
            let items = inner
                .into_inner()
                .map(build_expression)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::new(ExprKind::Tuple(items), span))
        }
        Rule::object => {
            let items = inner
                .into_inner()
                .map(build_object_elem)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::new(ExprKind::Object(items), span))
        }
        Rule::for_tuple | Rule::for_object => build_for_expr(inner),
        _ => Err(unexpected(&inner)),
    }
}

fn build_number(pair: &Pair<Rule>) -> ParseResult<Expr> {
    let span = span_from_pair(pair);
    let text = pair.as_str();
    let invalid = || ParseError::InvalidNumber {
        text: text.to_string(),
        span,
    };

    let is_float = text.contains(['.', 'e', 'E']);
    if !is_float {
        return text
            .parse::<i64>()
            .map(|i| Expr::new(ExprKind::Int(i), span))
            .map_err(|_| ParseError::IntegerOutOfRange {
                text: text.to_string(),
                span,
            });
    }
    let f: f64 = text.parse().map_err(|_| invalid())?;
    if !f.is_finite() {
        return Err(invalid());
    }
    Ok(Expr::new(ExprKind::Float(f), span))
}

fn build_function_call(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::function_call);
    let span = span_from_pair(&pair);
    let mut inner = pair.into_inner();

    let name = build_identifier(next_pair(&mut inner, "function call")?);
    let mut args = Vec::new();
    let mut expand_final = false;

    if let Some(call_args) = inner.next() {
        for arg in call_args.into_inner() {
            match arg.as_rule() {
                Rule::expression => args.push(build_expression(arg)?),
                Rule::ellipsis => expand_final = true,
                _ => return Err(unexpected(&arg)),
            }
        }
    }

    Ok(Expr::new(
        ExprKind::Call {
            name,
            args,
            expand_final,
        },
        span,
    ))
}

fn build_object_elem(pair: Pair<Rule>) -> ParseResult<ObjectItem> {
    debug_assert_eq!(pair.as_rule(), Rule::object_elem);
    let span = span_from_pair(&pair);
    let mut inner = pair.into_inner();

    let key_expr = build_expression(next_pair(&mut inner, "object key")?)?;
    let value = build_expression(next_pair(&mut inner, "object value")?)?;

    // A bare name is a literal key; `(name)` forces evaluation
    let key = match key_expr.kind {
        ExprKind::Variable(name) => ObjectKey::Name(Spanned::new(name, key_expr.span)),
        _ => ObjectKey::Expr(key_expr),
    };

    Ok(ObjectItem { key, value, span })
}

fn build_for_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = span_from_pair(&pair);
    let is_object = pair.as_rule() == Rule::for_object;
    let mut inner = pair.into_inner();

    let (key_var, value_var, collection) = build_for_intro(next_pair(&mut inner, "for")?)?;

    let first = build_expression(next_pair(&mut inner, "for")?)?;
    let (key_expr, value_expr) = if is_object {
        let value = build_expression(next_pair(&mut inner, "for")?)?;
        (Some(first), value)
    } else {
        (None, first)
    };

    let mut group = false;
    let mut condition = None;
    for rest in inner {
        match rest.as_rule() {
            Rule::ellipsis => group = true,
            Rule::for_cond => {
                let cond = rest
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::expression)
                    .ok_or_else(|| ParseError::UnexpectedToken("empty for condition".into()))?;
                condition = Some(build_expression(cond)?);
            }
            _ => return Err(unexpected(&rest)),
        }
    }

    Ok(Expr::new(
        ExprKind::For(Box::new(ForExpr {
            key_var,
            value_var,
            collection,
            key_expr,
            value_expr,
            group,
            condition,
        })),
        span,
    ))
}

/// `for k, v in coll :` returns the optional key variable, the value
/// variable and the collection
fn build_for_intro(pair: Pair<Rule>) -> ParseResult<(Option<Identifier>, Identifier, Expr)> {
    let mut idents = Vec::new();
    let mut collection = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => idents.push(build_identifier(inner)),
            Rule::expression => collection = Some(build_expression(inner)?),
            Rule::kw_for | Rule::kw_in => {}
            _ => return Err(unexpected(&inner)),
        }
    }

    let collection =
        collection.ok_or_else(|| ParseError::UnexpectedToken("for without collection".into()))?;
    let mut idents = idents.into_iter();
    match (idents.next(), idents.next()) {
        (Some(value), None) => Ok((None, value, collection)),
        (Some(key), Some(value)) => Ok((Some(key), value, collection)),
        _ => Err(ParseError::UnexpectedToken("for without iterator".into())),
    }
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Strip {
    left: bool,
    right: bool,
}

/// Flat template sequence before directives are nested
#[derive(Debug)]
enum TemplateToken {
    Literal(String),
    Interp(Expr, Strip),
    If(Expr, Strip, Span),
    Else(Strip, Span),
    EndIf(Strip, Span),
    For {
        key_var: Option<Identifier>,
        value_var: Identifier,
        collection: Expr,
        strip: Strip,
        span: Span,
    },
    EndFor(Strip, Span),
}

impl TemplateToken {
    fn strip(&self) -> Strip {
        match self {
            TemplateToken::Literal(_) => Strip::default(),
            TemplateToken::Interp(_, s)
            | TemplateToken::If(_, s, _)
            | TemplateToken::Else(s, _)
            | TemplateToken::EndIf(s, _)
            | TemplateToken::EndFor(s, _) => *s,
            TemplateToken::For { strip, .. } => *strip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    Else,
    EndIf,
    EndFor,
}

fn push_literal(tokens: &mut Vec<TemplateToken>, text: &str) {
    if let Some(TemplateToken::Literal(prev)) = tokens.last_mut() {
        prev.push_str(text);
    } else {
        tokens.push(TemplateToken::Literal(text.to_string()));
    }
}

fn build_template(pair: Pair<Rule>) -> ParseResult<Template> {
    debug_assert_eq!(pair.as_rule(), Rule::template);
    let span = span_from_pair(&pair);

    let mut tokens = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::quoted_chars => push_literal(&mut tokens, inner.as_str()),
            Rule::escape_sequence => {
                let text = unescape(inner.as_str(), span_from_pair(&inner))?;
                push_literal(&mut tokens, &text);
            }
            _ => tokens.push(build_template_token(inner)?),
        }
    }

    finish_template(tokens, span)
}

fn build_heredoc(pair: Pair<Rule>) -> ParseResult<Template> {
    debug_assert_eq!(pair.as_rule(), Rule::heredoc);
    let span = span_from_pair(&pair);

    let mut flush = false;
    let mut lines: Vec<Vec<TemplateToken>> = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::heredoc_flush => flush = true,
            Rule::identifier => {}
            Rule::heredoc_line => {
                let mut line = Vec::new();
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::heredoc_chars => push_literal(&mut line, part.as_str()),
                        Rule::heredoc_newline => push_literal(&mut line, "\n"),
                        _ => line.push(build_template_token(part)?),
                    }
                }
                lines.push(line);
            }
            _ => return Err(unexpected(&inner)),
        }
    }

    if flush {
        strip_common_indent(&mut lines);
    }

    let mut tokens = Vec::new();
    for token in lines.into_iter().flatten() {
        match token {
            TemplateToken::Literal(text) => {
                if let Some(TemplateToken::Literal(prev)) = tokens.last_mut() {
                    prev.push_str(&text);
                } else {
                    tokens.push(TemplateToken::Literal(text));
                }
            }
            other => tokens.push(other),
        }
    }

    finish_template(tokens, span)
}

/// Remove the smallest leading indentation shared by all non-blank lines
fn strip_common_indent(lines: &mut [Vec<TemplateToken>]) {
    let indent_of = |line: &Vec<TemplateToken>| -> Option<usize> {
        match line.first() {
            Some(TemplateToken::Literal(text)) => {
                if text.trim().is_empty() && line.len() == 1 {
                    None
                } else {
                    Some(text.chars().take_while(|c| *c == ' ' || *c == '\t').count())
                }
            }
            _ => Some(0),
        }
    };

    let Some(min) = lines.iter().filter_map(indent_of).min() else {
        return;
    };
    if min == 0 {
        return;
    }

    for line in lines.iter_mut() {
        if let Some(TemplateToken::Literal(text)) = line.first_mut() {
            let strip = text
                .char_indices()
                .take(min)
                .take_while(|(_, c)| *c == ' ' || *c == '\t')
                .map(|(i, c)| i + c.len_utf8())
                .last()
                .unwrap_or(0);
            text.drain(..strip);
        }
    }
}

fn build_template_token(pair: Pair<Rule>) -> ParseResult<TemplateToken> {
    let span = span_from_pair(&pair);
    match pair.as_rule() {
        Rule::template_escape => {
            // `$${` and `%%{` produce the literal sequence without the doubled sigil
            Ok(TemplateToken::Literal(pair.as_str()[1..].to_string()))
        }
        Rule::template_interp => {
            let (strip, mut parts) = split_strip_markers(pair);
            let expr = parts
                .pop()
                .ok_or_else(|| ParseError::UnexpectedToken("empty interpolation".into()))?;
            Ok(TemplateToken::Interp(build_expression(expr)?, strip))
        }
        Rule::template_if => {
            let (strip, parts) = split_strip_markers(pair);
            let cond = parts
                .into_iter()
                .find(|p| p.as_rule() == Rule::expression)
                .ok_or_else(|| ParseError::InvalidDirective {
                    message: "An if directive requires a condition.".to_string(),
                    span,
                })?;
            Ok(TemplateToken::If(build_expression(cond)?, strip, span))
        }
        Rule::template_else => Ok(TemplateToken::Else(split_strip_markers(pair).0, span)),
        Rule::template_endif => Ok(TemplateToken::EndIf(split_strip_markers(pair).0, span)),
        Rule::template_endfor => Ok(TemplateToken::EndFor(split_strip_markers(pair).0, span)),
        Rule::template_for => {
            let (strip, parts) = split_strip_markers(pair);
            let mut idents = Vec::new();
            let mut collection = None;
            for part in parts {
                match part.as_rule() {
                    Rule::identifier => idents.push(build_identifier(part)),
                    Rule::expression => collection = Some(build_expression(part)?),
                    _ => {}
                }
            }
            let collection = collection.ok_or_else(|| ParseError::InvalidDirective {
                message: "A for directive requires a collection.".to_string(),
                span,
            })?;
            let mut idents = idents.into_iter();
            let (key_var, value_var) = match (idents.next(), idents.next()) {
                (Some(value), None) => (None, value),
                (Some(key), Some(value)) => (Some(key), value),
                _ => {
                    return Err(ParseError::InvalidDirective {
                        message: "A for directive requires an iterator name.".to_string(),
                        span,
                    })
                }
            };
            Ok(TemplateToken::For {
                key_var,
                value_var,
                collection,
                strip,
                span,
            })
        }
        _ => Err(unexpected(&pair)),
    }
}

/// Separate `~` markers from the other children of an interpolation or
/// directive. A marker before the first other child strips to the left.
fn split_strip_markers(pair: Pair<Rule>) -> (Strip, Vec<Pair<Rule>>) {
    let mut strip = Strip::default();
    let mut rest = Vec::new();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::strip_marker {
            if rest.is_empty() {
                strip.left = true;
            } else {
                strip.right = true;
            }
        } else {
            rest.push(inner);
        }
    }
    (strip, rest)
}

fn finish_template(mut tokens: Vec<TemplateToken>, span: Span) -> ParseResult<Template> {
    apply_strip_markers(&mut tokens);

    let mut iter = tokens.into_iter();
    let (parts, closer) = assemble_parts(&mut iter)?;
    if let Some((closer, span)) = closer {
        return Err(ParseError::InvalidDirective {
            message: format!("Unexpected {} directive.", closer_keyword(closer)),
            span,
        });
    }

    Ok(Template { parts, span })
}

fn apply_strip_markers(tokens: &mut [TemplateToken]) {
    for i in 0..tokens.len() {
        let strip = tokens[i].strip();
        if strip.left && i > 0 {
            if let TemplateToken::Literal(text) = &mut tokens[i - 1] {
                let trimmed = text.trim_end().len();
                text.truncate(trimmed);
            }
        }
        if strip.right {
            if let Some(TemplateToken::Literal(text)) = tokens.get_mut(i + 1) {
                *text = text.trim_start().to_string();
            }
        }
    }
}

fn closer_keyword(closer: Closer) -> &'static str {
    match closer {
        Closer::Else => "else",
        Closer::EndIf => "endif",
        Closer::EndFor => "endfor",
    }
}

/// Nest the flat token list, stopping at the first closing directive,
/// which is returned to the caller for validation
fn assemble_parts(
    tokens: &mut std::vec::IntoIter<TemplateToken>,
) -> ParseResult<(Vec<TemplatePart>, Option<(Closer, Span)>)> {
    let mut parts = Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            TemplateToken::Literal(text) => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Literal(text));
                }
            }
            TemplateToken::Interp(expr, _) => parts.push(TemplatePart::Interpolation(expr)),
            TemplateToken::If(condition, _, span) => {
                let (then_parts, closer) = assemble_parts(tokens)?;
                let else_parts = match closer {
                    Some((Closer::EndIf, _)) => Vec::new(),
                    Some((Closer::Else, _)) => {
                        let (else_parts, closer) = assemble_parts(tokens)?;
                        expect_closer(closer, Closer::EndIf, "if", span)?;
                        else_parts
                    }
                    other => {
                        expect_closer(other, Closer::EndIf, "if", span)?;
                        Vec::new()
                    }
                };
                parts.push(TemplatePart::If {
                    condition,
                    then_parts,
                    else_parts,
                });
            }
            TemplateToken::For {
                key_var,
                value_var,
                collection,
                span,
                ..
            } => {
                let (body, closer) = assemble_parts(tokens)?;
                expect_closer(closer, Closer::EndFor, "for", span)?;
                parts.push(TemplatePart::For {
                    key_var,
                    value_var,
                    collection,
                    body,
                });
            }
            TemplateToken::Else(_, span) => return Ok((parts, Some((Closer::Else, span)))),
            TemplateToken::EndIf(_, span) => return Ok((parts, Some((Closer::EndIf, span)))),
            TemplateToken::EndFor(_, span) => return Ok((parts, Some((Closer::EndFor, span)))),
        }
    }

    Ok((parts, None))
}

fn expect_closer(
    found: Option<(Closer, Span)>,
    expected: Closer,
    opener: &str,
    opener_span: Span,
) -> ParseResult<()> {
    match found {
        Some((closer, _)) if closer == expected => Ok(()),
        Some((closer, span)) => Err(ParseError::InvalidDirective {
            message: format!(
                "Expected an {} directive to end the {} directive, found {}.",
                closer_keyword(expected),
                opener,
                closer_keyword(closer)
            ),
            span,
        }),
        None => Err(ParseError::InvalidDirective {
            message: format!(
                "The {} directive has no matching {}.",
                opener,
                closer_keyword(expected)
            ),
            span: opener_span,
        }),
    }
}

fn unescape(s: &str, span: Span) -> ParseResult<String> {
    let invalid = || ParseError::InvalidEscape {
        text: s.to_string(),
        span,
    };

    let mut chars = s.chars();
    if chars.next() != Some('\\') {
        return Err(invalid());
    }
    let c = match chars.next() {
        Some('n') => '\n',
        Some('r') => '\r',
        Some('t') => '\t',
        Some('"') => '"',
        Some('\\') => '\\',
        Some('u') | Some('U') => {
            let code = u32::from_str_radix(chars.as_str(), 16).map_err(|_| invalid())?;
            char::from_u32(code).ok_or_else(invalid)?
        }
        _ => return Err(invalid()),
    };
    Ok(c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Expr {
        parse_expression(src).unwrap()
    }

    #[test]
    fn test_precedence() {
        let e = expr("1 + 2 * 3");
        match e.kind {
            ExprKind::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_left_associative() {
        let e = expr("10 - 4 - 3");
        match e.kind {
            ExprKind::Binary { op, left, right } => {
                assert_eq!(op, BinaryOp::Sub);
                assert!(matches!(left.kind, ExprKind::Binary { .. }));
                assert_eq!(right.kind, ExprKind::Int(3));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional() {
        let e = expr("true ? 1 : 2");
        assert!(matches!(e.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(expr("42").kind, ExprKind::Int(42));
        assert_eq!(expr("1.5").kind, ExprKind::Float(1.5));
        assert_eq!(expr("1e3").kind, ExprKind::Float(1000.0));
    }

    #[test]
    fn test_unescape() {
        let s = Span::default();
        assert_eq!(unescape("\\n", s).unwrap(), "\n");
        assert_eq!(unescape("\\u00e9", s).unwrap(), "é");
        assert_eq!(unescape("\\U0001F600", s).unwrap(), "😀");
        assert!(unescape("\\q", s).is_err());
    }

    #[test]
    fn test_single_interpolation() {
        let e = expr("\"${var.x}\"");
        match e.kind {
            ExprKind::Template(t) => assert!(t.as_single_interpolation().is_some()),
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_template_escape() {
        let e = expr(r#""$${literal} %%{x}""#);
        match e.kind {
            ExprKind::Template(t) => {
                assert_eq!(t.as_literal().as_deref(), Some("${literal} %{x}"))
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_strip_markers() {
        let e = expr(r#""a   ${~ "b" ~}   c""#);
        match e.kind {
            ExprKind::Template(t) => {
                assert_eq!(t.parts.len(), 3);
                assert_eq!(t.parts[0], TemplatePart::Literal("a".into()));
                assert_eq!(t.parts[2], TemplatePart::Literal("c".into()));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_if_directive() {
        let err = parse_expression(r#""%{ if true }x""#).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Invalid template directive"), "{}", text);
    }

    #[test]
    fn test_flush_heredoc() {
        let src = "<<-EOT\n    hello\n      world\n    EOT\n";
        let e = expr(src);
        match e.kind {
            ExprKind::Template(t) => {
                assert_eq!(t.as_literal().as_deref(), Some("hello\n  world\n"))
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_object_keys() {
        let e = expr(r#"{ a = 1, "b" = 2, (c) = 3 }"#);
        match e.kind {
            ExprKind::Object(items) => {
                assert!(matches!(items[0].key, ObjectKey::Name(_)));
                assert!(matches!(items[1].key, ObjectKey::Expr(_)));
                assert!(matches!(items[2].key, ObjectKey::Expr(_)));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
