//! Abstract Syntax Tree definitions for HCL native syntax

use std::fmt;

/// Source location span (byte offsets into the parsed text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A node with associated source span
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Simple identifier
pub type Identifier = Spanned<String>;

// =============================================================================
// Configuration bodies
// =============================================================================

/// The contents of a configuration file or of a block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub items: Vec<BodyItem>,
    pub span: Span,
}

impl Body {
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter().filter_map(|item| match item {
            BodyItem::Attribute(attr) => Some(attr),
            BodyItem::Block(_) => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match item {
            BodyItem::Block(block) => Some(block),
            BodyItem::Attribute(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyItem {
    Attribute(Attribute),
    Block(Block),
}

/// `name = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: Identifier,
    pub value: Expr,
    pub span: Span,
}

/// `type "label" { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub ident: Identifier,
    pub labels: Vec<Spanned<String>>,
    pub body: Body,
    pub span: Span,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The variable name if this expression is a bare variable reference
    pub fn as_variable(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// Visit this expression and every nested expression, parents first
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Variable(_) => {}
            ExprKind::Template(t) => walk_template_parts(&t.parts, f),
            ExprKind::Tuple(items) => items.iter().for_each(|e| e.walk(f)),
            ExprKind::Object(items) => {
                for item in items {
                    if let ObjectKey::Expr(key) = &item.key {
                        key.walk(f);
                    }
                    item.value.walk(f);
                }
            }
            ExprKind::GetAttr { base, .. } => base.walk(f),
            ExprKind::Index { base, key } => {
                base.walk(f);
                key.walk(f);
            }
            ExprKind::Splat { base, each, .. } => {
                base.walk(f);
                for step in each {
                    if let Traversal::Index(key) = step {
                        key.walk(f);
                    }
                }
            }
            ExprKind::Call { args, .. } => args.iter().for_each(|e| e.walk(f)),
            ExprKind::Unary { operand, .. } => operand.walk(f),
            ExprKind::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.walk(f);
                then_branch.walk(f);
                else_branch.walk(f);
            }
            ExprKind::For(for_expr) => {
                for_expr.collection.walk(f);
                if let Some(key) = &for_expr.key_expr {
                    key.walk(f);
                }
                for_expr.value_expr.walk(f);
                if let Some(cond) = &for_expr.condition {
                    cond.walk(f);
                }
            }
            ExprKind::Parenthesized(inner) => inner.walk(f),
        }
    }
}

fn walk_template_parts(parts: &[TemplatePart], f: &mut dyn FnMut(&Expr)) {
    for part in parts {
        match part {
            TemplatePart::Literal(_) => {}
            TemplatePart::Interpolation(e) => e.walk(f),
            TemplatePart::If {
                condition,
                then_parts,
                else_parts,
            } => {
                condition.walk(f);
                walk_template_parts(then_parts, f);
                walk_template_parts(else_parts, f);
            }
            TemplatePart::For {
                collection, body, ..
            } => {
                collection.walk(f);
                walk_template_parts(body, f);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Template(Template),

    /// Root variable reference
    Variable(String),

    // Collection constructors
    Tuple(Vec<Expr>),
    Object(Vec<ObjectItem>),

    // Traversals
    GetAttr {
        base: Box<Expr>,
        name: Identifier,
    },
    Index {
        base: Box<Expr>,
        key: Box<Expr>,
    },
    Splat {
        base: Box<Expr>,
        kind: SplatKind,
        each: Vec<Traversal>,
    },

    /// `name(args...)`
    Call {
        name: Identifier,
        args: Vec<Expr>,
        expand_final: bool,
    },

    // Operators
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// `[for ...]` or `{for ...}`
    For(Box<ForExpr>),

    // Parenthesized (for preserving source info)
    Parenthesized(Box<Expr>),
}

/// One step applied to each element of a splat
#[derive(Debug, Clone, PartialEq)]
pub enum Traversal {
    Attr(Identifier),
    Index(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplatKind {
    /// `.*` (attribute-only)
    Attr,
    /// `[*]`
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectItem {
    pub key: ObjectKey,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    /// A bare identifier, taken literally as the attribute name
    Name(Identifier),
    /// Any other expression, evaluated and converted to a string
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub key_var: Option<Identifier>,
    pub value_var: Identifier,
    pub collection: Expr,
    /// Present for `{for ...}` expressions only
    pub key_expr: Option<Expr>,
    pub value_expr: Expr,
    /// `...` grouping mode for object for expressions
    pub group: bool,
    pub condition: Option<Expr>,
}

impl ForExpr {
    pub fn is_object(&self) -> bool {
        self.key_expr.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// Returns the precedence (higher = binds tighter)
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
        }
    }

    pub const MAX_PRECEDENCE: u8 = 6;

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

// =============================================================================
// Templates
// =============================================================================

/// A quoted or heredoc template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
    pub span: Span,
}

impl Template {
    /// Returns the single wrapped expression for `"${expr}"` templates,
    /// whose result is the expression value itself rather than a string
    pub fn as_single_interpolation(&self) -> Option<&Expr> {
        match self.parts.as_slice() {
            [TemplatePart::Interpolation(expr)] => Some(expr),
            _ => None,
        }
    }

    /// Get the literal string value if this template has no dynamic parts
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(s) => out.push_str(s),
                _ => return None,
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Expr),
    /// `%{ if cond }...%{ else }...%{ endif }`
    If {
        condition: Expr,
        then_parts: Vec<TemplatePart>,
        else_parts: Vec<TemplatePart>,
    },
    /// `%{ for k, v in coll }...%{ endfor }`
    For {
        key_var: Option<Identifier>,
        value_var: Identifier,
        collection: Expr,
        body: Vec<TemplatePart>,
    },
}
