//! Parser tests: AST shapes and syntax diagnostics

use tfunk_parser::*;

/// Render an expression as a compact s-expression
fn sexpr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Null => "null".to_string(),
        ExprKind::Bool(b) => b.to_string(),
        ExprKind::Int(i) => i.to_string(),
        ExprKind::Float(f) => format!("{:?}", f),
        ExprKind::Template(t) => template(&t.parts),
        ExprKind::Variable(name) => name.clone(),
        ExprKind::Tuple(items) => {
            let items: Vec<_> = items.iter().map(sexpr).collect();
            format!("[{}]", items.join(" "))
        }
        ExprKind::Object(items) => {
            let items: Vec<_> = items
                .iter()
                .map(|item| {
                    let key = match &item.key {
                        ObjectKey::Name(name) => name.node.clone(),
                        ObjectKey::Expr(e) => format!("({})", sexpr(e)),
                    };
                    format!("{}={}", key, sexpr(&item.value))
                })
                .collect();
            format!("{{{}}}", items.join(" "))
        }
        ExprKind::GetAttr { base, name } => format!("{}.{}", sexpr(base), name.node),
        ExprKind::Index { base, key } => format!("{}[{}]", sexpr(base), sexpr(key)),
        ExprKind::Splat { base, kind, each } => {
            let marker = match kind {
                SplatKind::Attr => ".*",
                SplatKind::Full => "[*]",
            };
            let steps: String = each
                .iter()
                .map(|t| match t {
                    Traversal::Attr(name) => format!(".{}", name.node),
                    Traversal::Index(e) => format!("[{}]", sexpr(e)),
                })
                .collect();
            format!("{}{}{}", sexpr(base), marker, steps)
        }
        ExprKind::Call {
            name,
            args,
            expand_final,
        } => {
            let args: Vec<_> = args.iter().map(sexpr).collect();
            let dots = if *expand_final { "..." } else { "" };
            format!("{}({}{})", name.node, args.join(" "), dots)
        }
        ExprKind::Unary { op, operand } => {
            let sym = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
            };
            format!("({} {})", sym, sexpr(operand))
        }
        ExprKind::Binary { op, left, right } => {
            format!("({} {} {})", op, sexpr(left), sexpr(right))
        }
        ExprKind::Conditional {
            condition,
            then_branch,
            else_branch,
        } => format!(
            "(? {} {} {})",
            sexpr(condition),
            sexpr(then_branch),
            sexpr(else_branch)
        ),
        ExprKind::For(f) => {
            let key = f
                .key_var
                .as_ref()
                .map(|k| format!("{}, ", k.node))
                .unwrap_or_default();
            let body = match &f.key_expr {
                Some(k) => format!("{} => {}", sexpr(k), sexpr(&f.value_expr)),
                None => sexpr(&f.value_expr),
            };
            let group = if f.group { "..." } else { "" };
            let cond = f
                .condition
                .as_ref()
                .map(|c| format!(" if {}", sexpr(c)))
                .unwrap_or_default();
            format!(
                "(for {}{} in {}: {}{}{})",
                key,
                f.value_var.node,
                sexpr(&f.collection),
                body,
                group,
                cond
            )
        }
        ExprKind::Parenthesized(inner) => sexpr(inner),
    }
}

fn template(parts: &[TemplatePart]) -> String {
    let rendered: Vec<String> = parts
        .iter()
        .map(|part| match part {
            TemplatePart::Literal(s) => format!("{:?}", s),
            TemplatePart::Interpolation(e) => format!("${{{}}}", sexpr(e)),
            TemplatePart::If {
                condition,
                then_parts,
                else_parts,
            } => format!(
                "%if({} {} {})",
                sexpr(condition),
                template(then_parts),
                template(else_parts)
            ),
            TemplatePart::For {
                value_var,
                collection,
                body,
                ..
            } => format!(
                "%for({} {} {})",
                value_var.node,
                sexpr(collection),
                template(body)
            ),
        })
        .collect();
    format!("<{}>", rendered.join(" "))
}

fn parse(src: &str) -> String {
    match parse_expression(src) {
        Ok(expr) => sexpr(&expr),
        Err(diags) => format!("error: {}", diags),
    }
}

// =============================================================================
// Operators
// =============================================================================

#[test]
fn test_arithmetic_precedence() {
    insta::assert_snapshot!(parse("1 + 2 * 3 - 4 / 2"), @"(- (+ 1 (* 2 3)) (/ 4 2))");
}

#[test]
fn test_logical_precedence() {
    insta::assert_snapshot!(parse("a || b && c == d"), @"(|| a (&& b (== c d)))");
}

#[test]
fn test_comparison_binds_tighter_than_equality() {
    insta::assert_snapshot!(parse("a < b == c >= d"), @"(== (< a b) (>= c d))");
}

#[test]
fn test_unary() {
    insta::assert_snapshot!(parse("!a && -b > 0"), @"(&& (! a) (> (- b) 0))");
}

#[test]
fn test_nested_conditional() {
    insta::assert_snapshot!(parse("a ? b : c ? d : e"), @"(? a b (? c d e))");
}

#[test]
fn test_parentheses() {
    insta::assert_snapshot!(parse("(1 + 2) * 3"), @"(* (+ 1 2) 3)");
}

// =============================================================================
// Traversals and calls
// =============================================================================

#[test]
fn test_traversals() {
    insta::assert_snapshot!(parse("local.items[0].name"), @"local.items[0].name");
    insta::assert_snapshot!(parse("var.list.1"), @"var.list[1]");
}

#[test]
fn test_splats() {
    insta::assert_snapshot!(parse("a.*.b.c"), @"a.*.b.c");
    insta::assert_snapshot!(parse("a[*].b[0]"), @"a[*].b[0]");
}

#[test]
fn test_function_calls() {
    insta::assert_snapshot!(parse("max(1, 2, 3)"), @"max(1 2 3)");
    insta::assert_snapshot!(parse("max(xs...)"), @"max(xs...)");
    insta::assert_snapshot!(parse("timestamp()"), @"timestamp()");
    insta::assert_snapshot!(parse("join(\",\", [\n  \"a\",\n  \"b\",\n])"), @r#"join(<","> [<"a"> <"b">])"#);
}

#[test]
fn test_hyphenated_identifiers() {
    insta::assert_snapshot!(parse("dependency.vpc-main.outputs"), @"dependency.vpc-main.outputs");
}

// =============================================================================
// Collections
// =============================================================================

#[test]
fn test_object_separators() {
    let src = r#"{
        a = 1
        b: 2,
        "c" = 3
        (d) = 4
    }"#;
    insta::assert_snapshot!(parse(src), @r#"{a=1 b=2 (<"c">)=3 (d)=4}"#);
}

#[test]
fn test_empty_collections() {
    insta::assert_snapshot!(parse("[]"), @"[]");
    insta::assert_snapshot!(parse("{}"), @"{}");
}

#[test]
fn test_for_expressions() {
    insta::assert_snapshot!(
        parse("[for i, v in xs : v * 2 if i > 0]"),
        @"(for i, v in xs: (* v 2) if (> i 0))"
    );
    insta::assert_snapshot!(
        parse("{for k, v in m : v => k...}"),
        @"(for k, v in m: v => k...)"
    );
}

#[test]
fn test_comments() {
    let src = "1 + # one\n 2 // two\n /* three */";
    insta::assert_snapshot!(parse(src), @"(+ 1 2)");
}

// =============================================================================
// Templates
// =============================================================================

#[test]
fn test_template_interpolation() {
    insta::assert_snapshot!(parse(r#""Hello, ${name}!""#), @r#"<"Hello, " ${name} "!">"#);
}

#[test]
fn test_template_directives() {
    insta::assert_snapshot!(
        parse(r#""%{ if x }yes%{ else }no%{ endif }""#),
        @r#"<%if(x <"yes"> <"no">)>"#
    );
    insta::assert_snapshot!(
        parse(r#""%{ for s in xs ~}${s}, %{~ endfor }""#),
        @r#"<%for(s xs <${s} ",">)>"#
    );
}

#[test]
fn test_template_escapes() {
    insta::assert_snapshot!(parse(r#""tab\there \"q\"""#), @r#"<"tab\there \"q\"">"#);
}

#[test]
fn test_heredoc() {
    let src = "<<EOT\nhello ${name}\n  world\nEOT";
    insta::assert_snapshot!(parse(src), @r#"<"hello " ${name} "\n  world\n">"#);
}

#[test]
fn test_heredoc_marker_prefix_is_content() {
    let src = "<<EOT\nEOTX\nEOT";
    insta::assert_snapshot!(parse(src), @r#"<"EOTX\n">"#);
}

// =============================================================================
// Bodies
// =============================================================================

#[test]
fn test_parse_body() {
    let src = r#"
locals {
  region = "eu-west-1"
}

dependency "vpc" {
  config_path = "../vpc"
}

inputs = {
  name = local.region
}
"#;
    let body = parse_body(src, "terragrunt.hcl").unwrap();
    let blocks: Vec<_> = body
        .blocks()
        .map(|b| {
            let labels: Vec<_> = b.labels.iter().map(|l| l.node.as_str()).collect();
            format!("{}{:?}", b.ident.node, labels)
        })
        .collect();
    assert_eq!(blocks, vec!["locals[]", "dependency[\"vpc\"]"]);

    let attrs: Vec<_> = body.attributes().map(|a| a.name.node.as_str()).collect();
    assert_eq!(attrs, vec!["inputs"]);
}

#[test]
fn test_block_label_with_interpolation_is_rejected() {
    let err = parse_body("a \"${x}\" {}", "f.hcl").unwrap_err();
    assert!(err.to_string().starts_with("f.hcl:1,3-9: Invalid block label"));
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_incomplete_expression_reports_position() {
    let err = parse_expression("1 +").unwrap_err();
    assert_eq!(err.len(), 1);
    let diag = err.iter().next().unwrap();
    assert_eq!(diag.severity, Severity::Error);
    assert_eq!(diag.summary, "Invalid expression");
    let subject = diag.subject.as_ref().unwrap();
    assert_eq!(subject.filename, EXPRESSION_NAME);
    assert_eq!(subject.start.line, 1);
    assert_eq!(subject.start.column, 4);
    assert_eq!(subject.start.byte, 3);
}

#[test]
fn test_error_on_second_line() {
    let err = parse_expression("[\n  1,\n  ]]").unwrap_err();
    let subject = err.iter().next().unwrap().subject.clone().unwrap();
    assert_eq!(subject.start.line, 3);
}

#[test]
fn test_invalid_escape() {
    let err = parse_expression(r#""\q""#).unwrap_err();
    assert!(err.has_errors());
}

#[test]
fn test_unbalanced_directive() {
    let err = parse_expression(r#""%{ endif }""#).unwrap_err();
    assert!(err.to_string().contains("Unexpected endif directive."));
}

#[test]
fn test_integer_literal_out_of_range() {
    assert_eq!(parse("9223372036854775807"), "9223372036854775807");
    let err = parse_expression("9223372036854775808").unwrap_err();
    let diag = err.iter().next().unwrap();
    assert_eq!(diag.summary, "Invalid number literal");
    assert!(parse("9223372036854775808.0").starts_with("9.223372036854776e18"));
}

#[test]
fn test_syntax_error_names_tokens_in_words() {
    for src in ["\"abc", "a.", "[1, 2", "foo(1,"] {
        let message = parse_expression(src).unwrap_err().to_string();
        assert!(!message.contains('_'), "{}: {}", src, message);
    }
}

#[test]
fn test_attribute_expression_must_stay_on_one_line() {
    let err = parse_body("x = 1 +\n  2\n", "f.hcl").unwrap_err();
    assert!(err.to_string().starts_with("f.hcl:1,8"), "{}", err);
    assert!(err.to_string().contains("Invalid configuration syntax"), "{}", err);
    assert!(parse_body("x =\n  1\n", "f.hcl").is_err());
    assert!(parse_body("x = a\n  .b\n", "f.hcl").is_err());

    let body = parse_body("x = [\n  1 +\n  2,\n]\ny = (1 +\n  2)\n", "f.hcl").unwrap();
    assert_eq!(body.attributes().count(), 2);
    let body = parse_body("z = <<EOT\nline\nEOT\n", "f.hcl").unwrap();
    assert_eq!(body.attributes().count(), 1);
    // Standalone expressions are not bound to a line
    assert_eq!(parse("1 +\n  2"), "(+ 1 2)");
}

#[test]
fn test_items_need_separate_lines() {
    let err = parse_body("a = 1 b = 2\n", "f.hcl").unwrap_err();
    assert!(err.to_string().contains("Missing newline after argument or block"), "{}", err);
    assert!(parse_body("b { a = 1 }\nc = 2\n", "f.hcl").is_ok());
}
