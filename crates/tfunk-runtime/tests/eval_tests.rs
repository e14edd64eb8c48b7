//! Snapshot tests for HCL expression evaluation

use tfunk_parser::{parse_expression, SourceMap, EXPRESSION_NAME};
use tfunk_runtime::{
    evaluate, indent, marshal, Context, Function, FunctionError, FunctionRegistry, Param, Type,
    Value,
};

fn context() -> Context {
    let mut functions = FunctionRegistry::new();
    functions.register(
        "join",
        Function::native(
            vec![
                Param::new("separator", Type::String),
                Param::new("list", Type::list(Type::String)),
            ],
            |args| {
                let sep = args[0].as_str().unwrap_or_default();
                let parts: Vec<&str> = args[1]
                    .as_sequence()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                Ok(Value::string(parts.join(sep)))
            },
        ),
    );
    functions.register(
        "fail",
        Function::native(vec![Param::new("message", Type::String)], |args| {
            Err(FunctionError::failed(args[0].as_str().unwrap_or_default()))
        }),
    );
    functions.register("try", Function::try_fn());
    functions.register("can", Function::can_fn());

    let mut local = tfunk_runtime::Attrs::new();
    local.insert("env".to_string(), Value::from("dev"));
    local.insert(
        "regions".to_string(),
        Value::tuple(vec![Value::from("eu-west-1"), Value::from("us-east-1")]),
    );
    Context::new(functions).with_variable("local", Value::object(local))
}

fn eval_hcl(source: &str) -> String {
    let expr = parse_expression(source).expect("Failed to parse");
    let value = evaluate(&expr, &context(), &SourceMap::new(EXPRESSION_NAME, source))
        .expect("Failed to evaluate");
    let compact = marshal(&value, &value.ty()).expect("Failed to marshal");
    String::from_utf8(indent(&compact).expect("Failed to indent")).expect("Invalid UTF-8")
}

fn eval_hcl_result(source: &str) -> String {
    let expr = match parse_expression(source) {
        Ok(e) => e,
        Err(diags) => return format!("Parse error: {}", diags),
    };
    match evaluate(&expr, &context(), &SourceMap::new(EXPRESSION_NAME, source)) {
        Ok(value) => format!("{:?}", value),
        Err(diags) => format!("Eval error: {}", diags),
    }
}

// =============================================================================
// Literals and operators
// =============================================================================

#[test]
fn test_literals() {
    insta::assert_snapshot!(eval_hcl(r#"[null, true, 42, 1.5, "hi"]"#), @r#"
    [
      null,
      true,
      42,
      1.5,
      "hi"
    ]
    "#);
}

#[test]
fn test_arithmetic_normalizes_integers() {
    insta::assert_snapshot!(eval_hcl("{sum = 1 + 2 * 3, div = 10 / 4, whole = 4 / 2, mod = 17 % 5}"), @r#"
    {
      "div": 2.5,
      "mod": 2,
      "sum": 7,
      "whole": 2
    }
    "#);
}

#[test]
fn test_object_keys_sorted() {
    insta::assert_snapshot!(eval_hcl(r#"{zeta = 1, "alpha" = 2, (local.env) = 3}"#), @r#"
    {
      "alpha": 2,
      "dev": 3,
      "zeta": 1
    }
    "#);
}

// =============================================================================
// Variables, templates, functions
// =============================================================================

#[test]
fn test_template_interpolation() {
    insta::assert_snapshot!(eval_hcl(r#""${local.env}-${join(",", local.regions)}""#), @r#""dev-eu-west-1,us-east-1""#);
}

#[test]
fn test_heredoc_with_directives() {
    let source = "<<-EOT\n  %{ for r in local.regions ~}\n  - ${r}\n  %{ endfor ~}\nEOT";
    insta::assert_snapshot!(eval_hcl(source), @r#""- eu-west-1\n- us-east-1\n""#);
}

#[test]
fn test_for_and_splat() {
    insta::assert_snapshot!(eval_hcl("[for r in local.regions : {name = r}][*].name"), @r#"
    [
      "eu-west-1",
      "us-east-1"
    ]
    "#);
}

#[test]
fn test_try_falls_back() {
    insta::assert_snapshot!(eval_hcl(r#"try(local.missing, fail("boom"), "fallback")"#), @r#""fallback""#);
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_unknown_attribute() {
    insta::assert_snapshot!(eval_hcl_result("local.nope"), @r#"Eval error: <expression>:1,7-11: Unsupported attribute; This object does not have an attribute named "nope"."#);
}

#[test]
fn test_function_failure() {
    insta::assert_snapshot!(eval_hcl_result(r#"fail("boom")"#), @r#"Eval error: <expression>:1,1-13: Error in function call; Call to function "fail" failed: boom."#);
}

#[test]
fn test_argument_type_error() {
    insta::assert_snapshot!(eval_hcl_result(r#"join(",", {a = 1})"#), @r#"Eval error: <expression>:1,11-18: Invalid function argument; Invalid value for "list" parameter: list of string required."#);
}

#[test]
fn test_parse_error_position() {
    let result = eval_hcl_result("local.env +");
    assert!(
        result.starts_with("Parse error: <expression>:1,12"),
        "unexpected: {}",
        result
    );
}
