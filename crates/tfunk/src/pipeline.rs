//! One evaluate-and-serialize run
//!
//! Each stage failure has a fixed disposition:
//!
//! | failure                    | disposition                             |
//! |----------------------------|-----------------------------------------|
//! | run options                | fatal                                   |
//! | evaluation context         | logged, continue with an empty context  |
//! | parse or eval diagnostics  | fatal, every diagnostic reported        |
//! | JSON marshal               | fatal, nothing printed                  |
//! | JSON indent                | logged, compact JSON printed instead    |

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;
use tfunk_parser::{parse_expression, SourceMap, EXPRESSION_NAME};
use tfunk_runtime::{evaluate, indent, marshal, Context, EvalContext, SerializeError, Value};
use tfunk_stdlib::{create_eval_context, ContextError, Extensions, OptionsError, RunOptions};

use crate::report::DiagnosticReport;

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct Request {
    pub expression: String,
    pub workdir: PathBuf,
    pub env: HashMap<String, String>,
}

/// A successfully evaluated expression
#[derive(Debug)]
pub struct Evaluated {
    pub value: Value,
    /// Indented JSON, or compact JSON if indenting failed
    pub json: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Get Options Had The Following Errors: {0}")]
    Options(#[from] OptionsError),

    #[error("{0}")]
    Diagnostics(DiagnosticReport),

    #[error("JSON Marshal Had The Following Errors: {0}")]
    Marshal(#[source] SerializeError),
}

pub fn run_pipeline(request: &Request) -> Result<Evaluated, PipelineError> {
    let options = RunOptions::new(&request.workdir)?.with_env(request.env.clone());
    let ctx = context_or_empty(create_eval_context(
        &request.workdir,
        &options,
        Extensions::default(),
    ));

    let value = evaluate_expression(&request.expression, &ctx)?;
    let json = serialize(&value)?;
    Ok(Evaluated { value, json })
}

/// A context that failed to build is logged and replaced by one with no
/// variables and no functions
fn context_or_empty(result: Result<Context, ContextError>) -> Context {
    match result {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::error!("Create HCL Eval Context Had The Following Errors: {}", err);
            Context::empty()
        }
    }
}

/// Parse and evaluate `text`, collecting diagnostics from whichever stage fails
pub fn evaluate_expression(text: &str, ctx: &dyn EvalContext) -> Result<Value, PipelineError> {
    let expr = parse_expression(text)
        .map_err(|diags| PipelineError::Diagnostics(DiagnosticReport::parse(diags)))?;
    let source = SourceMap::new(EXPRESSION_NAME, text);
    evaluate(&expr, ctx, &source)
        .map_err(|diags| PipelineError::Diagnostics(DiagnosticReport::eval(diags)))
}

fn serialize(value: &Value) -> Result<String, PipelineError> {
    let compact = marshal(value, &value.ty()).map_err(PipelineError::Marshal)?;
    let bytes = match indent(&compact) {
        Ok(pretty) => pretty,
        Err(err) => {
            tracing::error!("JSON Indent Had The Following Errors: {}", err);
            compact
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfunk_runtime::unmarshal;

    fn stdlib_context(dir: &std::path::Path) -> Context {
        let options = RunOptions::new(dir).unwrap();
        create_eval_context(dir, &options, Extensions::default()).unwrap()
    }

    #[test]
    fn test_failed_context_falls_back_to_empty() {
        let ctx = context_or_empty(Err(ContextError::DuplicateFunction("upper".to_string())));
        assert!(ctx.function("upper").is_none());
        assert!(ctx.variable("local").is_none());

        let value = evaluate_expression("{a = [1, 2]}", &ctx).unwrap();
        assert_eq!(serialize(&value).unwrap(), "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
        let err = evaluate_expression(r#"upper("x")"#, &ctx).unwrap_err();
        assert!(err.to_string().contains("Call to unknown function"), "{}", err);
    }

    #[test]
    fn test_collections_survive_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = stdlib_context(dir.path());
        let text = r#"{
            set   = toset(["b", "a", "b"])
            map   = tomap({z = 1, y = 2})
            list  = tolist([true, false])
            tuple = [1, "two", null]
        }"#;
        let value = evaluate_expression(text, &ctx).unwrap();
        let ty = value.ty();
        let bytes = marshal(&value, &ty).unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            r#"{"list":[true,false],"map":{"y":2,"z":1},"set":["a","b"],"tuple":[1,"two",null]}"#
        );
        assert_eq!(unmarshal(&bytes, &ty).unwrap(), value);
    }

    #[test]
    fn test_output_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request {
            expression: r#"{for k in toset(["c", "a", "b"]) : k => upper(k)}"#.to_string(),
            workdir: dir.path().to_path_buf(),
            env: HashMap::new(),
        };
        let first = run_pipeline(&request).unwrap().json;
        for _ in 0..5 {
            assert_eq!(run_pipeline(&request).unwrap().json, first);
        }
        assert_eq!(first, "{\n  \"a\": \"A\",\n  \"b\": \"B\",\n  \"c\": \"C\"\n}");
    }

    #[test]
    fn test_arithmetic_without_context() {
        let value = evaluate_expression("1 + 1", &Context::empty()).unwrap();
        assert_eq!(serialize(&value).unwrap(), "2");
    }

    #[test]
    fn test_object_is_indented() {
        let value = evaluate_expression(r#"{b = "x", a = 1}"#, &Context::empty()).unwrap();
        assert_eq!(
            serialize(&value).unwrap(),
            "{\n  \"a\": 1,\n  \"b\": \"x\"\n}"
        );
    }

    #[test]
    fn test_eval_diagnostics_are_reported() {
        let err = evaluate_expression("nope + 1", &Context::empty()).unwrap_err();
        let PipelineError::Diagnostics(report) = err else {
            panic!("expected diagnostics, got {:?}", err);
        };
        assert!(report.parse.is_empty());
        assert_eq!(report.eval.len(), 1);
        assert_eq!(
            report.lines()[1],
            "ValDiag - <expression>:1,1-5: Unknown variable; There is no variable named \"nope\"."
        );
    }

    #[test]
    fn test_missing_workdir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request {
            expression: "1".to_string(),
            workdir: dir.path().join("missing"),
            env: HashMap::new(),
        };
        let err = run_pipeline(&request).unwrap_err();
        assert!(matches!(err, PipelineError::Options(_)));
        assert!(err.to_string().starts_with("Get Options Had The Following Errors:"));
    }

    #[test]
    fn test_run_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("terragrunt.hcl"), "inputs = { size = 2 }\n").unwrap();
        let request = Request {
            expression: crate::cli::DEFAULT_EXPRESSION.to_string(),
            workdir: dir.path().to_path_buf(),
            env: HashMap::new(),
        };
        let evaluated = run_pipeline(&request).unwrap();
        assert_eq!(
            evaluated.json,
            "{\n  \"inputs\": {\n    \"size\": 2\n  },\n  \"locals\": {}\n}"
        );
    }
}
