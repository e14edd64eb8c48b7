//! End-to-end tests of the tfunk binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use insta::assert_snapshot;

fn tfunk(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tfunk"))
        .args(args)
        .current_dir(dir)
        .env_remove("TFUNK_LOG")
        .output()
        .expect("failed to run tfunk")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_arithmetic() {
    let dir = tempfile::tempdir().unwrap();
    let output = tfunk(dir.path(), &["-expression", "1 + 1"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "2");
}

#[test]
fn test_object_is_pretty_printed() {
    let dir = tempfile::tempdir().unwrap();
    let output = tfunk(dir.path(), &["-expression", r#"{a = 1, b = "x"}"#]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_snapshot!(stdout(&output), @r#"
    {
      "a": 1,
      "b": "x"
    }
    "#);
}

#[test]
fn test_parse_error_exits_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let output = tfunk(dir.path(), &["-expression", "1 +"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "");
    let err = stderr(&output);
    assert!(err.contains("wrong number of diagnostics 1; want 0"), "{}", err);
    assert!(err.contains("ParseDiag - <expression>:1,"), "{}", err);
    assert!(err.contains("ERROR"), "{}", err);
}

#[test]
fn test_evaluation_error_exits_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let output = tfunk(dir.path(), &["--expression=local.missing"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(
        err.contains("ValDiag - <expression>:1,1-6: Unknown variable"),
        "{}",
        err
    );
}

#[test]
fn test_environment_reaches_get_env() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_tfunk"))
        .args(["-expression", r#"[get_env("A"), get_env("B")]"#])
        .current_dir(dir.path())
        .env_clear()
        .env("A", "1")
        .env("B", "=2")
        .output()
        .expect("failed to run tfunk");
    assert!(output.status.success(), "{}", stderr(&output));
    assert_snapshot!(stdout(&output), @r#"
    [
      "1",
      "=2"
    ]
    "#);
}

#[test]
fn test_positional_argument_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let output = tfunk(dir.path(), &["-expression", "1", "stray"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "");
    let err = stderr(&output);
    assert!(err.contains("--expression"), "{}", err);
    assert!(err.contains("--workdir"), "{}", err);
}

#[test]
fn test_default_expression_reads_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("live")).unwrap();
    fs::write(
        dir.path().join("live/terragrunt.hcl"),
        "locals {\n  env = \"prod\"\n}\ninputs = {\n  env = local.env\n}\n",
    )
    .unwrap();

    let output = tfunk(dir.path(), &["-workdir", "live"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_snapshot!(stdout(&output), @r#"
    {
      "inputs": {
        "env": "prod"
      },
      "locals": {
        "env": "prod"
      }
    }
    "#);
}

#[test]
fn test_missing_workdir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = tfunk(dir.path(), &["-workdir", "nope", "-expression", "1"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "");
    assert!(stderr(&output).contains("Get Options Had The Following Errors"));
}

#[test]
fn test_verbose_logs_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let output = tfunk(dir.path(), &["-verbose", "-expression", "upper(\"x\")"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    for heading in ["Workdir:", "Expression:", "Got Value:", "Got String:"] {
        assert!(out.contains(heading), "missing {} in {}", heading, out);
    }
    assert!(out.contains("INFO"));
    assert!(out.contains("\"X\""));
}
