//! Terragrunt built-in functions

use std::fs;
use std::path::{Path, PathBuf};

use tfunk_parser::{parse_body, SourceMap};
use tfunk_runtime::json::to_json;
use tfunk_runtime::{Attrs, Context, Function, FunctionError, FunctionRegistry, Param, Type, Value};

use crate::args::{optional, str_arg, string_list};
use crate::config::{read_config, ConfigError};
use crate::filesystem::{clean_path, slash_path};
use crate::options::{RunOptions, DEFAULT_CONFIG_NAME};

/// How many parent folders `find_in_parent_folders` checks before giving up
const MAX_PARENT_FOLDERS: usize = 100;

const COMMANDS_NEEDING_VARS: &[&str] =
    &["apply", "console", "destroy", "import", "plan", "push", "refresh"];
const COMMANDS_NEEDING_INPUT: &[&str] = &["apply", "import", "init", "plan", "refresh"];
const COMMANDS_NEEDING_LOCKING: &[&str] = &[
    "apply", "destroy", "import", "init", "plan", "refresh", "taint", "untaint",
];
const COMMANDS_NEEDING_PARALLELISM: &[&str] = &["apply", "plan", "destroy"];

pub fn register(registry: &mut FunctionRegistry, options: &RunOptions) {
    let opts = options.clone();
    registry.register(
        "get_env",
        Function::native(vec![Param::new("name", Type::String)], move |args| {
            let name = str_arg(args, 0)?;
            let value = match opts.env.get(name) {
                Some(value) => value.clone(),
                None => optional(args, 1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
            Ok(Value::string(value))
        })
        .with_variadic(Param::new("default", Type::String).nullable()),
    );

    let opts = options.clone();
    registry.register(
        "find_in_parent_folders",
        Function::native(Vec::new(), move |args| {
            if args.len() > 2 {
                return Err(FunctionError::failed(format!(
                    "expected at most 2 arguments, got {}",
                    args.len()
                )));
            }
            let name = optional(args, 0)
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_CONFIG_NAME);
            match find_in_parent_folders(opts.config_dir(), name) {
                Some(found) => Ok(Value::string(slash_path(&found))),
                None => optional(args, 1).cloned().ok_or_else(|| {
                    FunctionError::failed(format!(
                        "could not find a {} in any of the parent folders of {}",
                        name,
                        opts.config_path.display()
                    ))
                }),
            }
        })
        .with_variadic(Param::new("args", Type::String).nullable()),
    );

    let opts = options.clone();
    registry.register("get_terragrunt_dir", path_fn(move || Ok(opts.config_dir().to_path_buf())));
    let opts = options.clone();
    registry.register(
        "get_original_terragrunt_dir",
        path_fn(move || {
            Ok(opts
                .original_config_path
                .parent()
                .unwrap_or(&opts.working_dir)
                .to_path_buf())
        }),
    );
    // Without include merging the parent is the configuration itself
    let opts = options.clone();
    registry.register(
        "get_parent_terragrunt_dir",
        path_fn(move || Ok(opts.config_dir().to_path_buf())),
    );
    let opts = options.clone();
    registry.register("get_working_dir", path_fn(move || Ok(opts.config_dir().to_path_buf())));

    let opts = options.clone();
    registry.register("get_repo_root", path_fn(move || repo_root(opts.config_dir())));
    let opts = options.clone();
    registry.register(
        "get_path_from_repo_root",
        Function::native(Vec::new(), move |_| {
            let dir = opts.config_dir();
            let root = repo_root(dir)?;
            let rel = dir.strip_prefix(&root).unwrap_or(Path::new(""));
            Ok(Value::string(relative_or_dot(rel)))
        }),
    );
    let opts = options.clone();
    registry.register(
        "get_path_to_repo_root",
        Function::native(Vec::new(), move |_| {
            let dir = opts.config_dir();
            let root = repo_root(dir)?;
            let depth = dir
                .strip_prefix(&root)
                .map(|rel| rel.components().count())
                .unwrap_or(0);
            let up = vec![".."; depth].join("/");
            Ok(Value::string(if up.is_empty() { ".".to_string() } else { up }))
        }),
    );

    registry.register(
        "get_platform",
        Function::native(Vec::new(), |_| Ok(Value::string(platform()))),
    );
    registry.register("path_relative_to_include", constant(Value::string(".")));
    registry.register("path_relative_from_include", constant(Value::string(".")));

    registry.register(
        "get_terraform_commands_that_need_vars",
        commands(COMMANDS_NEEDING_VARS),
    );
    registry.register(
        "get_terraform_commands_that_need_input",
        commands(COMMANDS_NEEDING_INPUT),
    );
    registry.register(
        "get_terraform_commands_that_need_locking",
        commands(COMMANDS_NEEDING_LOCKING),
    );
    registry.register(
        "get_terraform_commands_that_need_parallelism",
        commands(COMMANDS_NEEDING_PARALLELISM),
    );

    let opts = options.clone();
    registry.register(
        "read_tfvars_file",
        Function::native(vec![Param::new("path", Type::String)], move |args| {
            read_tfvars_file(&opts, str_arg(args, 0)?).map(Value::from)
        }),
    );

    let opts = options.clone();
    registry.register(
        "read_terragrunt_config",
        Function::native(vec![Param::new("config_path", Type::String)], move |args| {
            read_terragrunt_config(&opts, str_arg(args, 0)?, optional(args, 1))
        })
        .with_variadic(Param::new("default", Type::Dynamic).nullable()),
    );
}

fn constant(value: Value) -> Function {
    Function::native(Vec::new(), move |_| Ok(value.clone()))
}

fn commands(names: &'static [&'static str]) -> Function {
    Function::native(Vec::new(), move |_| {
        Ok(string_list(names.iter().map(|n| n.to_string())))
    })
}

/// A zero-argument function returning a path with `/` separators
fn path_fn<F>(f: F) -> Function
where
    F: Fn() -> Result<PathBuf, FunctionError> + Send + Sync + 'static,
{
    Function::native(Vec::new(), move |_| Ok(Value::string(slash_path(&f()?))))
}

fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn relative_or_dot(rel: &Path) -> String {
    let rel = slash_path(rel);
    if rel.is_empty() {
        ".".to_string()
    } else {
        clean_path(&rel)
    }
}

/// Look for `name` in the parents of `dir`, nearest first
fn find_in_parent_folders(dir: &Path, name: &str) -> Option<PathBuf> {
    dir.ancestors()
        .skip(1)
        .take(MAX_PARENT_FOLDERS)
        .map(|parent| parent.join(name))
        .find(|candidate| candidate.is_file())
}

/// The nearest ancestor of `dir` (itself included) containing `.git`
fn repo_root(dir: &Path) -> Result<PathBuf, FunctionError> {
    dir.ancestors()
        .find(|d| d.join(".git").exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            FunctionError::failed(format!("{} is not inside a git repository", dir.display()))
        })
}

/// Read a variables file and return its contents as a JSON string
fn read_tfvars_file(options: &RunOptions, path: &str) -> Result<String, FunctionError> {
    let resolved = options.resolve(path);
    let text = fs::read_to_string(&resolved).map_err(|e| {
        FunctionError::failed(format!("failed to read variables file {}: {}", path, e))
    })?;

    if resolved.extension().and_then(|ext| ext.to_str()) == Some("json") {
        serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
            FunctionError::failed(format!("could not parse {} as JSON: {}", path, e))
        })?;
        return Ok(text);
    }

    let body = parse_body(&text, path).map_err(|diags| FunctionError::failed(diags.to_string()))?;
    if let Some(block) = body.blocks().next() {
        return Err(FunctionError::failed(format!(
            "blocks are not allowed in variables files, found {:?}",
            block.ident.node
        )));
    }

    // Variables files are plain values: no functions, no variables
    let ctx = Context::empty();
    let source = SourceMap::new(path, &text);
    let mut attrs = Attrs::new();
    for attr in body.attributes() {
        let value = tfunk_runtime::evaluate(&attr.value, &ctx, &source)
            .map_err(|diags| FunctionError::failed(diags.to_string()))?;
        attrs.insert(attr.name.node.clone(), value);
    }
    let value = Value::object(attrs);
    let json = to_json(&value, &value.ty()).map_err(|e| FunctionError::failed(e.to_string()))?;
    serde_json::to_string(&json).map_err(|e| FunctionError::failed(e.to_string()))
}

fn read_terragrunt_config(
    options: &RunOptions,
    path: &str,
    default: Option<&Value>,
) -> Result<Value, FunctionError> {
    let resolved = options.resolve(path);
    if !resolved.is_file() {
        return match default {
            Some(value) => Ok(value.clone()),
            None => Err(FunctionError::failed(format!(
                "terragrunt config {} does not exist",
                resolved.display()
            ))),
        };
    }

    let canonical = resolved.canonicalize().map_err(|e| {
        FunctionError::failed(format!("could not resolve {}: {}", resolved.display(), e))
    })?;
    if options.is_reading(&canonical) {
        return Err(FunctionError::failed(format!(
            "cycle detected: {} is already being read",
            canonical.display()
        )));
    }

    read_config(&options.for_config(&canonical)).map_err(|err| match err {
        ConfigError::Io { .. } => FunctionError::failed(err.to_string()),
        ConfigError::Diagnostics(diags) => FunctionError::failed(diags.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_find_in_parent_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let nested = root.join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("terragrunt.hcl"), "").unwrap();
        fs::write(nested.join("terragrunt.hcl"), "").unwrap();

        assert_eq!(
            find_in_parent_folders(&nested, "terragrunt.hcl"),
            Some(root.join("terragrunt.hcl"))
        );
        assert_eq!(find_in_parent_folders(&nested, "missing.hcl"), None);
    }

    #[test]
    fn test_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("live/prod")).unwrap();
        assert_eq!(repo_root(&root.join("live/prod")).unwrap(), root);
    }

    #[test]
    fn test_read_tfvars_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("test.tfvars"),
            "region = \"us-east-1\"\ncount = 2\n",
        )
        .unwrap();
        let opts = RunOptions::new(dir.path()).unwrap().with_env(HashMap::new());
        let json = read_tfvars_file(&opts, "test.tfvars").unwrap();
        assert_eq!(json, r#"{"count":2,"region":"us-east-1"}"#);
    }

    #[test]
    fn test_platform_name() {
        assert_ne!(platform(), "macos");
    }
}
