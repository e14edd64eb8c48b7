//! Evaluation context builder
//!
//! [`create_eval_context`] assembles what an expression sees at the top
//! of a Terragrunt configuration: every built-in function bound to the
//! working directory, plus whatever variables the caller already decoded.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tfunk_runtime::{Context, FunctionRegistry, Value};

use crate::options::{RunOptions, DEFAULT_CONFIG_NAME};

/// Values and functions layered over the built-ins
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    /// Exposed as `local`
    pub locals: Option<Value>,
    /// Exposed as `include`
    pub include: Option<Value>,
    /// Exposed as `dependency`
    pub decoded_dependencies: Option<Value>,
    /// Extra functions; may not shadow a built-in
    pub functions: FunctionRegistry,
}

/// Error building an evaluation context
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("could not resolve working directory {path}: {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("working directory {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("function {0:?} is already a built-in function")]
    DuplicateFunction(String),
}

/// Build the evaluation context for expressions evaluated in `workdir`
pub fn create_eval_context(
    workdir: &Path,
    options: &RunOptions,
    extensions: Extensions,
) -> Result<Context, ContextError> {
    let working_dir = workdir
        .canonicalize()
        .map_err(|source| ContextError::WorkingDir {
            path: workdir.to_path_buf(),
            source,
        })?;
    if !working_dir.is_dir() {
        return Err(ContextError::NotADirectory(working_dir));
    }

    let mut options = options.clone();
    if working_dir != options.working_dir {
        tracing::debug!(
            working_dir = %working_dir.display(),
            "rebasing run options on context working directory"
        );
        options.config_path = working_dir.join(
            options
                .config_path
                .file_name()
                .unwrap_or(OsStr::new(DEFAULT_CONFIG_NAME)),
        );
        options.working_dir = working_dir;
    }

    let mut functions = crate::stdlib_registry(&options);
    for name in extensions.functions.names() {
        if functions.contains(name) {
            return Err(ContextError::DuplicateFunction(name.to_string()));
        }
        if let Some(function) = extensions.functions.get(name) {
            functions.register(name, function.clone());
        }
    }
    tracing::debug!(functions = functions.len(), "built evaluation context");

    let mut ctx = Context::new(functions);
    let variables = [
        ("local", extensions.locals),
        ("include", extensions.include),
        ("dependency", extensions.decoded_dependencies),
    ];
    for (name, value) in variables {
        if let Some(value) = value {
            ctx.set_variable(name, value);
        }
    }
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfunk_runtime::{EvalContext, Function, Param, Type};

    #[test]
    fn test_context_has_builtins_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions::new(dir.path()).unwrap();

        let mut functions = FunctionRegistry::new();
        functions.register(
            "greet",
            Function::native(vec![Param::new("name", Type::String)], |args| {
                Ok(Value::string(format!("hi {}", args[0].as_str().unwrap_or_default())))
            }),
        );
        let extensions = Extensions {
            locals: Some(Value::empty_object()),
            functions,
            ..Default::default()
        };

        let ctx = create_eval_context(dir.path(), &options, extensions).unwrap();
        assert!(ctx.function("read_terragrunt_config").is_some());
        assert!(ctx.function("greet").is_some());
        assert!(ctx.variable("local").is_some());
        assert!(ctx.variable("dependency").is_none());
    }

    #[test]
    fn test_extension_cannot_shadow_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions::new(dir.path()).unwrap();
        let mut functions = FunctionRegistry::new();
        functions.register("upper", Function::native(Vec::new(), |_| Ok(Value::null())));
        let extensions = Extensions {
            functions,
            ..Default::default()
        };

        let err = create_eval_context(dir.path(), &options, extensions).unwrap_err();
        assert!(matches!(err, ContextError::DuplicateFunction(name) if name == "upper"));
    }

    #[test]
    fn test_missing_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions::new(dir.path()).unwrap();
        let err = create_eval_context(&dir.path().join("gone"), &options, Extensions::default())
            .unwrap_err();
        assert!(matches!(err, ContextError::WorkingDir { .. }));
    }
}
