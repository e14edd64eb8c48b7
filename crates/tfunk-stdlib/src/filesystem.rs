//! Filesystem functions. Relative paths resolve against the working
//! directory of the run options.

use std::fs;
use std::io;
use std::path::Path;

use tfunk_parser::{parse_template, Expr, ExprKind};
use tfunk_runtime::{
    evaluate, Context, Function, FunctionError, FunctionRegistry, Param, Type, Value,
};

use crate::args::{attrs_arg, str_arg};
use crate::options::RunOptions;

pub fn register(registry: &mut FunctionRegistry, options: &RunOptions) {
    let opts = options.clone();
    registry.register(
        "file",
        Function::native(vec![Param::new("path", Type::String)], move |args| {
            read_file(&opts, str_arg(args, 0)?).map(Value::from)
        }),
    );

    let opts = options.clone();
    registry.register(
        "fileexists",
        Function::native(vec![Param::new("path", Type::String)], move |args| {
            let path = str_arg(args, 0)?;
            match fs::metadata(opts.resolve(path)) {
                Ok(meta) if meta.is_file() => Ok(Value::Bool(true)),
                Ok(_) => Err(FunctionError::failed(format!("{} is not a regular file", path))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Value::Bool(false)),
                Err(e) => Err(FunctionError::failed(format!("failed to stat {}: {}", path, e))),
            }
        }),
    );

    let opts = options.clone();
    registry.register(
        "fileset",
        Function::native(
            vec![Param::new("path", Type::String), Param::new("pattern", Type::String)],
            move |args| {
                let base = opts.resolve(str_arg(args, 0)?);
                let pattern = format!(
                    "{}/{}",
                    glob::Pattern::escape(&base.to_string_lossy()),
                    str_arg(args, 1)?
                );
                let paths = glob::glob(&pattern)
                    .map_err(|e| FunctionError::arg(1, format!("failed to glob pattern: {}", e)))?;

                let mut matches = Vec::new();
                for entry in paths {
                    let path = entry.map_err(|e| FunctionError::failed(e.to_string()))?;
                    if !path.is_file() {
                        continue;
                    }
                    if let Ok(rel) = path.strip_prefix(&base) {
                        matches.push(Value::string(slash_path(rel)));
                    }
                }
                Ok(Value::set(Type::String, matches))
            },
        ),
    );

    let opts = options.clone();
    registry.register(
        "abspath",
        Function::native(vec![Param::new("path", Type::String)], move |args| {
            let path = opts.resolve(str_arg(args, 0)?);
            Ok(Value::string(clean_path(&slash_path(&path))))
        }),
    );

    registry.register(
        "basename",
        Function::native(vec![Param::new("path", Type::String)], |args| {
            Ok(Value::string(basename(str_arg(args, 0)?)))
        }),
    );
    registry.register(
        "dirname",
        Function::native(vec![Param::new("path", Type::String)], |args| {
            Ok(Value::string(dirname(str_arg(args, 0)?)))
        }),
    );

    let opts = options.clone();
    registry.register(
        "pathexpand",
        Function::native(vec![Param::new("path", Type::String)], move |args| {
            let path = str_arg(args, 0)?;
            let Some(rest) = path.strip_prefix('~') else {
                return Ok(Value::string(path));
            };
            if !rest.is_empty() && !rest.starts_with('/') {
                return Ok(Value::string(path));
            }
            let home = opts
                .env
                .get("HOME")
                .or_else(|| opts.env.get("USERPROFILE"))
                .ok_or_else(|| FunctionError::failed("cannot determine the home directory"))?;
            Ok(Value::string(format!("{}{}", home, rest)))
        }),
    );

    let opts = options.clone();
    registry.register(
        "templatefile",
        Function::native(
            vec![Param::new("path", Type::String), Param::new("vars", Type::Dynamic)],
            move |args| render_template_file(&opts, str_arg(args, 0)?, &args[1]),
        ),
    );
}

fn read_file(options: &RunOptions, path: &str) -> Result<String, FunctionError> {
    let resolved = options.resolve(path);
    tracing::debug!(path = %resolved.display(), "reading file");
    match fs::read(&resolved) {
        Ok(bytes) => String::from_utf8(bytes).map_err(|_| {
            FunctionError::failed(format!(
                "contents of {} are not valid UTF-8; use the filebase64 function to obtain the Base64 encoded contents",
                path
            ))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FunctionError::failed(format!(
            "no file exists at {}; this function works only with files that are distributed as part of the configuration source code",
            path
        ))),
        Err(e) => Err(FunctionError::failed(format!("failed to read {}: {}", path, e))),
    }
}

fn render_template_file(
    options: &RunOptions,
    path: &str,
    vars: &Value,
) -> Result<Value, FunctionError> {
    let source = read_file(options, path)?;
    let template = parse_template(&source, path)
        .map_err(|diags| FunctionError::failed(diags.to_string()))?;
    let expr = Expr::new(ExprKind::Template(template.clone()), template.span);

    let mut functions = crate::stdlib_registry(options);
    functions.register(
        "templatefile",
        Function::native(Vec::new(), |_| {
            Err(FunctionError::failed(
                "cannot recursively call templatefile from inside templatefile call",
            ))
        })
        .with_variadic(Param::new("args", Type::Dynamic).nullable()),
    );
    let mut ctx = Context::new(functions);
    if !vars.is_null() {
        for (name, value) in attrs_arg(std::slice::from_ref(vars), 0)
            .map_err(|_| FunctionError::arg(1, "vars must be a map or object"))?
        {
            ctx.set_variable(name.clone(), value.clone());
        }
    }

    let map = tfunk_parser::SourceMap::new(path, &source);
    evaluate(&expr, &ctx, &map).map_err(|diags| FunctionError::failed(diags.to_string()))
}

/// Path with `/` separators
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
        .replacen("//", "/", 1)
}

/// Lexically clean a slash-separated path
pub(crate) fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn basename(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => clean_path(&path[..i]),
        None => ".".to_string(),
    }
}
