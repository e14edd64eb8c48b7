//! Reading Terragrunt configuration files into values
//!
//! A configuration body is decoded in the order Terragrunt uses: `locals`
//! first, then `dependency` blocks, then everything else with both in
//! scope. Locals are evaluated lazily so they may refer to each other in
//! any order; a local that depends on itself is reported as a circular
//! reference.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use indexmap::IndexMap;
use thiserror::Error;
use tfunk_parser::{
    parse_body, Block, Body, Diagnostic, Diagnostics, Expr, ExprKind, SourceMap,
};
use tfunk_runtime::{evaluate, Attrs, Context, EvalError, Value};

use crate::options::RunOptions;

/// Block type holding local values
const LOCALS_BLOCK: &str = "locals";
/// Block type declaring another module whose outputs are consumed
const DEPENDENCY_BLOCK: &str = "dependency";

/// Error reading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Diagnostics(#[from] Diagnostics),
}

/// Read and decode the configuration file named by `options.config_path`
pub fn read_config(options: &RunOptions) -> Result<Value, ConfigError> {
    let path = &options.config_path;
    tracing::debug!(path = %path.display(), "reading configuration");
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;

    let filename = path.display().to_string();
    let body = parse_body(&text, &filename)?;
    let source = SourceMap::new(filename, &text);
    let base = Context::new(crate::stdlib_registry(options));
    Ok(decode_config(&body, &base, &source)?)
}

/// Decode a parsed configuration body against `base`
pub fn decode_config(body: &Body, base: &Context, source: &SourceMap) -> Result<Value, Diagnostics> {
    let locals = Locals::collect(body, source)?.evaluate_all(base, source)?;
    let ctx = base.clone().with_variable("local", locals.clone());

    let dependencies = decode_dependencies(body, &ctx, source)?;
    let ctx = match &dependencies {
        Some(deps) => ctx.with_variable("dependency", deps.clone()),
        None => ctx,
    };

    let mut attrs = decode_body(body, &ctx, source, &[LOCALS_BLOCK, DEPENDENCY_BLOCK])?;
    if let Some(deps) = dependencies {
        attrs.insert(DEPENDENCY_BLOCK.to_string(), deps);
    }
    attrs.insert(LOCALS_BLOCK.to_string(), locals);
    Ok(Value::object(attrs))
}

/// Evaluate every attribute and nested block of `body`, skipping blocks
/// whose type is listed in `skip`
fn decode_body(
    body: &Body,
    ctx: &Context,
    source: &SourceMap,
    skip: &[&str],
) -> Result<Attrs, Diagnostics> {
    let mut attrs = Attrs::new();
    for attr in body.attributes() {
        if attrs.contains_key(&attr.name.node) {
            return Err(duplicate_argument(&attr.name.node, attr.name.span, source));
        }
        let value = evaluate(&attr.value, ctx, source)?;
        attrs.insert(attr.name.node.clone(), value);
    }

    let mut by_type: IndexMap<&str, Vec<&Block>> = IndexMap::new();
    for block in body.blocks() {
        if skip.contains(&block.ident.node.as_str()) {
            continue;
        }
        by_type.entry(block.ident.node.as_str()).or_default().push(block);
    }

    for (ty, blocks) in by_type {
        if attrs.contains_key(ty) {
            return Err(duplicate_argument(ty, blocks[0].ident.span, source));
        }
        let value = if blocks.iter().all(|b| b.labels.is_empty()) {
            let mut values = Vec::with_capacity(blocks.len());
            for block in &blocks {
                values.push(Value::object(decode_body(&block.body, ctx, source, &[])?));
            }
            if values.len() == 1 {
                values.remove(0)
            } else {
                Value::tuple(values)
            }
        } else {
            let mut nested = Attrs::new();
            for block in &blocks {
                let labels: Vec<&str> = block.labels.iter().map(|l| l.node.as_str()).collect();
                if labels.is_empty() {
                    return Err(Diagnostic::error("Missing block label")
                        .with_detail(format!(
                            "Every {:?} block in this body must have labels once one does.",
                            ty
                        ))
                        .with_subject(source.range(block.ident.span))
                        .into());
                }
                let value = Value::object(decode_body(&block.body, ctx, source, &[])?);
                insert_labelled(&mut nested, &labels, value);
            }
            Value::object(nested)
        };
        attrs.insert(ty.to_string(), value);
    }
    Ok(attrs)
}

/// Insert `value` under a chain of labels, creating intermediate objects
fn insert_labelled(target: &mut Attrs, labels: &[&str], value: Value) {
    let Some((first, rest)) = labels.split_first() else {
        return;
    };
    if rest.is_empty() {
        target.insert(first.to_string(), value);
        return;
    }
    let mut inner = target
        .get(*first)
        .and_then(Value::as_attrs)
        .cloned()
        .unwrap_or_default();
    insert_labelled(&mut inner, rest, value);
    target.insert(first.to_string(), Value::object(inner));
}

/// `dependency "name" { ... }` blocks become `dependency.name`, with the
/// mocked outputs exposed as `outputs`
fn decode_dependencies(
    body: &Body,
    ctx: &Context,
    source: &SourceMap,
) -> Result<Option<Value>, Diagnostics> {
    let mut deps = Attrs::new();
    let mut any = false;
    for block in body.blocks().filter(|b| b.ident.node == DEPENDENCY_BLOCK) {
        any = true;
        let Some(name) = block.labels.first() else {
            return Err(Diagnostic::error("Missing name for dependency")
                .with_detail("A dependency block must have a single label naming it.")
                .with_subject(source.range(block.ident.span))
                .into());
        };
        if deps.contains_key(&name.node) {
            return Err(Diagnostic::error("Duplicate dependency block")
                .with_detail(format!("A dependency named {:?} was already declared.", name.node))
                .with_subject(source.range(name.span))
                .into());
        }
        let mut attrs = decode_body(&block.body, ctx, source, &[])?;
        let outputs = attrs
            .get("mock_outputs")
            .cloned()
            .unwrap_or_else(Value::empty_object);
        attrs.insert("outputs".to_string(), outputs);
        deps.insert(name.node.clone(), Value::object(attrs));
    }
    Ok(any.then(|| Value::object(deps)))
}

fn duplicate_argument(name: &str, span: tfunk_parser::Span, source: &SourceMap) -> Diagnostics {
    Diagnostic::error("Duplicate argument")
        .with_detail(format!("An argument named {:?} was already set.", name))
        .with_subject(source.range(span))
        .into()
}

// =============================================================================
// Locals
// =============================================================================

#[derive(Debug, Clone)]
enum LocalState {
    Unevaluated,
    Evaluating,
    Evaluated(Value),
}

struct Local<'a> {
    expr: &'a Expr,
    state: RefCell<LocalState>,
}

/// The locals of one body, forced on demand
struct Locals<'a> {
    members: IndexMap<String, Local<'a>>,
}

impl<'a> Locals<'a> {
    fn collect(body: &'a Body, source: &SourceMap) -> Result<Self, Diagnostics> {
        let mut members = IndexMap::new();
        for block in body.blocks().filter(|b| b.ident.node == LOCALS_BLOCK) {
            for attr in block.body.attributes() {
                if members.contains_key(&attr.name.node) {
                    return Err(Diagnostic::error("Duplicate local value definition")
                        .with_detail(format!(
                            "A local value named {:?} was already defined.",
                            attr.name.node
                        ))
                        .with_subject(source.range(attr.name.span))
                        .into());
                }
                members.insert(
                    attr.name.node.clone(),
                    Local {
                        expr: &attr.value,
                        state: RefCell::new(LocalState::Unevaluated),
                    },
                );
            }
            if let Some(nested) = block.body.blocks().next() {
                return Err(Diagnostic::error("Unsupported block type")
                    .with_detail("Blocks are not allowed inside locals.")
                    .with_subject(source.range(nested.ident.span))
                    .into());
            }
        }
        Ok(Self { members })
    }

    fn evaluate_all(&self, base: &Context, source: &SourceMap) -> Result<Value, Diagnostics> {
        let mut values = Attrs::new();
        for name in self.members.keys() {
            values.insert(name.clone(), self.force(name, base, source)?);
        }
        Ok(Value::object(values))
    }

    fn force(&self, name: &str, base: &Context, source: &SourceMap) -> Result<Value, Diagnostics> {
        let Some(local) = self.members.get(name) else {
            return Ok(Value::null());
        };
        let current = local.state.borrow().clone();
        match current {
            LocalState::Evaluated(value) => return Ok(value),
            LocalState::Evaluating => {
                return Err(EvalError::CircularReference(format!("local.{}", name))
                    .at(local.expr.span)
                    .into_diagnostics(source));
            }
            LocalState::Unevaluated => {}
        }

        *local.state.borrow_mut() = LocalState::Evaluating;
        let mut visible = Attrs::new();
        for dep in self.dependencies_of(local.expr) {
            let value = self.force(&dep, base, source)?;
            visible.insert(dep, value);
        }
        let ctx = base.clone().with_variable("local", Value::object(visible));
        let value = evaluate(local.expr, &ctx, source)?;
        tracing::trace!(local = name, "evaluated local");
        *local.state.borrow_mut() = LocalState::Evaluated(value.clone());
        Ok(value)
    }

    /// Names of the locals `expr` refers to. A reference to `local` other
    /// than through a plain attribute access depends on every local.
    fn dependencies_of(&self, expr: &Expr) -> BTreeSet<String> {
        let mut named = BTreeSet::new();
        let mut attr_refs = 0usize;
        let mut bare_refs = 0usize;
        expr.walk(&mut |e| match &e.kind {
            ExprKind::GetAttr { base, name } if base.as_variable() == Some("local") => {
                attr_refs += 1;
                named.insert(name.node.clone());
            }
            ExprKind::Variable(v) if v == "local" => bare_refs += 1,
            _ => {}
        });

        if bare_refs > attr_refs {
            return self.members.keys().cloned().collect();
        }
        named.retain(|n| self.members.contains_key(n));
        named
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfunk_runtime::FunctionRegistry;

    fn decode(src: &str) -> Result<Value, Diagnostics> {
        let body = parse_body(src, "test.hcl").unwrap();
        let source = SourceMap::new("test.hcl", src);
        let mut registry = FunctionRegistry::new();
        crate::register_terraform(&mut registry);
        decode_config(&body, &Context::new(registry), &source)
    }

    fn field<'v>(value: &'v Value, path: &[&str]) -> &'v Value {
        path.iter().fold(value, |v, name| &v.as_attrs().unwrap()[*name])
    }

    #[test]
    fn test_locals_in_any_order() {
        let value = decode(
            r#"
locals {
  full = "${local.name}-${local.env}"
  name = upper("app")
  env  = "dev"
}
result = local.full
"#,
        )
        .unwrap();
        assert_eq!(field(&value, &["result"]).as_str(), Some("APP-dev"));
        assert_eq!(field(&value, &["locals", "name"]).as_str(), Some("APP"));
    }

    #[test]
    fn test_local_cycle() {
        let err = decode("locals {\n  a = local.b\n  b = local.a\n}\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Circular reference"), "{}", message);
    }

    #[test]
    fn test_labelled_and_repeated_blocks() {
        let value = decode(
            r#"
inputs = { size = 3 }
generate "provider" {
  path = "provider.tf"
}
terraform {
  source = "git::repo"
}
hook { name = "a" }
hook { name = "b" }
"#,
        )
        .unwrap();
        assert_eq!(field(&value, &["generate", "provider", "path"]).as_str(), Some("provider.tf"));
        assert_eq!(field(&value, &["terraform", "source"]).as_str(), Some("git::repo"));
        assert_eq!(field(&value, &["hook"]).as_sequence().map(<[Value]>::len), Some(2));
        assert_eq!(field(&value, &["locals"]).length(), Some(0));
    }

    #[test]
    fn test_dependency_mock_outputs() {
        let value = decode(
            r#"
dependency "vpc" {
  config_path  = "../vpc"
  mock_outputs = { vpc_id = "vpc-123" }
}
inputs = { vpc_id = dependency.vpc.outputs.vpc_id }
"#,
        )
        .unwrap();
        assert_eq!(field(&value, &["inputs", "vpc_id"]).as_str(), Some("vpc-123"));
        assert_eq!(
            field(&value, &["dependency", "vpc", "config_path"]).as_str(),
            Some("../vpc")
        );
    }

    #[test]
    fn test_duplicate_attribute() {
        let err = decode("a = 1\na = 2\n").unwrap_err();
        assert!(err.to_string().contains("Duplicate argument"));
    }
}
