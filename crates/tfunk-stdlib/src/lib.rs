//! Terraform and Terragrunt standard library
//!
//! This crate provides the built-in functions an expression can call, the
//! run options they are bound to, and the evaluation context builder.

mod args;
mod collections;
pub mod config;
pub mod context;
mod conversion;
mod encoding;
mod filesystem;
mod hash;
mod numeric;
pub mod options;
mod string;
mod terragrunt;

use tfunk_runtime::FunctionRegistry;

pub use config::{decode_config, read_config, ConfigError};
pub use context::{create_eval_context, ContextError, Extensions};
pub use options::{OptionsError, RunOptions, DEFAULT_CONFIG_NAME};

/// Register the Terraform functions that do not touch the filesystem
pub fn register_terraform(registry: &mut FunctionRegistry) {
    numeric::register(registry);
    string::register(registry);
    collections::register(registry);
    encoding::register(registry);
    hash::register(registry);
    conversion::register(registry);
}

/// Register every built-in function, binding path-dependent ones to `options`
pub fn register_stdlib(registry: &mut FunctionRegistry, options: &RunOptions) {
    register_terraform(registry);
    filesystem::register(registry, options);
    terragrunt::register(registry, options);
}

/// Create a function registry with all built-in functions registered
pub fn stdlib_registry(options: &RunOptions) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    register_stdlib(&mut registry, options);
    registry
}
