//! Command-line arguments

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

/// Expression evaluated when none is given
pub const DEFAULT_EXPRESSION: &str = r#"read_terragrunt_config("terragrunt.hcl")"#;

/// Flags that may also be spelled with a single leading dash
const LONG_FLAGS: &[&str] = &["expression", "workdir", "verbose", "help", "version"];

/// Flags whose value may follow as the next argument
const VALUE_FLAGS: &[&str] = &["expression", "workdir"];

#[derive(Debug, Parser)]
#[command(name = "tfunk")]
#[command(version, about = "Evaluate an HCL expression the way Terragrunt would and print it as JSON", long_about = None)]
pub struct Cli {
    /// The HCL expression to evaluate
    #[arg(long, default_value = DEFAULT_EXPRESSION, allow_hyphen_values = true)]
    pub expression: String,

    /// Directory that relative paths in functions resolve against
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Log the working directory, expression and value before the result
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub verbose: bool,

    /// Positional arguments are not accepted
    #[arg(hide = true)]
    pub extra: Vec<String>,
}

/// Rewrite `-flag` and `-flag=value` to their double-dash form so the
/// single-dash spelling keeps working
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut normalized = Vec::new();
    let mut value_next = false;
    let mut terminated = false;

    for (i, arg) in args.into_iter().enumerate() {
        if i == 0 || terminated || value_next {
            value_next = false;
            normalized.push(arg);
            continue;
        }
        if arg == "--" {
            terminated = true;
            normalized.push(arg);
            continue;
        }

        let name = arg
            .strip_prefix("--")
            .or_else(|| arg.strip_prefix('-'))
            .map(|rest| rest.split_once('=').map_or(rest, |(name, _)| name));
        match name {
            Some(name) if LONG_FLAGS.contains(&name) => {
                value_next = VALUE_FLAGS.contains(&name) && !arg.contains('=');
                if arg.starts_with("--") {
                    normalized.push(arg);
                } else {
                    normalized.push(format!("-{}", arg));
                }
            }
            _ => normalized.push(arg),
        }
    }
    normalized
}
