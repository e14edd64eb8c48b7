//! tfunk - evaluate HCL expressions the way Terragrunt does
//!
//! # Usage
//!
//! ```text
//! tfunk                                     Read terragrunt.hcl in the current directory
//! tfunk -expression 'get_env("HOME")'       Evaluate an expression
//! tfunk -workdir live/prod -verbose         Evaluate in another directory, logging each step
//! ```

mod cli;
mod env;
mod logging;
mod pipeline;
mod report;

use std::io::Write;

use clap::{CommandFactory, Parser};

use cli::{normalize_args, Cli};
use pipeline::{run_pipeline, Request};

fn main() {
    logging::init();

    let args = std::env::args_os().map(|arg| arg.to_string_lossy().into_owned());
    let cli = Cli::parse_from(normalize_args(args));
    if !cli.extra.is_empty() {
        eprintln!("{}", Cli::command().render_help());
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        for line in e.to_string().lines() {
            tracing::error!("{}", line);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.verbose {
        tracing::info!("Workdir: \n{}\n", cli.workdir.display());
        tracing::info!("Expression: \n{}\n", cli.expression);
    }

    let request = Request {
        expression: cli.expression,
        workdir: cli.workdir,
        env: env::process_environment(),
    };
    let evaluated = run_pipeline(&request)?;

    if cli.verbose {
        tracing::info!("Got Value: \n{:#?}\n", evaluated.value);
        tracing::info!("Got String: \n{}", evaluated.json);
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(evaluated.json.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}
