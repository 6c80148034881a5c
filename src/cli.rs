//! The `quirrelc` binary's command surface (§6.1): a single `emit`
//! subcommand that deserializes a JSON fixture, runs it through the
//! library's `emit()` entry point, and prints the resulting instructions one
//! per line. Split out of `main.rs` and named `Cli`/`Command` the way the
//! teacher's own `cli::build`/`cli::hash` etc. are, scaled down to the one
//! subcommand this crate actually needs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::fixture::{FixtureLoadError, FixtureNode};

#[derive(Parser)]
#[command(
    name = "quirrelc",
    version,
    about = "Quirrel bytecode emitter — lowers an elaborated AST fixture to stack-VM instructions"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Emit bytecode for an AST fixture
    Emit {
        /// Path to a JSON fixture (see `src/fixture.rs` for the schema)
        fixture: PathBuf,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Fixture(#[from] FixtureLoadError),
    #[error(transparent)]
    Emit(#[from] crate::error::EmitError),
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Emit { fixture } => cmd_emit(fixture),
    }
}

fn cmd_emit(path: PathBuf) -> Result<(), CliError> {
    let text = std::fs::read_to_string(&path).map_err(|source| CliError::Read {
        path: path.clone(),
        source,
    })?;
    let ast = FixtureNode::from_json(&text)?;
    let bytecode = crate::emit::emit(&ast)?;
    for instr in &bytecode {
        println!("{instr}");
    }
    Ok(())
}
