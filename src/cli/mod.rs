//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::DomainError;

#[derive(Parser)]
#[command(
    name = "parallax",
    about = "Research lifecycle orchestrator with parallel provider execution",
    version
)]
pub struct Cli {
    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the project-local workspace (.parallax/)
    Init(commands::init::InitArgs),
    /// Create, refine, run, and inspect research records
    Research(commands::research::ResearchArgs),
}

/// Print a structured error and exit non-zero. Synchronous calls surface a
/// stable code, the human message, and the correlation id of the command.
pub fn handle_error(err: anyhow::Error, json_output: bool, correlation_id: Uuid) -> ! {
    let code = err
        .downcast_ref::<DomainError>()
        .map_or("internal", DomainError::code);

    if json_output {
        let payload = json!({
            "code": code,
            "message": err.to_string(),
            "correlation_id": correlation_id.to_string(),
        });
        eprintln!("{payload}");
    } else {
        eprintln!("error[{code}]: {err} (correlation: {correlation_id})");
    }
    std::process::exit(1);
}
