//! YMERA control plane binary: loads configuration, initializes tracing,
//! wires every component, and drives the operational CLI (spec §6).
//! Mirrors `cli/src/main.rs`'s `#[tokio::main]` entry point, replacing its
//! HTTP-client submission flow with direct in-process facade calls since
//! this binary *is* the core, not a client of it.

use clap::Parser;

use ymera_core::cli::Cli;
use ymera_core::commands::{self, Outcome};
use ymera_core::wiring;
use ymera_observability::{init_tracing, LoggingConfig};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let config = match ymera_config::YmeraConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return std::process::ExitCode::from(2);
        }
    };

    if let Err(err) = init_tracing(&LoggingConfig::default()) {
        eprintln!("tracing already initialized: {err}");
    }

    let (core, _adapter, _durable_log) = wiring::build_in_memory(&config);

    let outcome = commands::dispatch(&core, cli.command).await;
    match &outcome {
        Outcome::Success(message) => println!("{message}"),
        Outcome::OperationError(message) | Outcome::InputError(message) => eprintln!("{message}"),
    }

    std::process::ExitCode::from(outcome.exit_code() as u8)
}
