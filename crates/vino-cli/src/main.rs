//! Vino session client binary entrypoint.
//!
//! This is the main entry point for the `vino-link` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vino_cli::cli::{Cli, Commands};
use vino_cli::commands;
use vino_cli::output::OutputFormat;

fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only events
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vino_link=info,vino_cli=info")),
        )
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Connect(args) => commands::connect(&args, format, &mut stdout).await,
        Commands::InitConfig { output, force } => commands::init_config(&output, force),
        Commands::Endpoint(source) => commands::endpoint(&source, format, &mut stdout),
    }
}
