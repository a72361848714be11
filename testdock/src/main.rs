//! # testdock Main Entry Point
//!
//! File: testdock/src/main.rs
//!
//! ## Overview
//!
//! Entry point of the `testdock` CLI, a thin shell over the library for poking at
//! images and containers by hand:
//! - Command-line argument parsing using Clap
//! - Setting up logging based on the `-v` count
//! - Routing execution to the command handlers
//!
//! ## Examples
//!
//! ```bash
//! testdock image pull alpine
//! testdock image exists alpine:latest
//! testdock -v run nginx:latest -p 80
//! ```
//!
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

/// Top-level command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "testdock",
    about = "Build, pull and run throwaway Docker images and containers",
    propagate_version = true,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Build, pull, inspect and remove images.
    #[command(alias = "i")]
    Image(commands::image::ImageArgs),
    /// Run a container until Ctrl-C, then remove it.
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", cli);

    let command_result = match cli.command {
        Commands::Image(args) => commands::image::handle_image(args).await,
        Commands::Run(args) => commands::run::handle_run(args).await,
    };

    if let Err(e) = command_result {
        tracing::error!("Command execution failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["testdock", "-vv", "image", "exists", "alpine"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let cli = Cli::try_parse_from(["testdock", "image", "exists", "alpine", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }
}
