//! Ponder CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Answer one query with the ReAct loop
//! - `tools`   — List the tools the agent can call
//! - `config`  — Show the effective or default configuration

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ponder_config::{AppConfig, LogFormat, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "ponder",
    about = "Ponder — ReAct reasoning loop for tool-using LLM agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query with the reasoning loop
    Run {
        /// The question or task
        query: String,

        /// Override the iteration budget
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Print the whole result as JSON
        #[arg(long)]
        json: bool,

        /// Print the reasoning trace before the answer
        #[arg(long)]
        trace: bool,

        /// Session identifier recorded with the task
        #[arg(long)]
        session: Option<String>,
    },

    /// List the registered tools
    Tools,

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the effective config
        #[arg(long)]
        default: bool,

        /// Print the config file path only
        #[arg(long, conflicts_with = "default")]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = AppConfig::load();
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging, cli.verbose);

    let outcome: Result<ExitCode, Box<dyn std::error::Error>> = match cli.command {
        Commands::Config { default: true, .. } => {
            commands::config_cmd::show_default().map(|()| ExitCode::SUCCESS)
        }
        Commands::Config { path: true, .. } => {
            commands::config_cmd::path().map(|()| ExitCode::SUCCESS)
        }
        Commands::Tools => commands::tools::run().map(|()| ExitCode::SUCCESS),
        command => match loaded {
            Err(e) => Err(format!("Failed to load config: {e}").into()),
            Ok(config) => match command {
                Commands::Run {
                    query,
                    max_iterations,
                    json,
                    trace,
                    session,
                } => {
                    let args = commands::run::RunArgs {
                        query,
                        max_iterations,
                        json,
                        trace,
                        session,
                    };
                    commands::run::run(&config, args).await
                }
                _ => commands::config_cmd::show(&config).map(|()| ExitCode::SUCCESS),
            },
        },
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  [Error] {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
