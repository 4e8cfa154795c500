//! # pgo
//!
//! Command-line entry point.
//!
//! - `pgo serve` runs the ingestion server (`POST/GET /profile/{tag}`)
//! - `pgo fetch` downloads a stored profile for a PGO build
//! - `pgo demo` runs a small HTTP service that publishes its own CPU profile
//!   when it shuts down
//!
//! Logs go to stderr. `RUST_LOG` overrides the configured level.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = commands::resolve_server_config(&args)?;
            init_tracing(cli.log_format, &config.log_level);
            commands::cmd_serve(config).await
        }
        Commands::Fetch {
            tag,
            server,
            output,
        } => {
            init_tracing(cli.log_format, "info");
            commands::cmd_fetch(&tag, &server, &output).await
        }
        Commands::Demo {
            server,
            listen,
            tag,
        } => {
            init_tracing(cli.log_format, "debug");
            commands::cmd_demo(&server, listen, &tag).await
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
