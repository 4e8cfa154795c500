//! CLI command definitions using clap.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pcapture::DEFAULT_SERVER_URL;

/// pgo - CPU profile collector
#[derive(Parser, Debug)]
#[command(name = "pgo")]
#[command(version)]
#[command(about = "Collect CPU profiles from running processes, keyed by tag")]
#[command(
    long_about = "pgo runs the profile ingestion server, downloads stored profiles for profile-guided optimization, and ships a small instrumented demo process."
)]
pub struct Cli {
    /// Log output format (written to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ingestion server
    Serve(ServeArgs),

    /// Download a stored profile
    Fetch {
        /// Tag the profile was published under
        #[arg(short, long)]
        tag: String,

        /// Profile endpoint of the server
        #[arg(short, long, default_value = DEFAULT_SERVER_URL)]
        server: String,

        /// Where to write the profile
        #[arg(short, long, default_value = "default.pgo")]
        output: PathBuf,
    },

    /// Run an instrumented HTTP service that publishes its profile on shutdown
    Demo {
        /// Profile endpoint of the server
        #[arg(short, long, default_value = DEFAULT_SERVER_URL)]
        server: String,

        /// Address the demo service listens on
        #[arg(short, long, default_value = "0.0.0.0:8081")]
        listen: SocketAddr,

        /// Tag to publish the profile under
        #[arg(short, long, default_value = "example")]
        tag: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// SQLite database path (overrides the config file)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Seconds to drain in-flight requests on shutdown
    #[arg(long)]
    pub grace_secs: Option<u64>,

    /// Keep profiles in memory only
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,
}
