//! Command line interface for the `ssetrace` binary.
//!
//! `serve` hosts the streaming JSON-RPC app behind the lifecycle tracker;
//! `probe` runs disconnect scenarios against a running server.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command line arguments for the `ssetrace` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ssetrace",
    version,
    about = "Trace streaming response lifecycles and provoke client disconnects"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the streaming JSON-RPC app with lifecycle tracking.
    Serve(ServeArgs),
    /// Run disconnect scenarios against a server.
    Probe(ProbeArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,
    /// Path of the JSON-RPC endpoint.
    #[arg(long, default_value = "/mcp")]
    pub endpoint: String,
    /// How long `slow_operation` takes, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub slow_ms: u64,
    /// Finish event streams with an empty body when the client leaves.
    #[arg(long)]
    pub close_on_disconnect: bool,
    /// Number of accept workers; defaults to the CPU count.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_bind: Option<SocketAddr>,
}

/// Stock scenario suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuiteChoice {
    /// Immediate and delayed closes of `initialize` requests.
    Reproduce,
    /// Cancellation, handshake abort and a concurrent burst.
    Fast,
    /// Both of the above.
    All,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Endpoint URL of the server under test.
    #[arg(long, default_value = "http://127.0.0.1:8000/mcp")]
    pub url: String,
    /// Stock suite to run.
    #[arg(long, value_enum, default_value_t = SuiteChoice::All)]
    pub suite: SuiteChoice,
    /// Pause between steps, in milliseconds.
    #[arg(long)]
    pub settle_ms: Option<u64>,
    /// Load the suite from a JSON file instead.
    #[arg(long, conflicts_with = "suite")]
    pub scenarios: Option<PathBuf>,
}
