//! CLI command implementations

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

pub mod error;
pub mod run;
pub mod status;
pub mod validate;

pub use error::CliError;
pub use run::RunCommand;
pub use status::StatusCommand;
pub use validate::ValidateCommand;

/// OCI Capacity Hunter CLI
#[derive(Parser, Debug)]
#[command(name = "oci-capacity-hunter")]
#[command(about = "Poll Oracle Cloud for scarce compute capacity", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Env file with OCI_* settings (missing file falls back to the environment)
    #[arg(long, global = true, default_value = ".env")]
    pub envfile: PathBuf,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Try to launch an instance
    Run(RunCommand),

    /// Check configuration and signing key without calling the API
    Validate(ValidateCommand),

    /// Show the suspension marker
    Status(StatusCommand),
}
