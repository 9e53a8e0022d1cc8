//! # jumpgate
//!
//! Pick a build/test host, run commands on it, or fan a command out over
//! every configured host.
//!
//! ## Commands
//!
//! - `choose`: Print the host that would be used
//! - `run`: Run a command on one host
//! - `fan-out`: Run a command on every host concurrently
//! - `docker-version`: Print a host's Docker server version
//!
//! ## Example
//!
//! ```bash
//! # Random reachable host from jumpgate.toml
//! jumpgate choose
//!
//! # Second configured host, no connectivity check
//! jumpgate run --host 2 -- uname -a
//!
//! # Every host, stop on the first failure
//! jumpgate --hosts build-1,build-2 fan-out --fail-fast -- df -h /
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use jumpgate_host::{Config, HostPool};

mod commands;

use commands::{choose, docker, fan_out, run};

/// Pick jump hosts and run commands on them.
#[derive(Parser, Debug)]
#[command(name = "jumpgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: jumpgate.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Comma-separated candidate hosts, replacing the configured ones
    #[arg(long, global = true, value_delimiter = ',')]
    hosts: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the chosen host
    Choose {
        /// 1-based host index or a host name
        #[arg(long)]
        host: Option<String>,
    },

    /// Run a command on the chosen host and exit with its exit code
    Run {
        /// 1-based host index or a host name
        #[arg(long)]
        host: Option<String>,

        /// Command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Run a command on every host concurrently
    FanOut {
        /// Abort with the first failure instead of reporting every host
        #[arg(long)]
        fail_fast: bool,

        /// Command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Print the Docker server version of the chosen host
    DockerVersion {
        /// 1-based host index or a host name
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let mut config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    if !cli.hosts.is_empty() {
        config.hosts.candidates = cli.hosts;
    }
    let pool = HostPool::from_config(&config);

    match cli.command {
        Commands::Choose { host } => {
            choose::run(&pool, host.as_deref()).await?;
        }
        Commands::Run { host, command } => {
            let exit_code = run::run(&pool, host.as_deref(), &command).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Commands::FanOut { fail_fast, command } => {
            if !fan_out::run(&pool, &command, fail_fast).await? {
                std::process::exit(1);
            }
        }
        Commands::DockerVersion { host } => {
            docker::run(&pool, host.as_deref()).await?;
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: info).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
