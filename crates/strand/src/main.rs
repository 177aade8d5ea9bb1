//! Strand - telemetry framing server
//!
//! Listens on the configured TCP/UDP endpoints, frames every connection's
//! byte stream into newline-delimited messages and writes them to stdout,
//! one per line. Diagnostics go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # TCP on 0.0.0.0:6514 with all defaults
//! strand
//!
//! strand --config strand.toml --log-level debug
//! ```

mod output;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use strand_config::{Config, LogFormat, LogLevel, ReceiverConfig};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Strand - telemetry framing server
#[derive(Parser, Debug)]
#[command(name = "strand")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, env = "STRAND_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long)]
    log_level: Option<LogLevel>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let level = cli.log_level.unwrap_or(config.log.level);
    init_logging(&config.log.filter(level), config.log.format)?;

    serve::run(config).await
}

/// Load the config file, or a single default TCP receiver without one
fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config {
            receivers: vec![ReceiverConfig::default()],
            ..Default::default()
        }),
    }
}

/// Install the stderr subscriber; a bad directive string is fatal
fn init_logging(directives: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(directives)
        .with_context(|| format!("invalid log directives '{directives}'"))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}
