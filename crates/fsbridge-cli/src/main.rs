//! # fsbridge CLI
//!
//! Command-line interface for mounting stores as Windows volumes.
//!
//! ## Commands
//!
//! - `fsbridge mount <source> [mount-point]` - Mount a host directory
//! - `fsbridge mounts` - List volumes the driver has mounted
//! - `fsbridge config` - Show or write the configuration file
//!
//! ## Example Usage
//!
//! ```bash
//! # Mirror a directory read-only on M:
//! fsbridge mount C:\data M:
//!
//! # Allow changes to go through to the directory
//! fsbridge mount C:\data M: --writable --label Data
//!
//! # What is mounted right now
//! fsbridge mounts --output json
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// fsbridge - expose a store as a Windows volume
#[derive(Parser)]
#[command(name = "fsbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a host directory and serve it until Enter is pressed
    Mount {
        /// Directory to expose
        source: PathBuf,

        /// Drive letter or empty NTFS folder
        #[arg(default_value = "X:")]
        mount_point: String,

        /// Pass writes, deletes and renames through to the directory
        #[arg(short, long)]
        writable: bool,

        /// Volume label (overrides the configuration file)
        #[arg(short, long)]
        label: Option<String>,
    },

    /// List volumes currently mounted through the driver
    Mounts {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the default location instead
        #[arg(short, long)]
        write: bool,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => fsbridge_core::Config::load_from(path)?,
        None => fsbridge_core::Config::load()?,
    };

    // Setup logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.general.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Mount {
            source,
            mount_point,
            writable,
            label,
        } => commands::mount::run(config, &source, &mount_point, writable, label),
        Commands::Mounts { output } => commands::mounts::run(config, output),
        Commands::Config { write } => commands::config::run(config, cli.config, write),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mount_defaults() {
        let cli = Cli::try_parse_from(["fsbridge", "mount", "C:\\data"]).unwrap();
        match cli.command {
            Commands::Mount {
                source,
                mount_point,
                writable,
                label,
            } => {
                assert_eq!(source, PathBuf::from("C:\\data"));
                assert_eq!(mount_point, "X:");
                assert!(!writable);
                assert!(label.is_none());
            }
            _ => panic!("expected mount"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["fsbridge", "mounts", "-vv", "--output", "JSON"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Mounts {
                output: OutputFormat::Json
            }
        ));
        assert!(Cli::try_parse_from(["fsbridge", "mounts", "-o", "yaml"]).is_err());
    }
}
