//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: start the scheduler daemon in the foreground
//! - check-config: validate and summarize the configuration
//! - dump: print the latest debug dump

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// repo-updater - keeps mirrored repositories fresh with adaptive backoff
#[derive(Parser, Debug)]
#[command(name = "repo-updater")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler daemon in the foreground
    Run,

    /// Load and validate the configuration
    CheckConfig,

    /// Print the latest debug dump written by the daemon
    Dump {
        /// Dump file to read instead of the configured one
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}
