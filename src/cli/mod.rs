//! CLI module for repo-updater - command-line interface and subcommands.

pub mod commands;

pub use commands::{Cli, Commands};
