use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

use repo_updater::config::UpdaterConfig;
use repo_updater::daemon::{Daemon, read_debug_dump};

mod cli;

use cli::{Cli, Commands};

fn setup_logging(verbose: bool) -> Result<PathBuf> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repo-updater")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_path = log_dir.join("repo-updater.log");
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    // Write to the log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized, writing to: {}", log_path.display());
    Ok(log_path)
}

async fn handle_run_command(config_path: Option<PathBuf>, config: UpdaterConfig, log_path: &Path) -> Result<()> {
    let path = UpdaterConfig::resolve_path(config_path.as_ref());
    println!(
        "{} {} sources, logging to {}",
        "Starting repo-updater:".cyan(),
        config.sources.len(),
        log_path.display()
    );

    let daemon = Daemon::new(path, config)?;
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
    });

    daemon.run(cancel).await?;
    println!("{}", "repo-updater stopped".green());
    Ok(())
}

fn handle_check_config_command(config: &UpdaterConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    println!("{}", "Configuration OK".green());
    println!("  update endpoint:     {}", config.update_endpoint);
    println!("  max concurrent:      {}", config.settings().effective_concurrency());
    if config.disable_auto_git_updates {
        println!("  auto git updates:    {}", "disabled".yellow());
    } else {
        println!("  auto git updates:    {}", "enabled".green());
    }
    println!("  debug dump:          {}", config.debug_dump.resolved_path().display());

    for (source, repos) in &config.sources {
        let enabled = repos.iter().filter(|r| r.enabled).count();
        println!("  {} {} repos ({} enabled)", source.cyan(), repos.len(), enabled);
    }
    Ok(())
}

fn handle_dump_command(path: Option<&PathBuf>, config: &UpdaterConfig) -> Result<()> {
    let path = path.cloned().unwrap_or_else(|| config.debug_dump.resolved_path());
    let dump = read_debug_dump(&path)?;
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_path = setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    // Load configuration
    let config = UpdaterConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("Starting with config from: {:?}", cli.config);

    match &cli.command {
        Commands::Run => handle_run_command(cli.config.clone(), config, &log_path).await,
        Commands::CheckConfig => handle_check_config_command(&config),
        Commands::Dump { path } => handle_dump_command(path.as_ref(), &config),
    }
}
