//! Lister
//!
//! Browsable directory listing server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use listing::{BaseDirectory, DirectoryLister, Entry};
use server::admission::{AdmissionStore, FileStore};
use server::config::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Lister - browsable directory listings over HTTP.
#[derive(Parser, Debug)]
#[command(name = "lister")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,

        /// Directory to list (overrides the config file)
        #[arg(long, value_name = "DIR")]
        base: Option<PathBuf>,
    },

    /// Print the listing of a directory below the base
    List {
        /// Path relative to the base directory
        #[arg(default_value = "")]
        path: String,

        /// Print the scan result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recorded security incidents
    Incidents {
        /// Number of recent incidents to show
        #[arg(long, short)]
        limit: Option<usize>,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the configuration as TOML
    Config {
        /// Print the built-in defaults instead of the effective configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    if let Commands::Serve { bind, base } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind = *bind;
        }
        if let Some(base) = base {
            config.server.base_dir = base.clone();
        }
    }

    let _log_guard = init_tracing(&config, cli.verbose)?;
    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    match cli.command {
        Commands::Config { default } => {
            let shown = if default { Config::default() } else { config };
            print!("{}", shown.to_toml()?);
        }
        Commands::Serve { .. } => {
            config.validate()?;
            run_server(config).await?;
        }
        Commands::List { path, json } => {
            config.validate()?;
            run_list(&config, &path, json)?;
        }
        Commands::Incidents { limit, json } => {
            config.validate()?;
            run_incidents(&config, limit, json)?;
        }
    }

    Ok(())
}

/// Set up the global subscriber. The returned guard flushes the file writer
/// on drop and must live until exit.
fn init_tracing(config: &Config, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.server.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    match &config.server.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "lister.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

async fn run_server(config: Config) -> Result<()> {
    tracing::info!("Lister starting...");

    let state = Arc::new(server::build_state(&config)?);
    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    server::web::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Lister stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Received shutdown signal, stopping...");
}

fn run_list(config: &Config, path: &str, json: bool) -> Result<()> {
    let base = BaseDirectory::new(&config.server.base_dir)?;
    let lister = DirectoryLister::new(base, config.scan_config()?);
    let result = lister
        .scan_path(path)
        .with_context(|| format!("Failed to list {:?}", path))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.current_path);
    if result.directories.is_empty() && result.files.is_empty() {
        println!("  (empty)");
    }
    for entry in result.directories.iter().chain(result.files.iter()) {
        println!("  {}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &Entry) -> String {
    let name = if entry.is_directory {
        format!("{}/", entry.name)
    } else {
        entry.name.clone()
    };
    format!(
        "{} {:>9}  {}  {}",
        entry.permissions, entry.size_formatted, entry.modified_formatted, name
    )
}

fn run_incidents(config: &Config, limit: Option<usize>, json: bool) -> Result<()> {
    let store = FileStore::new(&config.server.data_dir)?;
    let limit = limit.unwrap_or(config.security.recent_incidents);
    let stats = store
        .stats(limit)
        .context("Failed to read the incident log")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Total incidents: {}", stats.total_incidents);
    if stats.recent_incidents.is_empty() {
        println!("No incidents recorded.");
        return Ok(());
    }

    println!("Recent incidents:");
    for incident in &stats.recent_incidents {
        println!(
            "  {}  {:<26} {:<15} {}  [{}]",
            incident.timestamp,
            incident.kind.to_string(),
            incident.ip, incident.request_uri, incident.user_agent
        );
    }
    Ok(())
}
