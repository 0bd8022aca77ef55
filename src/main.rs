//! Pochi layout CLI
//!
//! Thin binary entry point around the layout engine: replay scenarios,
//! inspect configuration and resolve default documents.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pochi_config::{ConfigManager, DebugConfig};
use pochi_core::default_document::find_default_document;
use pochi_layout::config_watcher::ConfigWatcher;
use pochi_layout::scenario::{Scenario, Simulation, SimulationOptions, summarize};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(
    name = "pochi-layout",
    version,
    about = "Keeps an editor in the Pochi task / editor / terminal layout"
)]
struct Cli {
    /// Workspace whose configuration layers are used (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply the layout to a recorded host snapshot and print the result as JSON
    Simulate {
        /// Scenario file (JSON)
        scenario: PathBuf,
        /// Working directory for tasks, documents and terminals opened during the apply
        #[arg(long, value_name = "DIR")]
        cwd: Option<PathBuf>,
        /// Cycle focus to the next column when the layout is already in place
        #[arg(long)]
        cycle_focus: bool,
        /// Keep running and follow `enabled` changes in the config files
        #[arg(long)]
        watch_config: bool,
    },
    /// Print the document opened when the editor column is empty
    DefaultDocument {
        /// Directory to scan (defaults to the workspace)
        dir: Option<PathBuf>,
        /// Maximum number of files inspected
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let workspace = match &args.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to resolve the current directory")?,
    };
    let manager = if args.workspace.is_some() {
        ConfigManager::load_from_workspace(&workspace)
    } else {
        ConfigManager::load()
    }
    .context("Failed to load configuration")?;

    initialize_tracing(&manager.config().debug).ok();

    match args.command {
        Commands::Simulate {
            scenario,
            cwd,
            cycle_focus,
            watch_config,
        } => {
            let options = SimulationOptions {
                cwd,
                cycle_focus,
                config: manager.config().layout.clone(),
            };
            handle_simulate(&scenario, options, watch_config.then_some(workspace.as_path())).await?;
        }
        Commands::DefaultDocument { dir, limit } => {
            let dir = std::path::absolute(dir.unwrap_or(workspace))
                .context("Failed to resolve the scan directory")?;
            let limit = limit.unwrap_or(manager.config().layout.default_document_scan_limit);
            let document = find_default_document(&dir, limit)
                .await
                .with_context(|| format!("Failed to scan {}", dir.display()))?;
            let output = json!({ "document": document, "uri": document.uri(&dir)? });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Config => {
            if let Some(path) = manager.config_path() {
                tracing::debug!(path = %path.display(), "effective configuration source");
            }
            print!("{}", manager.config().to_toml_string()?);
        }
    }

    Ok(())
}

async fn handle_simulate(
    scenario: &Path,
    options: SimulationOptions,
    watch_workspace: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::from_file(scenario)?;
    let simulation = Simulation::new(scenario, options)?;
    let report = simulation.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let Some(workspace) = watch_workspace else {
        return Ok(());
    };

    let mut watcher = ConfigWatcher::for_workspace(workspace)?;
    watcher.initialize()?;
    let manager = simulation.manager();
    manager.watch_config(watcher.subscribe());
    tracing::info!(paths = ?watcher.watch_paths(), "following configuration changes");

    let mut states = manager.subscribe_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                let output = json!({
                    "enabled": manager.is_enabled(),
                    "state": state,
                    "groups": summarize(simulation.host().as_ref()),
                });
                println!("{output}");
            }
        }
    }

    manager.dispose();
    Ok(())
}

fn initialize_tracing(debug_cfg: &DebugConfig) -> Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;

    // RUST_LOG takes precedence over the config file
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_span_events(FmtSpan::FULL)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| anyhow::anyhow!(error))?;
        return Ok(());
    }

    if !debug_cfg.enable_tracing {
        return Ok(());
    }

    let filter_str = debug_cfg.filter_directive();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&filter_str))
        .with_span_events(FmtSpan::FULL)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!(error))?;

    tracing::info!(
        "Debug tracing enabled: filter={}, level={}",
        filter_str,
        debug_cfg.trace_level.as_str()
    );

    Ok(())
}
