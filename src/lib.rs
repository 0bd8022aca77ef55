//! # Pochi Layout
//!
//! Keeps an editor in the Pochi arrangement: task tabs in the left column,
//! editors top right and terminals bottom right. The reconciliation engine
//! lives in [`pochi_core`]; this package wires it to configuration files and
//! ships the `pochi-layout` binary.
//!
//! ## Quickstart
//!
//! ```bash
//! # Print the effective configuration for a workspace
//! pochi-layout --workspace ./my-project config
//!
//! # Replay a recorded window topology and print the reconciled result
//! pochi-layout simulate scenario.json --cwd ./my-project
//!
//! # Show which document would fill an empty editor column
//! pochi-layout default-document ./my-project
//! ```
//!
//! Persist defaults in `pochi.toml` at the workspace root, in
//! `.pochi/pochi.toml`, or in `~/.pochi/pochi.toml`:
//!
//! ```toml
//! [layout]
//! enabled = true
//! trigger_delay_ms = 100
//!
//! [debug]
//! enable_tracing = true
//! trace_level = "debug"
//! ```
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pochi_core::{ApplyOptions, LayoutManager, ManagerOptions, MemoryHost};
//! use pochi_layout::config_watcher::ConfigWatcher;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workspace = std::env::current_dir()?;
//!     let mut watcher = ConfigWatcher::for_workspace(&workspace)?;
//!     watcher.initialize()?;
//!
//!     let host = Arc::new(MemoryHost::new());
//!     let options = ManagerOptions::default().with_workspace(&workspace);
//!     let manager = LayoutManager::new(host, options);
//!     manager.watch_config(watcher.subscribe());
//!     manager.start_apply_pochi_layout(ApplyOptions::default());
//!     Ok(())
//! }
//! ```

pub mod config_watcher;
pub mod scenario;

pub use config_watcher::ConfigWatcher;
pub use scenario::{GroupSummary, Scenario, Simulation, SimulationOptions, SimulationReport};
