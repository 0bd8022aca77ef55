//! Replays a recorded window topology through the layout engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pochi_commons::{MemoryErrorReporter, MemoryTelemetry};
use pochi_config::LayoutConfig;
use pochi_core::host::memory::HostSnapshot;
use pochi_core::{
    ApplyOptions, GroupType, LayoutManager, LayoutState, LayoutTelemetryEvent, ManagerOptions,
    MemoryHost, TabGroup, WindowHost,
};
use serde::{Deserialize, Serialize};

const APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Scenario file: a host snapshot plus optional defaults for the run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub cycle_focus: bool,
    pub host: HostSnapshot,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scenario: {}", path.display()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulationOptions {
    /// Overrides the scenario's cwd.
    pub cwd: Option<PathBuf>,
    pub cycle_focus: bool,
    pub config: LayoutConfig,
}

/// One group as printed by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub view_column: usize,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub tabs: Vec<String>,
    pub active: bool,
    pub locked: bool,
}

impl From<&TabGroup> for GroupSummary {
    fn from(group: &TabGroup) -> Self {
        Self {
            view_column: group.view_column,
            group_type: group.group_type(),
            tabs: group.tabs.iter().map(|tab| tab.label.clone()).collect(),
            active: group.is_active,
            locked: group.is_locked,
        }
    }
}

pub fn summarize(host: &dyn WindowHost) -> Vec<GroupSummary> {
    host.tab_groups().iter().map(GroupSummary::from).collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub state: LayoutState,
    pub valid: bool,
    pub before: Vec<GroupSummary>,
    pub after: Vec<GroupSummary>,
    pub commands: Vec<&'static str>,
    pub telemetry: Vec<LayoutTelemetryEvent>,
    pub errors: Vec<String>,
}

/// A [`LayoutManager`] driving an in-memory host.
pub struct Simulation {
    host: Arc<MemoryHost>,
    manager: LayoutManager,
    telemetry: MemoryTelemetry<LayoutTelemetryEvent>,
    reporter: Arc<MemoryErrorReporter>,
    apply: ApplyOptions,
}

impl Simulation {
    /// Loads the host and enables the engine. Must be called from within a
    /// Tokio runtime.
    pub fn new(scenario: Scenario, options: SimulationOptions) -> Result<Self> {
        let host =
            Arc::new(MemoryHost::from_snapshot(scenario.host).context("Invalid host snapshot")?);
        let cwd = options.cwd.or(scenario.cwd);

        let mut manager_options = ManagerOptions::from_config(&options.config);
        manager_options.workspace_cwd = cwd.clone();
        let telemetry = MemoryTelemetry::new();
        let reporter = Arc::new(MemoryErrorReporter::new());
        let manager = LayoutManager::with_observers(
            host.clone(),
            manager_options,
            Arc::new(telemetry.clone()),
            reporter.clone(),
        );

        Ok(Self {
            host,
            manager,
            telemetry,
            reporter,
            apply: ApplyOptions {
                cwd,
                cycle_focus: options.cycle_focus || scenario.cycle_focus,
            },
        })
    }

    pub fn host(&self) -> &Arc<MemoryHost> {
        &self.host
    }

    pub fn manager(&self) -> &LayoutManager {
        &self.manager
    }

    /// Enables the engine, waits for the first validation and runs one
    /// manual apply.
    pub async fn run(&self) -> Result<SimulationReport> {
        let before = summarize(self.host.as_ref());
        let mut states = self.manager.subscribe_state();

        self.manager.set_enabled(true).await;
        tokio::time::timeout(
            APPLY_TIMEOUT,
            states.wait_for(|state| *state != LayoutState::Initial),
        )
        .await
        .context("Timed out validating the initial layout")?
        .context("Layout manager stopped")?;

        self.manager.start_apply_pochi_layout(self.apply.clone());
        if self.manager.state() != LayoutState::ApplyInProgress {
            bail!("Layout manager refused to apply from {}", self.manager.state());
        }
        tokio::time::timeout(
            APPLY_TIMEOUT,
            states.wait_for(|state| *state != LayoutState::ApplyInProgress),
        )
        .await
        .context("Timed out applying the layout")?
        .context("Layout manager stopped")?;

        let valid = self.manager.validate().await;
        Ok(SimulationReport {
            state: self.manager.state(),
            valid,
            before,
            after: summarize(self.host.as_ref()),
            commands: self.host.command_ids(),
            telemetry: self.telemetry.take(),
            errors: self.reporter.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pochi_core::TabInput;
    use pochi_core::host::memory::GroupSnapshot;

    fn scenario(groups: Vec<Vec<TabInput>>) -> Scenario {
        Scenario {
            cwd: Some(PathBuf::from("/work")),
            cycle_focus: false,
            host: HostSnapshot {
                groups: groups.into_iter().map(GroupSnapshot::with_tabs).collect(),
                ..HostSnapshot::default()
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scattered_tabs_end_up_in_three_columns() {
        let simulation = Simulation::new(
            scenario(vec![
                vec![
                    TabInput::text("file:///work/a.rs"),
                    TabInput::task("pochi-task:///1?cwd=%2Fwork"),
                ],
                vec![TabInput::text("file:///work/b.rs")],
            ]),
            SimulationOptions::default(),
        )
        .expect("simulation");

        let report = simulation.run().await.expect("report");

        assert_eq!(report.state, LayoutState::PochiLayout);
        assert!(report.valid);
        assert_eq!(report.before.len(), 2);
        let types: Vec<GroupType> = report.after.iter().map(|group| group.group_type).collect();
        assert_eq!(
            types,
            vec![GroupType::Task, GroupType::Editor, GroupType::Terminal]
        );
        assert!(report.errors.is_empty());
        assert!(report.commands.contains(&"workbench.action.movePanelToSidePanel"));
    }

    #[test]
    fn parses_scenario_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scenario.json");
        fs::write(
            &path,
            r#"{
                "cwd": "/work",
                "host": {
                    "groups": [
                        { "tabs": [{ "kind": "text", "uri": "file:///work/a.rs" }] }
                    ]
                }
            }"#,
        )
        .expect("write");

        let scenario = Scenario::from_file(&path).expect("scenario");
        assert_eq!(scenario.cwd, Some(PathBuf::from("/work")));
        assert_eq!(scenario.host.groups.len(), 1);
        assert!(Scenario::from_file(&dir.path().join("missing.json")).is_err());
    }
}
