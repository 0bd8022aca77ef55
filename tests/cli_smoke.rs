use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn pochi_layout(home: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("pochi-layout")?;
    cmd.env("HOME", home.path())
        .env_remove("POCHI_CONFIG_PATH")
        .env_remove("POCHI_WORKSPACE")
        .env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn pochi_layout_help_command_succeeds() -> Result<()> {
    let home = TempDir::new()?;
    let mut cmd = pochi_layout(&home)?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("simulate"));
    Ok(())
}

#[test]
fn config_command_prints_layered_configuration() -> Result<()> {
    let home = TempDir::new()?;
    let workspace = TempDir::new()?;
    fs::write(
        workspace.path().join("pochi.toml"),
        "[layout]\nenabled = true\ntrigger_delay_ms = 250\n",
    )?;

    let mut cmd = pochi_layout(&home)?;
    cmd.arg("--workspace").arg(workspace.path()).arg("config");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[layout]"))
        .stdout(predicate::str::contains("enabled = true"))
        .stdout(predicate::str::contains("trigger_delay_ms = 250"));
    Ok(())
}

#[test]
fn invalid_configuration_is_rejected() -> Result<()> {
    let home = TempDir::new()?;
    let workspace = TempDir::new()?;
    fs::write(
        workspace.path().join("pochi.toml"),
        "[layout]\ndefault_document_scan_limit = 0\n",
    )?;

    let mut cmd = pochi_layout(&home)?;
    cmd.arg("--workspace").arg(workspace.path()).arg("config");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
    Ok(())
}

#[test]
fn default_document_prefers_the_readme() -> Result<()> {
    let home = TempDir::new()?;
    let workspace = TempDir::new()?;
    fs::create_dir_all(workspace.path().join("src"))?;
    fs::write(workspace.path().join("src/main.rs"), "fn main() {}\n")?;
    fs::write(workspace.path().join("README.md"), "# demo\n")?;

    let mut cmd = pochi_layout(&home)?;
    cmd.arg("--workspace")
        .arg(workspace.path())
        .arg("default-document");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"path\": \"README.md\""));
    Ok(())
}

#[test]
fn simulate_reconciles_a_scattered_window() -> Result<()> {
    let home = TempDir::new()?;
    let workspace = TempDir::new()?;
    let scenario = workspace.path().join("scenario.json");
    fs::write(
        &scenario,
        r#"{
            "host": {
                "groups": [
                    {
                        "tabs": [
                            { "kind": "text", "uri": "file:///work/a.rs" },
                            { "kind": "custom", "viewType": "pochi.taskEditor", "uri": "pochi-task:///1" }
                        ]
                    },
                    { "tabs": [{ "kind": "text", "uri": "file:///work/b.rs" }] }
                ]
            }
        }"#,
    )?;

    let mut cmd = pochi_layout(&home)?;
    cmd.arg("--workspace")
        .arg(workspace.path())
        .arg("simulate")
        .arg(&scenario)
        .arg("--cwd")
        .arg(workspace.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"pochi-layout\""))
        .stdout(predicate::str::contains("\"valid\": true"));
    Ok(())
}

#[test]
fn simulate_reports_unreadable_scenarios() -> Result<()> {
    let home = TempDir::new()?;
    let workspace = TempDir::new()?;

    let mut cmd = pochi_layout(&home)?;
    cmd.arg("--workspace")
        .arg(workspace.path())
        .arg("simulate")
        .arg(workspace.path().join("missing.json"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scenario"));
    Ok(())
}
