use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use pochi_config::{CONFIG_FILE_NAME, ConfigManager, LayoutConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

type Loader = Arc<dyn Fn() -> Result<ConfigManager> + Send + Sync>;

/// Configuration watcher that monitors the `pochi.toml` layers and publishes
/// the `[layout]` section whenever a file changes.
///
/// A reload that fails keeps the previously published value.
pub struct ConfigWatcher {
    loader: Loader,
    watch_paths: Vec<PathBuf>,
    config_tx: Arc<watch::Sender<LayoutConfig>>,
    watcher: Option<RecommendedWatcher>,
    reload_task: Option<JoinHandle<()>>,
    debounce_duration: Duration,
}

impl ConfigWatcher {
    /// Watches the layers of `workspace` plus the user file in the home directory.
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Result<Self> {
        let workspace = workspace.into();
        Self::with_loader(move || ConfigManager::load_from_workspace(&workspace))
    }

    /// Builds a watcher around a custom loader. The loader runs once here; its
    /// candidate paths decide what gets watched.
    pub fn with_loader<F>(loader: F) -> Result<Self>
    where
        F: Fn() -> Result<ConfigManager> + Send + Sync + 'static,
    {
        let manager = loader().context("Failed to load initial configuration")?;
        let (config_tx, _) = watch::channel(manager.config().layout.clone());
        Ok(Self {
            loader: Arc::new(loader),
            watch_paths: manager.candidate_paths(),
            config_tx: Arc::new(config_tx),
            watcher: None,
            reload_task: None,
            debounce_duration: Duration::from_millis(500),
        })
    }

    pub fn set_debounce_duration(&mut self, millis: u64) {
        self.debounce_duration = Duration::from_millis(millis);
    }

    pub fn subscribe(&self) -> watch::Receiver<LayoutConfig> {
        self.config_tx.subscribe()
    }

    pub fn current(&self) -> LayoutConfig {
        self.config_tx.borrow().clone()
    }

    pub fn watch_paths(&self) -> &[PathBuf] {
        &self.watch_paths
    }

    /// Reloads right away. Returns whether the published value changed.
    pub fn reload(&self) -> Result<bool> {
        reload_into(&self.loader, &self.config_tx)
    }

    /// Start watching the directories that hold (or may hold) config files.
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&mut self) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
        let relevant = self.watch_paths.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if is_relevant_config_event(&event, &relevant) {
                        tracing::debug!(paths = ?event.paths, "config file changed");
                        event_tx.send(()).ok();
                    }
                }
                Err(error) => tracing::warn!(%error, "config watcher error"),
            },
            notify::Config::default(),
        )?;

        let directories: BTreeSet<&Path> = self
            .watch_paths
            .iter()
            .filter_map(|path| path.parent())
            .filter(|dir| dir.is_dir())
            .collect();
        for dir in directories {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;
        }

        let loader = self.loader.clone();
        let config_tx = self.config_tx.clone();
        let debounce = self.debounce_duration;
        let task = tokio::spawn(async move {
            while event_rx.recv().await.is_some() {
                // Editors save in bursts; wait for the burst to end.
                tokio::time::sleep(debounce).await;
                while event_rx.try_recv().is_ok() {}

                match reload_into(&loader, &config_tx) {
                    Ok(true) => tracing::info!("layout configuration reloaded"),
                    Ok(false) => tracing::debug!("layout configuration unchanged"),
                    Err(error) => {
                        tracing::warn!(
                            error = %format!("{error:#}"),
                            "keeping previous configuration"
                        );
                    }
                }
            }
        });

        if let Some(previous) = self.reload_task.replace(task) {
            previous.abort();
        }
        self.watcher = Some(watcher);
        Ok(())
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.reload_task.take() {
            task.abort();
        }
    }
}

fn reload_into(loader: &Loader, config_tx: &watch::Sender<LayoutConfig>) -> Result<bool> {
    let manager = loader().context("Failed to reload configuration")?;
    let layout = manager.config().layout.clone();
    Ok(config_tx.send_if_modified(|current| {
        if *current == layout {
            return false;
        }
        *current = layout;
        true
    }))
}

/// Check if a file event touches one of the config layers
fn is_relevant_config_event(event: &notify::Event, candidates: &[PathBuf]) -> bool {
    match &event.kind {
        notify::EventKind::Create(_)
        | notify::EventKind::Modify(_)
        | notify::EventKind::Remove(_) => event.paths.iter().any(|path| {
            candidates.iter().any(|candidate| candidate == path)
                || path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name == CONFIG_FILE_NAME)
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::EventKind;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::fs;

    fn watcher_for(workspace: &Path) -> ConfigWatcher {
        let workspace = workspace.to_path_buf();
        ConfigWatcher::with_loader(move || ConfigManager::load_with_home(&workspace, None))
            .expect("watcher")
    }

    #[test]
    fn reload_publishes_changes_and_keeps_last_good_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&file, "[layout]\nenabled = true\n").expect("write");

        let watcher = watcher_for(dir.path());
        let mut updates = watcher.subscribe();
        assert!(watcher.current().enabled);

        fs::write(&file, "[layout\nenabled = false\n").expect("write");
        assert!(watcher.reload().is_err());
        assert!(watcher.current().enabled);
        assert!(!updates.has_changed().expect("open"));

        fs::write(&file, "[layout]\nenabled = false\ntrigger_delay_ms = 50\n").expect("write");
        assert!(watcher.reload().expect("reload"));
        assert!(updates.has_changed().expect("open"));
        let current = updates.borrow_and_update().clone();
        assert!(!current.enabled);
        assert_eq!(current.trigger_delay_ms, 50);

        assert!(!watcher.reload().expect("reload"));
    }

    #[test]
    fn watches_every_workspace_layer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let watcher = watcher_for(dir.path());
        assert_eq!(
            watcher.watch_paths(),
            &[
                dir.path().join(".pochi").join(CONFIG_FILE_NAME),
                dir.path().join(CONFIG_FILE_NAME),
            ]
        );
    }

    #[test]
    fn only_config_files_are_relevant() {
        let candidate = PathBuf::from("/work/pochi.toml");
        let candidates = vec![candidate.clone()];

        let modified = notify::Event::new(EventKind::Modify(ModifyKind::Any)).add_path(candidate);
        assert!(is_relevant_config_event(&modified, &candidates));

        let nested = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/work/.pochi/pochi.toml"));
        assert!(is_relevant_config_event(&nested, &candidates));

        let other = notify::Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/work/Cargo.toml"));
        assert!(!is_relevant_config_event(&other, &candidates));

        let read = notify::Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/work/pochi.toml"));
        assert!(!is_relevant_config_event(&read, &candidates));
    }
}
