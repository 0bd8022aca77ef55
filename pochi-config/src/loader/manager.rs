use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::loader::config::PochiConfig;
use crate::loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};

pub const CONFIG_FILE_NAME: &str = "pochi.toml";
pub const CONFIG_DIR_NAME: &str = ".pochi";

/// Loads and validates layered configuration.
///
/// Layers, lowest precedence first:
/// 1. `~/.pochi/pochi.toml`
/// 2. `<workspace>/.pochi/pochi.toml`
/// 3. `<workspace>/pochi.toml`
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: PochiConfig,
    config_path: Option<PathBuf>,
    workspace_root: Option<PathBuf>,
    home_config_path: Option<PathBuf>,
    explicit: bool,
    layer_stack: ConfigLayerStack,
}

impl ConfigManager {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var("POCHI_CONFIG_PATH") {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!("Failed to load configuration from POCHI_CONFIG_PATH={trimmed}")
                });
            }
        }

        if let Ok(workspace_path) = std::env::var("POCHI_WORKSPACE") {
            let trimmed = workspace_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_workspace(trimmed).with_context(|| {
                    format!("Failed to load configuration from POCHI_WORKSPACE={trimmed}")
                });
            }
        }

        Self::load_from_workspace(std::env::current_dir()?)
    }

    /// Load configuration for a workspace using the user's home directory.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let home_config =
            dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        Self::load_with_home(workspace, home_config)
    }

    /// Load configuration for a workspace with an explicit user config path.
    pub fn load_with_home(
        workspace: impl AsRef<Path>,
        home_config: Option<PathBuf>,
    ) -> Result<Self> {
        let workspace_root = workspace.as_ref().to_path_buf();
        let mut layer_stack = ConfigLayerStack::default();

        if let Some(home_config_path) = home_config.as_ref()
            && home_config_path.exists()
        {
            let toml = Self::load_toml_from_file(home_config_path)?;
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::User {
                    file: home_config_path.clone(),
                },
                toml,
            ));
        }

        for path in Self::workspace_config_paths(&workspace_root) {
            if path.exists() && Some(&path) != home_config.as_ref() {
                let toml = Self::load_toml_from_file(&path)?;
                layer_stack.push(ConfigLayerEntry::new(
                    ConfigLayerSource::Workspace { file: path },
                    toml,
                ));
            }
        }

        Self::from_layers(layer_stack, Some(workspace_root), home_config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let toml = Self::load_toml_from_file(path)?;
        let mut layer_stack = ConfigLayerStack::default();
        layer_stack.push(ConfigLayerEntry::new(
            ConfigLayerSource::Explicit {
                file: path.to_path_buf(),
            },
            toml,
        ));
        let workspace_root = path.parent().map(Path::to_path_buf);
        let mut manager = Self::from_layers(layer_stack, workspace_root, None)?;
        manager.explicit = true;
        Ok(manager)
    }

    fn from_layers(
        layer_stack: ConfigLayerStack,
        workspace_root: Option<PathBuf>,
        home_config_path: Option<PathBuf>,
    ) -> Result<Self> {
        let config: PochiConfig = if layer_stack.is_empty() {
            PochiConfig::default()
        } else {
            layer_stack
                .effective_config()
                .try_into()
                .context("Failed to deserialize effective configuration")?
        };

        config
            .validate()
            .context("Configuration failed validation")?;

        let config_path = layer_stack
            .layers()
            .last()
            .map(|layer| layer.source.file().to_path_buf());

        debug!(
            layers = layer_stack.layers().len(),
            config_path = ?config_path,
            "loaded configuration"
        );

        Ok(Self {
            config,
            config_path,
            workspace_root,
            home_config_path,
            explicit: false,
            layer_stack,
        })
    }

    fn load_toml_from_file(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(value)
    }

    fn workspace_config_paths(workspace_root: &Path) -> [PathBuf; 2] {
        [
            workspace_root.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
            workspace_root.join(CONFIG_FILE_NAME),
        ]
    }

    pub fn config(&self) -> &PochiConfig {
        &self.config
    }

    /// Highest-precedence file that contributed to the configuration.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    pub fn layer_stack(&self) -> &ConfigLayerStack {
        &self.layer_stack
    }

    /// Every file that could contribute a layer, whether or not it exists yet.
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        if self.explicit {
            return self.config_path.iter().cloned().collect();
        }
        let mut paths: Vec<PathBuf> = self.home_config_path.iter().cloned().collect();
        if let Some(root) = &self.workspace_root {
            paths.extend(Self::workspace_config_paths(root));
        }
        paths
    }
}
