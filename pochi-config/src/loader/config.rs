use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::debug::DebugConfig;
use crate::layout::LayoutConfig;

/// Effective configuration after all layers have been merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PochiConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

impl PochiConfig {
    pub fn validate(&self) -> Result<()> {
        self.layout
            .validate()
            .context("Invalid [layout] configuration")?;
        Ok(())
    }

    /// Render the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
