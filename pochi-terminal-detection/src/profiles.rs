use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Platform key used by the host's `terminal.integrated.*` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalPlatform {
    Windows,
    Osx,
    Linux,
}

impl TerminalPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Osx
        } else {
            Self::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Osx => "osx",
            Self::Linux => "linux",
        }
    }

    const ALL: [Self; 3] = [Self::Windows, Self::Osx, Self::Linux];
}

/// A configured terminal profile. Only the fields the heuristic needs are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalProfile {
    pub path: Option<Value>,
    pub override_name: bool,
}

/// Snapshot of the host's terminal profile configuration.
///
/// A profile mapped to `None` has been disabled by the user (`null` in settings).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalProfileSettings {
    default_profiles: HashMap<TerminalPlatform, String>,
    profiles: HashMap<TerminalPlatform, HashMap<String, Option<TerminalProfile>>>,
    contributed_profiles: Vec<String>,
}

impl TerminalProfileSettings {
    pub fn with_default_profile(
        mut self,
        platform: TerminalPlatform,
        name: impl Into<String>,
    ) -> Self {
        self.default_profiles.insert(platform, name.into());
        self
    }

    pub fn with_profiles(
        mut self,
        platform: TerminalPlatform,
        profiles: HashMap<String, Option<TerminalProfile>>,
    ) -> Self {
        self.profiles.insert(platform, profiles);
        self
    }

    pub fn with_contributed_profiles(mut self, titles: Vec<String>) -> Self {
        self.contributed_profiles = titles;
        self
    }

    pub fn default_profile(&self, platform: TerminalPlatform) -> Option<&str> {
        self.default_profiles
            .get(&platform)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Look up a configured profile. `Some(None)` means the profile is disabled.
    pub fn profile(
        &self,
        platform: TerminalPlatform,
        name: &str,
    ) -> Option<&Option<TerminalProfile>> {
        self.profiles.get(&platform)?.get(name)
    }

    pub fn contributed_profiles(&self) -> &[String] {
        &self.contributed_profiles
    }

    /// Parse the flat `terminal.integrated.*` keys of a settings document.
    pub fn from_settings_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).context("Failed to parse terminal settings JSON")?;
        let object = value
            .as_object()
            .context("Terminal settings must be a JSON object")?;

        let mut settings = Self::default();
        for platform in TerminalPlatform::ALL {
            let default_key = format!("terminal.integrated.defaultProfile.{}", platform.as_str());
            if let Some(name) = object.get(&default_key).and_then(Value::as_str) {
                settings.default_profiles.insert(platform, name.to_string());
            }

            let profiles_key = format!("terminal.integrated.profiles.{}", platform.as_str());
            if let Some(raw) = object.get(&profiles_key) {
                let profiles: HashMap<String, Option<TerminalProfile>> =
                    serde_json::from_value(raw.clone())
                        .with_context(|| format!("Invalid value for {profiles_key}"))?;
                settings.profiles.insert(platform, profiles);
            }
        }
        Ok(settings)
    }

    /// Collect profile titles an extension contributes through its manifest.
    pub fn contributed_titles(package_json: &Value) -> Vec<String> {
        package_json
            .pointer("/contributes/terminal/profiles")
            .and_then(Value::as_array)
            .map(|profiles| {
                profiles
                    .iter()
                    .filter_map(|profile| profile.get("title").and_then(Value::as_str))
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}
