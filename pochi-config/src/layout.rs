use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Settings for the layout reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayoutConfig {
    /// Keep the editor in the task / editor / terminal arrangement.
    #[serde(default)]
    pub enabled: bool,
    /// Delay (in milliseconds) before a scheduled auto-apply fires.
    #[serde(default = "LayoutConfig::default_trigger_delay_ms")]
    pub trigger_delay_ms: u64,
    /// Pause (in milliseconds) after commands that reshape the window.
    #[serde(default = "LayoutConfig::default_window_settle_ms")]
    pub window_settle_ms: u64,
    /// Maximum number of workspace files inspected when picking a default document.
    #[serde(default = "LayoutConfig::default_document_scan_limit")]
    pub default_document_scan_limit: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_delay_ms: Self::default_trigger_delay_ms(),
            window_settle_ms: Self::default_window_settle_ms(),
            default_document_scan_limit: Self::default_document_scan_limit(),
        }
    }
}

impl LayoutConfig {
    const MAX_DELAY_MS: u64 = 10_000;

    const fn default_trigger_delay_ms() -> u64 {
        100
    }

    const fn default_window_settle_ms() -> u64 {
        100
    }

    const fn default_document_scan_limit() -> usize {
        2_000
    }

    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms)
    }

    pub fn window_settle(&self) -> Duration {
        Duration::from_millis(self.window_settle_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.trigger_delay_ms <= Self::MAX_DELAY_MS,
            "layout.trigger_delay_ms must be at most {}ms",
            Self::MAX_DELAY_MS
        );
        ensure!(
            self.window_settle_ms <= Self::MAX_DELAY_MS,
            "layout.window_settle_ms must be at most {}ms",
            Self::MAX_DELAY_MS
        );
        ensure!(
            self.default_document_scan_limit > 0,
            "layout.default_document_scan_limit must be at least 1"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_host_timings() {
        let config = LayoutConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.trigger_delay(), Duration::from_millis(100));
        assert_eq!(config.window_settle(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_table_fills_defaults() {
        let config: LayoutConfig = toml::from_str("enabled = true").expect("parse");
        assert!(config.enabled);
        assert_eq!(config.trigger_delay_ms, 100);
        assert_eq!(config.default_document_scan_limit, 2_000);
    }

    #[test]
    fn rejects_long_delays_and_zero_scan_limit() {
        let config = LayoutConfig {
            trigger_delay_ms: 60_000,
            ..LayoutConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LayoutConfig {
            default_document_scan_limit: 0,
            ..LayoutConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
