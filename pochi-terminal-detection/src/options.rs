use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a terminal is shown when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TerminalLocation {
    Panel,
    Editor {
        /// One-based editor column.
        view_column: u8,
        #[serde(default)]
        preserve_focus: bool,
    },
}

/// Options a terminal was created with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalOptions {
    pub name: Option<String>,
    pub shell_path: Option<String>,
    pub shell_args: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub location: Option<TerminalLocation>,
    pub message: Option<String>,
    /// Backed by an extension-provided pseudo terminal.
    pub pty: bool,
}

impl TerminalOptions {
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }
}
