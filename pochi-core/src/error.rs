use std::path::PathBuf;

use thiserror::Error;

use crate::tabs::TerminalId;

/// Failure reported by a [`WindowHost`](crate::host::WindowHost).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("command `{command}` failed: {message}")]
    CommandFailed {
        command: &'static str,
        message: String,
    },
    #[error("editor group {index} does not exist")]
    GroupNotFound { index: usize },
    #[error("editor group {index} is locked")]
    GroupLocked { index: usize },
    #[error("tab index {index} is out of range for editor group {group}")]
    TabNotFound { group: usize, index: usize },
    #[error("{0} does not exist")]
    TerminalNotFound(TerminalId),
    #[error("window host has been disposed")]
    Disposed,
}

impl HostError {
    pub fn command_failed(command: &'static str, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command,
            message: message.into(),
        }
    }
}

/// Why an apply attempt was abandoned.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("editor group {index} disappeared while {step}")]
    GroupVanished { index: usize, step: &'static str },
    #[error("no progress after {attempts} attempts while {step}")]
    NoProgress { step: &'static str, attempts: usize },
    #[error("failed to list workspace files in {}", path.display())]
    WorkspaceListing {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },
    #[error("cannot build a file URI for {}", path.display())]
    InvalidDocumentPath { path: PathBuf },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LayoutError {
    pub fn vanished(index: usize, step: &'static str) -> Self {
        Self::GroupVanished { index, step }
    }
}
