//! Port between the layout engine and the editor that owns the windows.
//!
//! Everything the engine reads or mutates goes through [`WindowHost`]. The
//! production adapter lives with the editor integration; [`memory::MemoryHost`]
//! is a faithful in-process model used by the simulator and the tests.

use std::path::Path;

use async_trait::async_trait;
use pochi_terminal_detection::{TerminalOptions, TerminalProfileSettings};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::HostError;
use crate::geometry::EditorLayout;
use crate::tabs::{Tab, TabGroup, TerminalId};

mod grid;
pub mod memory;

/// Editor column addressed when opening documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewColumn {
    One,
    Two,
    Three,
}

impl ViewColumn {
    /// Zero-based group index of the column.
    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Three => 2,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }
}

/// Destination of [`HostCommand::MoveActiveEditor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTarget {
    First,
    /// One-based group position.
    Position(u8),
}

impl GroupTarget {
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Position(position) => usize::from(position.max(1)) - 1,
        }
    }
}

/// Workbench command understood by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    MovePanelToSidePanel,
    /// Focus one of the first eight groups.
    FocusGroup(usize),
    FocusNextGroup,
    FocusLastGroup,
    MoveActiveGroupLeft,
    /// Merge the active group into its neighbour.
    JoinTwoGroups,
    NewGroupLeft,
    NewGroupRight,
    NewGroupBelow,
    OpenEditorAtIndex(usize),
    MoveActiveEditor(GroupTarget),
    LockGroup,
    UnlockGroup,
    MoveTerminalToEditor,
    EvenEditorWidths,
    SetEditorLayout(EditorLayout),
    CloseEditorsAndGroup,
    SetContext { key: String, value: bool },
}

const FOCUS_GROUP_COMMANDS: [&str; 8] = [
    "workbench.action.focusFirstEditorGroup",
    "workbench.action.focusSecondEditorGroup",
    "workbench.action.focusThirdEditorGroup",
    "workbench.action.focusFourthEditorGroup",
    "workbench.action.focusFifthEditorGroup",
    "workbench.action.focusSixthEditorGroup",
    "workbench.action.focusSeventhEditorGroup",
    "workbench.action.focusEighthEditorGroup",
];

/// Largest index [`HostCommand::FocusGroup`] can address directly.
pub const MAX_DIRECT_FOCUS_INDEX: usize = FOCUS_GROUP_COMMANDS.len() - 1;

impl HostCommand {
    /// Workbench command id, used for logging and fault injection.
    pub fn command_id(&self) -> &'static str {
        match self {
            Self::MovePanelToSidePanel => "workbench.action.movePanelToSidePanel",
            Self::FocusGroup(index) => {
                FOCUS_GROUP_COMMANDS[(*index).min(MAX_DIRECT_FOCUS_INDEX)]
            }
            Self::FocusNextGroup => "workbench.action.focusNextGroup",
            Self::FocusLastGroup => "workbench.action.focusLastEditorGroup",
            Self::MoveActiveGroupLeft => "workbench.action.moveActiveEditorGroupLeft",
            Self::JoinTwoGroups => "workbench.action.joinTwoGroups",
            Self::NewGroupLeft => "workbench.action.newGroupLeft",
            Self::NewGroupRight => "workbench.action.newGroupRight",
            Self::NewGroupBelow => "workbench.action.newGroupBelow",
            Self::OpenEditorAtIndex(_) => "workbench.action.openEditorAtIndex",
            Self::MoveActiveEditor(_) => "moveActiveEditor",
            Self::LockGroup => "workbench.action.lockEditorGroup",
            Self::UnlockGroup => "workbench.action.unlockEditorGroup",
            Self::MoveTerminalToEditor => "workbench.action.terminal.moveToEditor",
            Self::EvenEditorWidths => "workbench.action.evenEditorWidths",
            Self::SetEditorLayout(_) => "vscode.setEditorLayout",
            Self::CloseEditorsAndGroup => "workbench.action.closeEditorsAndGroup",
            Self::SetContext { .. } => "setContext",
        }
    }
}

/// Terminal known to the host, whether in the panel or in an editor group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub id: TerminalId,
    pub options: TerminalOptions,
}

/// Change notification published by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    TabGroupsChanged {
        opened: Vec<TabGroup>,
        closed: Vec<TabGroup>,
        changed: Vec<TabGroup>,
    },
    TabsChanged {
        opened: Vec<Tab>,
        closed: Vec<Tab>,
        changed: Vec<Tab>,
    },
    TerminalOpened(TerminalInfo),
    TerminalClosed(TerminalId),
    ActiveTerminalChanged(Option<TerminalId>),
}

/// Editor windows, tab groups and terminals as seen by the layout engine.
///
/// Groups are reported in view-column order: main window groups in grid
/// order first, then groups living in auxiliary windows.
#[async_trait]
pub trait WindowHost: Send + Sync + 'static {
    fn tab_groups(&self) -> Vec<TabGroup>;

    fn active_group_index(&self) -> Option<usize> {
        self.tab_groups().iter().position(|group| group.is_active)
    }

    fn terminals(&self) -> Vec<TerminalInfo>;

    fn active_terminal(&self) -> Option<TerminalId>;

    fn terminal_profiles(&self) -> TerminalProfileSettings;

    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;

    /// Grid of the window that owns the active group.
    async fn editor_layout(&self) -> Result<EditorLayout, HostError>;

    async fn execute(&self, command: HostCommand) -> Result<(), HostError>;

    async fn show_terminal(&self, terminal: TerminalId) -> Result<(), HostError>;

    async fn create_terminal(&self, options: TerminalOptions) -> Result<TerminalId, HostError>;

    /// Open a new-task editor for `cwd` without taking focus.
    async fn open_task_editor(&self, cwd: &Path, column: ViewColumn) -> Result<(), HostError>;

    /// Show a document without taking focus.
    async fn show_document(&self, uri: &str, column: ViewColumn) -> Result<(), HostError>;
}
