//! The command sequence that coerces the host into the Pochi layout.
//!
//! Every step re-reads the host after mutating it: the group indices an
//! editor reports shift as groups are created, joined and closed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pochi_terminal_detection::{TerminalLocation, TerminalOptions};
use tracing::{trace, warn};

use crate::default_document::{DefaultDocument, find_default_document};
use crate::error::LayoutError;
use crate::fsm::{ApplyTrigger, StartApply};
use crate::geometry::EditorLayout;
use crate::host::{GroupTarget, HostCommand, MAX_DIRECT_FOCUS_INDEX, ViewColumn, WindowHost};
use crate::tabs::{GroupType, Tab, TabGroup, TabGroupsShape, TabKind, TerminalId};

const TASK_GROUP: usize = 0;
const EDITOR_GROUP: usize = 1;
const TERMINAL_GROUP: usize = 2;

/// What an apply run did, for logging and bookkeeping by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyReport {
    /// Group that holds the focus afterwards.
    pub focus_group: usize,
    pub cycled_focus: bool,
    pub resized: bool,
    pub terminals_moved: usize,
    /// Terminal opened to fill an empty terminal group.
    pub created_terminal: Option<TerminalId>,
}

/// Drives a [`WindowHost`] through one reconciliation.
pub struct LayoutApplier<'a> {
    host: &'a dyn WindowHost,
    window_settle: Duration,
    workspace_cwd: Option<&'a Path>,
    scan_limit: usize,
}

impl<'a> LayoutApplier<'a> {
    pub fn new(host: &'a dyn WindowHost) -> Self {
        Self {
            host,
            window_settle: Duration::ZERO,
            workspace_cwd: None,
            scan_limit: 2_000,
        }
    }

    /// Pause after focus moves between windows.
    pub fn with_window_settle(mut self, settle: Duration) -> Self {
        self.window_settle = settle;
        self
    }

    /// Directory used when the request carries none.
    pub fn with_workspace(mut self, cwd: Option<&'a Path>) -> Self {
        self.workspace_cwd = cwd;
        self
    }

    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit.max(1);
        self
    }

    fn groups(&self) -> Vec<TabGroup> {
        self.host.tab_groups()
    }

    async fn exec(&self, command: HostCommand) -> Result<(), LayoutError> {
        trace!(command = command.command_id(), "EXEC");
        self.host.execute(command).await.map_err(LayoutError::from)
    }

    async fn settle(&self) {
        if !self.window_settle.is_zero() {
            tokio::time::sleep(self.window_settle).await;
        }
    }

    /// Focuses group `index`, stepping past the eighth group one at a time.
    pub async fn focus_group(&self, index: usize) -> Result<(), LayoutError> {
        self.exec(HostCommand::FocusGroup(index.min(MAX_DIRECT_FOCUS_INDEX)))
            .await?;
        for _ in MAX_DIRECT_FOCUS_INDEX..index {
            self.exec(HostCommand::FocusNextGroup).await?;
        }
        Ok(())
    }

    pub async fn apply(&self, request: &StartApply) -> Result<ApplyReport, LayoutError> {
        trace!(?request, ">>> Begin applyPochiLayout");
        let cwd: Option<PathBuf> = request
            .cwd
            .clone()
            .or_else(|| self.workspace_cwd.map(Path::to_path_buf));

        let focus_tab: Option<Tab> = self
            .groups()
            .into_iter()
            .find(|group| group.is_active)
            .and_then(|group| group.active_tab().cloned());
        let active_terminal = self.host.active_terminal();

        self.exec(HostCommand::MovePanelToSidePanel).await?;

        let mut layout = self.host.editor_layout().await?;
        let has_split_windows = self.groups().len() > layout.leaf_count();
        trace!(has_split_windows);
        if has_split_windows {
            self.focus_group(0).await?;
            self.settle().await;
            layout = self.host.editor_layout().await?;
        }

        let main: Vec<TabGroup> = self
            .groups()
            .into_iter()
            .take(layout.leaf_count())
            .collect();
        let main_shape = TabGroupsShape::from_groups(&main);
        let count_type = |kind: GroupType| {
            main.iter()
                .filter(|group| group.group_type() == kind)
                .count()
        };
        let task_groups = count_type(GroupType::Task);
        let editor_groups = count_type(GroupType::Editor);
        let mut remain = main.len() - task_groups - editor_groups;
        trace!(main = main.len(), task_groups, editor_groups, remain, "main window groups");

        self.setup_task_group(task_groups, &mut remain).await?;
        self.setup_editor_group(editor_groups, &mut remain).await?;
        self.setup_terminal_group(remain).await?;
        self.drain_editor_group().await?;
        self.merge_split_windows().await?;

        let terminals_moved = self.move_terminals().await?;
        if let Some(terminal) = active_terminal
            && let Err(error) = self.host.show_terminal(terminal).await
        {
            warn!(%terminal, %error, "failed to re-show the active terminal");
        }

        let layout = self.host.editor_layout().await?;
        let resized = !layout.matches_canonical_size();
        trace!(resized, "should set pochi layout view size");
        if resized {
            self.exec(HostCommand::EvenEditorWidths).await?;
            self.exec(HostCommand::SetEditorLayout(EditorLayout::canonical()))
                .await?;
        }

        let current_shape = TabGroupsShape::from_groups(&self.groups());
        let should_cycle = !resized && main_shape.same_as(&current_shape.slice(0..3));
        let target = target_focus_group(
            request,
            focus_tab.as_ref(),
            &main_shape,
            &current_shape,
            should_cycle,
        );
        let current = self.host.active_group_index().filter(|index| *index < 3);
        trace!(should_cycle, target, ?current, "focus");

        for index in focus_order(target, current) {
            self.focus_group(index).await?;
            let lock = if index == EDITOR_GROUP {
                HostCommand::UnlockGroup
            } else {
                HostCommand::LockGroup
            };
            self.exec(lock).await?;
        }

        if let Some(tab) = focus_tab.as_ref().filter(|_| !should_cycle)
            && let Some(position) = self
                .groups()
                .get(target)
                .and_then(|group| group.position_of(&tab.input))
        {
            self.exec(HostCommand::OpenEditorAtIndex(position)).await?;
        }

        let created_terminal = self.backfill(request.trigger, cwd.as_deref()).await?;
        trace!("<<< End applyPochiLayout");

        Ok(ApplyReport {
            focus_group: target,
            cycled_focus: request.cycle_focus && should_cycle,
            resized,
            terminals_moved,
            created_terminal,
        })
    }

    /// Moves groups of `kind` left until they occupy `offset..offset + count`.
    async fn gather(
        &self,
        kind: GroupType,
        offset: usize,
        count: usize,
        step: &'static str,
    ) -> Result<(), LayoutError> {
        for position in offset..offset + count {
            let budget = self.groups().len() + 1;
            let mut attempts = 0;
            loop {
                let groups = self.groups();
                let Some(group) = groups.get(position) else {
                    return Err(LayoutError::vanished(position, step));
                };
                if group.group_type() == kind {
                    break;
                }
                let Some(found) = groups[position..]
                    .iter()
                    .position(|group| group.group_type() == kind)
                else {
                    return Err(LayoutError::NoProgress { step, attempts });
                };
                attempts += 1;
                if attempts > budget {
                    return Err(LayoutError::NoProgress { step, attempts });
                }
                self.focus_group(position + found).await?;
                self.exec(HostCommand::MoveActiveGroupLeft).await?;
            }
        }
        Ok(())
    }

    async fn join_at(&self, index: usize, times: usize) -> Result<(), LayoutError> {
        for _ in 0..times {
            self.focus_group(index).await?;
            self.exec(HostCommand::JoinTwoGroups).await?;
        }
        Ok(())
    }

    async fn setup_task_group(
        &self,
        task_groups: usize,
        remain: &mut usize,
    ) -> Result<(), LayoutError> {
        trace!("Begin setup task group");
        if task_groups > 0 {
            self.gather(GroupType::Task, TASK_GROUP, task_groups, "gathering task groups")
                .await?;
            self.join_at(TASK_GROUP, task_groups - 1).await?;
        } else {
            match self.groups().first().map(TabGroup::group_type) {
                None => self.exec(HostCommand::NewGroupLeft).await?,
                Some(GroupType::Empty) => *remain = remain.saturating_sub(1),
                Some(_) => {
                    self.focus_group(TASK_GROUP).await?;
                    self.exec(HostCommand::NewGroupLeft).await?;
                }
            }
        }
        Ok(())
    }

    async fn setup_editor_group(
        &self,
        editor_groups: usize,
        remain: &mut usize,
    ) -> Result<(), LayoutError> {
        trace!("Begin setup editor group");
        if editor_groups > 0 {
            self.gather(GroupType::Editor, EDITOR_GROUP, editor_groups, "gathering editor groups")
                .await?;
            self.join_at(EDITOR_GROUP, editor_groups - 1).await?;
        } else {
            match self.groups().get(EDITOR_GROUP).map(TabGroup::group_type) {
                Some(GroupType::Empty) => *remain = remain.saturating_sub(1),
                _ => {
                    self.focus_group(TASK_GROUP).await?;
                    self.exec(HostCommand::NewGroupRight).await?;
                }
            }
        }
        Ok(())
    }

    async fn setup_terminal_group(&self, remain: usize) -> Result<(), LayoutError> {
        trace!(remain, "Begin setup terminal group");
        if remain > 0 {
            self.join_at(TERMINAL_GROUP, remain - 1).await
        } else {
            self.focus_group(EDITOR_GROUP).await?;
            self.exec(HostCommand::NewGroupBelow).await
        }
    }

    /// Sends task and terminal tabs out of the editor group.
    async fn drain_editor_group(&self) -> Result<(), LayoutError> {
        const STEP: &str = "moving tabs out of the editor group";
        let groups = self.groups();
        let editor = groups
            .get(EDITOR_GROUP)
            .ok_or(LayoutError::vanished(EDITOR_GROUP, STEP))?;
        let editor_id = editor.id;
        let budget = editor.tabs.len() + 1;

        let mut index = 0;
        let mut moves = 0;
        loop {
            let groups = self.groups();
            let group = groups
                .get(EDITOR_GROUP)
                .ok_or(LayoutError::vanished(EDITOR_GROUP, STEP))?;
            if group.id != editor_id {
                // The editor group held nothing else and was closed.
                self.focus_group(TASK_GROUP).await?;
                self.exec(HostCommand::NewGroupRight).await?;
                return Ok(());
            }
            let Some(tab) = group.tabs.get(index) else {
                return Ok(());
            };
            let target = match tab.kind() {
                TabKind::Task => GroupTarget::First,
                TabKind::Terminal => GroupTarget::Position(3),
                TabKind::Other => {
                    index += 1;
                    continue;
                }
            };
            moves += 1;
            if moves > budget {
                return Err(LayoutError::NoProgress {
                    step: STEP,
                    attempts: moves,
                });
            }
            self.focus_group(EDITOR_GROUP).await?;
            self.exec(HostCommand::OpenEditorAtIndex(index)).await?;
            self.exec(HostCommand::MoveActiveEditor(target)).await?;
        }
    }

    /// Pulls every tab of groups beyond the third into the Pochi groups.
    async fn merge_split_windows(&self) -> Result<(), LayoutError> {
        const STEP: &str = "merging split windows";
        let budget = self
            .groups()
            .iter()
            .skip(3)
            .map(|group| group.tabs.len() + 1)
            .sum::<usize>()
            + 1;
        let mut attempts = 0;
        loop {
            let groups = self.groups();
            let Some(last) = groups.last().filter(|_| groups.len() > 3) else {
                return Ok(());
            };
            attempts += 1;
            if attempts > budget {
                return Err(LayoutError::NoProgress { step: STEP, attempts });
            }

            self.exec(HostCommand::FocusLastGroup).await?;
            self.settle().await;
            let Some(tab) = last.tabs.first() else {
                self.exec(HostCommand::CloseEditorsAndGroup).await?;
                self.settle().await;
                continue;
            };
            self.exec(HostCommand::OpenEditorAtIndex(0)).await?;
            let moving_last_editor = last.tabs.len() == 1;
            let target = match tab.kind() {
                TabKind::Task => GroupTarget::First,
                TabKind::Terminal => GroupTarget::Position(3),
                TabKind::Other => GroupTarget::Position(2),
            };
            self.exec(HostCommand::MoveActiveEditor(target)).await?;
            if moving_last_editor {
                self.settle().await;
            }
        }
    }

    /// Moves panel terminals into the terminal group, which stays locked.
    pub async fn move_terminals(&self) -> Result<usize, LayoutError> {
        let in_editor = TabGroupsShape::from_groups(&self.groups()).count_terminal_tabs();
        let count = self.host.terminals().len().saturating_sub(in_editor);
        for _ in 0..count {
            self.focus_group(TERMINAL_GROUP).await?;
            self.exec(HostCommand::UnlockGroup).await?;
            self.exec(HostCommand::MoveTerminalToEditor).await?;
            self.exec(HostCommand::LockGroup).await?;
        }
        Ok(count)
    }

    async fn backfill(
        &self,
        trigger: ApplyTrigger,
        cwd: Option<&Path>,
    ) -> Result<Option<TerminalId>, LayoutError> {
        let is_empty = |index: usize| {
            self.groups()
                .get(index)
                .is_some_and(|group| group.tabs.is_empty())
        };

        if trigger != ApplyTrigger::OpenTask
            && is_empty(TASK_GROUP)
            && let Some(cwd) = cwd
        {
            trace!("Open new task tab");
            self.host.open_task_editor(cwd, ViewColumn::One).await?;
        }

        if trigger != ApplyTrigger::OpenEditor
            && is_empty(EDITOR_GROUP)
            && let Some(cwd) = cwd
        {
            let document = match find_default_document(cwd, self.scan_limit).await {
                Ok(document) => document,
                Err(error) => {
                    warn!(%error, "falling back to an untitled document");
                    DefaultDocument::Untitled
                }
            };
            trace!(?document, "Open default text document");
            let uri = document.uri(cwd)?;
            self.host.show_document(&uri, ViewColumn::Two).await?;
        }

        if trigger != ApplyTrigger::CreateTerminal && is_empty(TERMINAL_GROUP) {
            let options = TerminalOptions {
                cwd: cwd.map(Path::to_path_buf),
                location: Some(TerminalLocation::Editor {
                    view_column: ViewColumn::Three.number(),
                    preserve_focus: true,
                }),
                ..TerminalOptions::default()
            };
            let terminal = self.host.create_terminal(options).await?;
            return Ok(Some(terminal));
        }
        Ok(None)
    }
}

/// Group that should end up focused after an apply.
pub fn target_focus_group(
    request: &StartApply,
    focus_tab: Option<&Tab>,
    before: &TabGroupsShape,
    after: &TabGroupsShape,
    should_cycle: bool,
) -> usize {
    if request.trigger == ApplyTrigger::CreateTerminal {
        return TERMINAL_GROUP;
    }
    // Only terminals moved.
    if before.without_last().same_as(&after.slice(0..2))
        && !before.last_only().same_as(&after.slice(2..3))
    {
        return TERMINAL_GROUP;
    }
    let Some(tab) = focus_tab else {
        return TASK_GROUP;
    };
    let target = match tab.kind() {
        TabKind::Task => TASK_GROUP,
        TabKind::Terminal => TERMINAL_GROUP,
        TabKind::Other => EDITOR_GROUP,
    };
    if request.cycle_focus && should_cycle {
        (target + 1) % 3
    } else {
        target
    }
}

/// Order in which the three groups are visited so that `target` ends up
/// focused, starting from the currently focused one to avoid flicker.
pub fn focus_order(target: usize, current: Option<usize>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..3).filter(|index| *index != target).collect();
    order.push(target);
    if let Some(current) = current.filter(|current| *current != target) {
        order.retain(|index| *index != current);
        order.insert(0, current);
    }
    order
}
