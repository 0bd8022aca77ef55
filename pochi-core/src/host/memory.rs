//! In-process [`WindowHost`] that models the editor workbench closely enough
//! to drive the layout engine end to end.
//!
//! Main window groups are the leaves of an [`EditorLayout`] tree in
//! depth-first order. Groups opened in auxiliary windows follow them, one
//! group per window. Every mutation is diffed and published as
//! [`HostEvent`]s the way the editor reports them.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Result, ensure};
use async_trait::async_trait;
use parking_lot::Mutex;
use pochi_terminal_detection::{TerminalLocation, TerminalOptions, TerminalProfileSettings};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use super::grid::{self, Placement};
use super::{GroupTarget, HostCommand, HostEvent, TerminalInfo, ViewColumn, WindowHost};
use crate::error::HostError;
use crate::geometry::{EditorLayout, GroupLayout, Orientation};
use crate::tabs::{GroupId, Tab, TabGroup, TabId, TabInput, TerminalId};
use crate::task_uri::TaskUri;

const EVENT_CAPACITY: usize = 256;
const GET_EDITOR_LAYOUT: &str = "vscode.getEditorLayout";

/// Serializable picture of a [`MemoryHost`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSnapshot {
    /// Main window grid. Defaults to equal columns, one per group.
    pub layout: Option<EditorLayout>,
    pub groups: Vec<GroupSnapshot>,
    /// Groups shown in auxiliary windows.
    pub window_groups: Vec<GroupSnapshot>,
    /// Index into `groups` followed by `window_groups`.
    pub active_group: usize,
    pub terminals: Vec<TerminalInfo>,
    pub active_terminal: Option<TerminalId>,
    pub context: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupSnapshot {
    pub tabs: Vec<TabInput>,
    pub active_tab: Option<usize>,
    pub locked: bool,
}

impl GroupSnapshot {
    pub fn with_tabs(tabs: Vec<TabInput>) -> Self {
        Self {
            active_tab: (!tabs.is_empty()).then_some(0),
            tabs,
            locked: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Group {
    id: GroupId,
    tabs: Vec<Tab>,
    active_tab: Option<TabId>,
    locked: bool,
}

impl Group {
    fn new(id: GroupId) -> Self {
        Self {
            id,
            tabs: Vec::new(),
            active_tab: None,
            locked: false,
        }
    }

    fn push(&mut self, tab: Tab) {
        self.active_tab = Some(tab.id);
        self.tabs.push(tab);
    }

    fn push_background(&mut self, tab: Tab) {
        if self.active_tab.is_none() {
            self.active_tab = Some(tab.id);
        }
        self.tabs.push(tab);
    }

    fn remove(&mut self, position: usize) -> Tab {
        let tab = self.tabs.remove(position);
        if self.active_tab == Some(tab.id) {
            let next = position.min(self.tabs.len().saturating_sub(1));
            self.active_tab = self.tabs.get(next).map(|tab| tab.id);
        }
        tab
    }

    fn active_position(&self) -> Option<usize> {
        let active = self.active_tab?;
        self.tabs.iter().position(|tab| tab.id == active)
    }
}

fn label_for(input: &TabInput) -> String {
    match input {
        TabInput::Text { uri } | TabInput::Notebook { uri, .. } => uri
            .rsplit('/')
            .next()
            .unwrap_or(uri.as_str())
            .to_string(),
        TabInput::TextDiff { modified, .. } => format!("{modified} (diff)"),
        TabInput::Custom { .. } if input.task_uri().is_some() => "Pochi".to_string(),
        TabInput::Custom { uri, .. } => uri.clone(),
        TabInput::Webview { view_type } => view_type.clone(),
        TabInput::NotebookDiff { modified, .. } => format!("{modified} (diff)"),
        TabInput::Terminal { .. } => "Terminal".to_string(),
        TabInput::Unknown => String::new(),
    }
}

#[derive(Debug)]
struct HostState {
    layout: EditorLayout,
    main: Vec<Group>,
    aux: Vec<Group>,
    active: GroupId,
    terminals: Vec<TerminalInfo>,
    active_terminal: Option<TerminalId>,
    panel_in_side_bar: bool,
    context: BTreeMap<String, bool>,
    profiles: TerminalProfileSettings,
    failures: HashMap<String, usize>,
    commands: Vec<HostCommand>,
    next_id: u64,
}

impl HostState {
    fn empty() -> Self {
        Self {
            layout: EditorLayout::single(),
            main: vec![Group::new(GroupId(1))],
            aux: Vec::new(),
            active: GroupId(1),
            terminals: Vec::new(),
            active_terminal: None,
            panel_in_side_bar: false,
            context: BTreeMap::new(),
            profiles: TerminalProfileSettings::default(),
            failures: HashMap::new(),
            commands: Vec::new(),
            next_id: 2,
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn new_tab(&mut self, input: TabInput) -> Tab {
        Tab {
            id: TabId(self.allocate()),
            label: label_for(&input),
            input,
        }
    }

    fn group_count(&self) -> usize {
        self.main.len() + self.aux.len()
    }

    fn group(&self, index: usize) -> Option<&Group> {
        match index.checked_sub(self.main.len()) {
            None => self.main.get(index),
            Some(aux) => self.aux.get(aux),
        }
    }

    fn group_mut(&mut self, index: usize) -> Option<&mut Group> {
        match index.checked_sub(self.main.len()) {
            None => self.main.get_mut(index),
            Some(aux) => self.aux.get_mut(aux),
        }
    }

    fn index_of(&self, id: GroupId) -> Option<usize> {
        self.main
            .iter()
            .chain(&self.aux)
            .position(|group| group.id == id)
    }

    fn active_index(&self) -> usize {
        self.index_of(self.active).unwrap_or(0)
    }

    fn active_group_mut(&mut self) -> Result<&mut Group, HostError> {
        let index = self.active_index();
        self.group_mut(index)
            .ok_or(HostError::GroupNotFound { index })
    }

    fn tab_groups(&self) -> Vec<TabGroup> {
        self.main
            .iter()
            .chain(&self.aux)
            .enumerate()
            .map(|(index, group)| TabGroup {
                id: group.id,
                view_column: index + 1,
                tabs: group.tabs.clone(),
                active_tab: group.active_tab,
                is_active: group.id == self.active,
                is_locked: group.locked,
            })
            .collect()
    }

    fn locate_tab(&self, id: TabId) -> Option<(usize, usize)> {
        self.main
            .iter()
            .chain(&self.aux)
            .enumerate()
            .find_map(|(index, group)| {
                group
                    .tabs
                    .iter()
                    .position(|tab| tab.id == id)
                    .map(|position| (index, position))
            })
    }

    fn terminal_in_editor(&self, id: TerminalId) -> Option<(usize, usize)> {
        self.main
            .iter()
            .chain(&self.aux)
            .enumerate()
            .find_map(|(index, group)| {
                group
                    .tabs
                    .iter()
                    .position(|tab| tab.input == TabInput::terminal(id))
                    .map(|position| (index, position))
            })
    }

    fn panel_terminals(&self) -> Vec<TerminalId> {
        self.terminals
            .iter()
            .map(|terminal| terminal.id)
            .filter(|id| self.terminal_in_editor(*id).is_none())
            .collect()
    }

    fn take_failure(&mut self, command: &'static str) -> Result<(), HostError> {
        match self.failures.get_mut(command) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(HostError::command_failed(command, "injected failure"))
            }
            _ => Ok(()),
        }
    }

    fn focus(&mut self, index: usize) -> Result<(), HostError> {
        let group = self.group(index).ok_or(HostError::GroupNotFound { index })?;
        self.active = group.id;
        Ok(())
    }

    /// Removes the group at `index` unless it is the only main window group.
    fn remove_group(&mut self, index: usize) -> Option<Group> {
        let removed = match index.checked_sub(self.main.len()) {
            None => grid::remove_leaf(&mut self.layout, index).then(|| self.main.remove(index)),
            Some(aux) if aux < self.aux.len() => Some(self.aux.remove(aux)),
            Some(_) => None,
        }?;
        if removed.id == self.active {
            let fallback = index.min(self.group_count().saturating_sub(1));
            if let Some(group) = self.group(fallback) {
                self.active = group.id;
            }
        }
        Some(removed)
    }

    fn close_terminal_tabs(&mut self, tabs: &[Tab], events: &mut Vec<HostEvent>) {
        for tab in tabs {
            if let TabInput::Terminal {
                terminal: Some(terminal),
            } = tab.input
            {
                self.forget_terminal(terminal, events);
            }
        }
    }

    fn forget_terminal(&mut self, terminal: TerminalId, events: &mut Vec<HostEvent>) {
        let before = self.terminals.len();
        self.terminals.retain(|info| info.id != terminal);
        if self.terminals.len() == before {
            return;
        }
        if self.active_terminal == Some(terminal) {
            self.active_terminal = self.terminals.last().map(|info| info.id);
        }
        events.push(HostEvent::TerminalClosed(terminal));
    }

    fn new_group(
        &mut self,
        orientation: Orientation,
        placement: Placement,
    ) -> Result<(), HostError> {
        let index = self.active_index();
        let group = Group::new(GroupId(self.allocate()));
        let id = group.id;
        match index.checked_sub(self.main.len()) {
            None => {
                let at = grid::insert_leaf(&mut self.layout, index, orientation, placement)
                    .ok_or(HostError::GroupNotFound { index })?;
                self.main.insert(at, group);
            }
            Some(aux) => {
                let at = match placement {
                    Placement::Before => aux,
                    Placement::After => aux + 1,
                };
                self.aux.insert(at.min(self.aux.len()), group);
            }
        }
        self.active = id;
        Ok(())
    }

    fn move_group_left(&mut self) {
        let index = self.active_index();
        match index.checked_sub(self.main.len()) {
            None if index > 0 => self.main.swap(index, index - 1),
            Some(aux) if aux > 0 => self.aux.swap(aux, aux - 1),
            _ => {}
        }
    }

    fn join_groups(&mut self) -> Result<(), HostError> {
        let index = self.active_index();
        let (window_start, window_len) = if index < self.main.len() {
            (0, self.main.len())
        } else {
            (self.main.len(), self.aux.len())
        };
        let local = index - window_start;
        let target = if local + 1 < window_len {
            index + 1
        } else if local > 0 {
            index - 1
        } else {
            return Ok(());
        };
        let target_id = self
            .group(target)
            .map(|group| group.id)
            .ok_or(HostError::GroupNotFound { index: target })?;
        let source = self
            .remove_group(index)
            .ok_or(HostError::GroupNotFound { index })?;
        let target_index = self
            .index_of(target_id)
            .ok_or(HostError::GroupNotFound { index: target })?;
        let group = self
            .group_mut(target_index)
            .ok_or(HostError::GroupNotFound { index: target_index })?;
        let active_tab = source.active_tab.or(group.active_tab);
        group.tabs.extend(source.tabs);
        group.active_tab = active_tab;
        self.active = target_id;
        Ok(())
    }

    fn open_editor_at(&mut self, position: usize) -> Result<(), HostError> {
        let index = self.active_index();
        let group = self.active_group_mut()?;
        let tab = group
            .tabs
            .get(position)
            .ok_or(HostError::TabNotFound {
                group: index,
                index: position,
            })?
            .id;
        group.active_tab = Some(tab);
        Ok(())
    }

    fn move_active_editor(&mut self, target: GroupTarget) -> Result<(), HostError> {
        let source = self.active_index();
        let destination = target.index();
        if destination >= self.group_count() {
            return Err(HostError::GroupNotFound { index: destination });
        }
        if destination == source {
            return Ok(());
        }
        let group = self.active_group_mut()?;
        let position = group.active_position().ok_or(HostError::TabNotFound {
            group: source,
            index: 0,
        })?;
        let tab = group.remove(position);
        let source_emptied = group.tabs.is_empty();

        let target_group = self
            .group_mut(destination)
            .ok_or(HostError::GroupNotFound { index: destination })?;
        target_group.push(tab);
        let target_id = target_group.id;
        self.active = target_id;

        if source_emptied {
            self.remove_group(source);
        }
        Ok(())
    }

    fn move_terminal_to_editor(&mut self) -> Result<(), HostError> {
        let index = self.active_index();
        let panel = self.panel_terminals();
        let Some(terminal) = self
            .active_terminal
            .filter(|id| panel.contains(id))
            .or_else(|| panel.first().copied())
        else {
            return Ok(());
        };
        if self
            .group(index)
            .is_some_and(|group| group.locked)
        {
            return Err(HostError::GroupLocked { index });
        }
        let mut tab = self.new_tab(TabInput::terminal(terminal));
        if let Some(name) = self
            .terminals
            .iter()
            .find(|info| info.id == terminal)
            .and_then(|info| info.options.name.clone())
        {
            tab.label = name;
        }
        self.active_group_mut()?.push(tab);
        self.active_terminal = Some(terminal);
        Ok(())
    }

    fn set_layout(&mut self, layout: EditorLayout) {
        let mut layout = layout;
        grid::normalize(&mut layout);
        let wanted = layout.leaf_count().max(1);
        while self.main.len() < wanted {
            let group = Group::new(GroupId(self.allocate()));
            self.main.push(group);
        }
        while self.main.len() > wanted {
            let Some(extra) = self.main.pop() else {
                break;
            };
            if let Some(last) = self.main.last_mut() {
                last.tabs.extend(extra.tabs);
                if last.active_tab.is_none() {
                    last.active_tab = last.tabs.first().map(|tab| tab.id);
                }
                if extra.id == self.active {
                    self.active = last.id;
                }
            }
        }
        self.layout = layout;
    }

    fn close_active_group(&mut self, events: &mut Vec<HostEvent>) -> Result<(), HostError> {
        let index = self.active_index();
        let group = self.active_group_mut()?;
        let tabs = std::mem::take(&mut group.tabs);
        group.active_tab = None;
        self.close_terminal_tabs(&tabs, events);
        self.remove_group(index);
        Ok(())
    }

    fn run(&mut self, command: HostCommand, events: &mut Vec<HostEvent>) -> Result<(), HostError> {
        match command {
            HostCommand::MovePanelToSidePanel => self.panel_in_side_bar = true,
            HostCommand::FocusGroup(index) => self.focus(index.min(super::MAX_DIRECT_FOCUS_INDEX))?,
            HostCommand::FocusNextGroup => {
                let next = (self.active_index() + 1) % self.group_count().max(1);
                self.focus(next)?;
            }
            HostCommand::FocusLastGroup => self.focus(self.group_count().saturating_sub(1))?,
            HostCommand::MoveActiveGroupLeft => self.move_group_left(),
            HostCommand::JoinTwoGroups => self.join_groups()?,
            HostCommand::NewGroupLeft => {
                self.new_group(Orientation::Horizontal, Placement::Before)?;
            }
            HostCommand::NewGroupRight => {
                self.new_group(Orientation::Horizontal, Placement::After)?;
            }
            HostCommand::NewGroupBelow => self.new_group(Orientation::Vertical, Placement::After)?,
            HostCommand::OpenEditorAtIndex(position) => self.open_editor_at(position)?,
            HostCommand::MoveActiveEditor(target) => self.move_active_editor(target)?,
            HostCommand::LockGroup => self.active_group_mut()?.locked = true,
            HostCommand::UnlockGroup => self.active_group_mut()?.locked = false,
            HostCommand::MoveTerminalToEditor => self.move_terminal_to_editor()?,
            HostCommand::EvenEditorWidths => grid::even_widths(&mut self.layout),
            HostCommand::SetEditorLayout(layout) => self.set_layout(layout),
            HostCommand::CloseEditorsAndGroup => self.close_active_group(events)?,
            HostCommand::SetContext { key, value } => {
                self.context.insert(key, value);
            }
        }
        Ok(())
    }

    fn add_terminal(
        &mut self,
        options: TerminalOptions,
        events: &mut Vec<HostEvent>,
    ) -> TerminalId {
        let id = TerminalId(self.allocate());
        let info = TerminalInfo {
            id,
            options: options.clone(),
        };
        self.terminals.push(info.clone());
        events.push(HostEvent::TerminalOpened(info));

        if let Some(TerminalLocation::Editor {
            view_column,
            preserve_focus,
        }) = options.location
        {
            let index = usize::from(view_column.max(1) - 1)
                .min(self.group_count().saturating_sub(1));
            let mut tab = self.new_tab(TabInput::terminal(id));
            if let Some(name) = options.name {
                tab.label = name;
            }
            if let Some(group) = self.group_mut(index) {
                group.push(tab);
                let group_id = group.id;
                if !preserve_focus {
                    self.active = group_id;
                }
            }
        }
        self.active_terminal = Some(id);
        id
    }

    /// Opens `input` in a column without moving focus, reusing an open tab.
    fn open_in_column(&mut self, input: TabInput, column: ViewColumn) {
        let index = column.index().min(self.group_count().saturating_sub(1));
        let existing = self
            .group(index)
            .and_then(|group| group.tabs.iter().find(|tab| tab.input == input))
            .map(|tab| tab.id);
        let tab = if existing.is_some() {
            None
        } else {
            Some(self.new_tab(input))
        };
        let Some(group) = self.group_mut(index) else {
            return;
        };
        match tab {
            Some(tab) => group.push(tab),
            None => group.active_tab = existing,
        }
    }

    fn load(&mut self, snapshot: HostSnapshot) {
        let mut groups = snapshot.groups;
        if groups.is_empty() {
            groups.push(GroupSnapshot::default());
        }
        self.layout = snapshot
            .layout
            .unwrap_or_else(|| equal_columns(groups.len()));
        self.next_id = snapshot
            .terminals
            .iter()
            .map(|info| info.id.0 + 1)
            .max()
            .unwrap_or(1)
            .max(self.next_id);

        self.main = groups
            .into_iter()
            .map(|group| self.build_group(group))
            .collect();
        self.aux = snapshot
            .window_groups
            .into_iter()
            .map(|group| self.build_group(group))
            .collect();

        self.terminals = snapshot.terminals;
        self.active_terminal = snapshot
            .active_terminal
            .filter(|id| self.terminals.iter().any(|info| info.id == *id));
        self.context = snapshot.context;
        if let Some(group) = self.group(snapshot.active_group).or_else(|| self.group(0)) {
            self.active = group.id;
        }
    }

    fn build_group(&mut self, described: GroupSnapshot) -> Group {
        let mut group = Group::new(GroupId(self.allocate()));
        for input in described.tabs {
            let tab = self.new_tab(input);
            group.push_background(tab);
        }
        group.active_tab = described
            .active_tab
            .and_then(|position| group.tabs.get(position))
            .map(|tab| tab.id)
            .or(group.active_tab);
        group.locked = described.locked;
        group
    }
}

fn equal_columns(count: usize) -> EditorLayout {
    if count <= 1 {
        return EditorLayout::single();
    }
    EditorLayout {
        orientation: Orientation::Horizontal,
        groups: vec![GroupLayout::leaf(1.0 / count as f64); count],
    }
}

/// Appends group/tab change events for the transition `before` -> `after`.
fn diff_events(before: &[TabGroup], after: &[TabGroup], events: &mut Vec<HostEvent>) {
    let old: HashMap<GroupId, &TabGroup> = before.iter().map(|group| (group.id, group)).collect();
    let new: HashMap<GroupId, &TabGroup> = after.iter().map(|group| (group.id, group)).collect();

    let opened: Vec<TabGroup> = after
        .iter()
        .filter(|group| !old.contains_key(&group.id))
        .cloned()
        .collect();
    let closed: Vec<TabGroup> = before
        .iter()
        .filter(|group| !new.contains_key(&group.id))
        .cloned()
        .collect();
    let changed: Vec<TabGroup> = after
        .iter()
        .filter(|group| old.get(&group.id).is_some_and(|previous| *previous != *group))
        .cloned()
        .collect();
    if !(opened.is_empty() && closed.is_empty() && changed.is_empty()) {
        events.push(HostEvent::TabGroupsChanged {
            opened,
            closed,
            changed,
        });
    }

    let placements = |groups: &[TabGroup]| -> HashMap<TabId, (GroupId, usize, bool, Tab)> {
        groups
            .iter()
            .flat_map(|group| {
                group.tabs.iter().enumerate().map(move |(position, tab)| {
                    (
                        tab.id,
                        (group.id, position, group.active_tab == Some(tab.id), tab.clone()),
                    )
                })
            })
            .collect()
    };
    let old_tabs = placements(before);
    let new_tabs = placements(after);
    let ordered = |groups: &[TabGroup]| -> Vec<Tab> {
        groups.iter().flat_map(|group| group.tabs.iter().cloned()).collect()
    };

    let opened: Vec<Tab> = ordered(after)
        .into_iter()
        .filter(|tab| !old_tabs.contains_key(&tab.id))
        .collect();
    let closed: Vec<Tab> = ordered(before)
        .into_iter()
        .filter(|tab| !new_tabs.contains_key(&tab.id))
        .collect();
    let changed: Vec<Tab> = ordered(after)
        .into_iter()
        .filter(|tab| {
            old_tabs
                .get(&tab.id)
                .zip(new_tabs.get(&tab.id))
                .is_some_and(|(previous, current)| previous != current)
        })
        .collect();
    if !(opened.is_empty() && closed.is_empty() && changed.is_empty()) {
        events.push(HostEvent::TabsChanged {
            opened,
            closed,
            changed,
        });
    }
}

/// In-memory editor workbench.
#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<HostState>,
    events: broadcast::Sender<HostEvent>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// A window with one empty group.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(HostState::empty()),
            events,
        }
    }

    /// Side-by-side columns holding `groups`, with the first group active.
    pub fn with_groups(groups: Vec<Vec<TabInput>>) -> Self {
        let snapshot = HostSnapshot {
            groups: groups.into_iter().map(GroupSnapshot::with_tabs).collect(),
            ..HostSnapshot::default()
        };
        let host = Self::new();
        host.state.lock().load(snapshot);
        host
    }

    pub fn from_snapshot(snapshot: HostSnapshot) -> Result<Self> {
        let groups = snapshot.groups.len().max(1);
        if let Some(layout) = &snapshot.layout {
            ensure!(
                layout.leaf_count() == groups,
                "layout has {} groups but {} were described",
                layout.leaf_count(),
                groups
            );
        }
        let total = groups + snapshot.window_groups.len();
        ensure!(
            snapshot.active_group < total,
            "active group {} is out of range ({total} groups)",
            snapshot.active_group
        );
        for group in snapshot.groups.iter().chain(&snapshot.window_groups) {
            for input in &group.tabs {
                if let TabInput::Terminal {
                    terminal: Some(id),
                } = input
                {
                    ensure!(
                        snapshot.terminals.iter().any(|info| info.id == *id),
                        "tab refers to unknown {id}"
                    );
                }
            }
        }

        let host = Self::new();
        host.state.lock().load(snapshot);
        Ok(host)
    }

    pub fn snapshot(&self) -> HostSnapshot {
        let state = self.state.lock();
        let describe = |group: &Group| GroupSnapshot {
            tabs: group.tabs.iter().map(|tab| tab.input.clone()).collect(),
            active_tab: group.active_position(),
            locked: group.locked,
        };
        HostSnapshot {
            layout: Some(state.layout.clone()),
            groups: state.main.iter().map(describe).collect(),
            window_groups: state.aux.iter().map(describe).collect(),
            active_group: state.active_index(),
            terminals: state.terminals.clone(),
            active_terminal: state.active_terminal,
            context: state.context.clone(),
        }
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut HostState, &mut Vec<HostEvent>) -> T) -> T {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            let before = state.tab_groups();
            let active_terminal = state.active_terminal;
            let result = apply(&mut state, &mut events);
            diff_events(&before, &state.tab_groups(), &mut events);
            if state.active_terminal != active_terminal {
                events.push(HostEvent::ActiveTerminalChanged(state.active_terminal));
            }
            result
        };
        for event in events {
            // Nobody listening is fine.
            self.events.send(event).ok();
        }
        result
    }

    /// Make the next `times` invocations of `command_id` fail.
    pub fn inject_failure(&self, command_id: &str, times: usize) {
        self.state.lock().failures.insert(command_id.to_string(), times);
    }

    pub fn set_terminal_profiles(&self, settings: TerminalProfileSettings) {
        self.state.lock().profiles = settings;
    }

    /// Every command executed so far, failed ones included.
    pub fn commands(&self) -> Vec<HostCommand> {
        self.state.lock().commands.clone()
    }

    pub fn command_ids(&self) -> Vec<&'static str> {
        self.state
            .lock()
            .commands
            .iter()
            .map(HostCommand::command_id)
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    pub fn context(&self, key: &str) -> Option<bool> {
        self.state.lock().context.get(key).copied()
    }

    pub fn panel_in_side_bar(&self) -> bool {
        self.state.lock().panel_in_side_bar
    }

    /// Opens `input` in group `group` and focuses it.
    pub fn open_tab(&self, group: usize, input: TabInput) -> Result<TabId, HostError> {
        self.mutate(|state, _| {
            let tab = state.new_tab(input);
            let id = tab.id;
            let target = state
                .group_mut(group)
                .ok_or(HostError::GroupNotFound { index: group })?;
            target.push(tab);
            let group_id = target.id;
            state.active = group_id;
            Ok(id)
        })
    }

    /// Opens `input` in a new auxiliary window and focuses it.
    pub fn open_in_new_window(&self, input: TabInput) -> TabId {
        self.mutate(|state, _| {
            let tab = state.new_tab(input);
            let id = tab.id;
            let mut group = Group::new(GroupId(state.allocate()));
            group.push(tab);
            state.active = group.id;
            state.aux.push(group);
            id
        })
    }

    pub fn activate_tab(&self, tab: TabId) -> Result<(), HostError> {
        self.mutate(|state, _| {
            let (index, _) = state.locate_tab(tab).ok_or(HostError::TabNotFound {
                group: state.active_index(),
                index: 0,
            })?;
            if let Some(group) = state.group_mut(index) {
                group.active_tab = Some(tab);
                let group_id = group.id;
                state.active = group_id;
            }
            Ok(())
        })
    }

    /// Closes a tab; a group left empty is closed with it.
    pub fn close_tab(&self, tab: TabId) -> Result<(), HostError> {
        self.mutate(|state, events| {
            let (index, position) = state.locate_tab(tab).ok_or(HostError::TabNotFound {
                group: state.active_index(),
                index: 0,
            })?;
            let group = state
                .group_mut(index)
                .ok_or(HostError::GroupNotFound { index })?;
            let removed = group.remove(position);
            let emptied = group.tabs.is_empty();
            state.close_terminal_tabs(std::slice::from_ref(&removed), events);
            if emptied {
                state.remove_group(index);
            }
            Ok(())
        })
    }

    /// Starts a terminal the way a user or another extension would.
    pub fn open_terminal(&self, options: TerminalOptions) -> TerminalId {
        self.mutate(|state, events| state.add_terminal(options, events))
    }

    pub fn close_terminal(&self, terminal: TerminalId) -> Result<(), HostError> {
        self.mutate(|state, events| {
            if let Some((index, position)) = state.terminal_in_editor(terminal) {
                let group = state
                    .group_mut(index)
                    .ok_or(HostError::GroupNotFound { index })?;
                group.remove(position);
                if group.tabs.is_empty() {
                    state.remove_group(index);
                }
            }
            if !state.terminals.iter().any(|info| info.id == terminal) {
                return Err(HostError::TerminalNotFound(terminal));
            }
            state.forget_terminal(terminal, events);
            Ok(())
        })
    }
}

#[async_trait]
impl WindowHost for MemoryHost {
    fn tab_groups(&self) -> Vec<TabGroup> {
        self.state.lock().tab_groups()
    }

    fn active_group_index(&self) -> Option<usize> {
        let state = self.state.lock();
        state.index_of(state.active)
    }

    fn terminals(&self) -> Vec<TerminalInfo> {
        self.state.lock().terminals.clone()
    }

    fn active_terminal(&self) -> Option<TerminalId> {
        self.state.lock().active_terminal
    }

    fn terminal_profiles(&self) -> TerminalProfileSettings {
        self.state.lock().profiles.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    async fn editor_layout(&self) -> Result<EditorLayout, HostError> {
        let mut state = self.state.lock();
        state.take_failure(GET_EDITOR_LAYOUT)?;
        if state.active_index() >= state.main.len() {
            return Ok(EditorLayout::single());
        }
        Ok(state.layout.clone())
    }

    async fn execute(&self, command: HostCommand) -> Result<(), HostError> {
        trace!(command = command.command_id(), ?command, "exec");
        self.mutate(|state, events| {
            state.commands.push(command.clone());
            state.take_failure(command.command_id())?;
            state.run(command, events)
        })
    }

    async fn show_terminal(&self, terminal: TerminalId) -> Result<(), HostError> {
        self.mutate(|state, _| {
            if !state.terminals.iter().any(|info| info.id == terminal) {
                return Err(HostError::TerminalNotFound(terminal));
            }
            if let Some((index, position)) = state.terminal_in_editor(terminal)
                && let Some(group) = state.group_mut(index)
            {
                group.active_tab = group.tabs.get(position).map(|tab| tab.id);
                let group_id = group.id;
                state.active = group_id;
            }
            state.active_terminal = Some(terminal);
            Ok(())
        })
    }

    async fn create_terminal(&self, options: TerminalOptions) -> Result<TerminalId, HostError> {
        self.mutate(|state, events| Ok(state.add_terminal(options, events)))
    }

    async fn open_task_editor(&self, cwd: &Path, column: ViewColumn) -> Result<(), HostError> {
        let input = TabInput::task(TaskUri::new_task(cwd).to_uri_string());
        self.mutate(|state, _| {
            state.open_in_column(input, column);
            Ok(())
        })
    }

    async fn show_document(&self, uri: &str, column: ViewColumn) -> Result<(), HostError> {
        let input = TabInput::text(uri);
        self.mutate(|state, _| {
            state.open_in_column(input, column);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabs::GroupType;
    use pretty_assertions::assert_eq;

    fn text(name: &str) -> TabInput {
        TabInput::text(format!("file:///work/{name}"))
    }

    fn group_types(host: &MemoryHost) -> Vec<GroupType> {
        host.tab_groups().iter().map(TabGroup::group_type).collect()
    }

    #[tokio::test]
    async fn new_groups_follow_the_grid() {
        let host = MemoryHost::new();
        host.execute(HostCommand::NewGroupRight).await.expect("right");
        host.execute(HostCommand::NewGroupBelow).await.expect("below");

        let layout = host.editor_layout().await.expect("layout");
        assert_eq!(layout.orientation, Orientation::Horizontal);
        assert_eq!(layout.leaf_count(), 3);
        assert!(layout.groups[0].is_leaf());
        assert_eq!(host.active_group_index(), Some(2));

        host.execute(HostCommand::FocusGroup(0)).await.expect("focus");
        host.execute(HostCommand::NewGroupLeft).await.expect("left");
        assert_eq!(host.tab_groups().len(), 4);
        assert_eq!(host.active_group_index(), Some(0));
    }

    #[tokio::test]
    async fn join_merges_into_the_next_group() {
        let host = MemoryHost::with_groups(vec![vec![text("a.rs")], vec![text("b.rs")], vec![]]);
        host.execute(HostCommand::FocusGroup(0)).await.expect("focus");
        host.execute(HostCommand::JoinTwoGroups).await.expect("join");

        let groups = host.tab_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].tabs.len(), 2);
        assert!(groups[0].is_active);

        // The last group joins its left neighbour.
        host.execute(HostCommand::FocusLastGroup).await.expect("focus");
        host.execute(HostCommand::JoinTwoGroups).await.expect("join");
        assert_eq!(host.tab_groups().len(), 1);
        assert_eq!(host.editor_layout().await.expect("layout").leaf_count(), 1);
    }

    #[tokio::test]
    async fn moving_the_last_editor_closes_its_group() {
        let host = MemoryHost::with_groups(vec![
            vec![],
            vec![TabInput::task("pochi-task:///1")],
            vec![],
        ]);
        host.execute(HostCommand::FocusGroup(1)).await.expect("focus");
        host.execute(HostCommand::MoveActiveEditor(GroupTarget::First))
            .await
            .expect("move");

        assert_eq!(group_types(&host), vec![GroupType::Task, GroupType::Empty]);
        assert_eq!(host.active_group_index(), Some(0));
        assert_eq!(
            host.execute(HostCommand::MoveActiveEditor(GroupTarget::Position(5))).await,
            Err(HostError::GroupNotFound { index: 4 })
        );
    }

    #[tokio::test]
    async fn terminals_move_into_unlocked_groups_only() {
        let host = MemoryHost::with_groups(vec![vec![], vec![]]);
        let terminal = host.open_terminal(TerminalOptions::with_cwd("/work"));
        host.execute(HostCommand::FocusGroup(1)).await.expect("focus");
        host.execute(HostCommand::LockGroup).await.expect("lock");
        assert_eq!(
            host.execute(HostCommand::MoveTerminalToEditor).await,
            Err(HostError::GroupLocked { index: 1 })
        );

        host.execute(HostCommand::UnlockGroup).await.expect("unlock");
        host.execute(HostCommand::MoveTerminalToEditor).await.expect("move");
        assert_eq!(group_types(&host), vec![GroupType::Empty, GroupType::Terminal]);
        assert_eq!(host.tab_groups()[1].tabs[0].input, TabInput::terminal(terminal));

        // Nothing left in the panel.
        host.execute(HostCommand::MoveTerminalToEditor).await.expect("noop");
        assert_eq!(host.tab_groups()[1].tabs.len(), 1);
    }

    #[tokio::test]
    async fn set_layout_merges_surplus_groups() {
        let host = MemoryHost::with_groups(vec![
            vec![text("a.rs")],
            vec![text("b.rs")],
            vec![text("c.rs")],
            vec![text("d.rs")],
        ]);
        host.execute(HostCommand::SetEditorLayout(EditorLayout::canonical()))
            .await
            .expect("layout");
        let groups = host.tab_groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].tabs.len(), 2);
        assert_eq!(host.editor_layout().await.expect("layout"), EditorLayout::canonical());
    }

    #[tokio::test]
    async fn injected_failures_are_counted_down() {
        let host = MemoryHost::new();
        host.inject_failure("workbench.action.joinTwoGroups", 1);
        assert!(matches!(
            host.execute(HostCommand::JoinTwoGroups).await,
            Err(HostError::CommandFailed { command: "workbench.action.joinTwoGroups", .. })
        ));
        assert_eq!(host.execute(HostCommand::JoinTwoGroups).await, Ok(()));
        assert_eq!(
            host.command_ids(),
            vec!["workbench.action.joinTwoGroups", "workbench.action.joinTwoGroups"]
        );
    }

    #[tokio::test]
    async fn auxiliary_windows_report_their_own_grid() {
        let host = MemoryHost::with_groups(vec![vec![text("a.rs")], vec![]]);
        host.open_in_new_window(text("b.rs"));
        assert_eq!(host.tab_groups().len(), 3);
        assert_eq!(host.editor_layout().await.expect("layout"), EditorLayout::single());

        host.execute(HostCommand::FocusGroup(0)).await.expect("focus");
        assert_eq!(host.editor_layout().await.expect("layout").leaf_count(), 2);
    }

    #[tokio::test]
    async fn publishes_tab_and_terminal_events() {
        let host = MemoryHost::new();
        let mut events = host.subscribe();

        let tab = host.open_tab(0, text("a.rs")).expect("open");
        match events.recv().await.expect("event") {
            HostEvent::TabGroupsChanged { changed, .. } => assert_eq!(changed.len(), 1),
            other => panic!("unexpected event {other:?}"),
        }
        match events.recv().await.expect("event") {
            HostEvent::TabsChanged { opened, .. } => {
                assert_eq!(opened.iter().map(|tab| tab.id).collect::<Vec<_>>(), vec![tab]);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let terminal = host.open_terminal(TerminalOptions::default());
        assert!(matches!(
            events.recv().await.expect("event"),
            HostEvent::TerminalOpened(TerminalInfo { id, .. }) if id == terminal
        ));
        assert_eq!(
            events.recv().await.expect("event"),
            HostEvent::ActiveTerminalChanged(Some(terminal))
        );
    }

    #[tokio::test]
    async fn editor_terminals_and_background_documents() {
        let host = MemoryHost::with_groups(vec![vec![], vec![], vec![]]);
        let terminal = host
            .create_terminal(TerminalOptions {
                location: Some(TerminalLocation::Editor {
                    view_column: 3,
                    preserve_focus: true,
                }),
                ..TerminalOptions::default()
            })
            .await
            .expect("terminal");
        host.open_task_editor(Path::new("/work"), ViewColumn::One)
            .await
            .expect("task");
        host.show_document("file:///work/README.md", ViewColumn::Two)
            .await
            .expect("document");

        assert_eq!(
            group_types(&host),
            vec![GroupType::Task, GroupType::Editor, GroupType::Terminal]
        );
        assert_eq!(host.active_group_index(), Some(0));

        host.show_terminal(terminal).await.expect("show");
        assert_eq!(host.active_group_index(), Some(2));
        assert_eq!(host.active_terminal(), Some(terminal));
    }

    #[test]
    fn snapshots_round_trip_through_json() {
        let host = MemoryHost::with_groups(vec![vec![text("a.rs"), text("b.rs")], vec![]]);
        let json = serde_json::to_string(&host.snapshot()).expect("serialize");
        let restored: HostSnapshot = serde_json::from_str(&json).expect("deserialize");
        let copy = MemoryHost::from_snapshot(restored).expect("restore");
        assert_eq!(copy.snapshot(), host.snapshot());
    }

    #[test]
    fn rejects_inconsistent_snapshots() {
        let snapshot = HostSnapshot {
            layout: Some(EditorLayout::canonical()),
            groups: vec![GroupSnapshot::default()],
            ..HostSnapshot::default()
        };
        assert!(MemoryHost::from_snapshot(snapshot).is_err());

        let snapshot = HostSnapshot {
            groups: vec![GroupSnapshot::with_tabs(vec![TabInput::terminal(TerminalId(9))])],
            ..HostSnapshot::default()
        };
        assert!(MemoryHost::from_snapshot(snapshot).is_err());
    }
}
