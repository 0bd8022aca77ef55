//! Tabs, tab groups and the pure classification helpers built on them.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// View type registered by the Pochi task editor.
pub const TASK_EDITOR_VIEW_TYPE: &str = "pochi.taskEditor";

macro_rules! handle_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_id!(TabId, "tab");
handle_id!(GroupId, "group");
handle_id!(TerminalId, "terminal");

/// Content shown by a tab.
///
/// Every variant except [`TabInput::Terminal`] and [`TabInput::Unknown`] is
/// comparable and yields a [`TabIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TabInput {
    Text {
        uri: String,
    },
    TextDiff {
        original: String,
        modified: String,
    },
    #[serde(rename_all = "camelCase")]
    Custom {
        view_type: String,
        uri: String,
    },
    #[serde(rename_all = "camelCase")]
    Webview {
        view_type: String,
    },
    #[serde(rename_all = "camelCase")]
    Notebook {
        notebook_type: String,
        uri: String,
    },
    #[serde(rename_all = "camelCase")]
    NotebookDiff {
        notebook_type: String,
        original: String,
        modified: String,
    },
    Terminal {
        #[serde(default)]
        terminal: Option<TerminalId>,
    },
    Unknown,
}

impl TabInput {
    pub fn text(uri: impl Into<String>) -> Self {
        Self::Text { uri: uri.into() }
    }

    pub fn task(uri: impl Into<String>) -> Self {
        Self::Custom {
            view_type: TASK_EDITOR_VIEW_TYPE.to_string(),
            uri: uri.into(),
        }
    }

    pub fn terminal(id: TerminalId) -> Self {
        Self::Terminal { terminal: Some(id) }
    }

    pub fn kind(&self) -> TabKind {
        match self {
            Self::Custom { view_type, .. } if view_type == TASK_EDITOR_VIEW_TYPE => TabKind::Task,
            Self::Terminal { .. } => TabKind::Terminal,
            _ => TabKind::Other,
        }
    }

    /// Identity used to find a tab again after the host reshuffled groups.
    pub fn identity(&self) -> Option<TabIdentity<'_>> {
        match self {
            Self::Text { uri } => Some(TabIdentity::Text { uri }),
            Self::TextDiff { original, modified } => {
                Some(TabIdentity::TextDiff { original, modified })
            }
            Self::Custom { view_type, uri } => Some(TabIdentity::Custom { view_type, uri }),
            Self::Webview { view_type } => Some(TabIdentity::Webview { view_type }),
            Self::Notebook { notebook_type, uri } => {
                Some(TabIdentity::Notebook { notebook_type, uri })
            }
            Self::NotebookDiff {
                notebook_type,
                original,
                modified,
            } => Some(TabIdentity::NotebookDiff {
                notebook_type,
                original,
                modified,
            }),
            Self::Terminal { .. } | Self::Unknown => None,
        }
    }

    /// Task URI carried by a task tab.
    pub fn task_uri(&self) -> Option<&str> {
        match self {
            Self::Custom { view_type, uri } if view_type == TASK_EDITOR_VIEW_TYPE => Some(uri),
            _ => None,
        }
    }
}

/// Comparable part of a [`TabInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabIdentity<'a> {
    Text {
        uri: &'a str,
    },
    TextDiff {
        original: &'a str,
        modified: &'a str,
    },
    Custom {
        view_type: &'a str,
        uri: &'a str,
    },
    Webview {
        view_type: &'a str,
    },
    Notebook {
        notebook_type: &'a str,
        uri: &'a str,
    },
    NotebookDiff {
        notebook_type: &'a str,
        original: &'a str,
        modified: &'a str,
    },
}

/// Compare two inputs by identity.
///
/// When neither input is comparable the result is `fallback`; when only one
/// of them is comparable the inputs are never equal.
pub fn tab_identity_equals(a: &TabInput, b: &TabInput, fallback: bool) -> bool {
    match (a.identity(), b.identity()) {
        (None, None) => fallback,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TabKind {
    Task,
    Terminal,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub label: String,
    pub input: TabInput,
}

impl Tab {
    pub fn kind(&self) -> TabKind {
        self.input.kind()
    }

    pub fn is_task(&self) -> bool {
        self.kind() == TabKind::Task
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() == TabKind::Terminal
    }
}

/// One editor group as reported by the host, ordered by `view_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: GroupId,
    /// One-based column of the group.
    pub view_column: usize,
    pub tabs: Vec<Tab>,
    pub active_tab: Option<TabId>,
    pub is_active: bool,
    pub is_locked: bool,
}

impl TabGroup {
    pub fn group_type(&self) -> GroupType {
        classify_group(&self.tabs)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        let active = self.active_tab?;
        self.tabs.iter().find(|tab| tab.id == active)
    }

    pub fn position_of(&self, input: &TabInput) -> Option<usize> {
        self.tabs
            .iter()
            .position(|tab| tab_identity_equals(&tab.input, input, false))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupType {
    Empty,
    Task,
    Terminal,
    Editor,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Task => "pochi-task",
            Self::Terminal => "terminal",
            Self::Editor => "editor",
        })
    }
}

pub fn classify_group(tabs: &[Tab]) -> GroupType {
    if tabs.is_empty() {
        GroupType::Empty
    } else if tabs.iter().all(Tab::is_task) {
        GroupType::Task
    } else if tabs.iter().all(Tab::is_terminal) {
        GroupType::Terminal
    } else {
        GroupType::Editor
    }
}

/// Task tab the user most likely works with: the active tab of the active
/// group, then the active tab of any group, then any task tab at all.
pub fn find_active_task_tab(groups: &[TabGroup]) -> Option<&Tab> {
    if let Some(tab) = groups
        .iter()
        .find(|group| group.is_active)
        .and_then(TabGroup::active_tab)
        .filter(|tab| tab.is_task())
    {
        return Some(tab);
    }

    if let Some(tab) = groups
        .iter()
        .filter_map(TabGroup::active_tab)
        .find(|tab| tab.is_task())
    {
        return Some(tab);
    }

    groups
        .iter()
        .flat_map(|group| group.tabs.iter())
        .find(|tab| tab.is_task())
}

/// Ordered per-group tab inputs, used to detect whether an apply changed
/// anything.
#[derive(Debug, Clone, Default)]
pub struct TabGroupsShape {
    groups: Vec<Vec<TabInput>>,
}

impl TabGroupsShape {
    pub fn from_groups(groups: &[TabGroup]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|group| group.tabs.iter().map(|tab| tab.input.clone()).collect())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sub-shape over `range`, clamped to the available groups.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.groups.len());
        let start = range.start.min(end);
        Self {
            groups: self.groups.get(start..end).unwrap_or_default().to_vec(),
        }
    }

    /// Everything but the last group.
    pub fn without_last(&self) -> Self {
        self.slice(0..self.groups.len().saturating_sub(1))
    }

    /// Only the last group, or nothing when empty.
    pub fn last_only(&self) -> Self {
        self.slice(self.groups.len().saturating_sub(1)..self.groups.len())
    }

    /// Structural equality where two non-comparable inputs count as equal.
    pub fn same_as(&self, other: &Self) -> bool {
        self.groups.len() == other.groups.len()
            && self.groups.iter().zip(&other.groups).all(|(a, b)| {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(a, b)| tab_identity_equals(a, b, true))
            })
    }

    fn count(&self, predicate: impl Fn(TabKind) -> bool) -> usize {
        self.groups
            .iter()
            .flatten()
            .filter(|input| predicate(input.kind()))
            .count()
    }

    pub fn count_task_tabs(&self) -> usize {
        self.count(|kind| kind == TabKind::Task)
    }

    pub fn count_terminal_tabs(&self) -> usize {
        self.count(|kind| kind == TabKind::Terminal)
    }

    pub fn count_other_tabs(&self) -> usize {
        self.count(|kind| kind == TabKind::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: u64, input: TabInput) -> Tab {
        Tab {
            id: TabId(id),
            label: String::new(),
            input,
        }
    }

    fn group(id: u64, tabs: Vec<Tab>, active: bool) -> TabGroup {
        TabGroup {
            id: GroupId(id),
            view_column: id as usize + 1,
            active_tab: tabs.first().map(|tab| tab.id),
            tabs,
            is_active: active,
            is_locked: false,
        }
    }

    #[test]
    fn classifies_by_tab_kinds() {
        let task = tab(1, TabInput::task("pochi-task:///a"));
        let term = tab(2, TabInput::terminal(TerminalId(1)));
        let text = tab(3, TabInput::text("file:///a.rs"));

        assert_eq!(classify_group(&[]), GroupType::Empty);
        assert_eq!(classify_group(&[task.clone(), task.clone()]), GroupType::Task);
        assert_eq!(classify_group(&[term.clone()]), GroupType::Terminal);
        assert_eq!(classify_group(&[task.clone(), term.clone()]), GroupType::Editor);
        assert_eq!(classify_group(&[text.clone()]), GroupType::Editor);

        // Order of tabs does not matter.
        assert_eq!(
            classify_group(&[term.clone(), text.clone()]),
            classify_group(&[text, term])
        );
    }

    #[test]
    fn custom_editors_of_other_types_are_plain_editors() {
        let input = TabInput::Custom {
            view_type: "markdown.preview".into(),
            uri: "file:///README.md".into(),
        };
        assert_eq!(input.kind(), TabKind::Other);
        assert!(input.task_uri().is_none());
    }

    #[test]
    fn identity_rules() {
        let a = TabInput::text("file:///a.rs");
        let b = TabInput::text("file:///b.rs");
        let terminal = TabInput::terminal(TerminalId(1));

        assert!(tab_identity_equals(&a, &a.clone(), false));
        assert!(!tab_identity_equals(&a, &b, true));
        assert!(tab_identity_equals(&terminal, &TabInput::Unknown, true));
        assert!(!tab_identity_equals(&terminal, &TabInput::Unknown, false));
        assert!(!tab_identity_equals(&a, &terminal, true));

        let webview_a = TabInput::Webview {
            view_type: "pochi.sidebar".into(),
        };
        assert!(tab_identity_equals(&webview_a, &webview_a.clone(), false));
        assert!(!tab_identity_equals(
            &TabInput::text("file:///a.rs"),
            &TabInput::Notebook {
                notebook_type: "jupyter".into(),
                uri: "file:///a.rs".into()
            },
            false
        ));
    }

    #[test]
    fn shape_equality_is_symmetric() {
        let left = [
            group(0, vec![tab(1, TabInput::task("pochi-task:///a"))], true),
            group(1, vec![tab(2, TabInput::terminal(TerminalId(1)))], false),
        ];
        let right = [
            group(0, vec![tab(7, TabInput::task("pochi-task:///a"))], false),
            group(1, vec![tab(8, TabInput::Unknown)], false),
        ];
        let a = TabGroupsShape::from_groups(&left);
        let b = TabGroupsShape::from_groups(&right);
        assert!(a.same_as(&b));
        assert!(b.same_as(&a));

        let c = TabGroupsShape::from_groups(&left[..1]);
        assert!(!a.same_as(&c));
        assert!(!c.same_as(&a));
    }

    #[test]
    fn shape_slices_clamp() {
        let groups = [
            group(0, vec![tab(1, TabInput::task("pochi-task:///a"))], true),
            group(1, vec![tab(2, TabInput::text("file:///a.rs"))], false),
            group(2, vec![], false),
        ];
        let shape = TabGroupsShape::from_groups(&groups);
        assert_eq!(shape.slice(0..3).len(), 3);
        assert_eq!(shape.slice(2..9).len(), 1);
        assert_eq!(shape.slice(5..9).len(), 0);
        assert_eq!(shape.without_last().len(), 2);
        assert_eq!(shape.last_only().len(), 1);
        assert_eq!(shape.count_task_tabs(), 1);
        assert_eq!(shape.count_other_tabs(), 1);
        assert_eq!(shape.count_terminal_tabs(), 0);
        assert!(TabGroupsShape::default().last_only().is_empty());
    }

    #[test]
    fn active_task_tab_lookup_order() {
        let first_task = tab(1, TabInput::task("pochi-task:///first"));
        let second_task = tab(2, TabInput::task("pochi-task:///second"));
        let text = tab(3, TabInput::text("file:///a.rs"));

        let mut groups = vec![
            group(0, vec![text.clone(), first_task.clone()], true),
            group(1, vec![second_task.clone()], false),
        ];
        assert_eq!(find_active_task_tab(&groups), Some(&second_task));

        groups[0].active_tab = Some(first_task.id);
        assert_eq!(find_active_task_tab(&groups), Some(&first_task));

        groups[1].active_tab = None;
        groups[0].active_tab = Some(text.id);
        assert_eq!(find_active_task_tab(&groups), Some(&first_task));
    }
}
