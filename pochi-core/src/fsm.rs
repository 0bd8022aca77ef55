//! States and events of the layout reconciliation machine.
//!
//! [`transition`] is pure; the effects attached to entering a state are run
//! by the [`LayoutManager`](crate::manager::LayoutManager).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutState {
    Initial,
    NonPochiLayout,
    PochiLayout,
    ApplyInProgress,
}

impl LayoutState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::NonPochiLayout => "non-pochi-layout",
            Self::PochiLayout => "pochi-layout",
            Self::ApplyInProgress => "apply-in-progress",
        }
    }
}

impl fmt::Display for LayoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What asked for the layout to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyTrigger {
    #[default]
    Manual,
    OpenTask,
    CreateTerminal,
    OpenEditor,
}

impl fmt::Display for ApplyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::OpenTask => "open-task",
            Self::CreateTerminal => "create-terminal",
            Self::OpenEditor => "open-editor",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartApply {
    pub trigger: ApplyTrigger,
    pub cwd: Option<PathBuf>,
    pub cycle_focus: bool,
}

impl StartApply {
    pub fn new(trigger: ApplyTrigger, cwd: Option<PathBuf>) -> Self {
        Self {
            trigger,
            cwd,
            cycle_focus: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutEvent {
    StartApply(StartApply),
    CompleteApply,
    FailApply,
    LayoutInvalid,
    LayoutValid,
}

impl LayoutEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartApply(_) => "start-apply",
            Self::CompleteApply => "complete-apply",
            Self::FailApply => "fail-apply",
            Self::LayoutInvalid => "layout-invalid",
            Self::LayoutValid => "layout-valid",
        }
    }
}

/// Next state for `event`, or `None` when the current state ignores it.
pub fn transition(state: LayoutState, event: &LayoutEvent) -> Option<LayoutState> {
    use LayoutEvent as E;
    use LayoutState as S;

    match (state, event) {
        (S::Initial, E::LayoutValid) => Some(S::PochiLayout),
        (S::Initial, E::LayoutInvalid) => Some(S::NonPochiLayout),
        (S::PochiLayout, E::StartApply(_)) => Some(S::ApplyInProgress),
        (S::PochiLayout, E::LayoutInvalid) => Some(S::NonPochiLayout),
        (S::NonPochiLayout, E::StartApply(_)) => Some(S::ApplyInProgress),
        (S::NonPochiLayout, E::LayoutValid) => Some(S::PochiLayout),
        (S::ApplyInProgress, E::CompleteApply) => Some(S::PochiLayout),
        (S::ApplyInProgress, E::FailApply) => Some(S::NonPochiLayout),
        _ => None,
    }
}

/// Effect to run after entering a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryAction {
    Validate,
    Apply(StartApply),
}

/// Entry effect for `state` when it was reached through `event`.
///
/// `event` is `None` when the machine (re)starts in [`LayoutState::Initial`].
pub fn entry_action(state: LayoutState, event: Option<&LayoutEvent>) -> Option<EntryAction> {
    match (state, event) {
        (LayoutState::Initial, _) => Some(EntryAction::Validate),
        (LayoutState::ApplyInProgress, Some(LayoutEvent::StartApply(request))) => {
            Some(EntryAction::Apply(request.clone()))
        }
        _ => None,
    }
}
