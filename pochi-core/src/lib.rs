//! Editor layout reconciliation for Pochi.
//!
//! The [`LayoutManager`] watches an editor host through the [`WindowHost`]
//! port and coerces whatever arrangement the user left behind into three
//! columns: task tabs on the left, editors on the top right and terminals on
//! the bottom right.
//!
//! ```text
//! +--------+----------------+
//! |        |     editor     |
//! |  task  +----------------+
//! |        |    terminal    |
//! +--------+----------------+
//! ```

pub mod applier;
pub mod default_document;
pub mod error;
pub mod exclusive;
pub mod fsm;
pub mod geometry;
pub mod host;
pub mod manager;
pub mod tabs;
pub mod task_uri;
pub mod timed_jobs;
pub mod validate;

pub use applier::LayoutApplier;
pub use default_document::{DefaultDocument, find_default_document, resolve_default_document};
pub use error::{HostError, LayoutError};
pub use exclusive::ExclusiveGroup;
pub use fsm::{ApplyTrigger, LayoutEvent, LayoutState, StartApply};
pub use geometry::{EditorLayout, GroupLayout, Orientation};
pub use host::{
    GroupTarget, HostCommand, HostEvent, TerminalInfo, ViewColumn, WindowHost,
    memory::MemoryHost,
};
pub use manager::{ApplyOptions, LayoutManager, LayoutTelemetryEvent, ManagerOptions};
pub use tabs::{
    GroupId, GroupType, Tab, TabGroup, TabGroupsShape, TabId, TabInput, TabKind, TerminalId,
};
pub use task_uri::TaskUri;
pub use timed_jobs::TimedJobList;
pub use validate::{InvalidLayout, validate_layout};
