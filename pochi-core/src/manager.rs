//! Long-lived runtime around the layout state machine.
//!
//! [`LayoutManager`] owns the machine, listens to the host while the feature
//! is enabled, debounces automatic applies and serializes every operation
//! that reads or reshapes the grid.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use pochi_commons::{
    DisplayErrorFormatter, ErrorFormatter, ErrorReporter, NoopErrorReporter, NoopTelemetry,
    TelemetrySink,
};
use pochi_config::LayoutConfig;
use pochi_terminal_detection::{
    TerminalOptions, TerminalPlatform, is_terminal_likely_created_by_default,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::applier::{ApplyReport, LayoutApplier};
use crate::error::{HostError, LayoutError};
use crate::exclusive::ExclusiveGroup;
use crate::fsm::{
    ApplyTrigger, EntryAction, LayoutEvent, LayoutState, StartApply, entry_action, transition,
};
use crate::host::{HostCommand, HostEvent, TerminalInfo, ViewColumn, WindowHost};
use crate::tabs::{Tab, TabGroup, TabGroupsShape, TabId, TabKind, TerminalId, find_active_task_tab};
use crate::task_uri::TaskUri;
use crate::timed_jobs::TimedJobList;
use crate::validate::{InvalidLayout, validate_layout};

/// Context key mirrored to the host whenever the feature is toggled.
pub const ENABLED_CONTEXT_KEY: &str = "pochiLayoutEnabled";

/// Tunables of a [`LayoutManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Delay before a scheduled auto-apply fires.
    pub trigger_delay: Duration,
    /// Pause after focus moves between windows.
    pub window_settle: Duration,
    pub default_document_scan_limit: usize,
    /// Fallback directory for applies that carry no cwd.
    pub workspace_cwd: Option<PathBuf>,
    pub platform: TerminalPlatform,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}

impl ManagerOptions {
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self {
            trigger_delay: config.trigger_delay(),
            window_settle: config.window_settle(),
            default_document_scan_limit: config.default_document_scan_limit,
            workspace_cwd: None,
            platform: TerminalPlatform::current(),
        }
    }

    pub fn with_workspace(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.workspace_cwd = Some(cwd.into());
        self
    }

    fn update_from(&mut self, config: &LayoutConfig) {
        self.trigger_delay = config.trigger_delay();
        self.window_settle = config.window_settle();
        self.default_document_scan_limit = config.default_document_scan_limit;
    }
}

impl From<&LayoutConfig> for ManagerOptions {
    fn from(config: &LayoutConfig) -> Self {
        Self::from_config(config)
    }
}

/// Arguments of a manual apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub cwd: Option<PathBuf>,
    /// Move focus to the next column when the layout is already in place.
    pub cycle_focus: bool,
}

/// Events handed to the configured [`TelemetrySink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutTelemetryEvent {
    StateChanged {
        from: LayoutState,
        to: LayoutState,
        event: &'static str,
    },
    ApplyCompleted {
        trigger: ApplyTrigger,
        focus_group: usize,
        resized: bool,
        terminals_moved: usize,
    },
    ApplyFailed {
        trigger: ApplyTrigger,
        error: String,
    },
    TerminalsMoved {
        count: usize,
    },
}

/// Key of a pending automatic apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKey {
    Tab(TabId),
    Terminal(TerminalId),
}

struct Machine {
    state: LayoutState,
    running: bool,
    /// Bumped on every start and stop so effects of an old run are dropped.
    epoch: u64,
}

struct Inner {
    host: Arc<dyn WindowHost>,
    options: RwLock<ManagerOptions>,
    machine: Mutex<Machine>,
    state_tx: watch::Sender<LayoutState>,
    exclusive: ExclusiveGroup,
    scheduled: TimedJobList<JobKey>,
    enabled: AtomicBool,
    created_terminals: Mutex<HashSet<TerminalId>>,
    shape: Mutex<TabGroupsShape>,
    listener: Mutex<Option<JoinHandle<()>>>,
    terminal_listener: Mutex<Option<JoinHandle<()>>>,
    config_listener: Mutex<Option<JoinHandle<()>>>,
    telemetry: Arc<dyn TelemetrySink<LayoutTelemetryEvent>>,
    reporter: Arc<dyn ErrorReporter>,
}

/// Keeps the host in the Pochi layout while enabled.
///
/// Cloning is cheap and every clone drives the same machine. Must be created
/// inside a Tokio runtime.
#[derive(Clone)]
pub struct LayoutManager {
    inner: Arc<Inner>,
}

impl LayoutManager {
    pub fn new(host: Arc<dyn WindowHost>, options: ManagerOptions) -> Self {
        Self::with_observers(
            host,
            options,
            Arc::new(NoopTelemetry),
            Arc::new(NoopErrorReporter),
        )
    }

    pub fn with_observers(
        host: Arc<dyn WindowHost>,
        options: ManagerOptions,
        telemetry: Arc<dyn TelemetrySink<LayoutTelemetryEvent>>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LayoutState::Initial);
        let inner = Arc::new(Inner {
            host,
            options: RwLock::new(options),
            machine: Mutex::new(Machine {
                state: LayoutState::Initial,
                running: false,
                epoch: 0,
            }),
            state_tx,
            exclusive: ExclusiveGroup::new(),
            scheduled: TimedJobList::new(),
            enabled: AtomicBool::new(false),
            created_terminals: Mutex::new(HashSet::new()),
            shape: Mutex::new(TabGroupsShape::default()),
            listener: Mutex::new(None),
            terminal_listener: Mutex::new(None),
            config_listener: Mutex::new(None),
            telemetry,
            reporter,
        });
        inner.watch_closed_terminals();
        Self { inner }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Turns the feature on or off. Enabling starts the machine and the host
    /// listeners; disabling tears both down.
    pub async fn set_enabled(&self, enabled: bool) {
        self.inner.set_enabled(enabled).await;
    }

    /// Adopts new settings, then applies `config.enabled`.
    pub async fn apply_config(&self, config: &LayoutConfig) {
        self.inner.apply_config(config).await;
    }

    /// Follows a configuration channel until it closes or the manager is
    /// disposed. The current value is applied right away.
    pub fn watch_config(&self, mut config: watch::Receiver<LayoutConfig>) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                let current = config.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_config(&current).await;
                drop(inner);
                if config.changed().await.is_err() {
                    break;
                }
            }
        });
        if let Some(previous) = self.inner.config_listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Requests an apply. Ignored while the machine is stopped, validating or
    /// already applying.
    pub fn start_apply_pochi_layout(&self, options: ApplyOptions) {
        self.inner.send(LayoutEvent::StartApply(StartApply {
            trigger: ApplyTrigger::Manual,
            cwd: options.cwd,
            cycle_focus: options.cycle_focus,
        }));
    }

    /// Column new task editors should open in, if the layout is in place.
    pub fn view_column_for_task(&self) -> Option<ViewColumn> {
        self.inner.in_pochi_layout().then_some(ViewColumn::One)
    }

    /// Column new editor terminals should open in, if the layout is in place.
    pub fn view_column_for_terminal(&self) -> Option<ViewColumn> {
        self.inner.in_pochi_layout().then_some(ViewColumn::Three)
    }

    /// Creates a terminal on the host and remembers it as ours, which exempts
    /// it from the default-terminal heuristic.
    pub async fn create_terminal(&self, options: TerminalOptions) -> Result<TerminalId, HostError> {
        let id = self.inner.host.create_terminal(options).await?;
        self.inner.created_terminals.lock().insert(id);
        Ok(id)
    }

    /// Moves panel terminals into the terminal group.
    pub async fn move_terminals(&self) -> Result<usize, LayoutError> {
        self.inner.move_terminals().await
    }

    /// Runs a validation and reports whether the layout is in place.
    pub async fn validate(&self) -> bool {
        self.inner.validate().await
    }

    pub fn state(&self) -> LayoutState {
        self.inner.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LayoutState> {
        self.inner.state_tx.subscribe()
    }

    pub fn created_terminals(&self) -> Vec<TerminalId> {
        let mut terminals: Vec<_> = self.inner.created_terminals.lock().iter().copied().collect();
        terminals.sort();
        terminals
    }

    pub fn pending_jobs(&self) -> Vec<JobKey> {
        self.inner.scheduled.ids()
    }

    /// Stops the machine, every listener and all pending jobs. Queries keep
    /// working afterwards.
    pub fn dispose(&self) {
        self.inner.detach_listeners();
        self.inner.stop_machine();
        self.inner.enabled.store(false, Ordering::SeqCst);
        for slot in [&self.inner.terminal_listener, &self.inner.config_listener] {
            if let Some(handle) = slot.lock().take() {
                handle.abort();
            }
        }
    }
}

impl Inner {
    fn state(&self) -> LayoutState {
        self.machine.lock().state
    }

    fn in_pochi_layout(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && self.state() == LayoutState::PochiLayout
    }

    fn is_current(&self, epoch: u64) -> bool {
        let machine = self.machine.lock();
        machine.running && machine.epoch == epoch
    }

    fn record(&self, event: LayoutTelemetryEvent) {
        if let Err(error) = self.telemetry.record(&event) {
            warn!(error = %error, "failed to record layout telemetry");
        }
    }

    fn report(&self, error: &anyhow::Error) {
        if let Err(report_error) = self.reporter.capture(error) {
            warn!(error = %report_error, "failed to report layout error");
        }
    }

    async fn apply_config(self: &Arc<Self>, config: &LayoutConfig) {
        self.options.write().update_from(config);
        self.set_enabled(config.enabled).await;
    }

    async fn set_enabled(self: &Arc<Self>, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        let context = HostCommand::SetContext {
            key: ENABLED_CONTEXT_KEY.to_string(),
            value: enabled,
        };
        if let Err(error) = self.host.execute(context).await {
            warn!(error = %error, "failed to update {ENABLED_CONTEXT_KEY} context");
        }

        match (previous, enabled) {
            (false, true) => {
                debug!("pochi layout enabled");
                self.start_machine();
                self.attach_listeners();
            }
            (true, false) => {
                debug!("pochi layout disabled");
                self.detach_listeners();
                self.stop_machine();
            }
            _ => {}
        }
    }

    fn start_machine(self: &Arc<Self>) {
        let epoch = {
            let mut machine = self.machine.lock();
            machine.running = true;
            machine.epoch += 1;
            machine.state = LayoutState::Initial;
            machine.epoch
        };
        self.state_tx.send_replace(LayoutState::Initial);
        trace!(state = %LayoutState::Initial, "FSM started");
        if let Some(action) = entry_action(LayoutState::Initial, None) {
            self.spawn_entry(action, epoch);
        }
    }

    fn stop_machine(&self) {
        let mut machine = self.machine.lock();
        machine.running = false;
        machine.epoch += 1;
        trace!(state = %machine.state, "FSM stopped");
    }

    /// Feeds an event to the machine and runs the entry effect of the new
    /// state. Events the current state does not handle are dropped.
    fn send(self: &Arc<Self>, event: LayoutEvent) {
        let (from, to, epoch) = {
            let mut machine = self.machine.lock();
            if !machine.running {
                trace!(event = event.name(), "FSM not running, event ignored");
                return;
            }
            let Some(next) = transition(machine.state, &event) else {
                trace!(state = %machine.state, event = event.name(), "event ignored");
                return;
            };
            let from = machine.state;
            machine.state = next;
            (from, next, machine.epoch)
        };

        trace!(%from, %to, event = event.name(), "FSM state");
        self.state_tx.send_replace(to);
        self.record(LayoutTelemetryEvent::StateChanged {
            from,
            to,
            event: event.name(),
        });
        if let Some(action) = entry_action(to, Some(&event)) {
            self.spawn_entry(action, epoch);
        }
    }

    fn spawn_entry(self: &Arc<Self>, action: EntryAction, epoch: u64) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match action {
                EntryAction::Validate => {
                    let valid = inner.validate().await;
                    if !inner.is_current(epoch) {
                        return;
                    }
                    let enabled = inner.enabled.load(Ordering::SeqCst);
                    inner.send(if valid && enabled {
                        LayoutEvent::LayoutValid
                    } else {
                        LayoutEvent::LayoutInvalid
                    });
                }
                EntryAction::Apply(request) => {
                    let result = inner.apply(&request).await;
                    if !inner.is_current(epoch) {
                        return;
                    }
                    match result {
                        Ok(report) => {
                            inner.record(LayoutTelemetryEvent::ApplyCompleted {
                                trigger: request.trigger,
                                focus_group: report.focus_group,
                                resized: report.resized,
                                terminals_moved: report.terminals_moved,
                            });
                            inner.send(LayoutEvent::CompleteApply);
                        }
                        Err(error) => {
                            debug!(
                                trigger = %request.trigger,
                                error = %error,
                                "failed to apply pochi layout"
                            );
                            let error = anyhow::Error::new(error).context(format!(
                                "failed to apply pochi layout ({})",
                                request.trigger
                            ));
                            inner.record(LayoutTelemetryEvent::ApplyFailed {
                                trigger: request.trigger,
                                error: DisplayErrorFormatter.format_error(&error).into_owned(),
                            });
                            inner.report(&error);
                            inner.send(LayoutEvent::FailApply);
                        }
                    }
                }
            }
        });
    }

    async fn validate(&self) -> bool {
        self.exclusive
            .run(async {
                trace!(">>> Begin validate layout");
                let groups = self.host.tab_groups();
                let checked = if groups.len() < 3 {
                    Err(InvalidLayout::TooFewGroups)
                } else {
                    match self.host.editor_layout().await {
                        Ok(layout) => validate_layout(&groups, &layout),
                        Err(error) => {
                            debug!(error = %error, "failed to read editor layout");
                            return false;
                        }
                    }
                };
                match checked {
                    Ok(()) => {
                        trace!("<<< Layout is valid");
                        true
                    }
                    Err(reason) => {
                        trace!(%reason, "<<< Layout is invalid");
                        false
                    }
                }
            })
            .await
    }

    fn applier_options(&self) -> ManagerOptions {
        self.options.read().clone()
    }

    async fn apply(&self, request: &StartApply) -> Result<ApplyReport, LayoutError> {
        let options = self.applier_options();
        self.exclusive
            .run(async {
                let report = LayoutApplier::new(self.host.as_ref())
                    .with_window_settle(options.window_settle)
                    .with_workspace(options.workspace_cwd.as_deref())
                    .with_scan_limit(options.default_document_scan_limit)
                    .apply(request)
                    .await?;
                if let Some(terminal) = report.created_terminal {
                    self.created_terminals.lock().insert(terminal);
                }
                Ok(report)
            })
            .await
    }

    async fn move_terminals(&self) -> Result<usize, LayoutError> {
        let options = self.applier_options();
        let moved = self
            .exclusive
            .run(
                LayoutApplier::new(self.host.as_ref())
                    .with_window_settle(options.window_settle)
                    .move_terminals(),
            )
            .await?;
        if moved > 0 {
            self.record(LayoutTelemetryEvent::TerminalsMoved { count: moved });
        }
        Ok(moved)
    }

    async fn revalidate(self: &Arc<Self>) {
        let valid = self.validate().await;
        self.send(if valid {
            LayoutEvent::LayoutValid
        } else {
            LayoutEvent::LayoutInvalid
        });
    }

    /// Re-reads the groups and returns the previous shape.
    fn refresh_shape(&self, groups: &[TabGroup]) -> TabGroupsShape {
        std::mem::replace(&mut *self.shape.lock(), TabGroupsShape::from_groups(groups))
    }

    fn attach_listeners(self: &Arc<Self>) {
        let mut events = self.host.subscribe();
        self.refresh_shape(&self.host.tab_groups());

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "host events lagged, re-reading tab groups");
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.refresh_shape(&inner.host.tab_groups());
                        inner.revalidate().await;
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.handle_event(event).await;
            }
            trace!("host listener stopped");
        });
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    fn detach_listeners(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        self.scheduled.dispose();
    }

    /// Forgets terminals we created once the host closes them. Runs for the
    /// whole life of the manager, enabled or not.
    fn watch_closed_terminals(self: &Arc<Self>) {
        let mut events: broadcast::Receiver<HostEvent> = self.host.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(HostEvent::TerminalClosed(terminal)) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.created_terminals.lock().remove(&terminal);
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *self.terminal_listener.lock() = Some(handle);
    }

    async fn handle_event(self: &Arc<Self>, event: HostEvent) {
        match event {
            HostEvent::TabGroupsChanged {
                opened,
                closed,
                changed,
            } => {
                self.refresh_shape(&self.host.tab_groups());
                if !opened.is_empty() || !closed.is_empty() {
                    self.revalidate().await;
                }
                for group in changed {
                    if group.is_active
                        && let Some(tab) = group.active_tab
                    {
                        self.trigger_scheduled(JobKey::Tab(tab));
                    }
                }
            }
            HostEvent::TabsChanged {
                opened,
                closed,
                changed,
            } => {
                let groups = self.host.tab_groups();
                let previous = self.refresh_shape(&groups);
                if !opened.is_empty() || !closed.is_empty() {
                    self.revalidate().await;
                }
                self.on_tabs_opened(&opened, &previous);
                self.on_tabs_changed(&changed);
            }
            HostEvent::TerminalOpened(info) => self.on_terminal_opened(info),
            HostEvent::ActiveTerminalChanged(Some(terminal)) => {
                self.trigger_scheduled(JobKey::Terminal(terminal));
            }
            HostEvent::ActiveTerminalChanged(None) | HostEvent::TerminalClosed(_) => {}
        }
    }

    fn trigger_scheduled(&self, key: JobKey) {
        if self.scheduled.contains(&key) {
            trace!(?key, "triggering scheduled job early");
            self.scheduled.trigger(&key);
        }
    }

    fn on_tabs_opened(self: &Arc<Self>, opened: &[Tab], previous: &TabGroupsShape) {
        for tab in opened {
            match tab.kind() {
                TabKind::Task => {
                    let cwd = tab
                        .input
                        .task_uri()
                        .and_then(TaskUri::parse)
                        .and_then(|uri| uri.cwd);
                    self.schedule_apply(JobKey::Tab(tab.id), ApplyTrigger::OpenTask, cwd);
                }
                TabKind::Other => {
                    // First editor next to existing tasks.
                    let has_tasks = self.shape.lock().count_task_tabs() > 0;
                    if previous.count_other_tabs() == 0 && has_tasks {
                        let groups = self.host.tab_groups();
                        let cwd = find_active_task_tab(&groups)
                            .and_then(|task| task.input.task_uri())
                            .and_then(TaskUri::parse)
                            .and_then(|uri| uri.cwd);
                        self.schedule_apply(JobKey::Tab(tab.id), ApplyTrigger::OpenEditor, cwd);
                    }
                }
                TabKind::Terminal => {}
            }
        }
    }

    fn on_tabs_changed(&self, changed: &[Tab]) {
        if changed.is_empty() {
            return;
        }
        let groups = self.host.tab_groups();
        let Some(active) = groups.iter().find(|group| group.is_active) else {
            return;
        };
        for tab in changed {
            if active.active_tab == Some(tab.id) {
                self.trigger_scheduled(JobKey::Tab(tab.id));
            }
        }
    }

    fn on_terminal_opened(self: &Arc<Self>, info: TerminalInfo) {
        let created = self.created_terminals.lock().contains(&info.id);
        let platform = self.options.read().platform;
        let by_default = !created
            && is_terminal_likely_created_by_default(
                &info.options,
                &self.host.terminal_profiles(),
                platform,
            );
        if by_default {
            trace!(terminal = %info.id, "ignoring terminal created by default");
            return;
        }

        let weak = Arc::downgrade(self);
        let cwd = info.options.cwd;
        let delay = self.options.read().trigger_delay;
        self.scheduled.push(JobKey::Terminal(info.id), delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.state() == LayoutState::NonPochiLayout {
                inner.send(LayoutEvent::StartApply(StartApply::new(
                    ApplyTrigger::CreateTerminal,
                    cwd,
                )));
                return;
            }
            tokio::spawn(async move {
                if let Err(error) = inner.move_terminals().await {
                    debug!(error = %error, "failed to move terminals");
                    inner.report(&anyhow::Error::new(error).context("failed to move terminals"));
                }
            });
        });
    }

    fn schedule_apply(self: &Arc<Self>, key: JobKey, trigger: ApplyTrigger, cwd: Option<PathBuf>) {
        let weak = Arc::downgrade(self);
        let delay = self.options.read().trigger_delay;
        trace!(?key, %trigger, ?delay, "scheduling apply");
        self.scheduled.push(key, delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.state() == LayoutState::NonPochiLayout {
                inner.send(LayoutEvent::StartApply(StartApply::new(trigger, cwd)));
            }
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for slot in [
            &mut self.listener,
            &mut self.terminal_listener,
            &mut self.config_listener,
        ] {
            if let Some(handle) = slot.get_mut().take() {
                handle.abort();
            }
        }
    }
}
