use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use spectriq_core::{AcquisitionSettings, DeviceRef, RecordEvent};
use spectriq_plugin_sdk::{
    Configuration, FieldDirection, FieldError, FieldValue, HostInfo, OverrideTarget, PluginKey,
    PluginRequest, PluginResponse,
};

use crate::error::HostError;
use crate::loader::{PluginUnit, UnitLoader};
use crate::shell::{SharedReading, Shell};
use crate::validate::validate;
use crate::worker::{HostCommand, WorkerEvent, WorkerHandle};

/// Lifecycle of the plugin engine, as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No plugin selected.
    Unselected,
    /// A plugin is loaded and validated; no worker exists.
    Selected,
    /// A worker owns the plugin; requests are gated off.
    Connected,
    /// Connected, and streamed readings are dispatched.
    Enabled,
    /// Transient teardown while a disconnect is in progress.
    Disconnecting,
}

/// Why a reading was not dispatched. All of these are quiet, recoverable
/// conditions, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The gate is closed: not enabled, and the call was not manual.
    NotEnabled,
    /// The plugin only accepts manual triggers.
    NotStreaming,
    /// Reading came from a non-selected device the plugin does not accept.
    ForeignDevice,
    /// A blocking plugin still has a request in flight.
    Busy,
    /// Manual trigger with no reading available yet.
    NoReading,
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The request was enqueued (and, for host-blocking plugins, answered).
    Dispatched(u64),
    Skipped(SkipReason),
}

/// Tunable intervals of the engine. The defaults are the documented
/// behavior; tests shrink them.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// How long connect waits for the plugin's connect hook to fail fast.
    pub connect_grace: Duration,
    /// Hard ceiling on a host-blocking wait for one response.
    pub block_timeout: Duration,
    /// Worker queue-poll interval; also bounds event-response latency.
    pub poll_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            connect_grace: Duration::from_millis(50),
            block_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Per-session request-id source.
///
/// Ids strictly increase within one connected session and reset only when
/// a fresh session connects. The mutex exists because the streaming path
/// and the manual-trigger path can both reach the dispatcher; it is the
/// engine's only coordination lock.
#[derive(Clone)]
struct RequestIds {
    next: Arc<Mutex<u64>>,
}

impl RequestIds {
    fn new() -> Self {
        Self {
            next: Arc::new(Mutex::new(1)),
        }
    }

    fn next(&self) -> u64 {
        let mut guard = self.next.lock();
        let id = *guard;
        *guard += 1;
        id
    }
}

struct Selection {
    unit: Arc<PluginUnit>,
    config: Configuration,
}

struct Session {
    worker: WorkerHandle,
    ids: RequestIds,
    /// Id of the single in-flight request of a blocking plugin.
    outstanding: Option<u64>,
    /// Original readings of dispatched requests, kept so response
    /// overrides land on the object downstream consumers share.
    pending: HashMap<u64, SharedReading>,
    /// Names of the series currently shown, for reconciliation.
    active_series: HashSet<String>,
}

/// Orchestrates the plugin lifecycle: selection, connection, dispatch, and
/// response application. Lives on the host thread; the only state shared
/// with the worker are the two queues and the request-id counter.
pub struct PluginController {
    loader: UnitLoader,
    shell: Shell,
    options: ControllerOptions,
    state: LifecycleState,
    active_device: Option<DeviceRef>,
    selection: Option<Selection>,
    session: Option<Session>,
    /// Dependency answers cached across reconnects of any plugin.
    resolved_dependencies: HashMap<String, PathBuf>,
}

impl PluginController {
    pub fn new(loader: UnitLoader, shell: Shell) -> Self {
        Self::with_options(loader, shell, ControllerOptions::default())
    }

    pub fn with_options(loader: UnitLoader, shell: Shell, options: ControllerOptions) -> Self {
        Self {
            loader,
            shell,
            options,
            state: LifecycleState::Unselected,
            active_device: None,
            selection: None,
            session: None,
            resolved_dependencies: HashMap::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Identifiers the loader can resolve.
    pub fn available_plugins(&self) -> Vec<PluginKey> {
        self.loader.keys()
    }

    /// Validated configuration of the current selection.
    pub fn configuration(&self) -> Option<&Configuration> {
        self.selection.as_ref().map(|selection| &selection.config)
    }

    /// Instrument readings are matched against this device when the plugin
    /// does not accept multi-device input.
    pub fn set_active_device(&mut self, device: DeviceRef) {
        self.active_device = Some(device);
    }

    /// Edit an input field's current value. The next dispatched request
    /// snapshots it; output fields belong to the plugin and are rejected.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), HostError> {
        let selection = self
            .selection
            .as_mut()
            .ok_or(HostError::InvalidState("no plugin is selected"))?;
        let field = selection
            .config
            .field_mut(name)
            .ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
        if field.direction != FieldDirection::Input {
            return Err(HostError::InvalidState("field is plugin output"));
        }
        field.set_value(value)?;
        Ok(())
    }

    /// Load, validate, and select the plugin behind `key`.
    ///
    /// On failure the previous selection and state are left untouched; a
    /// failed select never applies partially.
    pub fn select(&mut self, key: &PluginKey) -> Result<(), HostError> {
        match self.state {
            LifecycleState::Connected | LifecycleState::Enabled | LifecycleState::Disconnecting => {
                return Err(HostError::InvalidState("a session is connected"))
            }
            LifecycleState::Unselected | LifecycleState::Selected => {}
        }

        let unit = self.loader.load(key)?;
        let config = validate(key, unit.declaration())?;
        info!("selected plugin {key} ({})", config.display_name);
        self.selection = Some(Selection { unit, config });
        self.state = LifecycleState::Selected;
        Ok(())
    }

    /// Spawn a worker and start a session for the selected plugin.
    pub fn connect(&mut self) -> Result<(), HostError> {
        if self.state != LifecycleState::Selected {
            return Err(HostError::InvalidState("no plugin is selected"));
        }
        let selection = self
            .selection
            .as_ref()
            .ok_or(HostError::InvalidState("no plugin is selected"))?;

        // Satisfy declared dependencies before any thread exists, reusing
        // earlier answers so reconnecting does not re-prompt.
        let mut resolved = HashMap::new();
        for dependency in &selection.config.dependencies {
            let value = match self.resolved_dependencies.get(&dependency.key) {
                Some(cached) => cached.clone(),
                None => match self.shell.dependencies.resolve(dependency) {
                    Some(answer) => {
                        self.resolved_dependencies
                            .insert(dependency.key.clone(), answer.clone());
                        answer
                    }
                    None => return Err(HostError::DependencyUnsatisfied(dependency.key.clone())),
                },
            };
            resolved.insert(dependency.key.clone(), value);
        }

        let mut host_info = HostInfo::new(self.shell.instrument.axis_unit());
        if let Some(dir) = self.shell.records.save_dir() {
            host_info = host_info.with_save_dir(dir);
        }
        if let Some(reading) = self.shell.instrument.latest_reading() {
            host_info = host_info.with_last_reading(reading.lock().clone());
        }
        for (key, value) in resolved {
            host_info = host_info.with_dependency(key, value);
        }

        let mut worker = WorkerHandle::spawn(
            selection.unit.instance(),
            host_info,
            self.options.poll_interval,
        );
        if let Err(diagnostic) = worker.await_connect(self.options.connect_grace) {
            debug!("connect failed for {}: {diagnostic}", selection.unit.key());
            return Err(HostError::Connect(diagnostic));
        }

        self.session = Some(Session {
            worker,
            ids: RequestIds::new(),
            outstanding: None,
            pending: HashMap::new(),
            active_series: HashSet::new(),
        });
        self.state = LifecycleState::Connected;
        info!("connected plugin {}", selection.unit.key());
        Ok(())
    }

    /// Open or close the request-submission gate. Never touches the worker.
    pub fn enable(&mut self, enabled: bool) -> Result<(), HostError> {
        match self.state {
            LifecycleState::Connected | LifecycleState::Enabled => {
                self.state = if enabled {
                    LifecycleState::Enabled
                } else {
                    LifecycleState::Connected
                };
                Ok(())
            }
            _ => Err(HostError::InvalidState("no session is connected")),
        }
    }

    /// End the session: send the shutdown sentinel and release the worker.
    pub fn disconnect(&mut self) -> Result<(), HostError> {
        match self.state {
            LifecycleState::Connected | LifecycleState::Enabled => {
                self.teardown_session();
                Ok(())
            }
            _ => Err(HostError::InvalidState("no session is connected")),
        }
    }

    /// Feed one reading into the engine.
    ///
    /// Dispatches a request when the gates allow it; quiet conditions are
    /// reported as [`DispatchOutcome::Skipped`]. For host-blocking plugins
    /// the call returns only once the matching response has been applied
    /// or the timeout forced a disconnect.
    pub fn process_reading(
        &mut self,
        reading: &SharedReading,
        settings: &AcquisitionSettings,
        manual: bool,
    ) -> Result<DispatchOutcome, HostError> {
        // Stale responses are applied first in every case, so host state
        // never lags behind a rejected reading.
        self.drain_responses()?;

        let config = match (self.state, manual) {
            (LifecycleState::Enabled, _) | (LifecycleState::Connected, true) => self
                .selection
                .as_ref()
                .map(|selection| &selection.config)
                .ok_or(HostError::InvalidState("no plugin is selected"))?,
            _ => return Ok(DispatchOutcome::Skipped(SkipReason::NotEnabled)),
        };

        if !manual && !config.streaming {
            return Ok(DispatchOutcome::Skipped(SkipReason::NotStreaming));
        }

        let snapshot = reading.lock().clone();
        if !config.multi_device {
            if let Some(active) = &self.active_device {
                if &snapshot.device != active {
                    debug!("dropping reading from non-selected device {}", snapshot.device);
                    return Ok(DispatchOutcome::Skipped(SkipReason::ForeignDevice));
                }
            }
        }

        let is_blocking = config.is_blocking;
        let block_host = config.block_host;
        let fields = config.value_snapshot();
        let session = self
            .session
            .as_mut()
            .ok_or(HostError::InvalidState("no session is connected"))?;

        if is_blocking && session.outstanding.is_some() {
            // A fast producer behind a slow plugin: shed the reading
            // instead of queueing it.
            return Ok(DispatchOutcome::Skipped(SkipReason::Busy));
        }

        let id = session.ids.next();
        let request = PluginRequest {
            id,
            device: snapshot.device.clone(),
            settings: settings.clone(),
            reading: snapshot,
            fields,
        };
        session.pending.insert(id, Arc::clone(reading));
        if is_blocking {
            session.outstanding = Some(id);
        }

        if !session.worker.send(HostCommand::Process(request)) {
            let diagnostic = session
                .worker
                .late_connect_failure()
                .unwrap_or_else(|| "worker ended unexpectedly".to_string());
            self.teardown_session();
            return Err(HostError::Processing(diagnostic));
        }
        debug!("dispatched request {id}");

        if block_host {
            self.await_response(id)?;
        }
        Ok(DispatchOutcome::Dispatched(id))
    }

    /// Manual trigger: pull the latest reading and settings from the
    /// pipeline and dispatch regardless of the enable gate.
    pub fn trigger_manual(&mut self) -> Result<DispatchOutcome, HostError> {
        let Some(reading) = self.shell.instrument.latest_reading() else {
            return Ok(DispatchOutcome::Skipped(SkipReason::NoReading));
        };
        let settings = self.shell.instrument.active_settings();
        self.process_reading(&reading, &settings, true)
    }

    /// Fire an action field's command on the connected plugin.
    pub fn trigger_action(&mut self, field: &str) -> Result<(), HostError> {
        let command = self
            .configuration()
            .and_then(|config| config.commands.get(field))
            .cloned()
            .ok_or_else(|| HostError::UnknownAction(field.to_string()))?;
        let session = self
            .session
            .as_ref()
            .ok_or(HostError::InvalidState("no session is connected"))?;
        if !session.worker.send(HostCommand::Action {
            field: field.to_string(),
            command,
        }) {
            self.teardown_session();
            return Err(HostError::Processing("worker ended unexpectedly".to_string()));
        }
        Ok(())
    }

    /// Relay a persistence event to the connected plugin, if any.
    pub fn relay_record_event(&mut self, event: RecordEvent) {
        if let Some(session) = &self.session {
            let _ = session.worker.send(HostCommand::Record(event));
        }
    }

    /// Apply every response already queued. Returns an error (after
    /// tearing the session down) if the poison sentinel is found.
    pub fn drain_responses(&mut self) -> Result<(), HostError> {
        loop {
            let Some(session) = &self.session else {
                return Ok(());
            };
            let Some(event) = session.worker.try_recv() else {
                return Ok(());
            };
            self.apply(event)?;
        }
    }

    /// Wait for the response to `id`, applying everything that arrives in
    /// the meantime, within the configured hard timeout.
    fn await_response(&mut self, id: u64) -> Result<(), HostError> {
        let deadline = Instant::now() + self.options.block_timeout;
        loop {
            let Some(session) = &self.session else {
                return Err(HostError::Processing(
                    "session ended while awaiting a response".to_string(),
                ));
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match session.worker.recv_timeout(remaining) {
                Ok(event) => {
                    let answered = matches!(
                        &event,
                        WorkerEvent::Response(response) if response.request_id == Some(id)
                    );
                    self.apply(event)?;
                    if answered {
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.teardown_session();
                    return Err(HostError::Processing(
                        "worker ended without answering".to_string(),
                    ));
                }
            }
        }

        // The host cannot tell a slow plugin from a hung one; both end the
        // session.
        warn!("request {id} exceeded the blocking timeout");
        self.teardown_session();
        Err(HostError::Timeout(self.options.block_timeout))
    }

    /// Apply one worker event to host-side state.
    fn apply(&mut self, event: WorkerEvent) -> Result<(), HostError> {
        let response = match event {
            WorkerEvent::Fatal { diagnostic } => {
                warn!("plugin session ended fatally: {diagnostic}");
                self.teardown_session();
                self.shell.notifier.notify(&diagnostic);
                return Err(HostError::Processing(diagnostic));
            }
            WorkerEvent::Response(response) => response,
        };

        if let Some(session) = self.session.as_mut() {
            if session.outstanding.is_some() && session.outstanding == response.request_id {
                session.outstanding = None;
            }
        }

        self.apply_outputs(&response);
        self.reconcile_series(&response);

        if let Some(table) = &response.table {
            self.shell.graph.show_table(table);
        }

        self.apply_overrides(&response);

        if !response.metadata.is_empty() {
            self.shell.records.merge_metadata(&response.metadata);
        }
        for (name, value) in &response.commands {
            self.shell.instrument.send_setting(name, value);
        }
        if let Some(message) = &response.message {
            self.shell.notifier.notify(message);
        }
        Ok(())
    }

    fn apply_outputs(&mut self, response: &PluginResponse) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };
        for (name, value) in &response.outputs {
            match selection.config.field_mut(name) {
                Some(field) if field.direction == FieldDirection::Output => {
                    if let Err(err) = field.set_value(value.clone()) {
                        warn!("ignoring output for `{name}`: {err}");
                    }
                }
                Some(_) => warn!("ignoring output for input field `{name}`"),
                None => warn!("ignoring output for undeclared field `{name}`"),
            }
        }
    }

    /// Reconcile the shown series set against the response: stale series
    /// are removed first, in a distinct pass, so they disappear even if
    /// recreating the rest is slow.
    fn reconcile_series(&mut self, response: &PluginResponse) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let stale: Vec<String> = session
            .active_series
            .iter()
            .filter(|name| !response.series.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            session.active_series.remove(&name);
            self.shell.graph.remove_series(&name);
        }
        for (name, data) in &response.series {
            session.active_series.insert(name.clone());
            self.shell.graph.upsert_series(name, data);
        }
    }

    /// Apply reading overrides onto the original reading of the answered
    /// request, so every downstream holder of that reading sees them.
    fn apply_overrides(&mut self, response: &PluginResponse) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(id) = response.request_id else {
            return;
        };
        let Some(shared) = session.pending.remove(&id) else {
            if !response.overrides.is_empty() {
                warn!("response {id} carries overrides for an unknown request");
            }
            return;
        };
        if response.overrides.is_empty() {
            return;
        }
        let mut reading = shared.lock();
        for (target, data) in &response.overrides {
            match target {
                OverrideTarget::Processed => reading.processed = data.clone(),
                OverrideTarget::RecordableDark => reading.dark = Some(data.clone()),
                OverrideTarget::RecordableReference => reading.reference = Some(data.clone()),
            }
        }
    }

    /// Quiet teardown shared by disconnect and every forced path: send the
    /// shutdown sentinel, release the worker handle, clear per-session
    /// bookkeeping, and fall back to `Selected`.
    fn teardown_session(&mut self) {
        self.state = LifecycleState::Disconnecting;
        if let Some(session) = self.session.take() {
            session.worker.send(HostCommand::Disconnect);
            // Dropping the handle releases both queues; anything the
            // plugin still produces lands nowhere.
        }
        self.state = if self.selection.is_some() {
            LifecycleState::Selected
        } else {
            LifecycleState::Unselected
        };
        debug!("session released");
    }
}

impl Drop for PluginController {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.teardown_session();
        }
    }
}
