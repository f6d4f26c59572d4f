use std::collections::HashMap;
use std::path::{Path, PathBuf};

use spectriq_core::{AxisUnit, RecordEvent, SpectralReading};

use crate::config::ConfigDecl;
use crate::protocol::{PluginRequest, PluginResponse};

/// Read-only view of the host handed to a plugin's connect hook.
///
/// Exposes the ambient state a plugin may need to initialise itself; there
/// is no way to mutate the host through it.
#[derive(Debug, Clone)]
pub struct HostInfo {
    axis_unit: AxisUnit,
    save_dir: Option<PathBuf>,
    dependencies: HashMap<String, PathBuf>,
    last_reading: Option<SpectralReading>,
}

impl HostInfo {
    pub fn new(axis_unit: AxisUnit) -> Self {
        Self {
            axis_unit,
            save_dir: None,
            dependencies: HashMap::new(),
            last_reading: None,
        }
    }

    pub fn with_save_dir(mut self, dir: PathBuf) -> Self {
        self.save_dir = Some(dir);
        self
    }

    pub fn with_dependency(mut self, key: impl Into<String>, value: PathBuf) -> Self {
        self.dependencies.insert(key.into(), value);
        self
    }

    pub fn with_last_reading(mut self, reading: SpectralReading) -> Self {
        self.last_reading = Some(reading);
        self
    }

    /// Axis unit currently active in the host's main graph.
    pub fn axis_unit(&self) -> AxisUnit {
        self.axis_unit
    }

    /// Directory spectra are saved to, when one is configured.
    pub fn save_dir(&self) -> Option<&Path> {
        self.save_dir.as_deref()
    }

    /// Resolved value of a declared dependency.
    pub fn dependency(&self, key: &str) -> Option<&Path> {
        self.dependencies.get(key).map(PathBuf::as_path)
    }

    /// Most recent reading the host has seen, if any.
    pub fn last_reading(&self) -> Option<&SpectralReading> {
        self.last_reading.as_ref()
    }
}

/// The contract every Spectriq processing plugin implements.
///
/// Hook methods return `anyhow::Result` because plugin authors are external
/// and their failure detail is free-form; the hosting worker contains every
/// error (and panic) behind the thread boundary, so a misbehaving
/// implementation cannot take the application down with it.
pub trait ProcessorPlugin: Send {
    /// Declared configuration; called once when the plugin is first loaded
    /// and validated by the host before anything else happens.
    fn configuration(&self) -> ConfigDecl;

    /// Called exactly once when a session starts, before any request is
    /// dispatched. Returning `Ok(false)` rejects the connection without it
    /// being treated as a crash.
    fn connect(&mut self, host: &HostInfo) -> anyhow::Result<bool>;

    /// Process one dispatched request.
    fn process_request(&mut self, request: &PluginRequest) -> anyhow::Result<PluginResponse>;

    /// Called once when the session ends, on both the quiet and the fatal
    /// path. Best effort; errors are logged and otherwise ignored.
    fn disconnect(&mut self) -> anyhow::Result<()>;

    /// Handle an action-field command. A returned response is forwarded to
    /// the host like any other.
    fn handle_action(&mut self, _command: &str) -> anyhow::Result<Option<PluginResponse>> {
        Ok(None)
    }

    /// Whether the plugin generates responses of its own accord (for
    /// example from an internal timer). The worker only polls plugins that
    /// opt in.
    fn supports_event_responses(&self) -> bool {
        false
    }

    /// Drain spontaneously generated responses. Polled once per worker
    /// iteration; a failure here permanently disables event polling for the
    /// remainder of the session.
    fn take_event_responses(&mut self) -> anyhow::Result<Vec<PluginResponse>> {
        Ok(Vec::new())
    }

    /// Notification that the application saved, loaded, or exported records.
    fn on_record_event(&mut self, _event: &RecordEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
