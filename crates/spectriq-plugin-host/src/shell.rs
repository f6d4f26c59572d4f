use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use spectriq_core::{AcquisitionSettings, AxisUnit, SpectralReading};
use spectriq_plugin_sdk::{Dependency, FieldValue, SeriesData, TablePayload};

/// A reading shared between the acquisition pipeline and the plugin engine.
///
/// Response overrides are applied through this handle onto the reading that
/// was dispatched, so every downstream consumer of that reading observes
/// the plugin's edits.
pub type SharedReading = Arc<Mutex<SpectralReading>>;

/// Graph and table surface the engine renders plugin output into.
pub trait GraphSurface: Send {
    fn upsert_series(&mut self, name: &str, data: &SeriesData);
    fn remove_series(&mut self, name: &str);
    fn show_table(&mut self, table: &TablePayload);
}

/// Access to the acquisition pipeline and the instrument's setting surface.
pub trait InstrumentLink: Send {
    /// Latest reading the pipeline produced, if any.
    fn latest_reading(&self) -> Option<SharedReading>;
    /// Settings currently active on the selected instrument.
    fn active_settings(&self) -> AcquisitionSettings;
    /// Axis unit the application currently displays.
    fn axis_unit(&self) -> AxisUnit;
    /// Relay one device-setting command to the instrument driver.
    fn send_setting(&mut self, name: &str, value: &FieldValue);
}

/// Operator-facing notifications (status bar, message log).
pub trait Notifier: Send {
    fn notify(&mut self, message: &str);
}

/// Prompts the operator for declared dependencies ("choose an existing
/// directory"). Returning `None` means the operator cancelled.
pub trait DependencyResolver: Send {
    fn resolve(&mut self, dependency: &Dependency) -> Option<PathBuf>;
}

/// Sink for record metadata contributed by plugin responses.
pub trait RecordSink: Send {
    fn merge_metadata(&mut self, metadata: &HashMap<String, FieldValue>);
    /// Directory spectra are currently saved to, if one is configured.
    fn save_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Bundle of the application collaborators the controller drives.
pub struct Shell {
    pub graph: Box<dyn GraphSurface>,
    pub instrument: Box<dyn InstrumentLink>,
    pub notifier: Box<dyn Notifier>,
    pub dependencies: Box<dyn DependencyResolver>,
    pub records: Box<dyn RecordSink>,
}
