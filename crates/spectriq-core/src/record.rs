use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Persistence events the application emits while a session is running.
///
/// The host relays these to connected plugins that opt into them, so a
/// plugin can, for example, flush its own sidecar file next to a saved
/// spectrum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordEvent {
    /// A spectrum record was written to disk.
    Saved(PathBuf),
    /// A previously recorded spectrum was loaded.
    Loaded(PathBuf),
    /// Records were exported to an interchange format.
    Exported(PathBuf),
}

impl RecordEvent {
    pub fn path(&self) -> &PathBuf {
        match self {
            RecordEvent::Saved(path) | RecordEvent::Loaded(path) | RecordEvent::Exported(path) => {
                path
            }
        }
    }
}
