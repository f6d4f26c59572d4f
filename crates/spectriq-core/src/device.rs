use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to a physical or simulated spectrometer.
///
/// Equality is decided by the serial number alone; the model string is
/// display metadata and may differ between firmware revisions of the same
/// unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRef {
    pub serial: String,
    pub model: String,
}

impl DeviceRef {
    pub fn new(serial: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            model: model.into(),
        }
    }
}

impl PartialEq for DeviceRef {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for DeviceRef {}

impl std::hash::Hash for DeviceRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model, self.serial)
    }
}
