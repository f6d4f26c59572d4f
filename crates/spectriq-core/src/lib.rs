//! Core instrument data model shared by the Spectriq host and its plugins.
//!
//! This crate defines the vocabulary that crosses the host/plugin boundary:
//! spectral readings, acquisition settings, device references, axis unit
//! classification, and persistence events. It deliberately contains no
//! threading or lifecycle logic so that plugin crates can depend on it
//! without pulling in the hosting machinery.

mod axis;
mod device;
mod reading;
mod record;

pub use axis::AxisUnit;
pub use device::DeviceRef;
pub use reading::{AcquisitionSettings, ReadingTimestamp, SpectralReading};
pub use record::RecordEvent;
