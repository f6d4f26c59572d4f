use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::DeviceRef;

/// Monotonic timestamp attached to spectral readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReadingTimestamp {
    micros: u64,
}

impl ReadingTimestamp {
    /// Creates a timestamp representing the current instant relative to the
    /// process wide acquisition clock epoch.
    pub fn now() -> Self {
        Self::from_instant(Instant::now())
    }

    /// Creates a timestamp from microseconds since the acquisition epoch.
    pub fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// Returns the timestamp expressed as a [`Duration`].
    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.micros)
    }

    /// Absolute difference between two timestamps.
    pub fn abs_diff(self, other: ReadingTimestamp) -> Duration {
        Duration::from_micros(self.micros.abs_diff(other.micros))
    }

    fn from_instant(now: Instant) -> Self {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let base = EPOCH.get_or_init(Instant::now);
        let duration = now
            .checked_duration_since(*base)
            .unwrap_or(Duration::ZERO);
        Self {
            micros: duration.as_micros().min(u64::MAX as u128) as u64,
        }
    }
}

/// Acquisition parameters active when a reading was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Detector integration time in microseconds.
    pub integration_micros: u64,
    /// Number of scans averaged into one reading.
    pub scans_to_average: u32,
    /// Boxcar half-width applied by the driver, in pixels.
    pub boxcar_width: u32,
    /// Whether the driver subtracts the electric dark baseline.
    pub electric_dark_correction: bool,
    /// Whether the driver linearises the detector response.
    pub nonlinearity_correction: bool,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            integration_micros: 100_000,
            scans_to_average: 1,
            boxcar_width: 0,
            electric_dark_correction: false,
            nonlinearity_correction: false,
        }
    }
}

impl AcquisitionSettings {
    pub fn with_integration_micros(mut self, micros: u64) -> Self {
        self.integration_micros = micros;
        self
    }

    pub fn with_scans_to_average(mut self, scans: u32) -> Self {
        self.scans_to_average = scans;
        self
    }
}

/// One spectrum as delivered by an instrument driver, plus the correction
/// buffers recorded alongside it.
///
/// `processed` starts out as a copy of `intensities` and is the slot that
/// downstream consumers (recording, display) read; processing stages
/// overwrite it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralReading {
    pub device: DeviceRef,
    pub timestamp: ReadingTimestamp,
    pub wavelengths: Vec<f64>,
    pub intensities: Vec<f64>,
    pub processed: Vec<f64>,
    pub dark: Option<Vec<f64>>,
    pub reference: Option<Vec<f64>>,
}

impl SpectralReading {
    pub fn new(device: DeviceRef, wavelengths: Vec<f64>, intensities: Vec<f64>) -> Self {
        let processed = intensities.clone();
        Self {
            device,
            timestamp: ReadingTimestamp::now(),
            wavelengths,
            intensities,
            processed,
            dark: None,
            reference: None,
        }
    }

    pub fn with_dark(mut self, dark: Vec<f64>) -> Self {
        self.dark = Some(dark);
        self
    }

    pub fn with_reference(mut self, reference: Vec<f64>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Number of detector pixels in this reading.
    pub fn pixel_count(&self) -> usize {
        self.intensities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceRef {
        DeviceRef::new("SQ-0001", "Spectriq Bench")
    }

    #[test]
    fn processed_starts_as_raw_copy() {
        let reading = SpectralReading::new(device(), vec![500.0, 501.0], vec![10.0, 12.0]);
        assert_eq!(reading.processed, reading.intensities);
    }

    #[test]
    fn timestamps_are_monotonic() {
        let a = ReadingTimestamp::now();
        let b = ReadingTimestamp::now();
        assert!(b >= a);
        assert!(a.abs_diff(b) < Duration::from_secs(1));
    }
}
