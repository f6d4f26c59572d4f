use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use spectriq_core::{AcquisitionSettings, DeviceRef, SpectralReading};

use crate::fields::FieldValue;

/// One unit of work dispatched to a connected plugin.
///
/// Every payload member is a snapshot deep-copied at dispatch time; the
/// plugin never observes host-side mutation of in-flight data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Monotonically increasing within one connected session, never reused.
    pub id: u64,
    /// Instrument the reading originated from.
    pub device: DeviceRef,
    pub settings: AcquisitionSettings,
    pub reading: SpectralReading,
    /// Current field values at the moment of dispatch.
    pub fields: HashMap<String, FieldValue>,
}

/// Data for one named graph series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesData {
    /// Flat Y sequence plotted against the active axis.
    Flat(Vec<f64>),
    /// Explicit X/Y pair.
    Xy {
        x: Vec<f64>,
        y: Vec<f64>,
        in_legend: bool,
    },
}

impl SeriesData {
    pub fn len(&self) -> usize {
        match self {
            SeriesData::Flat(y) => y.len(),
            SeriesData::Xy { y, .. } => y.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tabular plugin output, rendered by the host's table surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePayload {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

/// Reading buffers a response may overwrite on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideTarget {
    /// The processed spectrum downstream consumers read.
    Processed,
    /// The dark buffer that would be recorded with the spectrum.
    RecordableDark,
    /// The reference buffer that would be recorded with the spectrum.
    RecordableReference,
}

/// A plugin's answer to one request, or a spontaneous event response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Id of the originating request; `None` for event responses generated
    /// independently of any dispatch.
    pub request_id: Option<u64>,
    /// Values written back into output-direction fields.
    pub outputs: HashMap<String, FieldValue>,
    /// Named graph series; the set is reconciled against what is currently
    /// shown, so omitting a previously sent name removes that series.
    pub series: HashMap<String, SeriesData>,
    pub table: Option<TablePayload>,
    pub overrides: HashMap<OverrideTarget, Vec<f64>>,
    /// Merged into the metadata of persisted records.
    pub metadata: HashMap<String, FieldValue>,
    /// Device-setting commands relayed to the instrument link.
    pub commands: Vec<(String, FieldValue)>,
    /// Human-readable note surfaced through the host's notifier.
    pub message: Option<String>,
}

impl PluginResponse {
    /// Response answering the given request.
    pub fn for_request(id: u64) -> Self {
        Self {
            request_id: Some(id),
            ..Self::default()
        }
    }

    /// Spontaneous response not tied to any dispatched request.
    pub fn event() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    pub fn with_series(mut self, name: impl Into<String>, data: SeriesData) -> Self {
        self.series.insert(name.into(), data);
        self
    }

    pub fn with_table(mut self, table: TablePayload) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_override(mut self, target: OverrideTarget, data: Vec<f64>) -> Self {
        self.overrides.insert(target, data);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_command(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.commands.push((name.into(), value.into()));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
