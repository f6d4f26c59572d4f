use anyhow::bail;

use spectriq_plugin_sdk::prelude::*;

const PEAK_X_FIELD: &str = "peak_x";
const PEAK_Y_FIELD: &str = "peak_y";
const CENTROID_FIELD: &str = "centroid";
const MARK_FIELD: &str = "mark";
const MARK_COMMAND: &str = "mark_peak";

/// Reports the dominant peak of every processed spectrum.
///
/// Declared blocking: peak extraction on long traces is slow enough that
/// queueing readings behind it would only add latency, so the host sheds
/// readings while one is in flight.
#[derive(Debug, Default, Clone)]
pub struct PeakMetricsPlugin {
    last_peak: Option<(f64, f64)>,
}

impl ProcessorPlugin for PeakMetricsPlugin {
    fn configuration(&self) -> ConfigDecl {
        ConfigDecl::new()
            .with_name("Peak Metrics")
            .streaming(true)
            .blocking(true)
            .with_field(
                FieldDecl::new(PEAK_X_FIELD, "float")
                    .with_label("Peak position")
                    .with_direction("output"),
            )
            .with_field(
                FieldDecl::new(PEAK_Y_FIELD, "float")
                    .with_label("Peak height")
                    .with_direction("output"),
            )
            .with_field(
                FieldDecl::new(CENTROID_FIELD, "float")
                    .with_label("Centroid")
                    .with_direction("output"),
            )
            .with_field(
                FieldDecl::new(MARK_FIELD, "action")
                    .with_label("Mark current peak")
                    .with_command(MARK_COMMAND),
            )
            .with_x_label("Wavelength [nm]")
            .with_y_label("Counts")
    }

    fn connect(&mut self, _host: &HostInfo) -> anyhow::Result<bool> {
        self.last_peak = None;
        Ok(true)
    }

    fn process_request(&mut self, request: &PluginRequest) -> anyhow::Result<PluginResponse> {
        let reading = &request.reading;
        if reading.processed.is_empty() {
            bail!("received an empty spectrum");
        }

        let mut peak_index = 0;
        for (index, value) in reading.processed.iter().enumerate() {
            if *value > reading.processed[peak_index] {
                peak_index = index;
            }
        }
        let peak_x = reading
            .wavelengths
            .get(peak_index)
            .copied()
            .unwrap_or(peak_index as f64);
        let peak_y = reading.processed[peak_index];

        let total: f64 = reading.processed.iter().sum();
        let centroid = if total == 0.0 {
            peak_x
        } else {
            reading
                .processed
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    let x = reading.wavelengths.get(index).copied().unwrap_or(index as f64);
                    x * value
                })
                .sum::<f64>()
                / total
        };

        self.last_peak = Some((peak_x, peak_y));
        Ok(PluginResponse::for_request(request.id)
            .with_output(PEAK_X_FIELD, peak_x)
            .with_output(PEAK_Y_FIELD, peak_y)
            .with_output(CENTROID_FIELD, centroid)
            .with_metadata("peak_x", peak_x)
            .with_metadata("peak_y", peak_y))
    }

    fn handle_action(&mut self, command: &str) -> anyhow::Result<Option<PluginResponse>> {
        if command != MARK_COMMAND {
            return Ok(None);
        }
        match self.last_peak {
            Some((x, y)) => Ok(Some(PluginResponse::event().with_message(format!(
                "marked peak at {x:.2} ({y:.1} counts)"
            )))),
            None => Ok(Some(
                PluginResponse::event().with_message("no peak seen yet"),
            )),
        }
    }

    fn disconnect(&mut self) -> anyhow::Result<()> {
        self.last_peak = None;
        Ok(())
    }
}

pub struct PeakMetricsFactory;

impl PluginFactory for PeakMetricsFactory {
    fn key(&self) -> PluginKey {
        PluginKey::new("spectriq", "peak-metrics")
    }

    fn create(&self) -> Box<dyn ProcessorPlugin> {
        Box::new(PeakMetricsPlugin::default())
    }
}
