use spectriq_plugin_sdk::prelude::*;

const WIDTH_FIELD: &str = "width";

/// Boxcar moving-average smoother.
///
/// Streams every reading, replaces the processed spectrum with its
/// smoothed counterpart, and publishes the result as a graph series so the
/// operator can compare it against the raw trace.
#[derive(Debug, Default, Clone)]
pub struct BoxcarPlugin;

impl BoxcarPlugin {
    fn smooth(data: &[f64], half_width: usize) -> Vec<f64> {
        if half_width == 0 || data.is_empty() {
            return data.to_vec();
        }
        let mut smoothed = Vec::with_capacity(data.len());
        for index in 0..data.len() {
            let start = index.saturating_sub(half_width);
            let end = (index + half_width + 1).min(data.len());
            let window = &data[start..end];
            smoothed.push(window.iter().sum::<f64>() / window.len() as f64);
        }
        smoothed
    }
}

impl ProcessorPlugin for BoxcarPlugin {
    fn configuration(&self) -> ConfigDecl {
        ConfigDecl::new()
            .with_name("Boxcar Smooth")
            .streaming(true)
            .with_field(
                FieldDecl::new(WIDTH_FIELD, "int")
                    .with_label("Half-width [px]")
                    .with_bounds(0.0, 64.0)
                    .with_default(serde_json::json!(2)),
            )
            .with_graph_type("line")
            .with_series("smoothed")
            .with_x_label("Wavelength [nm]")
            .with_y_label("Counts")
    }

    fn connect(&mut self, _host: &HostInfo) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn process_request(&mut self, request: &PluginRequest) -> anyhow::Result<PluginResponse> {
        let half_width = request
            .fields
            .get(WIDTH_FIELD)
            .and_then(FieldValue::as_int)
            .unwrap_or(0)
            .max(0) as usize;
        let smoothed = Self::smooth(&request.reading.processed, half_width);
        Ok(PluginResponse::for_request(request.id)
            .with_series("smoothed", SeriesData::Flat(smoothed.clone()))
            .with_override(OverrideTarget::Processed, smoothed))
    }

    fn disconnect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct BoxcarFactory;

impl PluginFactory for BoxcarFactory {
    fn key(&self) -> PluginKey {
        PluginKey::new("spectriq", "boxcar")
    }

    fn create(&self) -> Box<dyn ProcessorPlugin> {
        Box::new(BoxcarPlugin)
    }
}
