//! Processing plugins bundled with Spectriq Studio.

pub mod metrics;
pub mod smoothing;

pub use metrics::{PeakMetricsFactory, PeakMetricsPlugin};
pub use smoothing::{BoxcarFactory, BoxcarPlugin};
