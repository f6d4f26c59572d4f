use serde::{Deserialize, Serialize};

/// Coarse classification of a spectral x-axis.
///
/// Derived from the axis label a plugin or instrument driver declares, and
/// used to pick a sensible default axis when none is configured explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisUnit {
    /// Wavelength axes (nanometres, ångström).
    Wavelength,
    /// Wavenumber axes (cm⁻¹, Raman shift).
    Wavenumber,
    /// Raw detector pixel indices.
    Pixel,
    /// Anything the classifier does not recognise.
    Unclassified,
}

impl AxisUnit {
    /// Classify an axis label by case-insensitive keyword match.
    ///
    /// This is a pure function; callers annotate their configuration with
    /// the result rather than re-deriving it on every draw.
    pub fn classify(label: &str) -> Self {
        let lowered = label.to_ascii_lowercase();
        if lowered.contains("wavenumber")
            || lowered.contains("raman")
            || lowered.contains("cm-1")
            || lowered.contains("cm⁻¹")
            || lowered.contains("1/cm")
        {
            AxisUnit::Wavenumber
        } else if lowered.contains("wavelength")
            || lowered.contains("nm")
            || lowered.contains("nanomet")
            || lowered.contains("angstrom")
        {
            AxisUnit::Wavelength
        } else if lowered.contains("pixel") || lowered.contains("px") {
            AxisUnit::Pixel
        } else {
            AxisUnit::Unclassified
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AxisUnit::Wavelength => "wavelength",
            AxisUnit::Wavenumber => "wavenumber",
            AxisUnit::Pixel => "pixel",
            AxisUnit::Unclassified => "unclassified",
        }
    }
}
