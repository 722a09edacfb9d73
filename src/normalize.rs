//! Pixel-to-body-scale normalization of raw measurements.
//!
//! Camera distance and image resolution change every pixel measurement by the
//! same factor. Body height is estimated from the torso length and every
//! numeric measurement is rescaled to a common reference height.

use serde_json::Value;

use crate::types::{Measurements, TORSO_LENGTH};

/// Reference body height in centimetres.
pub const DEFAULT_REFERENCE_HEIGHT: f64 = 170.0;

/// Full body height as a multiple of torso length.
const TORSO_TO_HEIGHT: f64 = 3.5;

/// Pixel-to-centimetre conversion applied to the estimated height.
const PIXELS_TO_CM: f64 = 0.1;

/// Scale factor mapping raw measurements onto `reference_height`.
///
/// Returns 1.0 when there is no usable (positive, numeric) torso length.
pub fn height_factor(measurements: &Measurements, reference_height: f64) -> f64 {
    match measurements.get_f64(TORSO_LENGTH) {
        Some(torso) if torso > 0.0 => {
            let estimated_height_px = torso * TORSO_TO_HEIGHT;
            reference_height / (estimated_height_px * PIXELS_TO_CM)
        }
        _ => 1.0,
    }
}

/// Rescale every numeric measurement by [`height_factor`].
///
/// Non-numeric values, and numbers that would overflow when scaled, are
/// copied through unchanged. Never fails: an empty or torso-less input comes
/// back as an identity copy.
pub fn normalize_measurements(measurements: &Measurements, reference_height: f64) -> Measurements {
    let factor = height_factor(measurements, reference_height);

    measurements
        .iter()
        .map(|(name, value)| (name.clone(), scale_value(value, factor)))
        .collect()
}

fn scale_value(value: &Value, factor: f64) -> Value {
    match value {
        Value::Number(n) => match n.as_f64().map(|v| v * factor) {
            Some(scaled) if scaled.is_finite() => Value::from(scaled),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}
