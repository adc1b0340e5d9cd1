//! Physical distance estimation from the apparent sphere size.

use crate::config::DistanceModel;

/// Epsilon guard shared with the radius-change quality score; single
/// precision on purpose so the behavior at a zero-size blob is unchanged.
pub(crate) const EPS: f64 = f32::EPSILON as f64;

/// Distance between sphere and camera in millimeters, from the blob
/// diameter in pixels.
///
/// Pin-hole relation with the camera's focal and pixel-size constants
/// folded in:
///
/// ```text
/// dist = (focal * sphere_diameter * user_factor)
///        / (blob_diameter * pixel_height / 100 + eps)
/// ```
pub fn calculate_distance(model: &DistanceModel, blob_diameter_px: f64) -> f64 {
    (model.focal_length * model.sphere_diameter_mm * model.user_factor)
        / (blob_diameter_px * model.pixel_height_um / 100.0 + EPS)
}
