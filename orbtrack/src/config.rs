use serde::{Deserialize, Serialize};
use shared::Scalar4;

/// Numeric policy for the tracker.
///
/// The defaults are the tuned values the pipeline ships with; changing them
/// shifts the balance between latency, robustness and color stability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Number of ROI pyramid levels. Level 0 is half the frame; every
    /// further level is square with 0.7x the previous minimum side.
    pub roi_levels: usize,
    /// Number of blink (on/off) image pairs captured during calibration.
    pub blinks: usize,
    /// Wait per blink phase in milliseconds (frames are polled meanwhile).
    pub blink_delay_ms: u64,
    /// Grey values at or below this are treated as noise in the blink diff.
    pub calibration_diff_threshold: f64,
    /// Minimum usable blob size during calibration, in pixels.
    pub calibration_min_size: usize,
    /// Maximum standard deviation of blink blob sizes, in percent of mean.
    pub calibration_size_std_pct: f64,
    /// Maximum displacement between blink blobs, in pixels.
    pub calibration_max_dist: f64,
    /// Half-widths of the HSV color filter (H, S, V).
    pub hsv_band: Scalar4,
    /// Minimum smoothed FPS before ROI recentering is attempted.
    pub roi_adjust_fps_threshold: f64,
    /// Minimum blob-pixels to circle-area ratio (q1) to accept a sphere.
    pub quality_t1: f64,
    /// Maximum relative radius change (q2) to accept a sphere.
    pub quality_t2: f64,
    /// Minimum radius in pixels (q3) to accept a sphere.
    pub quality_t3: f64,
    /// q1 above which the reported position snaps to the mass center.
    pub snap_to_mass_q1: f64,
    /// Adaptive x/y position smoothing.
    pub adaptive_xy: bool,
    /// Adaptive radius smoothing. The x/y smoothing block also keys off
    /// this flag, faithful to the shipped behavior; keep the two flags
    /// equal unless that coupling is acceptable.
    pub adaptive_z: bool,
    /// Maximum weighted HSV distance from the first color estimate before
    /// an adapted color is reverted.
    pub color_adaption_max_diff: f64,
    /// Seconds between color adaptations; 0 disables adaptation.
    pub color_update_rate_s: f64,
    /// Minimum q1 for a color update.
    pub color_update_q1: f64,
    /// Maximum q2 for a color update.
    pub color_update_q2: f64,
    /// Minimum q3 for a color update.
    pub color_update_q3: f64,
    /// Minimum q1 for the persisted-color fast path.
    pub fast_path_q1: f64,
    /// Minimum q3 for the persisted-color fast path.
    pub fast_path_q3: f64,
    /// Tracking attempts in the persisted-color fast path.
    pub fast_path_tries: usize,
    /// Delay between fast-path attempts in milliseconds.
    pub fast_path_delay_ms: u64,
    /// LED dimming applied to every write, for high-exposure setups.
    pub dimming_factor: f64,
    /// Fixed camera exposure used for tracking.
    pub exposure: u32,
    /// Constants of the pin-hole distance model.
    pub distance: DistanceModel,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            roi_levels: 4,
            blinks: 4,
            blink_delay_ms: 50,
            calibration_diff_threshold: 20.0,
            calibration_min_size: 50,
            calibration_size_std_pct: 10.0,
            calibration_max_dist: 30.0,
            hsv_band: [12.0, 85.0, 85.0, 0.0],
            roi_adjust_fps_threshold: 160.0,
            quality_t1: 0.3,
            quality_t2: 0.7,
            quality_t3: 4.0,
            snap_to_mass_q1: 0.85,
            adaptive_xy: true,
            adaptive_z: true,
            color_adaption_max_diff: 35.0,
            color_update_rate_s: 1.0,
            color_update_q1: 0.8,
            color_update_q2: 0.2,
            color_update_q3: 6.0,
            fast_path_q1: 0.83,
            fast_path_q3: 8.0,
            fast_path_tries: 3,
            fast_path_delay_ms: 100,
            dimming_factor: 1.0,
            exposure: 2051,
            distance: DistanceModel::default(),
        }
    }
}

/// Constants of the pin-hole distance model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceModel {
    /// Camera focal length constant, in degrees.
    pub focal_length: f64,
    /// Sensor pixel height, in micrometers.
    pub pixel_height_um: f64,
    /// Physical sphere diameter, in millimeters.
    pub sphere_diameter_mm: f64,
    /// User-tunable correction factor.
    pub user_factor: f64,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self {
            focal_length: 28.3,
            pixel_height_um: 5.0,
            sphere_diameter_mm: 47.0,
            user_factor: 1.05,
        }
    }
}
