use shared::camera_interface::CameraError;
use thiserror::Error;

/// Errors produced by the sphere tracker.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Camera driver failure.
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),

    /// The sphere could not be isolated in every calibration image.
    #[error("sphere not found in all calibration images ({valid}/{total} usable)")]
    SphereNotVisible {
        /// Blink images with a usable blob.
        valid: usize,
        /// Total blink images captured.
        total: usize,
    },

    /// The blobs found across the calibration blinks differ too much in
    /// size to trust the color estimate.
    #[error("calibration blob sizes vary too much (std {std:.1} px, limit {limit:.1} px)")]
    BlobSizeVariance {
        /// Standard deviation of the blob sizes.
        std: f64,
        /// Allowed deviation for the observed mean size.
        limit: f64,
    },

    /// Persistent storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}
