//! Camera abstraction layer.
//!
//! Provides a unified interface for the narrow set of camera operations the
//! tracker consumes, so the pipeline can be driven by real hardware or by a
//! scripted mock in tests.

pub mod mock;

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::image_proc::BgrImage;

/// Error type for camera operations.
#[derive(Error, Debug)]
pub enum CameraError {
    /// Hardware communication error.
    #[error("hardware error: {0}")]
    Hardware(String),
    /// Frame capture error (no frame available, stream fault).
    #[error("capture error: {0}")]
    Capture(String),
    /// Configuration error (unsupported parameter, bad calibration file).
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for camera operations.
pub type CameraResult<T> = Result<T, CameraError>;

/// One-shot parameter set applied to the camera at session start.
///
/// The `auto_*` switches disable the corresponding automatic control when
/// false; `None` means "leave the driver default alone".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParameters {
    pub auto_gain: bool,
    pub auto_white_balance: bool,
    pub auto_exposure: bool,
    pub exposure: u32,
    pub gain: u32,
    pub wb_red: u32,
    pub wb_green: u32,
    pub wb_blue: u32,
    pub contrast: Option<u32>,
    pub brightness: Option<u32>,
}

impl CameraParameters {
    /// Fixed manual exposure with neutral white balance, all automatic
    /// controls off.
    pub fn fixed_exposure(exposure: u32) -> Self {
        Self {
            auto_gain: false,
            auto_white_balance: false,
            auto_exposure: false,
            exposure,
            gain: 0,
            wb_red: 0xffff,
            wb_green: 0xffff,
            wb_blue: 0xffff,
            contrast: None,
            brightness: None,
        }
    }
}

/// Trait for the camera operations the tracker needs.
///
/// Frames are BGR images shared behind `Arc` so the driver can keep its own
/// reference while the tracker works on the latest frame.
pub trait CameraInterface {
    /// Acquire the next frame, blocking until one is available.
    fn query_frame(&mut self) -> CameraResult<Arc<BgrImage>>;

    /// Apply a parameter set (exposure, gain, white balance, auto modes).
    fn set_parameters(&mut self, params: &CameraParameters) -> CameraResult<()>;

    /// Change only the exposure.
    fn set_exposure(&mut self, exposure: u32) -> CameraResult<()>;

    /// Load undistortion data; both files are opaque to the caller.
    fn load_calibration(&mut self, intrinsics: &Path, distortion: &Path) -> CameraResult<()>;

    /// Serialize the camera's current settings into an opaque blob so they
    /// can be restored after the session.
    fn backup_settings(&mut self) -> CameraResult<Vec<u8>>;

    /// Restore settings from a blob previously produced by
    /// [`CameraInterface::backup_settings`].
    fn restore_settings(&mut self, blob: &[u8]) -> CameraResult<()>;

    /// Sensor size as (width, height) in pixels.
    fn size(&self) -> (usize, usize);
}
