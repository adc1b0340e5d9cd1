//! ORBTRACK - glowing-sphere controller tracking for a single fixed camera.
//!
//! Tracks one or more handheld controllers whose spheres glow in a distinct
//! color, reporting image-plane position, apparent radius and estimated
//! physical distance per frame.
//!
//! # Overview
//!
//! Each enabled controller walks through three phases:
//!
//! 1. **Color assignment** - a free entry of the fixed candidate palette
//!    (magenta, cyan, blue) is reserved for the controller.
//! 2. **Calibration** - the sphere is blinked and the difference images
//!    isolate it; the mean color inside the blink intersection becomes the
//!    controller's color signature. A persisted signature from an earlier
//!    session is tried first.
//! 3. **Tracking** - every frame, the sphere is searched in a region of
//!    interest using an HSV filter around the signature, with multi-level
//!    ROI widening and a quadrant sweep as fallback. Position and radius
//!    are smoothed adaptively, and the signature itself is re-estimated
//!    over time to follow drifting illumination.
//!
//! # Quick Start
//!
//! ```text
//! use orbtrack::{ControllerId, SphereTracker, Status};
//! use shared::ConfigStorage;
//!
//! let mut tracker = SphereTracker::new(camera, leds, ConfigStorage::new()?)?;
//!
//! let controller = ControllerId(0);
//! assert_eq!(tracker.enable(controller), Status::Calibrated);
//!
//! loop {
//!     tracker.update_image();
//!     let found = tracker.update(None);
//!     if let Some((x, y, radius)) = tracker.position(controller) {
//!         let distance = tracker.distance_mm(radius * 2.0);
//!         // drive the application
//!     }
//! }
//! ```
//!
//! # Camera and LED integration
//!
//! The tracker does not talk to hardware directly: the camera and the LED
//! driver are injected behind narrow traits at construction, which keeps
//! the pipeline testable against scripted devices.

use log::{info, warn};
use shared::camera_interface::{CameraInterface, CameraParameters};
use shared::image_proc::overlay::{draw_circle, draw_rect};
use shared::image_proc::Rect;
use shared::{BgrImage, ConfigStorage};
use std::sync::Arc;

mod calibration;
pub mod clock;
pub mod config;
pub mod distance;
pub mod error;
pub mod led;
pub mod palette;
pub mod record;
pub mod trace;
mod tracking;

use crate::clock::{Clock, SystemClock};
use crate::led::LedInterface;
use crate::palette::ColorPalette;
use crate::record::RecordStore;
use crate::trace::CalibrationTrace;
use crate::tracking::RoiPyramid;

// Re-export commonly used types for external use
pub use crate::config::{DistanceModel, TrackerConfig};
pub use crate::error::TrackerError;
pub use crate::record::{ControllerId, ControllerRecord};
pub use shared::camera_interface::CameraError;

/// Environment variable selecting the camera index (decimal integer).
pub const CAMERA_ENV: &str = "PSMOVE_TRACKER_CAMERA";

/// Frame acquisition attempts before construction gives up on the camera.
const STARTUP_FRAME_ATTEMPTS: usize = 1000;

/// Controller state as seen through the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The controller is not enabled.
    NotCalibrated,
    /// A color signature exists; the sphere was not found in the last
    /// frame. Also the result of a successful `enable`.
    Calibrated,
    /// The sphere was found in the last frame.
    Tracking,
    /// Enabling failed: no free color, or calibration rejected.
    CalibrationError,
}

/// Camera index from `PSMOVE_TRACKER_CAMERA`, if the variable holds a
/// valid decimal integer. Invalid values are ignored.
pub fn camera_index_from_env() -> Option<i32> {
    let value = std::env::var(CAMERA_ENV).ok()?;
    if value.is_empty() {
        return None;
    }
    value.parse::<i32>().ok()
}

/// Apply the LED dimming factor to a color.
pub(crate) fn dim_color(rgb: (u8, u8, u8), factor: f64) -> (u8, u8, u8) {
    let dim = |c: u8| (c as f64 * factor).min(255.0) as u8;
    (dim(rgb.0), dim(rgb.1), dim(rgb.2))
}

/// The tracking session.
///
/// Single-threaded: all operations run on the caller's thread, and callers
/// serialize access. One tracker owns its camera for the whole session.
pub struct SphereTracker<C: CameraInterface, L: LedInterface, K: Clock = SystemClock> {
    camera: C,
    leds: L,
    clock: K,
    storage: ConfigStorage,
    config: TrackerConfig,
    trace: Option<CalibrationTrace>,
    /// Latest frame from `update_image`, shared with the camera driver.
    frame: Option<Arc<BgrImage>>,
    /// Frame size as (width, height).
    frame_size: (usize, usize),
    /// ROI scratch buffers, reused across controllers and frames.
    roi: RoiPyramid,
    records: RecordStore,
    palette: ColorPalette,
    /// Exponentially smoothed frame rate of `update`.
    fps_ewma: f64,
    last_frame_duration_ms: u64,
}

impl<C: CameraInterface, L: LedInterface> SphereTracker<C, L, SystemClock> {
    /// Create a tracker with the default configuration.
    pub fn new(camera: C, leds: L, storage: ConfigStorage) -> Result<Self, TrackerError> {
        Self::with_config(camera, leds, storage, TrackerConfig::default())
    }

    /// Create a tracker with a custom configuration.
    pub fn with_config(
        camera: C,
        leds: L,
        storage: ConfigStorage,
        config: TrackerConfig,
    ) -> Result<Self, TrackerError> {
        Self::with_clock(camera, leds, storage, config, SystemClock::default())
    }
}

impl<C: CameraInterface, L: LedInterface, K: Clock> SphereTracker<C, L, K> {
    /// Create a tracker with an injected time source.
    pub fn with_clock(
        mut camera: C,
        leds: L,
        storage: ConfigStorage,
        config: TrackerConfig,
        clock: K,
    ) -> Result<Self, TrackerError> {
        if let Err(e) =
            camera.load_calibration(&storage.intrinsics_path(), &storage.distortion_path())
        {
            warn!("camera undistortion data not loaded: {e}");
        }

        // back up the system's camera settings, unless already backed up
        if !storage.has_camera_backup() {
            match camera.backup_settings() {
                Ok(blob) => {
                    if let Err(e) = storage.save_camera_backup(&blob) {
                        warn!("camera settings backup not saved: {e}");
                    }
                }
                Err(e) => warn!("camera settings backup failed: {e}"),
            }
        }

        // static exposure known to work for sphere tracking
        if let Err(e) = camera.set_parameters(&CameraParameters::fixed_exposure(config.exposure)) {
            warn!("camera parameters not applied: {e}");
        }

        // make sure the camera delivers before committing to a frame size
        let mut probe = None;
        let mut last_error = None;
        for _ in 0..STARTUP_FRAME_ATTEMPTS {
            match camera.query_frame() {
                Ok(frame) => {
                    probe = Some(frame);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let Some(probe) = probe else {
            return Err(TrackerError::Camera(last_error.expect(
                "no frame and no error cannot happen after a failed probe",
            )));
        };

        let (rows, cols, _) = probe.dim();
        let roi = RoiPyramid::new(cols, rows, config.roi_levels);
        info!("tracker ready, frame size {cols}x{rows}");

        Ok(Self {
            camera,
            leds,
            clock,
            storage,
            config,
            trace: None,
            frame: None,
            frame_size: (cols, rows),
            roi,
            records: RecordStore::new(),
            palette: ColorPalette::standard(),
            fps_ewma: 0.0,
            last_frame_duration_ms: 0,
        })
    }

    /// Route calibration diagnostics into the given directory: stage
    /// images per blink plus a plain-text value log.
    pub fn enable_trace(&mut self, dir: std::path::PathBuf) -> Result<(), TrackerError> {
        self.trace = Some(CalibrationTrace::new(dir)?);
        Ok(())
    }

    /// Enable a controller with the first free palette color.
    pub fn enable(&mut self, id: ControllerId) -> Status {
        let Some(rgb) = self.palette.pick_free() else {
            warn!("no free tracking color for controller {}", id.0);
            return Status::CalibrationError;
        };
        self.enable_with_color(id, rgb)
    }

    /// Enable a controller with a specific palette color.
    ///
    /// Returns `Calibrated` immediately when the controller is already
    /// enabled, `CalibrationError` when the color is unknown or taken or
    /// when calibration fails. A failed calibration leaves the palette and
    /// the record store untouched.
    pub fn enable_with_color(&mut self, id: ControllerId, rgb: (u8, u8, u8)) -> Status {
        if self.records.find(id).is_some() {
            return Status::Calibrated;
        }
        match self.palette.find(rgb) {
            Some(color) if !color.used => {}
            _ => return Status::CalibrationError,
        }

        // a signature from an earlier session may still match the lighting
        if let Some(record) = self.try_persisted_color(id, rgb) {
            info!("controller {} reacquired with persisted color", id.0);
            self.records.insert(record);
            self.palette.mark(rgb, true);
            return Status::Calibrated;
        }

        if let Some(trace) = &self.trace {
            trace.clear();
        }

        let outcome = calibration::calibrate_sphere(
            &mut self.camera,
            &mut self.leds,
            &self.clock,
            &self.config,
            self.trace.as_ref(),
            id,
            rgb,
        );
        match outcome {
            Ok(result) => {
                let mut record = ControllerRecord::new(id, rgb);
                record.set_color_estimate(result.bgr, result.hsv);
                self.records.insert(record);
                self.palette.mark(rgb, true);
                self.save_signatures();
                info!("controller {} calibrated with color {rgb:?}", id.0);
                Status::Calibrated
            }
            Err(e) => {
                warn!("calibration for controller {} failed: {e}", id.0);
                Status::CalibrationError
            }
        }
    }

    /// Try to reuse a persisted color signature: light the sphere and track
    /// it a few times; accept when every try looks solid.
    fn try_persisted_color(
        &mut self,
        id: ControllerId,
        rgb: (u8, u8, u8),
    ) -> Option<ControllerRecord> {
        let signature = match self.storage.get_color_signature(id.0)? {
            Ok(signature) => signature,
            Err(e) => {
                warn!("persisted color for controller {} unreadable: {e}", id.0);
                return None;
            }
        };

        let mut record = ControllerRecord::from_signature(id, &signature);
        record.assigned_rgb = rgb;
        let (r, g, b) = dim_color(rgb, self.config.dimming_factor);

        let mut tracked = true;
        for _ in 0..self.config.fast_path_tries {
            // keep the sphere lit and the frame fresh while waiting
            let mut elapsed = 0;
            while elapsed < self.config.fast_path_delay_ms {
                self.clock.sleep_ms(10);
                self.leds.set_leds(id, r, g, b);
                self.leds.update_leds(id);
                self.update_image();
                elapsed += 10;
            }

            if let Some(frame) = self.frame.clone() {
                let now = self.clock.ticks_ms();
                tracking::update_controller(
                    &frame,
                    &mut record,
                    &mut self.roi,
                    &self.config,
                    self.fps_ewma,
                    now,
                );
            }

            // quality gate on pixel ratio and radius only; radius stability
            // is deliberately not consulted here
            tracked = tracked
                && record.q1 > self.config.fast_path_q1
                && record.q3 > self.config.fast_path_q3;
        }

        tracked.then_some(record)
    }

    /// Disable a controller and free its palette color.
    pub fn disable(&mut self, id: ControllerId) {
        if let Some(record) = self.records.remove(id) {
            self.palette.mark(record.assigned_rgb, false);
            info!("controller {} disabled", id.0);
        }
    }

    /// Tracking status of a controller.
    pub fn status(&self, id: ControllerId) -> Status {
        match self.records.find(id) {
            Some(record) if record.is_tracked => Status::Tracking,
            Some(_) => Status::Calibrated,
            None => Status::NotCalibrated,
        }
    }

    /// The LED color of an enabled controller, after dimming.
    pub fn color(&self, id: ControllerId) -> Option<(u8, u8, u8)> {
        self.records
            .find(id)
            .map(|record| dim_color(record.assigned_rgb, self.config.dimming_factor))
    }

    /// Acquire a new frame from the camera.
    pub fn update_image(&mut self) {
        match self.camera.query_frame() {
            Ok(frame) => self.frame = Some(frame),
            Err(e) => {
                warn!("frame acquisition failed: {e}");
                self.frame = None;
            }
        }
    }

    /// Run tracking against the current frame for one controller, or for
    /// all controllers in insertion order.
    ///
    /// Returns the number of spheres found. Without a current frame this is
    /// zero.
    pub fn update(&mut self, id: Option<ControllerId>) -> usize {
        let started = self.clock.ticks_ms();
        let mut spheres_found = 0;

        if let Some(frame) = self.frame.clone() {
            let fps = self.fps_ewma;
            match id {
                None => {
                    for record in self.records.iter_mut() {
                        spheres_found += tracking::update_controller(
                            &frame,
                            record,
                            &mut self.roi,
                            &self.config,
                            fps,
                            started,
                        ) as usize;
                    }
                }
                Some(id) => {
                    if let Some(record) = self.records.find_mut(id) {
                        spheres_found = tracking::update_controller(
                            &frame,
                            record,
                            &mut self.roi,
                            &self.config,
                            fps,
                            started,
                        ) as usize;
                    }
                }
            }
        }

        self.last_frame_duration_ms = self.clock.ticks_ms().saturating_sub(started);
        if self.last_frame_duration_ms > 0 {
            self.fps_ewma =
                0.85 * self.fps_ewma + 0.15 * (1000.0 / self.last_frame_duration_ms as f64);
        }
        spheres_found
    }

    /// Smoothed position and radius of a controller's sphere, in pixels.
    pub fn position(&self, id: ControllerId) -> Option<(f64, f64, f64)> {
        self.records
            .find(id)
            .map(|record| (record.x, record.y, record.r))
    }

    /// Estimated distance in millimeters for a blob diameter in pixels.
    pub fn distance_mm(&self, blob_diameter_px: f64) -> f64 {
        distance::calculate_distance(&self.config.distance, blob_diameter_px)
    }

    /// The current frame, if one has been acquired.
    pub fn image(&self) -> Option<Arc<BgrImage>> {
        self.frame.clone()
    }

    /// Read-only view of a controller's tracking state.
    pub fn record(&self, id: ControllerId) -> Option<&ControllerRecord> {
        self.records.find(id)
    }

    /// The current ROI rectangle of a controller.
    pub fn roi_rect(&self, id: ControllerId) -> Option<Rect> {
        self.records.find(id).map(|record| {
            let (w, h) = self.roi.size(record.roi_level);
            Rect::new(record.roi_x, record.roi_y, w as i32, h as i32)
        })
    }

    /// The color palette with its current used/free flags.
    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }

    /// The smoothed frame rate of `update`.
    pub fn fps(&self) -> f64 {
        self.fps_ewma
    }

    /// Frame size as (width, height).
    pub fn frame_size(&self) -> (usize, usize) {
        self.frame_size
    }

    /// Copy of the current frame with the ROI box and the estimated circle
    /// drawn for every tracked controller.
    pub fn annotate_frame(&self) -> Option<BgrImage> {
        let frame = self.frame.as_ref()?;
        let mut annotated = (**frame).clone();

        for record in self.records.iter() {
            if !record.is_tracked {
                continue;
            }
            let (w, h) = self.roi.size(record.roi_level);
            let roi = Rect::new(record.roi_x, record.roi_y, w as i32, h as i32);
            draw_rect(&mut annotated, roi, (255, 255, 255), 3);
            draw_rect(&mut annotated, roi, (0, 0, 255), 1);
            draw_circle(&mut annotated, record.x, record.y, record.r, (255, 255, 255));
        }
        Some(annotated)
    }

    /// Persist the color signatures of all enabled controllers.
    fn save_signatures(&self) {
        for record in self.records.iter() {
            if let Err(e) = self
                .storage
                .save_color_signature(record.id.0, &record.signature())
            {
                warn!("color signature for controller {} not saved: {e}", record.id.0);
            }
        }
    }
}

impl<C: CameraInterface, L: LedInterface, K: Clock> Drop for SphereTracker<C, L, K> {
    fn drop(&mut self) {
        self.save_signatures();
        if let Some(Ok(blob)) = self.storage.get_camera_backup() {
            if let Err(e) = self.camera.restore_settings(&blob) {
                warn!("camera settings not restored: {e}");
            }
        }
    }
}
