//! Persistent storage for tracker calibration data.
//!
//! Provides centralized storage for per-controller color signatures and the
//! camera settings backup taken at session start. All files live under one
//! root directory (~/.orbtrack by default); tests inject a temp directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::image_proc::Scalar4;

/// Camera settings backup file name (opaque blob written by the driver).
#[cfg(windows)]
pub const CAMERA_BACKUP_FILE: &str = "PSEye_backup_win.ini";
#[cfg(not(windows))]
pub const CAMERA_BACKUP_FILE: &str = "PSEye_backup_v4l.ini";

/// Undistortion data consumed by the camera driver.
pub const INTRINSICS_FILE: &str = "intrinsics.xml";
pub const DISTORTION_FILE: &str = "distortion.xml";

/// Color signature of one controller as learned during calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSignature {
    /// RGB color the sphere is lit with.
    pub assigned_rgb: (u8, u8, u8),
    /// First estimated sphere color (BGR) under session lighting.
    pub bgr: Scalar4,
    /// The same color in HSV.
    pub hsv: Scalar4,
}

/// Storage manager for tracker configuration files.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g. ~/.orbtrack).
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a config storage with the default root (~/.orbtrack).
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        Ok(Self {
            root_path: PathBuf::from(home).join(".orbtrack"),
        })
    }

    /// Create a config storage with a custom root path.
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Path of the undistortion intrinsics file.
    pub fn intrinsics_path(&self) -> PathBuf {
        self.root_path.join(INTRINSICS_FILE)
    }

    /// Path of the undistortion coefficients file.
    pub fn distortion_path(&self) -> PathBuf {
        self.root_path.join(DISTORTION_FILE)
    }

    fn colors_dir(&self) -> PathBuf {
        self.root_path.join("colors")
    }

    fn color_signature_path(&self, controller: u32) -> PathBuf {
        self.colors_dir()
            .join(format!("controller_{controller}.json"))
    }

    /// Get the persisted color signature for a controller.
    ///
    /// Returns None if no signature exists. Returns Some(Err) if the file
    /// exists but cannot be loaded.
    pub fn get_color_signature(
        &self,
        controller: u32,
    ) -> Option<Result<ColorSignature, std::io::Error>> {
        let path = self.color_signature_path(controller);
        if !path.exists() {
            return None;
        }

        Some(std::fs::read_to_string(&path).and_then(|text| {
            serde_json::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }))
    }

    /// Save a controller's color signature, creating the colors directory
    /// if needed. Returns the path the signature was saved to.
    pub fn save_color_signature(
        &self,
        controller: u32,
        signature: &ColorSignature,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(self.colors_dir())?;
        let path = self.color_signature_path(controller);
        let text = serde_json::to_string_pretty(signature)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, text)?;
        Ok(path)
    }

    fn camera_backup_path(&self) -> PathBuf {
        self.root_path.join(CAMERA_BACKUP_FILE)
    }

    /// Whether a camera settings backup already exists.
    pub fn has_camera_backup(&self) -> bool {
        self.camera_backup_path().exists()
    }

    /// Read the opaque camera settings backup.
    pub fn get_camera_backup(&self) -> Option<Result<Vec<u8>, std::io::Error>> {
        let path = self.camera_backup_path();
        if !path.exists() {
            return None;
        }
        Some(std::fs::read(path))
    }

    /// Write the opaque camera settings backup.
    pub fn save_camera_backup(&self, blob: &[u8]) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root_path)?;
        let path = self.camera_backup_path();
        std::fs::write(&path, blob)?;
        Ok(path)
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".orbtrack")))
    }
}
