//! Mock camera implementation for testing.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::camera_interface::{CameraError, CameraInterface, CameraParameters, CameraResult};
use crate::image_proc::BgrImage;

/// Where the mock takes its frames from.
enum FrameSource {
    /// Fixed sequence; a single entry repeats forever.
    Frames(Vec<Arc<BgrImage>>),
    /// Frames produced on demand, e.g. rendered from shared scene state.
    Generator(Box<dyn FnMut() -> Arc<BgrImage> + Send>),
}

/// Mock camera backed by a frame script or a generator closure.
///
/// Records parameter and backup/restore calls so tests can assert on the
/// camera-facing behavior of the tracker.
pub struct MockCamera {
    source: FrameSource,
    frame_index: usize,
    size: (usize, usize),
    pub applied_parameters: Vec<CameraParameters>,
    pub exposures: Vec<u32>,
    pub restored_blobs: Arc<Mutex<Vec<Vec<u8>>>>,
    pub backup_blob: Vec<u8>,
    pub calibration_loads: usize,
}

impl MockCamera {
    /// Create a mock camera serving the given frames in order.
    pub fn new(frames: Vec<BgrImage>) -> Self {
        assert!(!frames.is_empty(), "mock camera needs at least one frame");
        let (rows, cols, _) = frames[0].dim();
        let size = (cols, rows);
        Self {
            source: FrameSource::Frames(frames.into_iter().map(Arc::new).collect()),
            frame_index: 0,
            size,
            applied_parameters: Vec::new(),
            exposures: Vec::new(),
            restored_blobs: Arc::default(),
            backup_blob: b"mock-settings".to_vec(),
            calibration_loads: 0,
        }
    }

    /// Create a mock camera that returns the same frame forever.
    pub fn new_repeating(frame: BgrImage) -> Self {
        Self::new(vec![frame])
    }

    /// Create a mock camera that calls a closure for every frame.
    pub fn from_fn<F>(size: (usize, usize), generator: F) -> Self
    where
        F: FnMut() -> Arc<BgrImage> + Send + 'static,
    {
        Self {
            source: FrameSource::Generator(Box::new(generator)),
            frame_index: 0,
            size,
            applied_parameters: Vec::new(),
            exposures: Vec::new(),
            restored_blobs: Arc::default(),
            backup_blob: b"mock-settings".to_vec(),
            calibration_loads: 0,
        }
    }
}

impl CameraInterface for MockCamera {
    fn query_frame(&mut self) -> CameraResult<Arc<BgrImage>> {
        match &mut self.source {
            FrameSource::Frames(frames) => {
                let index = if frames.len() == 1 {
                    0
                } else {
                    if self.frame_index >= frames.len() {
                        return Err(CameraError::Capture("no more frames".to_string()));
                    }
                    let current = self.frame_index;
                    self.frame_index += 1;
                    current
                };
                Ok(Arc::clone(&frames[index]))
            }
            FrameSource::Generator(generator) => {
                self.frame_index += 1;
                Ok(generator())
            }
        }
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> CameraResult<()> {
        self.applied_parameters.push(*params);
        Ok(())
    }

    fn set_exposure(&mut self, exposure: u32) -> CameraResult<()> {
        self.exposures.push(exposure);
        Ok(())
    }

    fn load_calibration(&mut self, _intrinsics: &Path, _distortion: &Path) -> CameraResult<()> {
        self.calibration_loads += 1;
        Ok(())
    }

    fn backup_settings(&mut self) -> CameraResult<Vec<u8>> {
        Ok(self.backup_blob.clone())
    }

    fn restore_settings(&mut self, blob: &[u8]) -> CameraResult<()> {
        self.restored_blobs.lock().unwrap().push(blob.to_vec());
        Ok(())
    }

    fn size(&self) -> (usize, usize) {
        self.size
    }
}
