//! Write-only calibration trace.
//!
//! When enabled, every calibration run dumps its intermediate images per
//! blink stage plus a plain-text log of named values and warnings into one
//! directory. Purely diagnostic; nothing reads these files back.

use log::warn;
use shared::frame_writer::FrameWriterHandle;
use shared::{BgrImage, GrayImage};
use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;

pub struct CalibrationTrace {
    dir: PathBuf,
    log_path: PathBuf,
    writer: Option<FrameWriterHandle>,
}

impl CalibrationTrace {
    /// Trace into the given directory (created if missing).
    pub fn new(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            log_path: dir.join("trace.log"),
            writer: Some(FrameWriterHandle::new(1, 32)),
            dir,
        })
    }

    /// Remove the output of any previous calibration run.
    pub fn clear(&self) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_trace_file = path.extension().is_some_and(|e| e == "png") || path == self.log_path;
            if is_trace_file {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    /// Dump a color frame for one blink stage.
    pub fn image_at(&self, image: &BgrImage, index: usize, stage: &str) {
        if let Some(writer) = &self.writer {
            let path = self.dir.join(format!("{stage}_{index}.png"));
            if let Err(e) = writer.write_bgr(image, path) {
                warn!("trace image dropped: {e}");
            }
        }
    }

    /// Dump a mask or grayscale image for one blink stage.
    pub fn mask_at(&self, mask: &GrayImage, index: usize, stage: &str) {
        if let Some(writer) = &self.writer {
            let path = self.dir.join(format!("{stage}_{index}.png"));
            if let Err(e) = writer.write_gray(mask, path) {
                warn!("trace mask dropped: {e}");
            }
        }
    }

    /// Append a leveled log line (e.g. WARNING, ERROR).
    pub fn log_entry(&self, level: &str, message: &str) {
        self.append(&format!("[{level}] {message}"));
    }

    /// Append a named value.
    pub fn put_value<T: Display>(&self, name: &str, value: T) {
        self.append(&format!("{name} = {value}"));
    }

    fn append(&self, line: &str) {
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!("trace log write failed: {e}");
        }
    }
}

impl Drop for CalibrationTrace {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.wait_for_completion();
        }
    }
}
