//! Asynchronous frame writer with a worker thread pool.
//!
//! Writes debug frames to disk without blocking the capture loop. Uses a
//! bounded channel; when the queue is full the frame is dropped rather than
//! stalling the caller.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};
use image::{GrayImage as PngGray, RgbImage};
use log::{info, warn};
use std::mem;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::image_proc::{BgrImage, GrayImage};

#[derive(Debug, Clone)]
pub enum ImagePayload {
    /// BGR color frame.
    Bgr(BgrImage),
    /// Single-channel image (grayscale or binary mask).
    Gray(GrayImage),
}

pub struct FrameWriterHandle {
    sender: Sender<FrameWriteTask>,
    workers: Vec<JoinHandle<()>>,
}

struct FrameWriteTask {
    payload: ImagePayload,
    filepath: PathBuf,
}

impl FrameWriterHandle {
    pub fn new(num_workers: usize, buffer_size: usize) -> Self {
        let (sender, receiver) = bounded::<FrameWriteTask>(buffer_size);

        let mut workers = Vec::new();
        for worker_id in 0..num_workers {
            let receiver = receiver.clone();

            let handle = std::thread::spawn(move || {
                info!("Frame writer worker {worker_id} started");
                while let Ok(task) = receiver.recv() {
                    if let Err(e) = save_frame(&task.payload, &task.filepath) {
                        warn!(
                            "Worker {} failed to save frame to {}: {}",
                            worker_id,
                            task.filepath.display(),
                            e
                        );
                    }
                }
                info!("Frame writer worker {worker_id} shutting down");
            });

            workers.push(handle);
        }

        Self { sender, workers }
    }

    /// Drop the sender and wait for the workers to drain the queue.
    pub fn wait_for_completion(mut self) {
        mem::drop(self.sender);

        for (worker_id, handle) in self.workers.drain(..).enumerate() {
            if let Err(e) = handle.join() {
                warn!("Worker {worker_id} panicked: {e:?}");
            }
        }

        info!("All frame writer workers completed");
    }

    /// Queue a BGR frame for writing as PNG.
    pub fn write_bgr(&self, frame: &BgrImage, filepath: PathBuf) -> Result<()> {
        self.send_task(FrameWriteTask {
            payload: ImagePayload::Bgr(frame.clone()),
            filepath,
        })
    }

    /// Queue a single-channel image for writing as PNG.
    pub fn write_gray(&self, frame: &GrayImage, filepath: PathBuf) -> Result<()> {
        self.send_task(FrameWriteTask {
            payload: ImagePayload::Gray(frame.clone()),
            filepath,
        })
    }

    fn send_task(&self, task: FrameWriteTask) -> Result<()> {
        match self.sender.try_send(task) {
            Ok(_) => Ok(()),
            Err(TrySendError::Full(task)) => {
                anyhow::bail!(
                    "Frame writer queue full, cannot write to {}",
                    task.filepath.display()
                )
            }
            Err(TrySendError::Disconnected(_)) => {
                anyhow::bail!("Frame writer workers have shut down")
            }
        }
    }
}

fn save_frame(payload: &ImagePayload, filepath: &Path) -> Result<()> {
    if let Some(parent) = filepath.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    match payload {
        ImagePayload::Bgr(frame) => {
            let (rows, cols, _) = frame.dim();
            let img = RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
                let (row, col) = (y as usize, x as usize);
                image::Rgb([
                    frame[[row, col, 2]],
                    frame[[row, col, 1]],
                    frame[[row, col, 0]],
                ])
            });
            img.save(filepath)?;
        }
        ImagePayload::Gray(frame) => {
            let (rows, cols) = frame.dim();
            let img = PngGray::from_fn(cols as u32, rows as u32, |x, y| {
                image::Luma([frame[[y as usize, x as usize]]])
            });
            img.save(filepath)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use tempfile::TempDir;

    #[test]
    fn test_write_bgr_frame() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FrameWriterHandle::new(2, 10);

        let frame = Array3::from_shape_fn((16, 16, 3), |(y, x, c)| ((x + y + c) * 10) as u8);
        let filepath = temp_dir.path().join("frame.png");
        writer.write_bgr(&frame, filepath.clone()).unwrap();
        writer.wait_for_completion();

        assert!(filepath.exists());
    }

    #[test]
    fn test_write_mask_creates_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FrameWriterHandle::new(1, 5);

        let mask = Array2::from_elem((8, 8), 255u8);
        let nested = temp_dir.path().join("stages/blink_0/mask.png");
        writer.write_gray(&mask, nested.clone()).unwrap();
        writer.wait_for_completion();

        assert!(nested.exists());
    }

    #[test]
    fn test_unwritable_path_does_not_poison_workers() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FrameWriterHandle::new(1, 5);

        let frame = Array3::zeros((4, 4, 3));
        // a bad extension fails inside the worker; later writes still land
        writer
            .write_bgr(&frame, temp_dir.path().join("frame.unknown-ext"))
            .unwrap();
        let good = temp_dir.path().join("frame.png");
        writer.write_bgr(&frame, good.clone()).unwrap();
        writer.wait_for_completion();

        assert!(good.exists());
    }
}
