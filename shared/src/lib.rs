//! Shared building blocks for the sphere tracker.
//!
//! Contains the image processing primitives, the camera abstraction layer,
//! the persistence facade and the asynchronous frame writer. Nothing in this
//! crate knows about tracking policy; that lives in the `orbtrack` crate.

pub mod camera_interface;
pub mod config_storage;
pub mod frame_writer;
pub mod image_proc;

pub use config_storage::{ColorSignature, ConfigStorage};
pub use image_proc::{BgrImage, GrayImage, Rect, Scalar4};
