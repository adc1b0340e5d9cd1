//! Image processing primitives for sphere tracking.
//!
//! All pixel work happens on `ndarray` buffers: BGR frames are
//! `Array3<u8>` with shape (rows, cols, 3), grayscale images and binary
//! masks are `Array2<u8>` (a mask pixel is either 0 or 255).
//!
//! # Module Organization
//!
//! - **color**: BGR↔HSV conversion, channel math, masked averaging, HSV
//!   range filtering
//! - **morphology**: thresholding, absolute difference, erode/dilate with
//!   the fixed rectangular kernel, mask combination
//! - **blob**: connected component labeling, biggest-blob extraction,
//!   image moments, max-chord circle estimation
//! - **overlay**: simple geometry drawing for debug output

pub mod blob;
pub mod color;
pub mod morphology;
pub mod overlay;

use ndarray::{Array2, Array3};

/// A color frame in BGR channel order, shape (rows, cols, 3).
pub type BgrImage = Array3<u8>;

/// A single-channel 8-bit image. Binary masks use 0 and 255.
pub type GrayImage = Array2<u8>;

/// A four-component value, used for color triples (B,G,R or H,S,V in
/// components 0..3, component 3 unused).
pub type Scalar4 = [f64; 4];

/// An axis-aligned rectangle in pixel coordinates.
///
/// The origin may be negative while a rectangle is being computed; callers
/// clamp before indexing into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

pub use blob::{biggest_blob_into, boundary_points, estimate_circle, moments, Blob, Moments};
pub use color::{
    bgr_region_to_hsv, bgr_scalar_to_hsv, bgr_to_hsv_pixel, in_range, masked_mean_bgr,
    scalar_add, scalar_scale, scalar_sub,
};
pub use morphology::{
    abs_diff, bgr_to_gray, count_nonzero, dilate, erode, mask_and, threshold_binary,
    MORPH_KERNEL_SIZE,
};
