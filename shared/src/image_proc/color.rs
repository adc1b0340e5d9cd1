//! Color-space conversion and color arithmetic.
//!
//! HSV follows the 8-bit convention used throughout the pipeline:
//! H ∈ [0, 180), S and V ∈ [0, 255]. Range filtering compares raw pixel
//! values against f64 bounds without clamping, so a lower bound below zero
//! simply accepts every pixel on that channel.

use ndarray::{Array3, ArrayView3};

use crate::image_proc::{BgrImage, GrayImage, Rect, Scalar4};

/// Convert a single BGR pixel to HSV (H in [0, 180)).
pub fn bgr_to_hsv_pixel(b: u8, g: u8, r: u8) -> (u8, u8, u8) {
    let (bf, gf, rf) = (b as f64, g as f64, r as f64);
    let v = bf.max(gf).max(rf);
    let min = bf.min(gf).min(rf);
    let delta = v - min;

    let s = if v > 0.0 {
        (255.0 * delta / v).round()
    } else {
        0.0
    };

    let h = if delta > 0.0 {
        let mut h = if v == rf {
            60.0 * (gf - bf) / delta
        } else if v == gf {
            120.0 + 60.0 * (bf - rf) / delta
        } else {
            240.0 + 60.0 * (rf - gf) / delta
        };
        if h < 0.0 {
            h += 360.0;
        }
        ((h / 2.0).round() as i32 % 180) as f64
    } else {
        0.0
    };

    (h as u8, s as u8, v as u8)
}

/// Convert a BGR color triple to HSV, both carried as [`Scalar4`].
///
/// Channels are rounded into the 8-bit range first, matching a conversion
/// of a one-pixel image.
pub fn bgr_scalar_to_hsv(bgr: Scalar4) -> Scalar4 {
    let b = bgr[0].round().clamp(0.0, 255.0) as u8;
    let g = bgr[1].round().clamp(0.0, 255.0) as u8;
    let r = bgr[2].round().clamp(0.0, 255.0) as u8;
    let (h, s, v) = bgr_to_hsv_pixel(b, g, r);
    [h as f64, s as f64, v as f64, 0.0]
}

/// Convert a rectangular region of a BGR frame into a pre-allocated HSV
/// buffer. The rectangle must be inside the frame and match the buffer
/// dimensions.
pub fn bgr_region_to_hsv(frame: &BgrImage, rect: Rect, dst: &mut Array3<u8>) {
    let (rows, cols, _) = dst.dim();
    assert_eq!(
        (rows, cols),
        (rect.height as usize, rect.width as usize),
        "HSV buffer must match the region size"
    );
    let (x0, y0) = (rect.x as usize, rect.y as usize);

    for row in 0..rows {
        for col in 0..cols {
            let b = frame[[y0 + row, x0 + col, 0]];
            let g = frame[[y0 + row, x0 + col, 1]];
            let r = frame[[y0 + row, x0 + col, 2]];
            let (h, s, v) = bgr_to_hsv_pixel(b, g, r);
            dst[[row, col, 0]] = h;
            dst[[row, col, 1]] = s;
            dst[[row, col, 2]] = v;
        }
    }
}

/// Component-wise sum over the first three channels.
pub fn scalar_add(a: Scalar4, b: Scalar4) -> Scalar4 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3]]
}

/// Component-wise difference over the first three channels.
pub fn scalar_sub(a: Scalar4, b: Scalar4) -> Scalar4 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3]]
}

/// Scale the first three channels by a factor.
pub fn scalar_scale(a: Scalar4, factor: f64) -> Scalar4 {
    [a[0] * factor, a[1] * factor, a[2] * factor, a[3]]
}

/// Mark every pixel whose three channels all lie within [lo, hi] inclusive.
///
/// Bounds are f64 and unclamped on purpose: an out-of-range bound degrades
/// into "accept everything" (below 0) or "accept up to 255" (above 255) on
/// that channel.
pub fn in_range(src: &Array3<u8>, lo: Scalar4, hi: Scalar4, dst: &mut GrayImage) {
    let (rows, cols, _) = src.dim();
    assert_eq!((rows, cols), dst.dim(), "mask must match the source size");

    for row in 0..rows {
        for col in 0..cols {
            let mut inside = true;
            for ch in 0..3 {
                let v = src[[row, col, ch]] as f64;
                if v < lo[ch] || v > hi[ch] {
                    inside = false;
                    break;
                }
            }
            dst[[row, col]] = if inside { 255 } else { 0 };
        }
    }
}

/// Mean BGR color over the nonzero pixels of a mask.
///
/// Returns zeros when the mask is empty.
pub fn masked_mean_bgr(image: &ArrayView3<u8>, mask: &GrayImage) -> Scalar4 {
    let (rows, cols, _) = image.dim();
    assert_eq!((rows, cols), mask.dim(), "mask must match the image size");

    let mut sum = [0.0f64; 3];
    let mut count = 0usize;
    for ((row, col), &m) in mask.indexed_iter() {
        if m != 0 {
            for (ch, acc) in sum.iter_mut().enumerate() {
                *acc += image[[row, col, ch]] as f64;
            }
            count += 1;
        }
    }

    if count == 0 {
        return [0.0; 4];
    }
    [
        sum[0] / count as f64,
        sum[1] / count as f64,
        sum[2] / count as f64,
        0.0,
    ]
}
