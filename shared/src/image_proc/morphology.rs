//! Grayscale conversion, thresholding and binary morphology.
//!
//! The erode/dilate pair uses one fixed rectangular kernel; windows are
//! clipped at the image border, which behaves like border replication for
//! binary masks.

use crate::image_proc::{BgrImage, GrayImage};

/// Side length of the rectangular structuring element used by
/// [`erode`] and [`dilate`].
pub const MORPH_KERNEL_SIZE: usize = 5;

/// Convert a BGR frame to grayscale using the usual luma weights.
pub fn bgr_to_gray(frame: &BgrImage) -> GrayImage {
    let (rows, cols, _) = frame.dim();
    GrayImage::from_shape_fn((rows, cols), |(row, col)| {
        let b = frame[[row, col, 0]] as f64;
        let g = frame[[row, col, 1]] as f64;
        let r = frame[[row, col, 2]] as f64;
        (0.299 * r + 0.587 * g + 0.114 * b).round() as u8
    })
}

/// Per-pixel absolute difference of two grayscale images.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    assert_eq!(a.dim(), b.dim(), "images must have the same size");
    let mut out = a.clone();
    out.zip_mut_with(b, |x, &y| *x = x.abs_diff(y));
    out
}

/// Binarize in place: pixels strictly above the threshold become 255,
/// everything else 0.
pub fn threshold_binary(image: &mut GrayImage, threshold: f64) {
    image.mapv_inplace(|v| if (v as f64) > threshold { 255 } else { 0 });
}

/// Morphological erosion with the fixed rectangular kernel.
pub fn erode(mask: &GrayImage) -> GrayImage {
    morph(mask, true)
}

/// Morphological dilation with the fixed rectangular kernel.
pub fn dilate(mask: &GrayImage) -> GrayImage {
    morph(mask, false)
}

fn morph(mask: &GrayImage, take_min: bool) -> GrayImage {
    let (rows, cols) = mask.dim();
    let half = (MORPH_KERNEL_SIZE / 2) as isize;

    GrayImage::from_shape_fn((rows, cols), |(row, col)| {
        let mut acc = if take_min { u8::MAX } else { u8::MIN };
        for dr in -half..=half {
            for dc in -half..=half {
                let r = row as isize + dr;
                let c = col as isize + dc;
                if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                    continue;
                }
                let v = mask[[r as usize, c as usize]];
                acc = if take_min { acc.min(v) } else { acc.max(v) };
            }
        }
        acc
    })
}

/// Intersect `b` into `a` (per-pixel minimum, which is AND for binary
/// masks).
pub fn mask_and(a: &mut GrayImage, b: &GrayImage) {
    assert_eq!(a.dim(), b.dim(), "masks must have the same size");
    a.zip_mut_with(b, |x, &y| *x = (*x).min(y));
}

/// Number of nonzero pixels in a mask.
pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.iter().filter(|&&v| v != 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn mask_with(pixels: &[(usize, usize)], rows: usize, cols: usize) -> GrayImage {
        let mut m = Array2::<u8>::zeros((rows, cols));
        for &(r, c) in pixels {
            m[[r, c]] = 255;
        }
        m
    }

    #[test]
    fn test_threshold() {
        let mut img = Array2::from_shape_vec((1, 3), vec![10u8, 20, 21]).unwrap();
        threshold_binary(&mut img, 20.0);
        assert_eq!(img.as_slice().unwrap(), &[0, 0, 255]);
    }

    #[test]
    fn test_abs_diff() {
        let a = Array2::from_shape_vec((1, 2), vec![10u8, 200]).unwrap();
        let b = Array2::from_shape_vec((1, 2), vec![30u8, 150]).unwrap();
        assert_eq!(abs_diff(&a, &b).as_slice().unwrap(), &[20, 50]);
    }

    #[test]
    fn test_erode_removes_small_speckle() {
        // A lone 3x3 patch is smaller than the kernel and erodes away.
        let pixels: Vec<_> = (5..8).flat_map(|r| (5..8).map(move |c| (r, c))).collect();
        let mask = mask_with(&pixels, 16, 16);
        assert_eq!(count_nonzero(&erode(&mask)), 0);
    }

    #[test]
    fn test_erode_keeps_large_blob_core() {
        let pixels: Vec<_> = (2..12).flat_map(|r| (2..12).map(move |c| (r, c))).collect();
        let mask = mask_with(&pixels, 16, 16);
        let eroded = erode(&mask);
        assert!(count_nonzero(&eroded) > 0);
        assert_eq!(eroded[[7, 7]], 255);
        assert_eq!(eroded[[2, 2]], 0);
    }

    #[test]
    fn test_dilate_grows_blob() {
        let mask = mask_with(&[(8, 8)], 16, 16);
        let dilated = dilate(&mask);
        assert_eq!(count_nonzero(&dilated), MORPH_KERNEL_SIZE * MORPH_KERNEL_SIZE);
        assert_eq!(dilated[[6, 6]], 255);
        assert_eq!(dilated[[5, 5]], 0);
    }

    #[test]
    fn test_mask_and() {
        let mut a = mask_with(&[(0, 0), (0, 1)], 2, 2);
        let b = mask_with(&[(0, 1), (1, 1)], 2, 2);
        mask_and(&mut a, &b);
        assert_eq!(count_nonzero(&a), 1);
        assert_eq!(a[[0, 1]], 255);
    }

    #[test]
    fn test_gray_conversion_weights() {
        let mut frame = BgrImage::zeros((1, 1, 3));
        frame[[0, 0, 2]] = 255;
        assert_eq!(bgr_to_gray(&frame)[[0, 0]], 76); // 0.299 * 255
    }
}
