//! Per-frame sphere localization.
//!
//! Each controller is searched inside its region of interest; when the
//! sphere is not found the ROI widens level by level, and once the coarsest
//! level fails the search falls back to sweeping the four frame quadrants,
//! one per frame.

use log::{debug, info};
use ndarray::{s, Array3};
use shared::image_proc::{
    bgr_region_to_hsv, bgr_scalar_to_hsv, biggest_blob_into, boundary_points, count_nonzero,
    estimate_circle, in_range, masked_mean_bgr, moments, scalar_add, scalar_scale, scalar_sub,
    Rect, Scalar4,
};
use shared::{BgrImage, GrayImage};

use crate::config::TrackerConfig;
use crate::distance::EPS;
use crate::record::ControllerRecord;

/// One level of the ROI scratch pyramid: its size plus reusable HSV and
/// mask work buffers.
pub(crate) struct RoiLevel {
    pub width: usize,
    pub height: usize,
    hsv: Array3<u8>,
    mask: GrayImage,
}

/// The ROI work buffers, largest level first.
///
/// Scratch owned by the tracker and reused across controllers and frames;
/// nothing outside a single `update_controller` call may hold on to the
/// buffers.
pub(crate) struct RoiPyramid {
    levels: Vec<RoiLevel>,
}

impl RoiPyramid {
    /// Level 0 is half the frame; every further level is square with 0.7x
    /// the previous minimum side.
    pub fn new(frame_width: usize, frame_height: usize, levels: usize) -> Self {
        let mut width = frame_width / 2;
        let mut height = frame_height / 2;

        let mut out = Vec::with_capacity(levels);
        for _ in 0..levels {
            out.push(RoiLevel {
                width,
                height,
                hsv: Array3::zeros((height, width, 3)),
                mask: GrayImage::zeros((height, width)),
            });
            let side = (width.min(height) as f32 * 0.7) as usize;
            width = side;
            height = side;
        }
        Self { levels: out }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn size(&self, level: usize) -> (usize, usize) {
        (self.levels[level].width, self.levels[level].height)
    }

    fn level_mut(&mut self, level: usize) -> &mut RoiLevel {
        &mut self.levels[level]
    }
}

/// Clamp-and-set the ROI origin so the rectangle stays inside the frame.
pub(crate) fn set_roi(
    record: &mut ControllerRecord,
    x: i32,
    y: i32,
    roi_w: usize,
    roi_h: usize,
    frame_w: i32,
    frame_h: i32,
) {
    record.roi_x = x;
    record.roi_y = y;

    if record.roi_x < 0 {
        record.roi_x = 0;
    }
    if record.roi_y < 0 {
        record.roi_y = 0;
    }
    if record.roi_x + roi_w as i32 > frame_w {
        record.roi_x = frame_w - roi_w as i32;
    }
    if record.roi_y + roi_h as i32 > frame_h {
        record.roi_y = frame_h - roi_h as i32;
    }
    // an ROI larger than the frame pins to the origin
    if record.roi_x < 0 {
        record.roi_x = 0;
    }
    if record.roi_y < 0 {
        record.roi_y = 0;
    }
}

/// Weighted HSV distance between the first and the current color estimate.
/// Hue differences count double compared to saturation and value.
pub(crate) fn hsv_color_diff(first: Scalar4, current: Scalar4) -> f64 {
    (first[0] - current[0]).abs()
        + (first[1] - current[1]).abs() * 0.5
        + (first[2] - current[2]).abs() * 0.5
}

fn point_dist(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = (a.0 - b.0) as f64;
    let dy = (a.1 - b.1) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Look for the biggest matching blob in the current ROI and propose a new
/// ROI origin that would center it. Used to keep fast-moving spheres from
/// escaping the ROI between frames.
fn propose_roi_origin(
    frame: &BgrImage,
    record: &ControllerRecord,
    pyramid: &mut RoiPyramid,
    lo: Scalar4,
    hi: Scalar4,
) -> Option<(i32, i32)> {
    let level = pyramid.level_mut(record.roi_level);
    let (roi_w, roi_h) = (level.width, level.height);
    let rect = Rect::new(record.roi_x, record.roi_y, roi_w as i32, roi_h as i32);

    bgr_region_to_hsv(frame, rect, &mut level.hsv);
    in_range(&level.hsv, lo, hi, &mut level.mask);
    biggest_blob_into(&mut level.mask)?;

    let (mx, my) = moments(&level.mask).mass_center();
    Some((
        mx + record.roi_x - roi_w as i32 / 2,
        my + record.roi_y - roi_h as i32 / 2,
    ))
}

/// Run one tracking step for one controller against the current frame.
///
/// Returns whether the sphere was found; the record's position, radius,
/// quality scores and ROI are updated in place.
pub(crate) fn update_controller(
    frame: &BgrImage,
    record: &mut ControllerRecord,
    pyramid: &mut RoiPyramid,
    config: &TrackerConfig,
    fps: f64,
    now_ms: u64,
) -> bool {
    let (frame_rows, frame_cols, _) = frame.dim();
    let (frame_w, frame_h) = (frame_cols as i32, frame_rows as i32);
    let sizes: Vec<(usize, usize)> = (0..pyramid.len()).map(|i| pyramid.size(i)).collect();

    let filter_lo = scalar_sub(record.e_hsv, config.hsv_band);
    let filter_hi = scalar_add(record.e_hsv, config.hsv_band);

    let mut sphere_found;
    loop {
        let (roi_w, roi_h) = sizes[record.roi_level];

        // Recenter the ROI on the blob, but only when the frame rate leaves
        // headroom for the extra pass.
        if fps > config.roi_adjust_fps_threshold {
            if let Some((nx, ny)) = propose_roi_origin(frame, record, pyramid, filter_lo, filter_hi)
            {
                set_roi(record, nx, ny, roi_w, roi_h, frame_w, frame_h);
            }
        }

        sphere_found = false;
        let mut color_reverted = false;

        let level = pyramid.level_mut(record.roi_level);
        let rect = Rect::new(record.roi_x, record.roi_y, roi_w as i32, roi_h as i32);
        bgr_region_to_hsv(frame, rect, &mut level.hsv);
        in_range(&level.hsv, filter_lo, filter_hi, &mut level.mask);

        if let Some(blob) = biggest_blob_into(&mut level.mask) {
            // the mask now holds only the biggest blob
            let (px, py) = moments(&level.mask).mass_center();
            let old_mass = (record.mx, record.my);
            record.mx = px + record.roi_x;
            record.my = py + record.roi_y;
            let new_mass = (record.mx, record.my);

            let old_radius = record.r;
            let contour = boundary_points(&level.mask);
            let (cx, cy, radius) = estimate_circle(&contour);
            record.r = radius;

            if config.adaptive_z {
                // a large radius jump passes through, a small one smooths
                let r_diff = (record.rs - record.r).abs();
                let rf = (r_diff / 4.0 + 0.15).min(1.0);
                record.rs = record.rs * (1.0 - rf) + record.r * rf;
                record.r = record.rs;
            }

            // The x/y smoothing keys off adaptive_z as shipped; see the
            // TrackerConfig::adaptive_z docs.
            if config.adaptive_z {
                let diff = point_dist(old_mass, new_mass);
                let f = (diff / 7.0 + 0.15).min(1.0);
                record.x = record.x * (1.0 - f) + (cx + record.roi_x as f64) * f;
                record.y = record.y * (1.0 - f) + (cy + record.roi_y as f64) * f;
            } else {
                record.x = cx + record.roi_x as f64;
                record.y = cy + record.roi_y as f64;
            }

            let pixels_in_blob = count_nonzero(&level.mask);
            let circle_pixels = record.r * record.r * std::f64::consts::PI;
            record.q1 = pixels_in_blob as f64 / circle_pixels;
            record.q2 = f64::MAX;
            record.q3 = record.r;

            // pixel-ratio and minimum size always apply
            sphere_found = record.q1 > config.quality_t1 && record.q3 > config.quality_t3;

            // with a near-perfect pixel ratio the mass center is the better
            // position estimate
            if record.q1 > config.snap_to_mass_q1 {
                record.x = record.mx as f64;
                record.y = record.my as f64;
            }

            // radius stability is only meaningful once the sphere has been
            // seen and no quadrant sweep is in progress
            if old_radius > 0.0 && record.search_quadrant == 0 {
                record.q2 = (old_radius - record.r).abs() / (old_radius + EPS);
                sphere_found = sphere_found && record.q2 < config.quality_t2;
            }

            if sphere_found {
                let adaptation_due = config.color_update_rate_s > 0.0
                    && now_ms.saturating_sub(record.last_color_update_ms) as f64
                        > config.color_update_rate_s * 1000.0;
                if adaptation_due
                    && record.q1 > config.color_update_q1
                    && record.q2 < config.color_update_q2
                    && record.q3 > config.color_update_q3
                {
                    let (x0, y0) = (record.roi_x as usize, record.roi_y as usize);
                    let roi_view = frame.slice(s![y0..y0 + roi_h, x0..x0 + roi_w, ..]);
                    let observed = masked_mean_bgr(&roi_view, &level.mask);

                    record.e_bgr = scalar_scale(scalar_add(record.e_bgr, observed), 0.5);
                    record.e_hsv = bgr_scalar_to_hsv(record.e_bgr);
                    record.last_color_update_ms = now_ms;

                    let drift = hsv_color_diff(record.e_first_hsv, record.e_hsv);
                    if drift > config.color_adaption_max_diff {
                        info!(
                            "controller {} color drifted too far (diff {drift:.1}), reverting",
                            record.id.0
                        );
                        record.e_bgr = record.e_first_bgr;
                        record.e_hsv = record.e_first_hsv;
                        sphere_found = false;
                        color_reverted = true;
                    }
                }

                // future ROI: three times the blob's bounding square, at the
                // smallest level that still contains it
                let grown = blob.bounds.width.max(blob.bounds.height) * 3;
                for (i, &(w, h)) in sizes.iter().enumerate() {
                    if grown > w as i32 && grown > h as i32 {
                        break;
                    }
                    record.roi_level = i;
                }
                let (w, h) = sizes[record.roi_level];
                let nx = (record.x - (w / 2) as f64) as i32;
                let ny = (record.y - (h / 2) as f64) as i32;
                set_roi(record, nx, ny, w, h, frame_w, frame_h);
            }
        }

        if sphere_found {
            record.search_quadrant = 0;
            break;
        } else if color_reverted {
            // the color estimate was reverted; treat this frame as lost and
            // resume with the original color next frame
            break;
        } else if record.roi_level > 0 {
            // widen: move to the next larger level around the same center
            record.roi_x += roi_w as i32 / 2;
            record.roi_y += roi_h as i32 / 2;
            record.roi_level -= 1;

            let (w, h) = sizes[record.roi_level];
            let nx = record.roi_x - w as i32 / 2;
            let ny = record.roi_y - h as i32 / 2;
            set_roi(record, nx, ny, w, h, frame_w, frame_h);
        } else {
            // already at the coarsest level: try one frame quadrant, the
            // next one on the next failing frame
            let (rx, ry) = match record.search_quadrant {
                0 => (0, 0),
                1 => (frame_w / 2, 0),
                2 => (frame_w / 2, frame_h / 2),
                _ => (0, frame_h / 2),
            };
            debug!(
                "controller {} lost, searching quadrant {}",
                record.id.0, record.search_quadrant
            );
            record.search_quadrant = (record.search_quadrant + 1) % 4;
            record.roi_level = 0;
            let (w, h) = sizes[0];
            set_roi(record, rx, ry, w, h, frame_w, frame_h);
            break;
        }
    }

    record.is_tracked = sphere_found;
    sphere_found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ControllerId;

    #[test]
    fn test_pyramid_geometry() {
        let pyramid = RoiPyramid::new(640, 480, 4);
        assert_eq!(pyramid.size(0), (320, 240));
        // deeper levels are square, each 0.7x the previous minimum side
        assert_eq!(pyramid.size(1), (167, 167));
        assert_eq!(pyramid.size(2), (116, 116));
        assert_eq!(pyramid.size(3), (81, 81));
    }

    #[test]
    fn test_set_roi_clamps_to_frame() {
        let mut record = ControllerRecord::new(ControllerId(1), (255, 0, 255));

        set_roi(&mut record, -10, -20, 100, 100, 640, 480);
        assert_eq!((record.roi_x, record.roi_y), (0, 0));

        set_roi(&mut record, 600, 450, 100, 100, 640, 480);
        assert_eq!((record.roi_x, record.roi_y), (540, 380));

        // an oversized ROI pins to the origin instead of going negative
        set_roi(&mut record, 5, 5, 800, 600, 640, 480);
        assert_eq!((record.roi_x, record.roi_y), (0, 0));
    }

    #[test]
    fn test_hsv_diff_weights_hue_double() {
        let first = [100.0, 200.0, 200.0, 0.0];
        let drifted = [140.0, 170.0, 170.0, 0.0];
        assert_eq!(hsv_color_diff(first, drifted), 70.0);
        assert_eq!(hsv_color_diff(first, first), 0.0);
    }
}
