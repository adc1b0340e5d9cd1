//! Blink calibration: learn the sphere's color signature under the current
//! lighting.
//!
//! The sphere is blinked several times; the difference between the lit and
//! the dark frame isolates it spatially, and the intersection of all blink
//! masks pins down the one region that reacted every time. The average
//! color inside that region becomes the color signature, cross-checked by
//! re-detecting the sphere in every lit frame through an HSV filter around
//! the estimate.

use log::warn;
use shared::camera_interface::CameraInterface;
use shared::image_proc::{
    abs_diff, bgr_region_to_hsv, bgr_scalar_to_hsv, bgr_to_gray, biggest_blob_into, count_nonzero,
    dilate, erode, in_range, mask_and, masked_mean_bgr, scalar_add, scalar_sub, threshold_binary,
    Rect, Scalar4,
};
use shared::{BgrImage, GrayImage};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::led::LedInterface;
use crate::record::ControllerId;
use crate::trace::CalibrationTrace;

/// Color signature produced by a successful calibration.
pub(crate) struct CalibrationResult {
    pub bgr: Scalar4,
    pub hsv: Scalar4,
}

/// Poll frames for the given delay (10 ms granularity) and return the last
/// one.
pub(crate) fn wait_for_frame<C: CameraInterface, K: Clock>(
    camera: &mut C,
    clock: &K,
    delay_ms: u64,
) -> Result<Arc<BgrImage>, TrackerError> {
    let step = 10;
    let mut frame = None;
    let mut elapsed = 0;
    while elapsed < delay_ms {
        clock.sleep_ms(step);
        frame = Some(camera.query_frame()?);
        elapsed += step;
    }
    match frame {
        Some(frame) => Ok(frame),
        None => Ok(camera.query_frame()?),
    }
}

/// Light the sphere, grab a frame, switch it off, grab another, and return
/// the lit frame together with the grayscale absolute difference.
fn capture_blink_diff<C: CameraInterface, L: LedInterface, K: Clock>(
    camera: &mut C,
    leds: &mut L,
    clock: &K,
    config: &TrackerConfig,
    id: ControllerId,
    dimmed: (u8, u8, u8),
) -> Result<(BgrImage, GrayImage), TrackerError> {
    leds.set_leds(id, dimmed.0, dimmed.1, dimmed.2);
    leds.update_leds(id);
    let on_frame = wait_for_frame(camera, clock, config.blink_delay_ms)?;
    let on_image = (*on_frame).clone();

    leds.set_leds(id, 0, 0, 0);
    leds.update_leds(id);
    let off_frame = wait_for_frame(camera, clock, config.blink_delay_ms)?;

    let grey_on = bgr_to_gray(&on_image);
    let grey_off = bgr_to_gray(&off_frame);
    Ok((on_image, abs_diff(&grey_off, &grey_on)))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    let avg = mean(values);
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64
}

/// Run the blink calibration for one controller.
///
/// On success the palette entry is still untouched; the caller decides
/// whether to commit the color.
pub(crate) fn calibrate_sphere<C: CameraInterface, L: LedInterface, K: Clock>(
    camera: &mut C,
    leds: &mut L,
    clock: &K,
    config: &TrackerConfig,
    trace: Option<&CalibrationTrace>,
    id: ControllerId,
    rgb: (u8, u8, u8),
) -> Result<CalibrationResult, TrackerError> {
    let dimmed = crate::dim_color(rgb, config.dimming_factor);
    let assigned_bgr = [rgb.2 as f64, rgb.1 as f64, rgb.0 as f64, 0.0];
    if let Some(t) = trace {
        t.put_value("assigned_color", format!("{rgb:?}"));
    }

    let mut images: Vec<BgrImage> = Vec::with_capacity(config.blinks);
    let mut diffs: Vec<GrayImage> = Vec::with_capacity(config.blinks);

    for i in 0..config.blinks {
        let (on_image, raw_diff) = capture_blink_diff(camera, leds, clock, config, id, dimmed)?;
        if let Some(t) = trace {
            t.image_at(&on_image, i, "originals");
            t.mask_at(&raw_diff, i, "rawdiffs");
        }

        // threshold away sensor noise, then open to drop speckles
        let mut diff = raw_diff;
        threshold_binary(&mut diff, config.calibration_diff_threshold);
        if let Some(t) = trace {
            t.mask_at(&diff, i, "threshdiffs");
        }

        let diff = dilate(&erode(&diff));
        if let Some(t) = trace {
            t.mask_at(&diff, i, "erodediffs");
        }

        images.push(on_image);
        diffs.push(diff);
    }

    // intersect all blink masks; the sphere is the one region that reacted
    // to every blink
    let mut mask = diffs[0].clone();
    for diff in &diffs[1..] {
        mask_and(&mut mask, diff);
    }
    biggest_blob_into(&mut mask);
    if let Some(t) = trace {
        t.mask_at(&mask, 0, "finaldiff");
    }

    if count_nonzero(&mask) < config.calibration_min_size {
        warn!("calibration mask for controller {} is small", id.0);
        if let Some(t) = trace {
            t.log_entry(
                "WARNING",
                "the final mask may not be representative for color estimation",
            );
        }
    }

    // the color signature is the mean sphere color of the first lit frame
    let color = masked_mean_bgr(&images[0].view(), &mask);
    let hsv_assigned = bgr_scalar_to_hsv(assigned_bgr);
    let hsv_color = bgr_scalar_to_hsv(color);
    if let Some(t) = trace {
        t.put_value("estimated_color", format!("{color:?}"));
        t.put_value("estimated_hue", hsv_color[0]);
        t.put_value("assigned_hue", hsv_assigned[0]);
    }

    if (hsv_assigned[0] - hsv_color[0]).abs() > config.hsv_band[0] {
        warn!(
            "estimated hue {} far from assigned hue {}",
            hsv_color[0], hsv_assigned[0]
        );
        if let Some(t) = trace {
            t.log_entry(
                "WARNING",
                "the estimated color seems not to be similar to the color it should be",
            );
        }
    }

    // cross-check: the filter built from the estimate must find a
    // consistent blob in every lit frame
    let filter_lo = scalar_sub(hsv_color, config.hsv_band);
    let filter_hi = scalar_add(hsv_color, config.hsv_band);

    let (rows, cols, _) = images[0].dim();
    let full_rect = Rect::new(0, 0, cols as i32, rows as i32);
    let mut hsv_image = ndarray::Array3::<u8>::zeros((rows, cols, 3));

    let mut sizes = vec![0.0f64; config.blinks];
    let mut first_position: Option<(i32, i32)> = None;
    let mut valid_contours = 0;

    for (i, image) in images.iter().enumerate() {
        bgr_region_to_hsv(image, full_rect, &mut hsv_image);
        let mut filtered = GrayImage::zeros((rows, cols));
        in_range(&hsv_image, filter_lo, filter_hi, &mut filtered);
        let filtered = dilate(&erode(&filtered));
        if let Some(t) = trace {
            t.mask_at(&filtered, i, "filtered");
        }

        let mut blob_mask = filtered;
        let blob = biggest_blob_into(&mut blob_mask);

        let mut displacement = f64::MAX;
        if let Some(blob) = blob {
            let position = (blob.bounds.x, blob.bounds.y);
            if i == 0 {
                first_position = Some(position);
            }
            if let Some(first) = first_position {
                let dx = (first.0 - position.0) as f64;
                let dy = (first.1 - position.1) as f64;
                displacement = (dx * dx + dy * dy).sqrt();
            }
            sizes[i] = blob.area;
        }

        let verdict = if blob.is_none() {
            "no contour"
        } else if sizes[i] <= config.calibration_min_size as f64 {
            "too small"
        } else if displacement >= config.calibration_max_dist {
            "too far apart"
        } else {
            valid_contours += 1;
            "OK"
        };
        if let Some(t) = trace {
            t.put_value(&format!("contour_{i}"), verdict);
        }
    }

    if valid_contours < config.blinks {
        if let Some(t) = trace {
            t.log_entry("ERROR", "the sphere could not be found in all images");
        }
        return Err(TrackerError::SphereNotVisible {
            valid: valid_contours,
            total: config.blinks,
        });
    }

    let std_sizes = variance(&sizes).sqrt();
    let limit = mean(&sizes) / 100.0 * config.calibration_size_std_pct;
    if std_sizes >= limit {
        if let Some(t) = trace {
            t.log_entry("ERROR", "the spheres found differ too much in size");
        }
        return Err(TrackerError::BlobSizeVariance {
            std: std_sizes,
            limit,
        });
    }

    Ok(CalibrationResult {
        bgr: color,
        hsv: hsv_color,
    })
}
