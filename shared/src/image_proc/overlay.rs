//! Geometry drawing on BGR frames for debug output.

use crate::image_proc::{BgrImage, Rect};

/// Set one pixel if it lies inside the frame.
fn put_pixel(frame: &mut BgrImage, x: i32, y: i32, color: (u8, u8, u8)) {
    let (rows, cols, _) = frame.dim();
    if x < 0 || y < 0 || x >= cols as i32 || y >= rows as i32 {
        return;
    }
    frame[[y as usize, x as usize, 0]] = color.0;
    frame[[y as usize, x as usize, 1]] = color.1;
    frame[[y as usize, x as usize, 2]] = color.2;
}

/// Draw a rectangle outline with the given stroke thickness (grown
/// outward-and-inward around the nominal edge).
pub fn draw_rect(frame: &mut BgrImage, rect: Rect, color: (u8, u8, u8), thickness: i32) {
    let half = thickness / 2;
    for t in -half..=half {
        let x0 = rect.x - t;
        let y0 = rect.y - t;
        let x1 = rect.x + rect.width - 1 + t;
        let y1 = rect.y + rect.height - 1 + t;
        for x in x0..=x1 {
            put_pixel(frame, x, y0, color);
            put_pixel(frame, x, y1, color);
        }
        for y in y0..=y1 {
            put_pixel(frame, x0, y, color);
            put_pixel(frame, x1, y, color);
        }
    }
}

/// Draw a one-pixel circle outline.
pub fn draw_circle(frame: &mut BgrImage, cx: f64, cy: f64, radius: f64, color: (u8, u8, u8)) {
    if radius <= 0.0 {
        put_pixel(frame, cx as i32, cy as i32, color);
        return;
    }
    // Enough steps that adjacent samples are less than a pixel apart.
    let steps = (radius * 8.0).ceil().max(16.0) as usize;
    for i in 0..steps {
        let angle = (i as f64) * std::f64::consts::TAU / steps as f64;
        let x = (cx + radius * angle.cos()).round() as i32;
        let y = (cy + radius * angle.sin()).round() as i32;
        put_pixel(frame, x, y, color);
    }
}
