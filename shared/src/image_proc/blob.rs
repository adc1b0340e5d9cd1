//! Blob extraction on binary masks.
//!
//! Connected components use two-pass labeling with union-find (4-connected;
//! diagonal neighbors are separate blobs). The biggest blob stands in for
//! the "biggest contour" of the classic pipeline: its pixel count is the
//! contour area, and its boundary pixels are the contour points.

use ndarray::Array2;

use crate::image_proc::{GrayImage, Rect};

/// A connected region found in a binary mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Blob area in pixels.
    pub area: f64,
    /// Tight bounding rectangle.
    pub bounds: Rect,
}

/// Unit-weight image moments of a binary mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// Mass center as integer pixel coordinates (x, y), truncated.
    ///
    /// Returns (0, 0) for an empty mask.
    pub fn mass_center(&self) -> (i32, i32) {
        if self.m00 == 0.0 {
            return (0, 0);
        }
        ((self.m10 / self.m00) as i32, (self.m01 / self.m00) as i32)
    }
}

/// Find the root label in the union-find parent table, compressing paths
/// along the way.
fn find_root(parents: &mut [usize], label: usize) -> usize {
    let mut current = label;
    while current != parents[current] {
        parents[current] = parents[parents[current]];
        current = parents[current];
    }
    current
}

/// Union two labels; the smaller root becomes the parent.
fn union_labels(parents: &mut [usize], a: usize, b: usize) -> usize {
    let root_a = find_root(parents, a);
    let root_b = find_root(parents, b);
    if root_a == root_b {
        return root_a;
    }
    if root_a < root_b {
        parents[root_b] = root_a;
        root_a
    } else {
        parents[root_a] = root_b;
        root_b
    }
}

/// Find the biggest blob and rewrite the mask in place so that only its
/// pixels remain set.
///
/// Returns `None` (leaving an all-zero mask) when the mask is empty.
pub fn biggest_blob_into(mask: &mut GrayImage) -> Option<Blob> {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<usize>::zeros((rows, cols));
    let mut parents: Vec<usize> = vec![0];

    // First pass: provisional labels, recording equivalences.
    for row in 0..rows {
        for col in 0..cols {
            if mask[[row, col]] == 0 {
                continue;
            }
            let left = if col > 0 { labels[[row, col - 1]] } else { 0 };
            let up = if row > 0 { labels[[row - 1, col]] } else { 0 };

            labels[[row, col]] = match (left, up) {
                (0, 0) => {
                    let label = parents.len();
                    parents.push(label);
                    label
                }
                (l, 0) => l,
                (0, u) => u,
                (l, u) => union_labels(&mut parents, l, u),
            };
        }
    }

    if parents.len() == 1 {
        return None;
    }

    // Second pass: per-root area and bounds.
    let mut areas = vec![0usize; parents.len()];
    let mut min_row = vec![usize::MAX; parents.len()];
    let mut min_col = vec![usize::MAX; parents.len()];
    let mut max_row = vec![0usize; parents.len()];
    let mut max_col = vec![0usize; parents.len()];

    for row in 0..rows {
        for col in 0..cols {
            let label = labels[[row, col]];
            if label == 0 {
                continue;
            }
            let root = find_root(&mut parents, label);
            labels[[row, col]] = root;
            areas[root] += 1;
            min_row[root] = min_row[root].min(row);
            min_col[root] = min_col[root].min(col);
            max_row[root] = max_row[root].max(row);
            max_col[root] = max_col[root].max(col);
        }
    }

    let best = (1..parents.len())
        .filter(|&root| areas[root] > 0)
        .max_by_key(|&root| areas[root])?;

    for (m, &label) in mask.iter_mut().zip(labels.iter()) {
        *m = if label == best { 255 } else { 0 };
    }

    Some(Blob {
        area: areas[best] as f64,
        bounds: Rect::new(
            min_col[best] as i32,
            min_row[best] as i32,
            (max_col[best] - min_col[best] + 1) as i32,
            (max_row[best] - min_row[best] + 1) as i32,
        ),
    })
}

/// Unit-weight moments over the nonzero pixels of a mask.
pub fn moments(mask: &GrayImage) -> Moments {
    let mut mu = Moments::default();
    for ((row, col), &v) in mask.indexed_iter() {
        if v != 0 {
            mu.m00 += 1.0;
            mu.m10 += col as f64;
            mu.m01 += row as f64;
        }
    }
    mu
}

/// Boundary pixels of a mask in raster order, as (x, y) coordinates.
///
/// A blob pixel is a boundary pixel when any 4-neighbor is unset or lies
/// outside the image.
pub fn boundary_points(mask: &GrayImage) -> Vec<(i32, i32)> {
    let (rows, cols) = mask.dim();
    let mut points = Vec::new();

    for row in 0..rows {
        for col in 0..cols {
            if mask[[row, col]] == 0 {
                continue;
            }
            let edge = row == 0
                || col == 0
                || row + 1 == rows
                || col + 1 == cols
                || mask[[row - 1, col]] == 0
                || mask[[row + 1, col]] == 0
                || mask[[row, col - 1]] == 0
                || mask[[row, col + 1]] == 0;
            if edge {
                points.push((col as i32, row as i32));
            }
        }
    }
    points
}

/// Estimate a circle from contour points: find the most distant point pair
/// (sampled with a stride so that no more than ~20 points are compared),
/// take its midpoint as the center and half its distance as the radius.
///
/// Degenerate inputs do not panic: an empty slice yields (0, 0, 0) and a
/// single point yields that point with radius 0.
pub fn estimate_circle(points: &[(i32, i32)]) -> (f64, f64, f64) {
    let Some(&first) = points.first() else {
        return (0.0, 0.0, 0.0);
    };

    let step = (points.len() / 20).max(1);
    let mut best_d = 0.0f64;
    let mut best = (first, first);

    let mut i = 0;
    while i < points.len() {
        let p1 = points[i];
        let mut j = i + 1;
        while j < points.len() {
            let p2 = points[j];
            let dx = (p1.0 - p2.0) as f64;
            let dy = (p1.1 - p2.1) as f64;
            let d = dx * dx + dy * dy;
            if d > best_d {
                best_d = d;
                best = (p1, p2);
            }
            j += step;
        }
        i += step;
    }

    let x = 0.5 * (best.0 .0 + best.1 .0) as f64;
    let y = 0.5 * (best.0 .1 + best.1 .1) as f64;
    (x, y, best_d.sqrt() / 2.0)
}
