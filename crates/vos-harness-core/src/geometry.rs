//! Mask geometry: bounding boxes, seed points and connected components.

use std::collections::VecDeque;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::mask::Mask;
use crate::models::Point;

/// Axis-aligned box in pixel coordinates, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// COCO `[x, y, width, height]` form.
    pub fn to_xywh(&self) -> [f32; 4] {
        [self.x0, self.y0, self.width(), self.height()]
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Tight box around the set pixels, or `None` for an empty mask.
pub fn mask_to_bbox(mask: &Mask) -> Option<BBox> {
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for ((row, col), &px) in mask.indexed_iter() {
        if !px {
            continue;
        }
        bounds = Some(match bounds {
            None => (col, row, col, row),
            Some((x0, y0, x1, y1)) => (x0.min(col), y0.min(row), x1.max(col), y1.max(row)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| BBox {
        x0: x0 as f32,
        y0: y0 as f32,
        x1: (x1 + 1) as f32,
        y1: (y1 + 1) as f32,
    })
}

/// Pick `k` seed points inside the mask.
///
/// The first point is the set pixel nearest the mask centroid, which stays
/// inside the object even for non-convex shapes. Remaining points are spread
/// evenly over the set pixels in raster order. Returns fewer than `k` points
/// when the mask has fewer set pixels, and none for an empty mask.
pub fn mask_to_points(mask: &Mask, k: usize) -> Vec<Point> {
    let pixels: Vec<(usize, usize)> = mask
        .indexed_iter()
        .filter(|&(_, &px)| px)
        .map(|(idx, _)| idx)
        .collect();
    if pixels.is_empty() || k == 0 {
        return Vec::new();
    }

    let n = pixels.len() as f64;
    let cy = pixels.iter().map(|(r, _)| *r as f64).sum::<f64>() / n;
    let cx = pixels.iter().map(|(_, c)| *c as f64).sum::<f64>() / n;

    let nearest = pixels
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = (a.0 as f64 - cy).powi(2) + (a.1 as f64 - cx).powi(2);
            let db = (b.0 as f64 - cy).powi(2) + (b.1 as f64 - cx).powi(2);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(pixels[0]);

    let mut chosen = vec![nearest];
    let extra = (k - 1).min(pixels.len() - 1);
    for i in 0..extra {
        let pick = pixels[(i * 2 + 1) * pixels.len() / (extra * 2)];
        if !chosen.contains(&pick) {
            chosen.push(pick);
        }
    }

    chosen
        .into_iter()
        .map(|(row, col)| Point {
            x: col as f32,
            y: row as f32,
        })
        .collect()
}

/// Split a mask into its 8-connected components.
///
/// Components are ordered by their first pixel in raster order. Each
/// returned mask has the same shape as the input.
pub fn mask_to_instances(mask: &Mask) -> Vec<Mask> {
    let (h, w) = mask.dim();
    let mut visited = Array2::from_elem((h, w), false);
    let mut instances = Vec::new();

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] || visited[[row, col]] {
                continue;
            }
            let mut component = Array2::from_elem((h, w), false);
            let mut queue = VecDeque::from([(row, col)]);
            visited[[row, col]] = true;

            while let Some((r, c)) = queue.pop_front() {
                component[[r, c]] = true;
                for dr in -1i64..=1 {
                    for dc in -1i64..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let nr = r as i64 + dr;
                        let nc = c as i64 + dc;
                        if nr < 0 || nc < 0 || nr >= h as i64 || nc >= w as i64 {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        if mask[[nr, nc]] && !visited[[nr, nc]] {
                            visited[[nr, nc]] = true;
                            queue.push_back((nr, nc));
                        }
                    }
                }
            }
            instances.push(component);
        }
    }

    instances
}
