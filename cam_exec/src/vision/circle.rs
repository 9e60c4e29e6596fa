//! Gradient Hough circle detection
//!
//! Edge pixels are found with a Canny detector. Each edge pixel votes for every centre lying along
//! its gradient direction within the radius range, in an accumulator `dp` times coarser than the
//! image. Accumulator peaks above the vote threshold become candidate centres, strongest first,
//! discarding any closer than `min_dist` to a centre already accepted. The radius of each centre is
//! the distance shared by the most edge pixels.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::GrayImage;
use log::debug;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HoughParams {
    /// Standard deviation of the Gaussian blur applied before detection
    pub blur_sigma: f32,

    /// Ratio of the image resolution to the accumulator resolution
    pub dp: f64,

    /// Minimum distance between detected centres.
    ///
    /// Units: pixels
    pub min_dist: f64,

    /// Upper Canny threshold, the lower one being half of it
    pub canny_threshold: f64,

    /// Votes a centre needs to be accepted, and edge pixels a radius needs
    pub acc_threshold: u32,

    /// Units: pixels
    pub min_radius: u32,

    /// Units: pixels
    pub max_radius: u32,
}

/// A detected circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    /// Centre in pixels
    pub x: f64,
    pub y: f64,

    /// Radius in pixels
    pub r: f64,

    /// Accumulator votes for the centre
    pub votes: u32,
}

/// Image gradients and the edge map derived from them.
struct Edges {
    width: usize,
    height: usize,
    dx: Vec<f64>,
    dy: Vec<f64>,
    edge: Vec<bool>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            blur_sigma: 2.0,
            dp: 1.2,
            min_dist: 100.0,
            canny_threshold: 100.0,
            acc_threshold: 30,
            min_radius: 10,
            max_radius: 210,
        }
    }
}

impl Circle {
    /// Centre and radius rounded to whole pixels.
    pub fn rounded(&self) -> (i64, i64, i64) {
        (self.x.round() as i64, self.y.round() as i64, self.r.round() as i64)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Detect circles in a preprocessed grayscale image.
///
/// Circles are returned largest first.
pub fn detect_circles(image: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    let edges = canny(image, params.canny_threshold / 2.0, params.canny_threshold);

    let dp = params.dp.max(1.0);
    let acc_w = (edges.width as f64 / dp).ceil() as usize + 2;
    let acc_h = (edges.height as f64 / dp).ceil() as usize + 2;
    let mut acc = vec![0u32; acc_w * acc_h];

    let min_r = params.min_radius.max(1) as f64;
    let max_r = params.max_radius.max(params.min_radius.max(1)) as f64;

    let mut edge_points = Vec::new();

    // ---- VOTE ----

    for y in 0..edges.height {
        for x in 0..edges.width {
            let i = y * edges.width + x;
            if !edges.edge[i] {
                continue;
            }
            edge_points.push((x as f64, y as f64));

            let (gx, gy) = (edges.dx[i], edges.dy[i]);
            let mag = (gx * gx + gy * gy).sqrt();
            if mag == 0.0 {
                continue;
            }
            let (ux, uy) = (gx / mag, gy / mag);

            for sign in &[1.0, -1.0] {
                // Step through the radius range one accumulator cell at a time
                let mut r = min_r;
                while r <= max_r {
                    let cx = (x as f64 + sign * ux * r) / dp;
                    let cy = (y as f64 + sign * uy * r) / dp;
                    if cx < 0.0 || cy < 0.0 {
                        break;
                    }
                    let (cx, cy) = (cx as usize + 1, cy as usize + 1);
                    if cx >= acc_w - 1 || cy >= acc_h - 1 {
                        break;
                    }
                    acc[cy * acc_w + cx] += 1;
                    r += dp;
                }
            }
        }
    }

    // ---- CENTRES ----

    let mut centres = Vec::new();
    for cy in 1..acc_h - 1 {
        for cx in 1..acc_w - 1 {
            let i = cy * acc_w + cx;
            let v = acc[i];
            if v > params.acc_threshold
                && v > acc[i - 1]
                && v >= acc[i + 1]
                && v > acc[i - acc_w]
                && v >= acc[i + acc_w]
            {
                centres.push((cx, cy, v));
            }
        }
    }

    centres.sort_by(|a, b| b.2.cmp(&a.2));

    debug!(
        "{} edge pixels, {} candidate centres",
        edge_points.len(),
        centres.len()
    );

    // ---- RADII ----

    let mut circles: Vec<Circle> = Vec::new();
    let bins = (max_r - min_r).ceil() as usize + 1;

    for (cx, cy, votes) in centres {
        let x = (cx as f64 - 1.0 + 0.5) * dp;
        let y = (cy as f64 - 1.0 + 0.5) * dp;

        if circles
            .iter()
            .any(|c| ((c.x - x).powi(2) + (c.y - y).powi(2)).sqrt() < params.min_dist)
        {
            continue;
        }

        let mut hist = vec![0u32; bins];
        for (px, py) in &edge_points {
            let d = ((px - x).powi(2) + (py - y).powi(2)).sqrt();
            if d >= min_r && d <= max_r {
                hist[(d - min_r).round() as usize] += 1;
            }
        }

        // Sum over neighbouring bins so a ring split across two bins keeps its support
        let mut best = (0, 0u32);
        for b in 0..bins {
            let support = hist[b] + if b + 1 < bins { hist[b + 1] } else { 0 };
            if support > best.1 {
                best = (b, support);
            }
        }

        if best.1 < params.acc_threshold {
            continue;
        }

        let (b, _) = best;
        let next = if b + 1 < bins { hist[b + 1] } else { 0 };
        let total = hist[b] + next;
        let r = min_r + b as f64 + next as f64 / total.max(1) as f64;

        circles.push(Circle { x, y, r, votes });
    }

    circles.sort_by(|a, b| b.r.partial_cmp(&a.r).unwrap_or(std::cmp::Ordering::Equal));

    circles
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Canny edge detector on 3x3 Sobel gradients with an L1 magnitude.
fn canny(image: &GrayImage, low: f64, high: f64) -> Edges {
    let (w, h) = image.dimensions();
    let (width, height) = (w as usize, h as usize);
    let px = |x: usize, y: usize| image.get_pixel(x as u32, y as u32)[0] as f64;

    let mut dx = vec![0.0; width * height];
    let mut dy = vec![0.0; width * height];
    let mut mag = vec![0.0; width * height];

    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));

            let i = y * width + x;
            dx[i] = gx;
            dy[i] = gy;
            mag[i] = gx.abs() + gy.abs();
        }
    }

    // Non-maximum suppression along the gradient direction, quantised to 45 degrees
    let mut strong = vec![false; width * height];
    let mut weak = vec![false; width * height];

    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let i = y * width + x;
            let m = mag[i];
            if m <= low {
                continue;
            }

            let angle = dy[i].atan2(dx[i]).to_degrees().rem_euclid(180.0);
            let (a, b) = if !(22.5..157.5).contains(&angle) {
                (i - 1, i + 1)
            } else if angle < 67.5 {
                (i - width - 1, i + width + 1)
            } else if angle < 112.5 {
                (i - width, i + width)
            } else {
                (i - width + 1, i + width - 1)
            };

            if m > mag[a] && m >= mag[b] {
                if m > high {
                    strong[i] = true;
                } else {
                    weak[i] = true;
                }
            }
        }
    }

    // Hysteresis, keeping weak edges connected to strong ones
    let mut edge = strong.clone();
    let mut stack: Vec<usize> = (0..width * height).filter(|i| strong[*i]).collect();

    while let Some(i) = stack.pop() {
        let (x, y) = (i % width, i / width);
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let n = ny * width + nx;
                if weak[n] && !edge[n] {
                    edge[n] = true;
                    stack.push(n);
                }
            }
        }
    }

    Edges { width, height, dx, dy, edge }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vision::preprocess;
    use image::{DynamicImage, Luma};

    /// Dark image with filled bright discs.
    fn discs(w: u32, h: u32, discs: &[(f64, f64, f64)]) -> DynamicImage {
        let img = GrayImage::from_fn(w, h, |x, y| {
            let lit = discs.iter().any(|(cx, cy, r)| {
                (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2) <= r * r
            });
            Luma([if lit { 220 } else { 20 }])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_single_disc() {
        let params = HoughParams {
            max_radius: 150,
            ..Default::default()
        };
        let img = preprocess(&discs(400, 400, &[(200.0, 190.0, 80.0)]), params.blur_sigma);

        let circles = detect_circles(&img, &params);
        assert!(!circles.is_empty());

        let c = circles[0];
        assert!((c.x - 200.0).abs() < 3.0, "x = {}", c.x);
        assert!((c.y - 190.0).abs() < 3.0, "y = {}", c.y);
        assert!((c.r - 80.0).abs() < 3.0, "r = {}", c.r);
    }

    #[test]
    fn test_sorted_by_radius() {
        let params = HoughParams {
            max_radius: 100,
            ..Default::default()
        };
        let img = preprocess(
            &discs(600, 300, &[(150.0, 150.0, 40.0), (420.0, 150.0, 90.0)]),
            params.blur_sigma,
        );

        let circles = detect_circles(&img, &params);
        assert!(circles.len() >= 2);
        assert!((circles[0].x - 420.0).abs() < 3.0);
        assert!((circles[0].r - 90.0).abs() < 3.0);
        assert!(circles.windows(2).all(|w| w[0].r >= w[1].r));
    }

    #[test]
    fn test_blank_image() {
        let img = preprocess(&discs(200, 200, &[]), 2.0);
        assert!(detect_circles(&img, &HoughParams::default()).is_empty());
    }
}
