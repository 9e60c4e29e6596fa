//! Well intensity analysis
//!
//! The well is the largest detected circle, shrunk by a margin so its rim is left out. A plane
//! `I = a x + b y + c` is fitted by least squares to the lit pixels inside it, modelling uneven
//! illumination across the well. Two coverage fractions are then measured over the lit pixels:
//!
//! - gradient corrected: pixels whose intensity above the plane exceeds the first filter
//! - raw: pixels whose intensity exceeds the second filter

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{GrayImage, Luma};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::{Circle, VisionError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WellParams {
    /// Distance the well circle is shrunk by before analysis.
    ///
    /// Units: pixels
    pub margin_px: u32,

    /// Threshold on the gradient corrected intensity
    pub filter_corrected: u8,

    /// Threshold on the raw intensity
    pub filter_raw: u8,
}

/// Result of a well analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WellReport {
    /// The detected well
    pub circle: Circle,

    /// Radius of the analysed disc.
    ///
    /// Units: pixels
    pub analysed_radius: i64,

    /// Fitted intensity plane `[a, b, c]` with `I = a x + b y + c`
    pub plane: [f64; 3],

    /// Number of lit pixels inside the analysed disc
    pub lit_pixels: usize,

    /// Fraction of lit pixels above the first filter once the plane is removed
    pub coverage_corrected: f64,

    /// Fraction of lit pixels above the second filter
    pub coverage_raw: f64,
}

/// Intermediate images of a well analysis.
pub struct WellImages {
    /// Grayscale image with everything outside the analysed disc set to zero
    pub masked: GrayImage,

    /// The fitted plane over the lit pixels
    pub gradient: GrayImage,

    /// Masked image with the plane removed
    pub corrected: GrayImage,

    /// Pixels passing the first filter
    pub filter_corrected: GrayImage,

    /// Pixels passing the second filter
    pub filter_raw: GrayImage,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for WellParams {
    fn default() -> Self {
        Self {
            margin_px: 18,
            filter_corrected: 20,
            filter_raw: 100,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Analyse the well in a grayscale image, which must not be blurred.
pub fn analyse_well(
    gray: &GrayImage,
    circle: &Circle,
    params: &WellParams,
) -> Result<(WellReport, WellImages), VisionError> {
    let (w, h) = gray.dimensions();
    let (cx, cy, r) = circle.rounded();
    let r_reduced = (r - params.margin_px as i64).max(1);

    // ---- MASK ----

    let mut masked = GrayImage::new(w, h);
    let mut lit = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = (x as i64 - cx, y as i64 - cy);
            if dx * dx + dy * dy > r_reduced * r_reduced {
                continue;
            }

            let v = gray.get_pixel(x, y)[0];
            masked.put_pixel(x, y, Luma([v]));
            if v > 0 {
                lit.push((x, y, v));
            }
        }
    }

    if lit.is_empty() {
        return Err(VisionError::EmptyWell);
    }

    // ---- PLANE FIT ----

    // Normal equations of the least squares fit, in coordinates relative to the centre to keep
    // them well conditioned
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for (x, y, v) in &lit {
        let row = Vector3::new(*x as f64 - cx as f64, *y as f64 - cy as f64, 1.0);
        ata += row * row.transpose();
        atb += row * *v as f64;
    }

    let sol = ata.lu().solve(&atb).ok_or(VisionError::PlaneFit)?;
    let (a, b) = (sol[0], sol[1]);
    let c = sol[2] - a * cx as f64 - b * cy as f64;

    // ---- COVERAGE ----

    let mut gradient = GrayImage::new(w, h);
    let mut corrected = GrayImage::new(w, h);
    let mut filter_corrected = GrayImage::new(w, h);
    let mut filter_raw = GrayImage::new(w, h);

    let mut n_corrected = 0;
    let mut n_raw = 0;

    for (x, y, v) in &lit {
        let plane = a * *x as f64 + b * *y as f64 + c;
        let residual = (*v as f64 - plane).max(0.0).min(255.0) as u8;

        gradient.put_pixel(*x, *y, Luma([plane.max(0.0).min(255.0) as u8]));
        corrected.put_pixel(*x, *y, Luma([residual]));

        if residual > params.filter_corrected {
            n_corrected += 1;
            filter_corrected.put_pixel(*x, *y, Luma([255]));
        }
        if *v > params.filter_raw {
            n_raw += 1;
            filter_raw.put_pixel(*x, *y, Luma([255]));
        }
    }

    let n = lit.len();

    let report = WellReport {
        circle: *circle,
        analysed_radius: r_reduced,
        plane: [a, b, c],
        lit_pixels: n,
        coverage_corrected: n_corrected as f64 / n as f64,
        coverage_raw: n_raw as f64 / n as f64,
    };

    let images = WellImages {
        masked,
        gradient,
        corrected,
        filter_corrected,
        filter_raw,
    };

    Ok((report, images))
}

#[cfg(test)]
mod test {
    use super::*;

    const CENTRE: (f64, f64) = (150.0, 150.0);

    fn well() -> Circle {
        Circle { x: CENTRE.0, y: CENTRE.1, r: 100.0, votes: 100 }
    }

    /// Intensity rising by one level per pixel in X across the image.
    fn ramp() -> GrayImage {
        GrayImage::from_fn(300, 300, |x, _| Luma([(128 + x as i64 - 150) as u8]))
    }

    #[test]
    fn test_plane_removed() {
        let params = WellParams {
            filter_corrected: 10,
            filter_raw: 128,
            ..Default::default()
        };

        let (report, images) = analyse_well(&ramp(), &well(), &params).unwrap();

        assert_eq!(report.analysed_radius, 82);
        assert!((report.plane[0] - 1.0).abs() < 1e-6);
        assert!(report.plane[1].abs() < 1e-6);
        assert!((report.plane[2] - (128.0 - 150.0)).abs() < 1e-6);

        assert_eq!(report.coverage_corrected, 0.0);
        assert!((report.coverage_raw - 0.5).abs() < 0.02, "{}", report.coverage_raw);

        // Outside the analysed disc is masked out
        assert_eq!(images.masked.get_pixel(150, 150 - 90)[0], 0);
        assert_eq!(images.masked.get_pixel(150, 150)[0], 128);
    }

    #[test]
    fn test_bright_spot() {
        let mut img = ramp();
        for y in 140..150 {
            for x in 160..170 {
                let v = img.get_pixel(x, y)[0];
                img.put_pixel(x, y, Luma([v + 80]));
            }
        }

        let (report, images) = analyse_well(&img, &well(), &WellParams::default()).unwrap();

        let spot = 100.0 / report.lit_pixels as f64;
        assert!((report.coverage_corrected - spot).abs() < 0.5 * spot);
        assert_eq!(images.filter_corrected.get_pixel(165, 145)[0], 255);
        assert_eq!(images.filter_corrected.get_pixel(100, 100)[0], 0);
    }

    #[test]
    fn test_dark_well() {
        let img = GrayImage::new(300, 300);
        assert!(matches!(
            analyse_well(&img, &well(), &WellParams::default()),
            Err(VisionError::EmptyWell)
        ));
    }
}
