//! # Vision
//!
//! Circle detection and well analysis on still images.
//!
//! Images are converted to grayscale and smoothed with a Gaussian blur before circles are searched
//! for with a gradient Hough transform. The largest circle found is taken to be the well, and the
//! pixel intensities inside it are analysed for coverage.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod circle;
mod well;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{DynamicImage, GrayImage, Rgb, RgbImage};

pub use circle::*;
pub use well::*;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("No circle was found in the image")]
    NoCircle,

    #[error("The well contains no lit pixels")]
    EmptyWell,

    #[error("Could not fit the intensity plane, the well pixels are degenerate")]
    PlaneFit,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert to grayscale and apply a Gaussian blur.
pub fn preprocess(image: &DynamicImage, blur_sigma: f32) -> GrayImage {
    let gray = image::imageops::grayscale(image);

    if blur_sigma > 0.0 {
        image::imageops::blur(&gray, blur_sigma)
    } else {
        gray
    }
}

/// Draw the outline of a circle.
pub fn draw_circle(image: &mut RgbImage, circle: &Circle, colour: Rgb<u8>, thickness: f64) {
    let half = thickness / 2.0;
    let (w, h) = image.dimensions();

    let x_min = (circle.x - circle.r - half).floor().max(0.0) as u32;
    let y_min = (circle.y - circle.r - half).floor().max(0.0) as u32;
    let x_max = ((circle.x + circle.r + half).ceil().max(0.0) as u32).min(w.saturating_sub(1));
    let y_max = ((circle.y + circle.r + half).ceil().max(0.0) as u32).min(h.saturating_sub(1));

    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let d = ((x as f64 - circle.x).powi(2) + (y as f64 - circle.y).powi(2)).sqrt();
            if (d - circle.r).abs() <= half {
                image.put_pixel(x, y, colour);
            }
        }
    }
}

/// Copy of `image` with the circles drawn on, the largest in green and the others in blue, and
/// each centre marked in red.
pub fn annotate(image: &DynamicImage, circles: &[Circle]) -> RgbImage {
    let mut out = image.to_rgb8();

    for (i, c) in circles.iter().enumerate() {
        let colour = if i == 0 { Rgb([0, 255, 0]) } else { Rgb([0, 0, 255]) };
        draw_circle(&mut out, c, colour, 4.0);
        draw_circle(
            &mut out,
            &Circle { r: 2.0, ..*c },
            Rgb([255, 0, 0]),
            3.0,
        );
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_draw_circle() {
        let mut img = RgbImage::new(50, 50);
        let c = Circle { x: 25.0, y: 25.0, r: 10.0, votes: 0 };

        draw_circle(&mut img, &c, Rgb([0, 255, 0]), 2.0);

        assert_eq!(*img.get_pixel(35, 25), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(25, 15), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(25, 25), Rgb([0, 0, 0]));
    }
}
