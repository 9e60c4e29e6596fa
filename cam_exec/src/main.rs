//! # Camera Executable
//!
//! Offline analysis of images taken with the camera tool.
//!
//! - `detect` finds the circles in each image
//! - `analyse` measures the coverage of the well, the largest circle, in each image
//!
//! A JSON report for each image is saved into the session, along with the annotated and
//! intermediate images if requested.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

mod params;
mod vision;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use image::GrayImage;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

use params::CamExecParams;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::{self, Session},
};
use vision::{Circle, VisionError, WellReport};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "cam_exec", about = "Circle detection and well analysis")]
enum Opt {
    /// Detect circles
    Detect {
        #[structopt(parse(from_os_str), required = true)]
        images: Vec<PathBuf>,

        /// Smallest radius searched for, in pixels
        #[structopt(long)]
        min_radius: Option<u32>,

        /// Largest radius searched for, in pixels
        #[structopt(long)]
        max_radius: Option<u32>,

        /// Save an annotated copy of each image
        #[structopt(long)]
        save_images: bool,
    },

    /// Measure the coverage of the well in each image
    Analyse {
        #[structopt(parse(from_os_str), required = true)]
        images: Vec<PathBuf>,

        /// Smallest radius searched for, in pixels
        #[structopt(long)]
        min_radius: Option<u32>,

        /// Largest radius searched for, in pixels
        #[structopt(long)]
        max_radius: Option<u32>,

        /// Threshold on the gradient corrected intensity
        #[structopt(long)]
        filter_corrected: Option<u8>,

        /// Threshold on the raw intensity
        #[structopt(long)]
        filter_raw: Option<u8>,

        /// Save the annotated and intermediate images
        #[structopt(long)]
        save_images: bool,
    },
}

#[derive(Debug, Serialize)]
struct DetectReport {
    image: PathBuf,
    circles: Vec<Circle>,
}

#[derive(Debug, Serialize)]
struct AnalyseReport {
    image: PathBuf,
    well: WellReport,
}

// -----------------------------------------------------------------------------------------------
// MAIN
// -----------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("cam_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Jubilee Camera Executable\n");
    info!("Running on: {:#?}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut params: CamExecParams = util::params::load("cam_exec.toml")
        .wrap_err("Could not load cam_exec params")?;

    info!("Exec parameters loaded");

    // ---- RUN ----

    let mut failures = 0;

    match opt {
        Opt::Detect { images, min_radius, max_radius, save_images } => {
            apply_radius_overrides(&mut params, min_radius, max_radius);
            params.save_images |= save_images;

            for path in images {
                match detect(&path, &params, &session.arch_root) {
                    Ok(circles) => {
                        info!("{:?}: {} circles", path, circles.len());
                        for c in &circles {
                            info!("    ({:.1}, {:.1}) r = {:.1}", c.x, c.y, c.r);
                        }
                        session::save_with_timestamp(
                            report_path("detect", &path),
                            DetectReport { image: path, circles },
                        );
                    }
                    Err(e) => {
                        warn!("{:?}: {:?}", path, e);
                        failures += 1;
                    }
                }
            }
        }
        Opt::Analyse {
            images,
            min_radius,
            max_radius,
            filter_corrected,
            filter_raw,
            save_images,
        } => {
            apply_radius_overrides(&mut params, min_radius, max_radius);
            if let Some(f) = filter_corrected {
                params.well.filter_corrected = f;
            }
            if let Some(f) = filter_raw {
                params.well.filter_raw = f;
            }
            params.save_images |= save_images;

            for path in images {
                match analyse(&path, &params, &session.arch_root) {
                    Ok(well) => {
                        info!(
                            "{:?}: coverage {:.4} (gradient corrected), {:.4} (raw)",
                            path, well.coverage_corrected, well.coverage_raw
                        );
                        session::save_with_timestamp(
                            report_path("analyse", &path),
                            AnalyseReport { image: path, well },
                        );
                    }
                    Err(e) => {
                        warn!("{:?}: {:?}", path, e);
                        failures += 1;
                    }
                }
            }
        }
    }

    if failures > 0 {
        warn!("{} images could not be processed", failures);
    }

    session.exit();

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn apply_radius_overrides(params: &mut CamExecParams, min: Option<u32>, max: Option<u32>) {
    if let Some(r) = min {
        params.hough.min_radius = r;
    }
    if let Some(r) = max {
        params.hough.max_radius = r;
    }
}

/// Detect the circles in an image, largest first.
fn detect(path: &Path, params: &CamExecParams, out_dir: &Path) -> Result<Vec<Circle>> {
    let image = image::open(path).wrap_err("Could not open the image")?;

    let blurred = vision::preprocess(&image, params.hough.blur_sigma);
    let circles = vision::detect_circles(&blurred, &params.hough);

    if params.save_images {
        vision::annotate(&image, &circles)
            .save(out_dir.join(format!("{}_circles.png", stem(path))))
            .wrap_err("Could not save the annotated image")?;
    }

    Ok(circles)
}

/// Analyse the well of an image.
fn analyse(path: &Path, params: &CamExecParams, out_dir: &Path) -> Result<WellReport> {
    let image = image::open(path).wrap_err("Could not open the image")?;

    let blurred = vision::preprocess(&image, params.hough.blur_sigma);
    let circles = vision::detect_circles(&blurred, &params.hough);
    let well = circles.first().ok_or(VisionError::NoCircle)?;

    let gray = vision::preprocess(&image, 0.0);
    let (report, images) = vision::analyse_well(&gray, well, &params.well)?;

    if params.save_images {
        let stem = stem(path);
        let mut annotated = vision::annotate(&image, &circles[..1]);
        vision::draw_circle(
            &mut annotated,
            &Circle { r: report.analysed_radius as f64, ..*well },
            image::Rgb([255, 0, 255]),
            2.0,
        );

        let save = |img: &GrayImage, name: &str| -> Result<()> {
            img.save(out_dir.join(format!("{}_{}.png", stem, name)))
                .wrap_err_with(|| format!("Could not save the {} image", name))
        };

        annotated
            .save(out_dir.join(format!("{}_well.png", stem)))
            .wrap_err("Could not save the annotated image")?;
        save(&images.masked, "masked")?;
        save(&images.gradient, "gradient")?;
        save(&images.corrected, "corrected")?;
        save(&images.filter_corrected, "filter_corrected")?;
        save(&images.filter_raw, "filter_raw")?;
    }

    Ok(report)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into())
}

fn report_path(kind: &str, image: &Path) -> PathBuf {
    PathBuf::from(kind).join(format!("{}.json", stem(image)))
}
