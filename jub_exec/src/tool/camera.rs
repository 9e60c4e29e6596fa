//! # Camera Tool
//!
//! The camera is a USB video device carried as a tool. Each photo opens its own capture handle on
//! the device, reads a single frame and closes it again, so no stream is kept running between
//! photos.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{DynamicImage, RgbImage};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{dock::DockParams, ToolAdapter, ToolError, ToolParams};
use crate::motion_ctrl::MotionCtrl;
use comms_if::net::MachineLink;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of single frames.
pub trait CameraDevice {
    /// Open the device, read one frame and release the device.
    fn capture_frame(&mut self) -> Result<DynamicImage, CaptureError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraParams {
    pub tool: ToolParams,

    /// Path to the V4L2 video device
    pub device: String,

    /// Frame size in pixels
    pub resolution: (u32, u32),

    /// Four character code of the pixel format, `MJPG` or `RGB3`
    pub format: String,

    /// Frame interval as a `(numerator, denominator)` fraction of a second
    pub interval: (u32, u32),
}

/// The camera tool.
pub struct CameraTool<D: CameraDevice> {
    params: CameraParams,
    dock: DockParams,
    device: D,
}

/// Capture from a V4L2 device.
pub struct RscamDevice {
    params: CameraParams,
}

/// A camera producing a fixed test pattern, or failing on demand.
#[derive(Debug, Clone, Default)]
pub struct SimCamera {
    pub resolution: (u32, u32),
    pub fail: bool,
    pub captures: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Could not open {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("Could not start the capture: {0}")]
    Start(String),

    #[error("No frame was read: {0}")]
    NoFrame(String),

    #[error("Unsupported pixel format {0}")]
    UnsupportedFormat(String),

    #[error("Could not decode the frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Video capture is not available on this platform")]
    Unsupported,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            tool: ToolParams {
                name: super::ToolId::Camera.name().into(),
                parking_xy: [302.0, 7.0],
                move_velocity: 10000,
                retreat_xy: Some([50.0, 120.0]),
                z_window: None,
            },
            device: "/dev/video0".into(),
            resolution: (640, 480),
            format: "MJPG".into(),
            interval: (1, 30),
        }
    }
}

impl<D: CameraDevice> CameraTool<D> {
    pub fn new(params: CameraParams, dock: DockParams, device: D) -> Self {
        Self { params, dock, device }
    }

    /// Take a photo and save it to `path`.
    ///
    /// Returns the path written, or `None` if no frame could be captured.
    pub fn photo<L: MachineLink, P: AsRef<Path>>(
        &mut self,
        machine: &MotionCtrl<L>,
        path: P,
    ) -> Result<Option<PathBuf>, ToolError> {
        self.ensure_installed(machine)?;

        let frame = match self.device.capture_frame() {
            Ok(f) => f,
            Err(e) => {
                warn!("[camera] Photo not taken: {}", e);
                return Ok(None);
            }
        };

        let path = path.as_ref().to_path_buf();
        frame.save(&path)?;

        info!("[camera] Photo saved to {:?}", path);

        Ok(Some(path))
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn camera_params(&self) -> &CameraParams {
        &self.params
    }
}

impl<D: CameraDevice> ToolAdapter for CameraTool<D> {
    fn params(&self) -> &ToolParams {
        &self.params.tool
    }

    fn dock(&self) -> &DockParams {
        &self.dock
    }
}

impl RscamDevice {
    pub fn new(params: CameraParams) -> Self {
        Self { params }
    }
}

#[cfg(target_os = "linux")]
impl CameraDevice for RscamDevice {
    fn capture_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        let mut camera = rscam::Camera::new(&self.params.device).map_err(|e| CaptureError::Open {
            device: self.params.device.clone(),
            reason: e.to_string(),
        })?;

        camera
            .start(&rscam::Config {
                interval: self.params.interval,
                resolution: self.params.resolution,
                format: self.params.format.as_bytes(),
                ..Default::default()
            })
            .map_err(|e| CaptureError::Start(e.to_string()))?;

        let frame = camera
            .capture()
            .map_err(|e| CaptureError::NoFrame(e.to_string()))?;

        let (width, height) = frame.resolution;

        match self.params.format.as_str() {
            "MJPG" => Ok(image::load_from_memory_with_format(
                &frame[..],
                image::ImageFormat::Jpeg,
            )?),
            "RGB3" => RgbImage::from_raw(width, height, frame.to_vec())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| CaptureError::NoFrame("Short RGB frame".into())),
            other => Err(CaptureError::UnsupportedFormat(other.into())),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl CameraDevice for RscamDevice {
    fn capture_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

impl SimCamera {
    pub fn new(resolution: (u32, u32)) -> Self {
        Self {
            resolution,
            ..Default::default()
        }
    }
}

impl CameraDevice for SimCamera {
    fn capture_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        if self.fail {
            return Err(CaptureError::NoFrame("Simulated capture failure".into()));
        }

        self.captures += 1;

        let (w, h) = self.resolution;
        let img = RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 128])
        });

        Ok(DynamicImage::ImageRgb8(img))
    }
}

impl<D: CameraDevice + ?Sized> CameraDevice for Box<D> {
    fn capture_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        (**self).capture_frame()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::motion_ctrl::MotionParams;
    use crate::prompt::FixedOperator;
    use comms_if::net::SimLink;
    use image::GenericImageView;

    fn machine() -> MotionCtrl<SimLink> {
        MotionCtrl::new(
            SimLink::homed(),
            MotionParams::default(),
            Box::new(FixedOperator::new(true)),
        )
        .unwrap()
    }

    fn camera(fail: bool) -> CameraTool<SimCamera> {
        let mut device = SimCamera::new((32, 24));
        device.fail = fail;
        CameraTool::new(CameraParams::default(), DockParams::default(), device)
    }

    #[test]
    fn test_photo_requires_install() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = machine();
        let mut cam = camera(false);

        let res = cam.photo(&m, dir.path().join("a.png"));
        assert!(matches!(res, Err(ToolError::NotInstalled { .. })));
        assert_eq!(cam.device().captures, 0);

        m.set_tool(Some("gripper".into()));
        assert!(cam.photo(&m, dir.path().join("a.png")).is_err());
        assert!(!dir.path().join("a.png").exists());
    }

    #[test]
    fn test_photo_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = machine();
        m.ensure_homed().unwrap();
        let mut cam = camera(false);

        assert_eq!(cam.install(&mut m).unwrap(), crate::tool::ToolChange::Installed);

        let path = dir.path().join("photo.png");
        assert_eq!(cam.photo(&m, &path).unwrap(), Some(path.clone()));

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (32, 24));
    }

    #[test]
    fn test_capture_failure_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = machine();
        m.set_tool(Some("camera".into()));
        let mut cam = camera(true);

        let path = dir.path().join("photo.png");
        assert_eq!(cam.photo(&m, &path).unwrap(), None);
        assert!(!path.exists());
    }
}
