//! Hoop model and calibration
//!
//! The hoop is found once, from a frame showing at least three colored
//! markers on the ring. The fitted circle defines the reference frame in
//! which ball angles are measured.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::config::HoopConfig;
use crate::constants::MIN_HOOP_MARKERS;
use crate::error::{CalibrationError, Error};
use crate::geometry::{angle_between, fit_circle};
use crate::vision::blob::{external_blobs, open};
use crate::vision::debug::DebugDump;
use crate::vision::hsv::{in_range, HsvImage, HsvRange};

/// Angular sector of the hoop in which the ball may be found.
///
/// Degrees are measured from 12 o'clock, increasing clockwise on screen, so
/// the default `90..270` is the lower half of the hoop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub start: f64,
    pub end: f64,
}

impl FieldOfView {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether the direction `(dx, dy)` from the hoop center lies in the sector
    pub fn contains_direction(&self, dx: f64, dy: f64) -> bool {
        let span = self.end - self.start;
        if span >= 360.0 {
            return true;
        }
        if span < 0.0 {
            return false;
        }
        let clock = dy.atan2(dx).to_degrees() + 90.0;
        (clock - self.start).rem_euclid(360.0) <= span
    }
}

impl Default for FieldOfView {
    fn default() -> Self {
        Self::new(90.0, 270.0)
    }
}

/// Parameters for finding the hoop markers
#[derive(Debug, Clone, PartialEq)]
pub struct HoopSearch {
    pub hsv: HsvRange,
    /// Erode/dilate rounds to suppress speckle noise, 0 disables
    pub morph_iterations: u32,
    /// Markers with a smaller enclosing radius are ignored
    pub min_dot_radius: i32,
}

impl From<&HoopConfig> for HoopSearch {
    fn from(conf: &HoopConfig) -> Self {
        Self {
            hsv: conf.hsv,
            morph_iterations: conf.morph_iterations,
            min_dot_radius: conf.min_dots_radius,
        }
    }
}

/// The calibrated hoop
#[derive(Debug, Clone, PartialEq)]
pub struct Hoop {
    center: [i32; 2],
    radius: i32,
    center_dots: Vec<[i32; 2]>,
    radius_dots: Vec<i32>,
    angle_offset: i32,
    field_of_view: FieldOfView,
}

impl Hoop {
    /// Create a hoop from fitted values and the markers that produced them
    pub fn new(
        center: [i32; 2],
        radius: i32,
        center_dots: Vec<[i32; 2]>,
        radius_dots: Vec<i32>,
    ) -> Result<Self, Error> {
        if radius <= 0 {
            return Err(Error::Config(format!("hoop radius must be positive, got {}", radius)));
        }
        if center_dots.len() != radius_dots.len() {
            return Err(Error::Config(format!(
                "hoop has {} marker centers but {} marker radii",
                center_dots.len(),
                radius_dots.len()
            )));
        }
        if center_dots.len() < MIN_HOOP_MARKERS {
            return Err(Error::Config(format!(
                "hoop needs at least {} markers, got {}",
                MIN_HOOP_MARKERS,
                center_dots.len()
            )));
        }
        Ok(Self {
            center,
            radius,
            center_dots,
            radius_dots,
            angle_offset: 0,
            field_of_view: FieldOfView::default(),
        })
    }

    /// Load a previously calibrated hoop from configuration
    pub fn from_config(conf: &HoopConfig) -> Result<Self, Error> {
        let (Some(center), Some(radius)) = (conf.center, conf.radius) else {
            return Err(Error::Config(
                "hoop is not calibrated, run calibration first".to_string(),
            ));
        };
        Ok(Self::new(center, radius, conf.center_dots.clone(), conf.radius_dots.clone())?
            .with_angle_offset(conf.angle_offset)
            .with_field_of_view(FieldOfView::new(conf.fov[0], conf.fov[1])))
    }

    /// Write the calibrated geometry back into `conf`
    pub fn store_into(&self, conf: &mut HoopConfig) {
        conf.center = Some(self.center);
        conf.radius = Some(self.radius);
        conf.center_dots = self.center_dots.clone();
        conf.radius_dots = self.radius_dots.clone();
    }

    pub fn with_angle_offset(mut self, angle_offset: i32) -> Self {
        self.angle_offset = angle_offset;
        self
    }

    pub fn with_field_of_view(mut self, field_of_view: FieldOfView) -> Self {
        self.field_of_view = field_of_view;
        self
    }

    /// Find the hoop markers in `frame` and fit a circle through them
    pub fn calibrate(
        frame: &HsvImage,
        search: &HoopSearch,
        debug: &DebugDump,
    ) -> Result<Self, CalibrationError> {
        let mut mask = in_range(frame, &search.hsv);
        debug.save_mask("hoop-mask", &mask);
        if search.morph_iterations > 0 {
            mask = open(&mask, search.morph_iterations);
            debug.save_mask("hoop-mask-open", &mask);
        }

        let mut center_dots = Vec::new();
        let mut radius_dots = Vec::new();
        for blob in external_blobs(&mask) {
            if blob.enclosing.radius < search.min_dot_radius as f64 {
                continue;
            }
            let Some(centroid) = blob.pixel_centroid() else {
                continue;
            };
            center_dots.push(centroid);
            radius_dots.push(blob.pixel_radius());
        }
        tracing::debug!("Hoop calibration found {} marker(s)", center_dots.len());

        if center_dots.len() < MIN_HOOP_MARKERS {
            return Err(CalibrationError::TooFewMarkers {
                found: center_dots.len(),
                required: MIN_HOOP_MARKERS,
            });
        }

        let points: Vec<[f64; 2]> = center_dots.iter().map(|p| [p[0] as f64, p[1] as f64]).collect();
        let circle = fit_circle(&points).ok_or(CalibrationError::DegenerateMarkers)?;
        let center = [to_pixel(circle.center[0]), to_pixel(circle.center[1])];
        let radius = to_pixel(circle.radius);
        if radius <= 0 {
            return Err(CalibrationError::DegenerateMarkers);
        }

        Ok(Self {
            center,
            radius,
            center_dots,
            radius_dots,
            angle_offset: 0,
            field_of_view: FieldOfView::default(),
        })
    }

    /// Signed angle of `point` around the hoop center plus the angle offset.
    ///
    /// Zero is straight down from the center; positive angles run towards
    /// image-left.
    pub fn angle_in_hoop(&self, point: [i32; 2]) -> f64 {
        let reference = [0.0, self.radius as f64];
        let v = [
            (point[0] - self.center[0]) as f64,
            (point[1] - self.center[1]) as f64,
        ];
        angle_between(reference, v) + self.angle_offset as f64
    }

    /// Whether pixel `(x, y)` lies inside the hoop and within the field of view
    pub fn in_sector(&self, x: i32, y: i32) -> bool {
        let dx = (x - self.center[0]) as i64;
        let dy = (y - self.center[1]) as i64;
        let r = self.radius as i64;
        if dx * dx + dy * dy > r * r {
            return false;
        }
        if dx == 0 && dy == 0 {
            return true;
        }
        self.field_of_view.contains_direction(dx as f64, dy as f64)
    }

    /// Filled sector mask of the field of view, `width x height`
    pub fn sector_mask(&self, width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if self.in_sector(x as i32, y as i32) { 255 } else { 0 }])
        })
    }

    pub fn center(&self) -> [i32; 2] {
        self.center
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn center_dots(&self) -> &[[i32; 2]] {
        &self.center_dots
    }

    pub fn radius_dots(&self) -> &[i32] {
        &self.radius_dots
    }

    pub fn angle_offset(&self) -> i32 {
        self.angle_offset
    }

    pub fn field_of_view(&self) -> FieldOfView {
        self.field_of_view
    }
}

/// Truncate a fitted coordinate to whole pixels. Values within fit noise of
/// an integer snap to it first.
fn to_pixel(v: f64) -> i32 {
    let nearest = v.round();
    if (v - nearest).abs() < 1e-6 {
        nearest as i32
    } else {
        v.trunc() as i32
    }
}
