//! Connected blobs in binary masks

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

use crate::geometry::{min_enclosing_circle, polygon_moments, Circle};

/// Outer contour of a connected foreground region, measured
#[derive(Debug, Clone)]
pub struct Blob {
    /// Contour vertices in traversal order
    pub points: Vec<[i32; 2]>,
    /// Area enclosed by the contour polygon
    pub area: f64,
    /// Polygon centroid, `None` for zero-area contours
    pub centroid: Option<[f64; 2]>,
    /// Minimal enclosing circle of the contour
    pub enclosing: Circle,
}

impl Blob {
    fn from_points(points: Vec<[i32; 2]>) -> Option<Self> {
        let enclosing = min_enclosing_circle(&points)?;
        let moments = polygon_moments(&points);
        Some(Self {
            points,
            area: moments.area,
            centroid: moments.centroid,
            enclosing,
        })
    }

    /// Centroid truncated to whole pixels
    pub fn pixel_centroid(&self) -> Option<[i32; 2]> {
        self.centroid.map(|c| [c[0] as i32, c[1] as i32])
    }

    /// Enclosing radius truncated to whole pixels
    pub fn pixel_radius(&self) -> i32 {
        // Tolerance absorbs rounding in the circumcircle construction
        (self.enclosing.radius + 1e-6) as i32
    }
}

/// Outermost contours of `mask`, nested contours are ignored
pub fn external_blobs(mask: &GrayImage) -> Vec<Blob> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| Blob::from_points(c.points.iter().map(|p| [p.x, p.y]).collect()))
        .collect()
}

/// Erode then dilate with a 3x3 kernel, `iterations` times each
pub fn open(mask: &GrayImage, iterations: u32) -> GrayImage {
    if iterations == 0 {
        return mask.clone();
    }
    let k = iterations.min(u8::MAX as u32) as u8;
    dilate(&erode(mask, Norm::LInf, k), Norm::LInf, k)
}

/// Dilate then erode with a 3x3 kernel, `iterations` times each
pub fn close(mask: &GrayImage, iterations: u32) -> GrayImage {
    if iterations == 0 {
        return mask.clone();
    }
    let k = iterations.min(u8::MAX as u32) as u8;
    erode(&dilate(mask, Norm::LInf, k), Norm::LInf, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn disc_mask(w: u32, h: u32, discs: &[([i32; 2], i32)]) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let inside = discs.iter().any(|&(c, r)| {
                let dx = x as i32 - c[0];
                let dy = y as i32 - c[1];
                dx * dx + dy * dy <= r * r
            });
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_single_disc_blob() {
        let mask = disc_mask(60, 60, &[([30, 25], 10)]);
        let blobs = external_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].pixel_centroid(), Some([30, 25]));
        assert_eq!(blobs[0].pixel_radius(), 10);
        assert!(blobs[0].area > 250.0);
    }

    #[test]
    fn test_ring_yields_one_external_blob() {
        let mut mask = disc_mask(60, 60, &[([30, 30], 20)]);
        for (x, y, p) in mask.enumerate_pixels_mut() {
            let dx = x as i32 - 30;
            let dy = y as i32 - 30;
            if dx * dx + dy * dy <= 100 {
                *p = Luma([0]);
            }
        }
        assert_eq!(external_blobs(&mask).len(), 1);
    }

    #[test]
    fn test_open_removes_speckle() {
        let mut mask = disc_mask(40, 40, &[([20, 20], 6)]);
        mask.put_pixel(2, 2, Luma([255]));
        assert_eq!(external_blobs(&mask).len(), 2);
        assert_eq!(external_blobs(&open(&mask, 1)).len(), 1);
    }

    #[test]
    fn test_close_fills_gap() {
        let mut mask = disc_mask(40, 40, &[([20, 20], 8)]);
        for y in 0..40 {
            mask.put_pixel(20, y, Luma([0]));
        }
        assert_eq!(external_blobs(&mask).len(), 2);
        assert_eq!(external_blobs(&close(&mask, 1)).len(), 1);
    }
}
