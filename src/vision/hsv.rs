//! HSV frames and color thresholding
//!
//! Frames use the 8-bit HSV convention of the camera pipeline: hue in
//! `0..180` (degrees halved), saturation and value in `0..=255`. The three
//! channels are stored in an `Rgb<u8>` buffer in H, S, V order.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// An HSV frame, channels in H, S, V order
pub type HsvImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Inclusive HSV color range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Whether every lower bound is at most its upper bound
    pub fn is_ordered(&self) -> bool {
        self.lower.iter().zip(self.upper.iter()).all(|(lo, hi)| lo <= hi)
    }

    /// Whether `pixel` lies within the range on all three channels
    pub fn contains(&self, pixel: &Rgb<u8>) -> bool {
        (0..3).all(|c| self.lower[c] <= pixel[c] && pixel[c] <= self.upper[c])
    }
}

/// Binary mask (255 inside, 0 outside) of the pixels inside `range`
pub fn in_range(frame: &HsvImage, range: &HsvRange) -> GrayImage {
    let (w, h) = frame.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if range.contains(frame.get_pixel(x, y)) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Pixel-wise AND of two masks of equal size
pub fn bitwise_and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (w, h) = a.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if a.get_pixel(x, y)[0] != 0 && b.get_pixel(x, y)[0] != 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Convert one RGB pixel to 8-bit HSV
pub fn rgb_to_hsv_pixel(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        ((h / 2.0).round() as u32 % 180) as u8,
        s.round() as u8,
        max as u8,
    ]
}

/// Convert one 8-bit HSV pixel back to RGB
pub fn hsv_to_rgb_pixel(hsv: [u8; 3]) -> [u8; 3] {
    let h = hsv[0] as f32 * 2.0;
    let s = hsv[1] as f32 / 255.0;
    let v = hsv[2] as f32;

    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m].map(|ch| ch.round().clamp(0.0, 255.0) as u8)
}

/// Convert an RGB image to an HSV frame
pub fn rgb_to_hsv(image: &RgbImage) -> HsvImage {
    let (w, h) = image.dimensions();
    HsvImage::from_fn(w, h, |x, y| Rgb(rgb_to_hsv_pixel(image.get_pixel(x, y).0)))
}

/// Convert an HSV frame to an RGB image, for debug output
pub fn hsv_to_rgb(frame: &HsvImage) -> RgbImage {
    let (w, h) = frame.dimensions();
    RgbImage::from_fn(w, h, |x, y| Rgb(hsv_to_rgb_pixel(frame.get_pixel(x, y).0)))
}
