//! Optional debug image output
//!
//! Nothing is written unless a directory was given. Write failures are
//! logged and otherwise ignored.

use std::path::{Path, PathBuf};

use image::{GrayImage, Rgb};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::vision::ball::Ball;
use crate::vision::hoop::Hoop;
use crate::vision::hsv::{hsv_to_rgb, HsvImage};

const HOOP_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const BALL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Destination for intermediate masks and annotated frames
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugDump {
    dir: Option<PathBuf>,
}

impl DebugDump {
    /// A dump that writes nothing
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// A dump writing PNG files into `dir`
    pub fn to_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// A nested dump under `name`, disabled if this one is
    pub fn subdir(&self, name: impl AsRef<Path>) -> Self {
        Self {
            dir: self.dir.as_ref().map(|d| d.join(name)),
        }
    }

    pub fn save_mask(&self, name: &str, mask: &GrayImage) {
        if let Some(path) = self.prepare(name) {
            if let Err(e) = mask.save(&path) {
                tracing::warn!("Failed to write debug mask {}: {}", path.display(), e);
            }
        }
    }

    pub fn save_frame(&self, name: &str, frame: &HsvImage) {
        if let Some(path) = self.prepare(name) {
            if let Err(e) = hsv_to_rgb(frame).save(&path) {
                tracing::warn!("Failed to write debug frame {}: {}", path.display(), e);
            }
        }
    }

    /// Frame with the hoop, its markers and the ball (if any) drawn on it
    pub fn save_result(&self, name: &str, frame: &HsvImage, hoop: &Hoop, ball: Option<&Ball>) {
        let Some(path) = self.prepare(name) else {
            return;
        };
        let mut canvas = hsv_to_rgb(frame);
        let [hx, hy] = hoop.center();
        draw_hollow_circle_mut(&mut canvas, (hx, hy), hoop.radius(), HOOP_COLOR);
        for (dot, r) in hoop.center_dots().iter().zip(hoop.radius_dots()) {
            draw_filled_circle_mut(&mut canvas, (dot[0], dot[1]), r + 1, HOOP_COLOR);
        }
        if let Some(ball) = ball {
            let [bx, by] = ball.center;
            draw_hollow_circle_mut(&mut canvas, (bx, by), ball.radius, BALL_COLOR);
            draw_filled_circle_mut(&mut canvas, (bx, by), 2, BALL_COLOR);
            draw_line_segment_mut(
                &mut canvas,
                (hx as f32, hy as f32),
                (bx as f32, by as f32),
                BALL_COLOR,
            );
        }
        if let Err(e) = canvas.save(&path) {
            tracing::warn!("Failed to write debug result {}: {}", path.display(), e);
        }
    }

    fn prepare(&self, name: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("Failed to create debug directory {}: {}", dir.display(), e);
            return None;
        }
        Some(dir.join(format!("{}.png", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_writes_nothing() {
        let dump = DebugDump::disabled();
        assert!(!dump.is_enabled());
        assert!(!dump.subdir("7").is_enabled());
        dump.save_mask("mask", &GrayImage::new(4, 4));
    }

    #[test]
    fn test_saves_mask_into_subdir() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = DebugDump::to_dir(tmp.path()).subdir("30");
        dump.save_mask("ball-mask", &GrayImage::new(4, 4));
        assert!(tmp.path().join("30").join("ball-mask.png").is_file());
    }
}
