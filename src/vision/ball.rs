//! Per-frame ball detection

use std::sync::Arc;

use crate::config::BallConfig;
use crate::pipeline::dispatcher::FrameDetector;
use crate::vision::blob::{close, external_blobs};
use crate::vision::debug::DebugDump;
use crate::vision::hoop::Hoop;
use crate::vision::hsv::{bitwise_and, in_range, HsvImage, HsvRange};

/// A ball located in one frame
#[derive(Debug, Clone)]
pub struct Ball {
    hoop: Arc<Hoop>,
    pub center: [i32; 2],
    pub radius: i32,
}

impl Ball {
    pub fn new(hoop: Arc<Hoop>, center: [i32; 2], radius: i32) -> Self {
        Self { hoop, center, radius }
    }

    /// Angle of the ball inside the hoop it was resolved against
    pub fn angle(&self) -> f64 {
        self.hoop.angle_in_hoop(self.center)
    }

    pub fn hoop(&self) -> &Hoop {
        &self.hoop
    }
}

/// Parameters for the ball search
#[derive(Debug, Clone, PartialEq)]
pub struct BallSearch {
    pub hsv: HsvRange,
    /// Dilate/erode rounds closing gaps left by the hoop occluding the ball
    pub morph_iterations: u32,
    pub min_radius: i32,
    pub max_radius: i32,
}

impl From<&BallConfig> for BallSearch {
    fn from(conf: &BallConfig) -> Self {
        Self {
            hsv: conf.hsv,
            morph_iterations: conf.morph_iterations,
            min_radius: conf.min_radius,
            max_radius: conf.max_radius,
        }
    }
}

/// Locate the ball in `frame`.
///
/// Candidates are the external contours of the color mask restricted to the
/// hoop's field of view, largest area first. The first one whose enclosing
/// radius lies within `[min_radius, max_radius]` wins. `None` means no ball
/// in this frame.
pub fn find_ball(
    frame: &HsvImage,
    search: &BallSearch,
    hoop: &Arc<Hoop>,
    debug: &DebugDump,
) -> Option<Ball> {
    debug.save_frame("raw", frame);
    let mut mask = in_range(frame, &search.hsv);
    debug.save_mask("ball-mask", &mask);
    if search.morph_iterations > 0 {
        mask = close(&mask, search.morph_iterations);
        debug.save_mask("ball-mask-close", &mask);
    }

    let (w, h) = frame.dimensions();
    let sector = hoop.sector_mask(w, h);
    debug.save_mask("segment-mask", &sector);
    let mask = bitwise_and(&mask, &sector);
    debug.save_mask("final-mask", &mask);

    let mut blobs = external_blobs(&mask);
    blobs.sort_by(|a, b| b.area.total_cmp(&a.area));

    let ball = blobs.iter().find_map(|blob| {
        let radius = blob.enclosing.radius;
        if radius < search.min_radius as f64 || radius > search.max_radius as f64 {
            return None;
        }
        let center = blob.pixel_centroid()?;
        Some(Ball::new(hoop.clone(), center, blob.pixel_radius()))
    });

    debug.save_result("result", frame, hoop, ball.as_ref());
    ball
}

/// Ball search bound to one hoop, run by the dispatcher's workers
#[derive(Debug, Clone)]
pub struct BallDetector {
    hoop: Arc<Hoop>,
    search: BallSearch,
    debug: DebugDump,
    debug_interval: u64,
}

impl BallDetector {
    pub fn new(hoop: Arc<Hoop>, search: BallSearch) -> Self {
        Self {
            hoop,
            search,
            debug: DebugDump::disabled(),
            debug_interval: 0,
        }
    }

    /// Dump every `interval`-th frame into `debug/<frame_number>/`
    pub fn with_debug(mut self, debug: DebugDump, interval: u64) -> Self {
        self.debug = debug;
        self.debug_interval = interval;
        self
    }

    pub fn hoop(&self) -> &Arc<Hoop> {
        &self.hoop
    }
}

impl FrameDetector for BallDetector {
    fn detect(&self, frame_number: u64, frame: &HsvImage) -> Option<Ball> {
        let dump = if self.debug_interval > 0 && frame_number % self.debug_interval == 0 {
            self.debug.subdir(frame_number.to_string())
        } else {
            DebugDump::disabled()
        };
        find_ball(frame, &self.search, &self.hoop, &dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const BALL: [u8; 3] = [110, 200, 200];

    fn search() -> BallSearch {
        BallSearch {
            hsv: HsvRange::new([100, 86, 6], [120, 255, 255]),
            morph_iterations: 1,
            min_radius: 5,
            max_radius: 20,
        }
    }

    fn hoop() -> Arc<Hoop> {
        Arc::new(
            Hoop::new([100, 100], 80, vec![[180, 100], [100, 180], [20, 100]], vec![3, 3, 3])
                .unwrap(),
        )
    }

    fn frame_with_discs(discs: &[([i32; 2], i32)]) -> HsvImage {
        HsvImage::from_fn(200, 200, |x, y| {
            let hit = discs.iter().any(|&(c, r)| {
                let dx = x as i32 - c[0];
                let dy = y as i32 - c[1];
                dx * dx + dy * dy <= r * r
            });
            Rgb(if hit { BALL } else { [0, 0, 0] })
        })
    }

    #[test]
    fn test_finds_ball_in_field_of_view() {
        let frame = frame_with_discs(&[([100, 150], 12)]);
        let ball = find_ball(&frame, &search(), &hoop(), &DebugDump::disabled()).unwrap();
        assert_eq!(ball.center, [100, 150]);
        assert_eq!(ball.radius, 12);
        assert!(ball.angle().abs() < 1e-9);
    }

    #[test]
    fn test_ball_outside_field_of_view_is_ignored() {
        let frame = frame_with_discs(&[([100, 50], 12)]);
        assert!(find_ball(&frame, &search(), &hoop(), &DebugDump::disabled()).is_none());
    }

    #[test]
    fn test_radius_bounds() {
        let too_big = frame_with_discs(&[([100, 140], 25)]);
        assert!(find_ball(&too_big, &search(), &hoop(), &DebugDump::disabled()).is_none());

        let too_small = frame_with_discs(&[([100, 140], 3)]);
        assert!(find_ball(&too_small, &search(), &hoop(), &DebugDump::disabled()).is_none());
    }

    #[test]
    fn test_largest_qualifying_blob_wins() {
        let frame = frame_with_discs(&[([70, 130], 8), ([130, 130], 14)]);
        let ball = find_ball(&frame, &search(), &hoop(), &DebugDump::disabled()).unwrap();
        assert_eq!(ball.center, [130, 130]);
        assert_eq!(ball.radius, 14);
    }

    #[test]
    fn test_oversized_blob_falls_through_to_next() {
        let frame = frame_with_discs(&[([100, 150], 25), ([40, 110], 9)]);
        let ball = find_ball(&frame, &search(), &hoop(), &DebugDump::disabled()).unwrap();
        assert_eq!(ball.center, [40, 110]);
    }

    #[test]
    fn test_empty_frame_has_no_ball() {
        let frame = frame_with_discs(&[]);
        assert!(find_ball(&frame, &search(), &hoop(), &DebugDump::disabled()).is_none());
    }

    #[test]
    fn test_detector_dumps_every_nth_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let detector = BallDetector::new(hoop(), search())
            .with_debug(DebugDump::to_dir(tmp.path()), 30);
        let frame = frame_with_discs(&[([100, 150], 12)]);

        assert!(detector.detect(29, &frame).is_some());
        assert!(detector.detect(30, &frame).is_some());
        assert!(!tmp.path().join("29").exists());
        assert!(tmp.path().join("30").join("result.png").is_file());
    }
}
