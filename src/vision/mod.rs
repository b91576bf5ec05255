//! Vision subsystem
//!
//! Color masks, blob measurement, hoop calibration and per-frame ball
//! detection on HSV frames.

pub mod ball;
pub mod blob;
pub mod debug;
pub mod hoop;
pub mod hsv;

pub use ball::{find_ball, Ball, BallDetector, BallSearch};
pub use debug::DebugDump;
pub use hoop::{FieldOfView, Hoop, HoopSearch};
pub use hsv::{HsvImage, HsvRange};
