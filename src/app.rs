//! Application wiring
//!
//! Loads the configuration of this host, runs hoop calibration and the
//! tracking loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::{AppConfig, HostConfig};
use crate::error::{CalibrationError, Error, Result};
use crate::network::init_network;
use crate::pipeline::{DirectoryFrameSource, DispatcherStats, FrameDispatcher, FrameSource};
use crate::vision::ball::{find_ball, Ball, BallDetector, BallSearch};
use crate::vision::debug::DebugDump;
use crate::vision::hoop::{Hoop, HoopSearch};
use crate::vision::hsv::{rgb_to_hsv, HsvImage};

/// Outcome of a calibration run
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub hoop: Arc<Hoop>,
    /// Ball found on the calibration frame with the configured color range
    pub ball: Option<Ball>,
}

pub struct Application {
    config: AppConfig,
    config_path: PathBuf,
    hostname: String,
}

impl Application {
    pub fn new(config: AppConfig, config_path: impl Into<PathBuf>, hostname: impl Into<String>) -> Result<Self> {
        let hostname = hostname.into();
        config.host(&hostname)?.validate()?;
        Ok(Self {
            config,
            config_path: config_path.into(),
            hostname,
        })
    }

    pub fn load(config_path: impl AsRef<Path>, hostname: impl Into<String>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config = AppConfig::load(config_path)?;
        Self::new(config, config_path, hostname)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn host_config(&self) -> Result<&HostConfig> {
        self.config.host(&self.hostname)
    }

    fn debug_root(&self) -> Result<DebugDump> {
        Ok(match &self.host_config()?.pipeline.debug_dir {
            Some(dir) => DebugDump::to_dir(dir),
            None => DebugDump::disabled(),
        })
    }

    /// Frame used for calibration: the configured calibration image, else
    /// the first recorded frame
    pub fn calibration_frame(&self) -> Result<HsvImage> {
        let conf = self.host_config()?;
        if let Some(path) = &conf.hoop.calibration_image {
            tracing::info!("Calibrating from {}", path.display());
            return Ok(rgb_to_hsv(&image::open(path)?.to_rgb8()));
        }
        let mut source = self.frame_source()?;
        let frame = source.next_frame()?;
        source.close();
        frame.ok_or_else(|| CalibrationError::NoFrame.into())
    }

    /// Replay source for the configured frame directory
    pub fn frame_source(&self) -> Result<DirectoryFrameSource> {
        let video = &self.host_config()?.video;
        let dir = video.frames_dir.as_ref().ok_or_else(|| {
            Error::Config("video.frames_dir is not set, no frame source available".to_string())
        })?;
        Ok(DirectoryFrameSource::open(dir, video.rotation)?)
    }

    /// Find the hoop in `frame`, store it in the configuration and save it.
    ///
    /// On failure the configuration is left untouched and the masks are left
    /// in `<debug_dir>/calibration/` for inspection.
    pub fn calibrate(&mut self, frame: &HsvImage) -> Result<CalibrationReport> {
        let debug = self.debug_root()?.subdir("calibration");
        let conf = self.host_config()?;
        let search = HoopSearch::from(&conf.hoop);

        let hoop = match Hoop::calibrate(frame, &search, &debug) {
            Ok(hoop) => hoop,
            Err(e) => {
                tracing::warn!("No hoop found: {}", e);
                if let Some(dir) = debug.dir() {
                    tracing::warn!("See {} for debug images", dir.display());
                }
                return Err(e.into());
            }
        };
        tracing::info!("Hoop found @ {:?} with r={}", hoop.center(), hoop.radius());

        let host = self.config.host_mut(&self.hostname)?;
        hoop.store_into(&mut host.hoop);
        // Angle offset and field of view stay as configured
        let hoop = Arc::new(Hoop::from_config(&host.hoop)?);

        let ball = find_ball(frame, &BallSearch::from(&host.ball), &hoop, &debug.subdir("ball"));
        match &ball {
            Some(ball) => tracing::info!(
                "Ball found @ {:?} with r={}, angle {:.1}",
                ball.center,
                ball.radius,
                ball.angle()
            ),
            None => tracing::info!("No ball found on the calibration frame"),
        }

        self.config.save(&self.config_path)?;
        Ok(CalibrationReport { hoop, ball })
    }

    /// Track the ball over `source` until it is exhausted or `stop` is set,
    /// sending every result through this host's network endpoint.
    pub fn run<S>(&self, source: &mut S, stop: Arc<AtomicBool>) -> Result<DispatcherStats>
    where
        S: FrameSource + ?Sized,
    {
        let conf = self.host_config()?;
        let hoop = Arc::new(Hoop::from_config(&conf.hoop)?);
        tracing::info!("Using hoop @ {:?} with r={}", hoop.center(), hoop.radius());

        let debug = self.debug_root()?;
        if let Some(dir) = debug.dir() {
            reset_dir(dir)?;
        }
        let detector = BallDetector::new(hoop, BallSearch::from(&conf.ball))
            .with_debug(debug, conf.pipeline.debug_interval);

        let mut endpoint = init_network(&conf.network, &self.hostname)?;
        let dispatcher = FrameDispatcher::new(conf.pipeline.worker_count()).with_stop_flag(stop);
        let result = dispatcher.run(source, &detector, &mut endpoint);
        endpoint.close();

        if let Ok(stats) = &result {
            if let Some(latency) = stats.mean_latency() {
                tracing::info!("Mean detection latency {:.1} ms", latency.as_secs_f64() * 1000.0);
            }
        }
        result
    }
}

/// Host name of this machine, used to select its configuration section
pub fn machine_hostname() -> Result<String> {
    let name = gethostname::gethostname();
    match name.to_str().map(str::trim) {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(Error::Config(format!(
            "cannot use machine host name {:?}, pass --host",
            name
        ))),
    }
}

/// Empty `dir`, creating it if needed
fn reset_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}
