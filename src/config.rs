//! Configuration
//!
//! One TOML file describes every node of the rig, keyed by host name:
//!
//! ```toml
//! [hosts.pi-left.hoop]
//! center = [160, 120]
//! radius = 90
//! center_dots = [[250, 120], [160, 210], [70, 120]]
//! radius_dots = [4, 4, 4]
//! fov = [90.0, 270.0]
//! hsv = { lower = [25, 150, 150], upper = [35, 255, 255] }
//!
//! [hosts.pi-left.ball]
//! hsv = { lower = [100, 86, 6], upper = [120, 255, 255] }
//!
//! [hosts.pi-left.network]
//! is_server = true
//! server_ip = "0.0.0.0"
//! ```
//!
//! Sections and keys left out take the defaults below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::vision::hsv::HsvRange;

/// Whole-rig configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hosts: BTreeMap<String, HostConfig>,
}

impl AppConfig {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "ball-hoop-tracker")
            .map(|dirs| dirs.config_dir().join("tracker.toml"))
            .unwrap_or_else(|| PathBuf::from("tracker.toml"))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded configuration for {} host(s) from {}", config.hosts.len(), path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Configuration of one host
    pub fn host(&self, name: &str) -> Result<&HostConfig> {
        self.hosts
            .get(name)
            .ok_or_else(|| Error::Config(format!("no configuration for host '{}'", name)))
    }

    pub fn host_mut(&mut self, name: &str) -> Result<&mut HostConfig> {
        self.hosts
            .get_mut(name)
            .ok_or_else(|| Error::Config(format!("no configuration for host '{}'", name)))
    }
}

/// Configuration of one tracking node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub hoop: HoopConfig,
    pub ball: BallConfig,
    pub video: VideoConfig,
    pub network: NetworkConfig,
    pub pipeline: PipelineConfig,
}

impl HostConfig {
    /// Check value ranges once, before any component is built
    pub fn validate(&self) -> Result<()> {
        if !self.hoop.hsv.is_ordered() {
            return Err(Error::Config("hoop.hsv lower bound exceeds upper bound".into()));
        }
        if !self.ball.hsv.is_ordered() {
            return Err(Error::Config("ball.hsv lower bound exceeds upper bound".into()));
        }
        if self.ball.min_radius < 0 || self.ball.min_radius > self.ball.max_radius {
            return Err(Error::Config(format!(
                "ball radius range [{}, {}] is empty",
                self.ball.min_radius, self.ball.max_radius
            )));
        }
        if self.hoop.fov[1] < self.hoop.fov[0] {
            return Err(Error::Config(format!(
                "hoop.fov end {} is before start {}",
                self.hoop.fov[1], self.hoop.fov[0]
            )));
        }
        if self.video.rotation > 3 {
            return Err(Error::Config(format!(
                "video.rotation must be 0..=3 quarter turns, got {}",
                self.video.rotation
            )));
        }
        if !(1..=8).contains(&self.network.message_bytes) {
            return Err(Error::Config(format!(
                "network.message_bytes must be 1..=8, got {}",
                self.network.message_bytes
            )));
        }
        if self.network.precision == 0 {
            return Err(Error::Config("network.precision must be positive".into()));
        }
        Ok(())
    }
}

/// Hoop calibration results and marker search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoopConfig {
    /// Fitted center, absent until calibrated
    pub center: Option<[i32; 2]>,
    /// Fitted radius, absent until calibrated
    pub radius: Option<i32>,
    pub center_dots: Vec<[i32; 2]>,
    pub radius_dots: Vec<i32>,
    /// Added to every computed angle, degrees
    pub angle_offset: i32,
    /// Field of view in degrees from 12 o'clock, clockwise
    pub fov: [f64; 2],
    /// Marker color
    pub hsv: HsvRange,
    pub morph_iterations: u32,
    pub min_dots_radius: i32,
    /// Image used for calibration instead of a live frame
    pub calibration_image: Option<PathBuf>,
}

impl Default for HoopConfig {
    fn default() -> Self {
        Self {
            center: None,
            radius: None,
            center_dots: Vec::new(),
            radius_dots: Vec::new(),
            angle_offset: 0,
            fov: [90.0, 270.0],
            hsv: HsvRange::new([0, 0, 0], [179, 255, 255]),
            morph_iterations: 0,
            min_dots_radius: 2,
            calibration_image: None,
        }
    }
}

/// Ball search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallConfig {
    pub hsv: HsvRange,
    pub morph_iterations: u32,
    pub min_radius: i32,
    pub max_radius: i32,
}

impl Default for BallConfig {
    fn default() -> Self {
        Self {
            hsv: HsvRange::new([100, 86, 6], [120, 255, 255]),
            morph_iterations: 1,
            min_radius: 5,
            max_radius: 20,
        }
    }
}

/// Frame acquisition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Directory of recorded frames `1.png, 2.png, ...`
    pub frames_dir: Option<PathBuf>,
    /// Clockwise quarter turns applied to every frame
    pub rotation: u8,
}

/// Network role and wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub is_server: bool,
    pub server_ip: String,
    pub server_port: u16,
    pub precision: u64,
    pub message_bytes: u8,
    /// Transmit reserved error codes instead of dropping them
    pub send_errors: bool,
    /// Where the server writes its result log on shutdown
    pub result_path: PathBuf,
    /// Client acknowledgement timeout in milliseconds, the connection counts
    /// as lost after it
    pub ack_timeout_ms: u64,
    pub serial: SerialConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            is_server: false,
            server_ip: "127.0.0.1".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            precision: DEFAULT_PRECISION,
            message_bytes: DEFAULT_MESSAGE_BYTES,
            send_errors: true,
            result_path: PathBuf::from("storage/result.json"),
            ack_timeout_ms: 5000,
            serial: SerialConfig::default(),
        }
    }
}

/// Serial line towards the actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub com: PathBuf,
    pub baud: u32,
    /// When false, writes are only logged
    pub active: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            com: PathBuf::from(DEFAULT_SERIAL_DEVICE),
            baud: DEFAULT_BAUD_RATE,
            active: true,
        }
    }
}

/// Worker pool and debugging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads, defaults to the number of CPU cores
    pub workers: Option<usize>,
    /// Directory for debug images, disabled when absent
    pub debug_dir: Option<PathBuf>,
    /// Dump every n-th frame while tracking
    pub debug_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            debug_dir: None,
            debug_interval: 30,
        }
    }
}

impl PipelineConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }
}
