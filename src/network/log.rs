//! Per-host result time series kept by the server

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::Decoded;

/// Parallel arrays, one entry per received value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSeries {
    /// Milliseconds since server start
    pub time: Vec<u64>,
    /// Angle in degrees, the last good angle while an error is reported
    pub angle: Vec<i64>,
    /// 0, or the error code relative to the reserved range
    pub error: Vec<u64>,
}

impl HostSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    fn push(&mut self, time: u64, value: Decoded) {
        self.time.push(time);
        match value {
            Decoded::Angle(angle) => {
                self.angle.push(angle.round() as i64);
                self.error.push(0);
            }
            Decoded::Error(code) => {
                let last = self.angle.last().copied().unwrap_or(0);
                self.angle.push(last);
                self.error.push(code);
            }
        }
    }
}

/// On-disk form of the result log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    /// RFC 3339 local time of the save
    pub saved_at: String,
    pub hosts: BTreeMap<String, HostSeries>,
}

impl ResultFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(|e| Error::Config(format!("result log: {}", e)))
    }
}

#[derive(Debug, Clone)]
pub struct ResultLog {
    started: Instant,
    hosts: BTreeMap<String, HostSeries>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            hosts: BTreeMap::new(),
        }
    }

    /// Append a value for `host`, timestamped now
    pub fn record(&mut self, host: &str, value: Decoded) {
        let time = self.started.elapsed().as_millis() as u64;
        self.hosts.entry(host.to_string()).or_default().push(time, value);
    }

    pub fn host(&self, host: &str) -> Option<&HostSeries> {
        self.hosts.get(host)
    }

    pub fn hosts(&self) -> &BTreeMap<String, HostSeries> {
        &self.hosts
    }

    /// Write all series as JSON
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = ResultFile {
            saved_at: chrono::Local::now().to_rfc3339(),
            hosts: self.hosts.clone(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &file)
            .map_err(|e| Error::Config(format!("result log: {}", e)))?;
        tracing::info!(
            "Saved results of {} host(s) to {}",
            self.hosts.len(),
            path.display()
        );
        Ok(())
    }
}

impl Default for ResultLog {
    fn default() -> Self {
        Self::new()
    }
}
