//! Serial line towards the actuator
//!
//! Every value is written as an unsigned big-endian integer exactly
//! `message_bytes` wide.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use crate::config::SerialConfig;
use crate::error::NetworkError;

const WRITE_TIMEOUT_MS: u64 = 1000;

/// Encode `value` as a big-endian integer `message_bytes` wide
pub fn encode_value(value: u64, message_bytes: u8) -> Result<Bytes, NetworkError> {
    if !(1..=8).contains(&message_bytes) {
        return Err(NetworkError::Serial(format!(
            "message bytes must be between 1 and 8, got {}",
            message_bytes
        )));
    }
    if message_bytes < 8 && value >> (8 * message_bytes as u32) != 0 {
        return Err(NetworkError::Serial(format!(
            "value {} does not fit into {} byte(s)",
            value, message_bytes
        )));
    }
    let mut buf = BytesMut::with_capacity(message_bytes as usize);
    buf.put_uint(value, message_bytes as usize);
    Ok(buf.freeze())
}

/// Byte sink of the serial line
pub struct SerialLine {
    sink: Option<Box<dyn Write + Send>>,
    message_bytes: u8,
    name: String,
    written: u64,
}

impl SerialLine {
    /// Open the configured device at its baud rate, or an inactive line when
    /// `active` is off
    pub fn open(conf: &SerialConfig, message_bytes: u8) -> Result<Self, NetworkError> {
        if !conf.active {
            tracing::info!("Serial line inactive, values are only logged");
            return Ok(Self::inactive(message_bytes));
        }
        let port = serialport::new(conf.com.to_string_lossy(), conf.baud)
            .timeout(Duration::from_millis(WRITE_TIMEOUT_MS))
            .open()
            .map_err(|e| {
                NetworkError::Serial(format!("{} at {} baud: {}", conf.com.display(), conf.baud, e))
            })?;
        tracing::info!("Opened serial line {} at {} baud", conf.com.display(), conf.baud);
        Ok(Self {
            sink: Some(Box::new(port)),
            message_bytes,
            name: conf.com.display().to_string(),
            written: 0,
        })
    }

    /// A line that logs values instead of writing them
    pub fn inactive(message_bytes: u8) -> Self {
        Self {
            sink: None,
            message_bytes,
            name: "inactive".to_string(),
            written: 0,
        }
    }

    /// A line writing into any byte sink
    pub fn with_writer(writer: impl Write + Send + 'static, message_bytes: u8) -> Self {
        Self {
            sink: Some(Box::new(writer)),
            message_bytes,
            name: "writer".to_string(),
            written: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    pub fn message_bytes(&self) -> u8 {
        self.message_bytes
    }

    /// Number of values written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write(&mut self, value: u64) -> Result<(), NetworkError> {
        let bytes = encode_value(value, self.message_bytes)?;
        match self.sink.as_mut() {
            Some(sink) => {
                sink.write_all(&bytes)
                    .and_then(|_| sink.flush())
                    .map_err(|e| NetworkError::Serial(format!("{}: {}", self.name, e)))?;
                tracing::trace!("Serial {} <- {} {:02x?}", self.name, value, bytes.as_ref());
            }
            None => tracing::debug!("Serial (inactive) <- {} {:02x?}", value, bytes.as_ref()),
        }
        self.written += 1;
        Ok(())
    }
}

impl fmt::Debug for SerialLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLine")
            .field("name", &self.name)
            .field("message_bytes", &self.message_bytes)
            .field("active", &self.is_active())
            .field("written", &self.written)
            .finish()
    }
}

/// In-memory serial sink for simulation, cloned handles share the buffer
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Captured values, decoded in `message_bytes` chunks
    pub fn values(&self, message_bytes: u8) -> Vec<u64> {
        self.bytes
            .lock()
            .chunks_exact(message_bytes as usize)
            .map(|chunk| chunk.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
            .collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_big_endian() {
        assert_eq!(encode_value(350, 2).unwrap().as_ref(), &[0x01, 0x5e]);
        assert_eq!(encode_value(65535, 2).unwrap().as_ref(), &[0xff, 0xff]);
        assert_eq!(encode_value(7, 3).unwrap().as_ref(), &[0, 0, 7]);
        assert_eq!(encode_value(u64::MAX, 8).unwrap().len(), 8);
    }

    #[test]
    fn test_encode_rejects_overflow() {
        assert!(encode_value(65536, 2).is_err());
        assert!(encode_value(1, 0).is_err());
        assert!(encode_value(1, 9).is_err());
    }

    #[test]
    fn test_capture_line() {
        let capture = CaptureBuffer::new();
        let mut line = SerialLine::with_writer(capture.clone(), 2);
        line.write(10).unwrap();
        line.write(65535).unwrap();
        assert_eq!(capture.bytes(), vec![0x00, 0x0a, 0xff, 0xff]);
        assert_eq!(capture.values(2), vec![10, 65535]);
        assert_eq!(line.written(), 2);
    }

    #[test]
    fn test_inactive_line() {
        let conf = SerialConfig {
            active: false,
            ..Default::default()
        };
        let mut line = SerialLine::open(&conf, 2).unwrap();
        assert!(!line.is_active());
        line.write(42).unwrap();
        assert_eq!(line.written(), 1);
    }

    #[test]
    fn test_open_missing_device() {
        let conf = SerialConfig {
            com: "/nonexistent/serial0".into(),
            baud: 115_200,
            ..Default::default()
        };
        match SerialLine::open(&conf, 2) {
            Err(NetworkError::Serial(msg)) => {
                assert!(msg.contains("/nonexistent/serial0"), "{}", msg);
                assert!(msg.contains("115200 baud"), "{}", msg);
            }
            other => panic!("unexpected {:?}", other.map(|l| l.is_active())),
        }
    }

    #[test]
    fn test_regular_file_is_not_a_serial_port() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let conf = SerialConfig {
            com: tmp.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(SerialLine::open(&conf, 2), Err(NetworkError::Serial(_))));
        assert!(std::fs::read(tmp.path()).unwrap().is_empty());
    }
}
