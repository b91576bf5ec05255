//! # Ball and Hoop Tracker
//!
//! Tracks a colored ball rolling inside a colored hoop and streams the ball's
//! angle to an actuator over a fixed-width serial protocol.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            CAMERA NODE (client or server)                │
//! │  ┌──────────────┐                                                        │
//! │  │ Frame Source │  frames 1, 2, 3, ...                                   │
//! │  └──────┬───────┘                                                        │
//! │         ▼                                                                │
//! │  ┌────────────────────────────────────────────────────────────────────┐  │
//! │  │             Frame Dispatcher (pipeline::dispatcher)                │  │
//! │  │   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐        │  │
//! │  │   │ Worker 0 │   │ Worker 1 │   │ Worker 2 │   │ Worker N │        │  │
//! │  │   │ findBall │   │ findBall │   │ findBall │   │ findBall │        │  │
//! │  │   └────┬─────┘   └────┬─────┘   └────┬─────┘   └────┬─────┘        │  │
//! │  └────────┼──────────────┼──────────────┼──────────────┼──────────────┘  │
//! │           ▼              ▼              ▼              ▼                 │
//! │  ┌────────────────────────────────────────────────────────────────────┐  │
//! │  │      Result Sequencer (pipeline::sequencer) - drops stale frames   │  │
//! │  └──────────────────────────────┬─────────────────────────────────────┘  │
//! │                                 ▼                                        │
//! │  ┌────────────────────────────────────────────────────────────────────┐  │
//! │  │    Protocol Codec (protocol) - angle -> [0, precision) | code      │  │
//! │  └──────────────────────────────┬─────────────────────────────────────┘  │
//! └─────────────────────────────────┼────────────────────────────────────────┘
//!                                   │ TCP, decimal ASCII, "ok" ack
//!                                   ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                                SERVER NODE                               │
//! │  ┌────────────────────────────────────────────────────────────────────┐  │
//! │  │   Server (network::server) - multiplexes hosts, logs time series   │  │
//! │  └──────────────────────────────┬─────────────────────────────────────┘  │
//! │                                 ▼                                        │
//! │  ┌────────────────────────────────────────────────────────────────────┐  │
//! │  │   Serial Line (network::serial) - big-endian, message_bytes wide   │  │
//! │  └────────────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod geometry;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod vision;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default number of angle buckets on the wire (one per degree)
    pub const DEFAULT_PRECISION: u64 = 360;

    /// Default width of a wire/serial message in bytes
    pub const DEFAULT_MESSAGE_BYTES: u8 = 2;

    /// Number of values at the top of the wire range reserved for error codes
    pub const RESERVED_CODES: u64 = 10;

    /// Default TCP port of the server endpoint
    pub const DEFAULT_SERVER_PORT: u16 = 9999;

    /// Acknowledgement sent by the server for every message
    pub const ACK: &[u8] = b"ok";

    /// Maximum size of a single message on the socket
    pub const MAX_MESSAGE_LEN: usize = 1024;

    /// Minimum number of hoop markers required for calibration
    pub const MIN_HOOP_MARKERS: usize = 3;

    /// Default serial device on the Raspberry Pi
    pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/serial0";

    /// Default serial baud rate
    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    /// Server poll interval while no socket is ready, in milliseconds
    pub const POLL_INTERVAL_MS: u64 = 5;
}
