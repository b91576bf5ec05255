//! Error types for the tracker

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Hoop calibration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("no hoop found: {found} marker(s) qualified, at least {required} required")]
    TooFewMarkers { found: usize, required: usize },

    #[error("hoop markers are collinear, no circle fits them")]
    DegenerateMarkers,

    #[error("no calibration frame available")]
    NoFrame,
}

/// Per-frame detection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("worker fault on frame {frame_number}: {message}")]
    WorkerFault { frame_number: u64, message: String },

    #[error("result aggregator panicked: {0}")]
    AggregatorFault(String),
}

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not enough message bytes ({message_bytes}) to fulfill precision {precision}")]
    InsufficientMessageBytes { precision: u64, message_bytes: u8 },

    #[error("message bytes must be between 1 and 8, got {0}")]
    InvalidMessageBytes(u8),

    #[error("precision must be positive")]
    ZeroPrecision,

    #[error("invalid payload: {0:?}")]
    InvalidPayload(String),
}

/// Network transport errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Handshake rejected by server")]
    HandshakeRejected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Serial line error: {0}")]
    Serial(String),

    #[error("Endpoint is not running")]
    NotRunning,
}

/// Frame acquisition errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Frame directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Failed to read frame {index}: {message}")]
    ReadFailed { index: u64, message: String },

    #[error("Frame source is closed")]
    Closed,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
