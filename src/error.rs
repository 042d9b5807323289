//! Error types for the voice streaming core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec errors
///
/// `NoData` is the normal end of a pop loop, not a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("No data available")]
    NoData,

    #[error("Invalid codec handle")]
    InvalidHandle,

    #[error("Codec call failed: {0}")]
    Failed(String),

    #[error("Unsupported codec configuration: {0}")]
    Unsupported(String),
}

/// How loudly a codec status should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Normal flow control, never logged above trace
    Expected,
    /// A handle was freed concurrently; single occurrences are normal
    Teardown,
    /// Anything else
    Hard,
}

impl CodecError {
    pub fn severity(&self) -> Severity {
        match self {
            CodecError::NoData => Severity::Expected,
            CodecError::InvalidHandle => Severity::Teardown,
            CodecError::Failed(_) | CodecError::Unsupported(_) => Severity::Hard,
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        CodecError::Failed(msg.into())
    }
}

/// Network errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Room handle is no longer valid")]
    InvalidRoom,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// Ring buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Requested {requested} samples but capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error("Ring buffer capacity must be greater than zero")]
    ZeroCapacity,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker already stopped")]
    AlreadyStopped,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
