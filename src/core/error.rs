//! Error types shared across the sync layer

use thiserror::Error;

/// Failure reported by the agent transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Agent not running")]
    NotRunning,

    #[error("Agent input closed")]
    Closed,

    #[error("Agent rejected request: {0}")]
    Rejected(String),

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a command dispatcher operation
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Agent did not respond within {0} ms")]
    Timeout(u64),

    #[error("Refusing to send an empty command")]
    EmptyCommand,

    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

/// Failure inside a subscriber's notify callback
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Subscriber closed")]
    Closed,

    #[error("Subscriber failed: {0}")]
    Failed(String),
}

/// Failure of a display update call on the surface
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Surface disconnected")]
    Disconnected,

    #[error("Surface write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Surface message malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid surface event: {0}")]
    InvalidEvent(String),
}

/// Failure parsing an enum value from text
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown permission mode: {0}")]
    UnknownPermissionMode(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),
}
