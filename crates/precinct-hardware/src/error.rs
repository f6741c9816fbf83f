//! Error types for scanner driver operations.
//!
//! [`DriverError`] covers the transport-level failures a scanner driver can
//! report. [`PollError`] covers the ways a paper status poll can fail that
//! cannot be expressed as a paper status event.

use crate::types::PaperStatus;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur during scanner driver operations.
///
/// Errors are `Clone` so that they can travel inside controller events and
/// status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Scanner is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Low-level I/O failure talking to the scanner.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The scanner rejected a feed command because the paper path is invalid.
    #[error("Feed invalid")]
    FeedInvalid,

    /// The sheet could not be pulled into the scanner.
    #[error("Error feeding sheet")]
    ErrorFeeding,

    /// A scan was requested but no sheet was present.
    #[error("No paper to scan")]
    NoPaper,

    /// A scan finished without producing an image for each side.
    #[error("Incomplete scan: expected two files, got {files}")]
    IncompleteScan { files: usize },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The scanner reported a failure for a command.
    #[error("{operation} failed: {message}")]
    CommandFailed { operation: String, message: String },

    /// Connecting to the scanner failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new command failure.
    pub fn command_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether a failed scan may be retried once the sheet is back at the front.
    pub fn is_retryable_scan_failure(&self) -> bool {
        matches!(self, Self::ErrorFeeding | Self::NoPaper)
    }

    /// Whether the scanner is in a state no recovery sequence can fix.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::IncompleteScan { .. })
    }
}

impl From<std::io::Error> for DriverError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

/// Ways a paper status poll can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// The scanner reported a status with no paper status event.
    #[error("Unexpected paper status: {0}")]
    UnexpectedPaperStatus(PaperStatus),

    /// The scanner did not answer within the watchdog timeout.
    #[error("Paper status timed out after {duration_ms}ms")]
    TimedOut { duration_ms: u64 },

    /// The driver failed in a way that has no paper status event.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
