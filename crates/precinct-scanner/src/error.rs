//! Controller error taxonomy.
//!
//! Hardware conditions the controller expects (jam, double feed, disconnect)
//! are states, not errors. What ends up in the context's `error` field is
//! either a [`ScannerFault`] raised by the controller itself, with a stable
//! tag, or an opaque failure from the driver or interpreter.

use precinct_hardware::{DriverError, PaperStatus, PollError};
use thiserror::Error;

/// Tag used in public status for opaque driver and interpreter failures.
pub const OPAQUE_ERROR_TAG: &str = "scanner_error";

/// Faults the controller raises when a hardware report contradicts expectation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScannerFault {
    #[error("Paper status timed out")]
    PaperStatusTimedOut,

    #[error("Scanning timed out")]
    ScanningTimedOut,

    #[error("Scanning failed")]
    ScanningFailed,

    #[error("Both sides have paper")]
    BothSidesHavePaper,

    #[error("Paper in back after accept")]
    PaperInBackAfterAccept,

    #[error("Paper in front after reconnect")]
    PaperInFrontAfterReconnect,

    #[error("Paper in back after reconnect")]
    PaperInBackAfterReconnect,

    #[error("Unexpected paper status: {status}")]
    UnexpectedPaperStatus { status: PaperStatus },

    #[error("Unexpected event: {event}")]
    UnexpectedEvent { event: String },

    /// The sheet dropped but the store did not record it.
    #[error("Failed to record accepted sheet: {message}")]
    StoreFailed { message: String },
}

impl ScannerFault {
    /// Stable tag reported to the outside world.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PaperStatusTimedOut => "paper_status_timed_out",
            Self::ScanningTimedOut => "scanning_timed_out",
            Self::ScanningFailed => "scanning_failed",
            Self::BothSidesHavePaper => "both_sides_have_paper",
            Self::PaperInBackAfterAccept => "paper_in_back_after_accept",
            Self::PaperInFrontAfterReconnect => "paper_in_front_after_reconnect",
            Self::PaperInBackAfterReconnect => "paper_in_back_after_reconnect",
            Self::UnexpectedPaperStatus { .. } => "unexpected_paper_status",
            Self::UnexpectedEvent { .. } => "unexpected_event",
            Self::StoreFailed { .. } => "store_failed",
        }
    }

    pub fn unexpected_event(event: impl Into<String>) -> Self {
        Self::UnexpectedEvent { event: event.into() }
    }
}

/// The last fault recorded by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Fault(#[from] ScannerFault),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Interpretation failed: {0}")]
    Interpreter(String),
}

impl ControllerError {
    /// Public error string: the fault tag, or a generic tag for opaque failures.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Fault(fault) => fault.tag(),
            Self::Driver(_) | Self::Interpreter(_) => OPAQUE_ERROR_TAG,
        }
    }

    pub fn fault(&self) -> Option<&ScannerFault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<PollError> for ControllerError {
    fn from(error: PollError) -> Self {
        match error {
            PollError::UnexpectedPaperStatus(status) => ScannerFault::UnexpectedPaperStatus { status }.into(),
            PollError::TimedOut { .. } => ScannerFault::PaperStatusTimedOut.into(),
            PollError::Driver(error) => Self::Driver(error),
        }
    }
}

/// The controller loop has exited and no longer accepts commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("scanner controller stopped")]
pub struct ControllerStopped;

/// Failure of the blocking calibrate command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrateError {
    /// Calibration ran and the controller recorded an error.
    #[error("{tag}")]
    Failed { tag: String },

    /// Calibration never started: it needs a sheet ready to scan.
    #[error("calibration needs a sheet ready to scan, scanner is {state}")]
    NotReady { state: String },

    /// Calibration did not finish in time.
    #[error("calibration did not finish within {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    /// The controller is no longer running.
    #[error("scanner controller stopped")]
    Stopped,
}

impl From<ControllerStopped> for CalibrateError {
    fn from(_: ControllerStopped) -> Self {
        Self::Stopped
    }
}
