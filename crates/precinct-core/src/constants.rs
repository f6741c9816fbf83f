//! Core constants for the precinct scanner controller.
//!
//! This module centralizes the timing defaults and limits shared by the
//! hardware layer, the controller and the command-line simulator. Every
//! duration is expressed in milliseconds so it can be written directly into a
//! TOML delay table.
//!
//! # Usage
//!
//! ```
//! use precinct_core::constants::*;
//! use std::time::Duration;
//!
//! let poll_every = Duration::from_millis(DEFAULT_PAPER_STATUS_POLLING_INTERVAL_MS);
//! let watchdog = Duration::from_millis(DEFAULT_PAPER_STATUS_POLLING_TIMEOUT_MS);
//! assert!(watchdog > poll_every);
//! ```

// ============================================================================
// Scanning Limits
// ============================================================================

/// Number of scan attempts made for a single sheet before it is rejected.
///
/// A sheet that misfeeds this many times in a row is returned to the voter
/// with the `scanning_failed` fault instead of being retried again.
pub const MAX_FAILED_SCAN_ATTEMPTS: u32 = 10;

/// Sheet identifier used when interpretation is skipped.
pub const SKIPPED_INTERPRETATION_SHEET_ID: &str = "mock-sheet-id";

// ============================================================================
// Paper Status Polling
// ============================================================================

/// Time between two paper status polls (500ms).
pub const DEFAULT_PAPER_STATUS_POLLING_INTERVAL_MS: u64 = 500;

/// Watchdog for a single paper status poll (2 seconds).
///
/// A driver that does not answer within this window is considered hung and
/// the controller starts its error recovery.
pub const DEFAULT_PAPER_STATUS_POLLING_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// Sheet Handling Timeouts
// ============================================================================

/// Maximum duration of a single scan (5 seconds).
pub const DEFAULT_SCANNING_TIMEOUT_MS: u64 = 5_000;

/// Maximum wait for the drop confirmation after an accept (5 seconds).
pub const DEFAULT_ACCEPTING_TIMEOUT_MS: u64 = 5_000;

/// Time after an accept during which a newly inserted sheet is ignored (2 seconds).
pub const DEFAULT_ACCEPTED_READY_FOR_NEXT_BALLOT_MS: u64 = 2_000;

/// Time after an accept before the controller falls back to `no_paper` (5 seconds).
pub const DEFAULT_ACCEPTED_RESET_TO_NO_PAPER_MS: u64 = 5_000;

/// Hold confirmation wait after a reject or return (1 second).
///
/// Must be longer than the polling interval, otherwise the confirming
/// status can never be observed.
pub const DEFAULT_WAIT_FOR_HOLD_AFTER_REJECT_MS: u64 = 1_000;

// ============================================================================
// Connection Recovery
// ============================================================================

/// Delay before reconnecting after the scanner disconnected (500ms).
pub const DEFAULT_RECONNECT_MS: u64 = 500;

/// Cool-off before reconnecting while recovering from an unexpected error (3 seconds).
pub const DEFAULT_RECONNECT_ON_UNEXPECTED_ERROR_MS: u64 = 3_000;

/// Maximum time for a nice disconnect before the driver is killed (1 second).
pub const DEFAULT_KILL_AFTER_DISCONNECT_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// Commands
// ============================================================================

/// Maximum time the calibrate command waits for calibration to finish (20 seconds).
pub const DEFAULT_CALIBRATE_TIMEOUT_MS: u64 = 20_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_wait_exceeds_polling_interval() {
        assert!(DEFAULT_WAIT_FOR_HOLD_AFTER_REJECT_MS > DEFAULT_PAPER_STATUS_POLLING_INTERVAL_MS);
    }

    #[test]
    fn test_ready_for_next_ballot_precedes_reset() {
        assert!(DEFAULT_ACCEPTED_READY_FOR_NEXT_BALLOT_MS < DEFAULT_ACCEPTED_RESET_TO_NO_PAPER_MS);
    }
}
