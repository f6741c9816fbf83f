//! Paper status poller.
//!
//! The scanner never pushes status changes, so the controller polls. This
//! module provides the [`PaperStatusPoller`], which reads the paper status on a
//! fixed interval and translates every raw status or driver error into a
//! [`PaperStatusEvent`], or a [`PollError`] when no event applies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  get_paper_status()  ┌────────────┐  PollResult  ┌────────────┐
//! │ ScannerDriver│◄─────────────────────│   Poller   │─────────────►│ Controller │
//! │              │─────────────────────►│ (interval, │   report()   │   queue    │
//! └──────────────┘  status / error      │  watchdog) │              └────────────┘
//!                                       └────────────┘
//! ```
//!
//! Each poll is bounded by a watchdog timeout so a hung driver surfaces as
//! [`PollError::TimedOut`] instead of stalling the controller. Polling stops
//! after the first [`PollError`] or when the report callback asks it to.
//!
//! # Examples
//!
//! ```
//! use precinct_hardware::mock::MockScanner;
//! use precinct_hardware::poller::{PaperStatusPoller, PollerConfig};
//! use precinct_hardware::PaperStatusEvent;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (scanner, handle) = MockScanner::connected();
//!     handle.load_sheet();
//!
//!     let poller = PaperStatusPoller::new(PollerConfig::default());
//!     assert_eq!(poller.poll_once(&scanner).await, Ok(PaperStatusEvent::ReadyToScan));
//! }
//! ```

use std::time::Duration;

use precinct_core::constants::{
    DEFAULT_PAPER_STATUS_POLLING_INTERVAL_MS, DEFAULT_PAPER_STATUS_POLLING_TIMEOUT_MS,
};
use tokio::time::MissedTickBehavior;
use tracing::trace;

use crate::error::{DriverError, PollError};
use crate::traits::ScannerDriver;
use crate::types::{PaperStatus, PaperStatusEvent};

/// Outcome of a single paper status poll.
pub type PollResult = std::result::Result<PaperStatusEvent, PollError>;

/// Map a raw paper status to the event the controller understands.
///
/// # Errors
///
/// Returns [`PollError::UnexpectedPaperStatus`] for any status without an event.
pub fn event_for_status(status: PaperStatus) -> PollResult {
    match status {
        PaperStatus::NoPaper | PaperStatus::DevReadyNoPaper => Ok(PaperStatusEvent::NoPaper),
        PaperStatus::ReadyToScan => Ok(PaperStatusEvent::ReadyToScan),
        PaperStatus::ReadyToEject => Ok(PaperStatusEvent::ReadyToEject),
        PaperStatus::BothSidesHavePaper => Ok(PaperStatusEvent::BothSidesHavePaper),
        PaperStatus::Jam | PaperStatus::FrontAndBackSensorHavePaperReady => Ok(PaperStatusEvent::Jam),
        other => Err(PollError::UnexpectedPaperStatus(other)),
    }
}

/// Map a driver error raised while polling to the event the controller understands.
///
/// # Errors
///
/// Returns [`PollError::Driver`] for errors that are not expected hardware conditions.
pub fn event_for_error(error: DriverError) -> PollResult {
    match error {
        DriverError::Disconnected { .. } | DriverError::Io { .. } => Ok(PaperStatusEvent::Disconnected),
        DriverError::FeedInvalid => Ok(PaperStatusEvent::Jam),
        other => Err(PollError::Driver(other)),
    }
}

/// Timing of the paper status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between two polls.
    pub interval: Duration,

    /// Watchdog for a single poll.
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_PAPER_STATUS_POLLING_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_PAPER_STATUS_POLLING_TIMEOUT_MS),
        }
    }
}

/// Polls a scanner's paper status and reports mapped events.
#[derive(Debug, Clone)]
pub struct PaperStatusPoller {
    config: PollerConfig,
}

impl PaperStatusPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Read the paper status once, bounded by the watchdog timeout.
    pub async fn poll_once<D: ScannerDriver>(&self, driver: &D) -> PollResult {
        match tokio::time::timeout(self.config.timeout, driver.get_paper_status()).await {
            Ok(Ok(status)) => {
                trace!("Paper status: {}", status);
                event_for_status(status)
            }
            Ok(Err(error)) => {
                trace!("Paper status error: {}", error);
                event_for_error(error)
            }
            Err(_) => Err(PollError::TimedOut {
                duration_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Poll until `report` returns `false` or a poll fails.
    ///
    /// The first poll happens immediately. The failing [`PollResult`] is
    /// reported before polling stops.
    pub async fn run<D, F>(&self, driver: &D, mut report: F)
    where
        D: ScannerDriver,
        F: FnMut(PollResult) -> bool,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let result = self.poll_once(driver).await;
            let failed = result.is_err();
            if !report(result) || failed {
                break;
            }
        }
    }
}

impl Default for PaperStatusPoller {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}
