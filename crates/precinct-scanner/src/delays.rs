//! Named timing knobs of the controller.
//!
//! Every timer the controller arms is looked up by [`DelayName`] in a
//! [`Delays`] table. The table always holds a value for every name: missing
//! entries fall back to the defaults in [`precinct_core::constants`].
//!
//! In TOML the table is written with snake_case keys and millisecond values:
//!
//! ```toml
//! [delays]
//! paper_status_polling_interval = 250
//! accepted_reset_to_no_paper = 3000
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use precinct_core::constants::*;
use precinct_core::{Error, Result};
use precinct_hardware::PollerConfig;
use serde::{Deserialize, Serialize};

/// Name of a configurable delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayName {
    PaperStatusPollingInterval,
    PaperStatusPollingTimeout,
    ScanningTimeout,
    AcceptingTimeout,
    AcceptedReadyForNextBallot,
    AcceptedResetToNoPaper,
    WaitForHoldAfterReject,
    Reconnect,
    ReconnectOnUnexpectedError,
    KillAfterDisconnectTimeout,
}

impl DelayName {
    pub const ALL: [DelayName; 10] = [
        Self::PaperStatusPollingInterval,
        Self::PaperStatusPollingTimeout,
        Self::ScanningTimeout,
        Self::AcceptingTimeout,
        Self::AcceptedReadyForNextBallot,
        Self::AcceptedResetToNoPaper,
        Self::WaitForHoldAfterReject,
        Self::Reconnect,
        Self::ReconnectOnUnexpectedError,
        Self::KillAfterDisconnectTimeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaperStatusPollingInterval => "paper_status_polling_interval",
            Self::PaperStatusPollingTimeout => "paper_status_polling_timeout",
            Self::ScanningTimeout => "scanning_timeout",
            Self::AcceptingTimeout => "accepting_timeout",
            Self::AcceptedReadyForNextBallot => "accepted_ready_for_next_ballot",
            Self::AcceptedResetToNoPaper => "accepted_reset_to_no_paper",
            Self::WaitForHoldAfterReject => "wait_for_hold_after_reject",
            Self::Reconnect => "reconnect",
            Self::ReconnectOnUnexpectedError => "reconnect_on_unexpected_error",
            Self::KillAfterDisconnectTimeout => "kill_after_disconnect_timeout",
        }
    }

    pub fn default_duration(&self) -> Duration {
        let ms = match self {
            Self::PaperStatusPollingInterval => DEFAULT_PAPER_STATUS_POLLING_INTERVAL_MS,
            Self::PaperStatusPollingTimeout => DEFAULT_PAPER_STATUS_POLLING_TIMEOUT_MS,
            Self::ScanningTimeout => DEFAULT_SCANNING_TIMEOUT_MS,
            Self::AcceptingTimeout => DEFAULT_ACCEPTING_TIMEOUT_MS,
            Self::AcceptedReadyForNextBallot => DEFAULT_ACCEPTED_READY_FOR_NEXT_BALLOT_MS,
            Self::AcceptedResetToNoPaper => DEFAULT_ACCEPTED_RESET_TO_NO_PAPER_MS,
            Self::WaitForHoldAfterReject => DEFAULT_WAIT_FOR_HOLD_AFTER_REJECT_MS,
            Self::Reconnect => DEFAULT_RECONNECT_MS,
            Self::ReconnectOnUnexpectedError => DEFAULT_RECONNECT_ON_UNEXPECTED_ERROR_MS,
            Self::KillAfterDisconnectTimeout => DEFAULT_KILL_AFTER_DISCONNECT_TIMEOUT_MS,
        };
        Duration::from_millis(ms)
    }
}

impl fmt::Display for DelayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DelayName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown delay: {s}")))
    }
}

/// Table of every controller delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct Delays {
    table: BTreeMap<DelayName, Duration>,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            table: DelayName::ALL
                .into_iter()
                .map(|name| (name, name.default_duration()))
                .collect(),
        }
    }
}

impl Delays {
    pub fn get(&self, name: DelayName) -> Duration {
        self.table
            .get(&name)
            .copied()
            .unwrap_or_else(|| name.default_duration())
    }

    pub fn set(&mut self, name: DelayName, duration: Duration) {
        self.table.insert(name, duration);
    }

    /// Override one delay.
    ///
    /// # Examples
    ///
    /// ```
    /// use precinct_scanner::{DelayName, Delays};
    /// use std::time::Duration;
    ///
    /// let delays = Delays::default().with(DelayName::Reconnect, Duration::from_millis(50));
    /// assert_eq!(delays.get(DelayName::Reconnect), Duration::from_millis(50));
    /// assert_eq!(delays.get(DelayName::ScanningTimeout), Duration::from_secs(5));
    /// ```
    #[must_use]
    pub fn with(mut self, name: DelayName, duration: Duration) -> Self {
        self.set(name, duration);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (DelayName, Duration)> + '_ {
        DelayName::ALL.into_iter().map(|name| (name, self.get(name)))
    }

    /// Poll interval and watchdog for the paper status poller.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.get(DelayName::PaperStatusPollingInterval),
            timeout: self.get(DelayName::PaperStatusPollingTimeout),
        }
    }

    /// Check the relationships between delays the controller relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the polling interval or watchdog is zero,
    /// or if the hold confirmation wait is not longer than the polling
    /// interval.
    pub fn validate(&self) -> Result<()> {
        let interval = self.get(DelayName::PaperStatusPollingInterval);
        if interval.is_zero() {
            return Err(Error::Config(format!("{} must be positive", DelayName::PaperStatusPollingInterval)));
        }
        if self.get(DelayName::PaperStatusPollingTimeout).is_zero() {
            return Err(Error::Config(format!("{} must be positive", DelayName::PaperStatusPollingTimeout)));
        }
        if self.get(DelayName::WaitForHoldAfterReject) <= interval {
            return Err(Error::Config(format!(
                "{} must be longer than {}",
                DelayName::WaitForHoldAfterReject,
                DelayName::PaperStatusPollingInterval
            )));
        }
        Ok(())
    }
}

impl TryFrom<BTreeMap<String, u64>> for Delays {
    type Error = Error;

    fn try_from(millis: BTreeMap<String, u64>) -> Result<Self> {
        let mut delays = Self::default();
        for (name, ms) in millis {
            delays.set(name.parse()?, Duration::from_millis(ms));
        }
        delays.validate()?;
        Ok(delays)
    }
}

impl From<Delays> for BTreeMap<String, u64> {
    fn from(delays: Delays) -> Self {
        delays
            .iter()
            .map(|(name, duration)| (name.to_string(), u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)))
            .collect()
    }
}
