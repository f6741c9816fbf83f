//! Precinct scanner state model.
//!
//! The controller is a flat state machine. Each [`ScannerState`] declares what
//! runs while the machine is in it: at most one hardware or interpretation
//! [`Activity`], optionally the paper status poller, and a set of timers. The
//! runtime starts these on entry and tears them down on exit.
//!
//! # States
//!
//! - Connection: `Connecting`, `ErrorDisconnected`, `Reconnecting`
//! - Setup: `WaitingForConfiguration`, `CheckingInitialPaperStatus`
//! - Idle: `NoPaper`, `ReadyToScan`
//! - Scanning: `Scanning`, `CheckingScanningCompleted`, `ErrorScanning`, `Interpreting`
//! - Accept path: `ReadyToAccept`, `Accepting`, `CheckingAcceptingCompleted`, `Accepted`
//! - Review: `NeedsReview`, `Returning`, `CheckingReturningCompleted`, `Returned`
//! - Reject path: `Rejecting`, `CheckingRejectingCompleted`, `Rejected`
//! - Calibration: `Calibrating`, `CheckingCalibrationCompleted`
//! - Hardware conditions: `ErrorJammed`, `ErrorBothSidesHavePaper`
//! - Failure: `Error` (disconnect, kill, cool off, reconnect), `UnrecoverableError`
//!
//! # Valid Transitions
//!
//! - Connecting → WaitingForConfiguration → CheckingInitialPaperStatus → NoPaper
//! - NoPaper ⇄ ReadyToScan → Scanning → CheckingScanningCompleted → Interpreting
//! - Interpreting → ReadyToAccept | NeedsReview | Rejecting
//! - ReadyToAccept → Accepting → CheckingAcceptingCompleted → Accepted → NoPaper
//! - NeedsReview → Accepting (after review) | Returning → CheckingReturningCompleted → Returned → NoPaper
//! - Rejecting → CheckingRejectingCompleted → Rejected → NoPaper
//!
//! # Examples
//!
//! ```
//! use precinct_scanner::{Activity, PublicState, ScannerState};
//!
//! let state = ScannerState::CheckingScanningCompleted;
//! assert_eq!(state.public_state(), PublicState::Scanning);
//! assert!(state.polls_paper_status());
//! assert_eq!(ScannerState::Scanning.activity(), Some(Activity::Scan));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::delays::DelayName;

/// Maximum number of state transitions to keep in history.
///
/// A sheet going through the accept path takes about ten transitions, so
/// this covers the last several sheets.
const MAX_HISTORY_SIZE: usize = 100;

/// Phases of the recovery from an unexpected error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStep {
    /// Closing the driver nicely.
    Disconnecting,

    /// Forcefully terminating the driver.
    Killing,

    /// Waiting before reconnecting.
    CoolingOff,

    /// Connecting again.
    Reconnecting,
}

/// Every state of the precinct scanner controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerState {
    /// Initial state, connecting to the scanner.
    Connecting,

    /// The scanner disconnected. Waiting to reconnect.
    ErrorDisconnected,

    /// Connecting again after a disconnect.
    Reconnecting,

    /// Connected, waiting for a store and an interpreter.
    WaitingForConfiguration,

    /// Making sure no sheet was left in the scanner.
    CheckingInitialPaperStatus,

    NoPaper,

    /// A sheet is held at the front.
    ReadyToScan,

    Scanning,

    /// Scan finished. Waiting for the sheet to be reported at the back.
    CheckingScanningCompleted,

    /// Scan failed. Deciding whether to retry.
    ErrorScanning,

    Interpreting,

    ReadyToAccept,

    Accepting { after_review: bool },

    /// Accept sent. Waiting for the sheet to drop.
    CheckingAcceptingCompleted { after_review: bool },

    /// Sheet counted. New sheets are ignored until `ready_for_next_ballot`.
    Accepted { ready_for_next_ballot: bool },

    NeedsReview,

    Returning,

    /// Return sent. Waiting for the sheet to be held at the front.
    CheckingReturningCompleted,

    /// Returned sheet held at the front for the voter to remove.
    Returned,

    Rejecting,

    /// Reject sent. Waiting for the sheet to be held at the front.
    CheckingRejectingCompleted,

    /// Rejected sheet held at the front for the voter to remove.
    Rejected,

    Calibrating,

    CheckingCalibrationCompleted,

    ErrorJammed,

    ErrorBothSidesHavePaper,

    /// Recovering from an unexpected error.
    Error(RecoveryStep),

    /// Terminal. Requires a restart.
    UnrecoverableError,
}

/// Work a state runs for as long as the machine stays in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Connect,
    Disconnect,
    Kill,
    Scan,
    Interpret,
    Accept,
    /// Reject holding the sheet at the front.
    Reject,
    Calibrate,
}

/// Coarse state name reported to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicState {
    Connecting,
    Unconfigured,
    Disconnected,
    NoPaper,
    ReadyToScan,
    Scanning,
    ReadyToAccept,
    Accepting,
    Accepted,
    NeedsReview,
    AcceptingAfterReview,
    Returning,
    Returned,
    Rejecting,
    Rejected,
    Calibrating,
    Jammed,
    BothSidesHavePaper,
    RecoveringFromError,
    UnrecoverableError,
}

impl PublicState {
    /// Whether the error string is part of the public status in this state.
    pub fn shows_error(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejecting | Self::Rejected | Self::RecoveringFromError | Self::UnrecoverableError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Unconfigured => "unconfigured",
            Self::Disconnected => "disconnected",
            Self::NoPaper => "no_paper",
            Self::ReadyToScan => "ready_to_scan",
            Self::Scanning => "scanning",
            Self::ReadyToAccept => "ready_to_accept",
            Self::Accepting => "accepting",
            Self::Accepted => "accepted",
            Self::NeedsReview => "needs_review",
            Self::AcceptingAfterReview => "accepting_after_review",
            Self::Returning => "returning",
            Self::Returned => "returned",
            Self::Rejecting => "rejecting",
            Self::Rejected => "rejected",
            Self::Calibrating => "calibrating",
            Self::Jammed => "jammed",
            Self::BothSidesHavePaper => "both_sides_have_paper",
            Self::RecoveringFromError => "recovering_from_error",
            Self::UnrecoverableError => "unrecoverable_error",
        }
    }
}

impl fmt::Display for PublicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            Self::Connecting => "connecting",
            Self::ErrorDisconnected => "error_disconnected",
            Self::Reconnecting => "reconnecting",
            Self::WaitingForConfiguration => "waiting_for_configuration",
            Self::CheckingInitialPaperStatus => "checking_initial_paper_status",
            Self::NoPaper => "no_paper",
            Self::ReadyToScan => "ready_to_scan",
            Self::Scanning => "scanning",
            Self::CheckingScanningCompleted => "checking_scanning_completed",
            Self::ErrorScanning => "error_scanning",
            Self::Interpreting => "interpreting",
            Self::ReadyToAccept => "ready_to_accept",
            Self::Accepting { after_review: false } => "accepting",
            Self::Accepting { after_review: true } => "accepting_after_review",
            Self::CheckingAcceptingCompleted { after_review: false } => "checking_accepting_completed",
            Self::CheckingAcceptingCompleted { after_review: true } => {
                "checking_accepting_after_review_completed"
            }
            Self::Accepted {
                ready_for_next_ballot: false,
            } => "accepted.scanning_paused",
            Self::Accepted {
                ready_for_next_ballot: true,
            } => "accepted.ready_for_next_ballot",
            Self::NeedsReview => "needs_review",
            Self::Returning => "returning",
            Self::CheckingReturningCompleted => "checking_returning_completed",
            Self::Returned => "returned",
            Self::Rejecting => "rejecting",
            Self::CheckingRejectingCompleted => "checking_rejecting_completed",
            Self::Rejected => "rejected",
            Self::Calibrating => "calibrating",
            Self::CheckingCalibrationCompleted => "checking_calibration_completed",
            Self::ErrorJammed => "error_jammed",
            Self::ErrorBothSidesHavePaper => "error_both_sides_have_paper",
            Self::Error(RecoveryStep::Disconnecting) => "error.disconnecting",
            Self::Error(RecoveryStep::Killing) => "error.killing",
            Self::Error(RecoveryStep::CoolingOff) => "error.cooling_off",
            Self::Error(RecoveryStep::Reconnecting) => "error.reconnecting",
            Self::UnrecoverableError => "unrecoverable_error",
        };
        write!(f, "{}", state_str)
    }
}

impl ScannerState {
    /// Every state, in declaration order.
    pub const ALL: [ScannerState; 34] = [
        Self::Connecting,
        Self::ErrorDisconnected,
        Self::Reconnecting,
        Self::WaitingForConfiguration,
        Self::CheckingInitialPaperStatus,
        Self::NoPaper,
        Self::ReadyToScan,
        Self::Scanning,
        Self::CheckingScanningCompleted,
        Self::ErrorScanning,
        Self::Interpreting,
        Self::ReadyToAccept,
        Self::Accepting { after_review: false },
        Self::Accepting { after_review: true },
        Self::CheckingAcceptingCompleted { after_review: false },
        Self::CheckingAcceptingCompleted { after_review: true },
        Self::Accepted {
            ready_for_next_ballot: false,
        },
        Self::Accepted {
            ready_for_next_ballot: true,
        },
        Self::NeedsReview,
        Self::Returning,
        Self::CheckingReturningCompleted,
        Self::Returned,
        Self::Rejecting,
        Self::CheckingRejectingCompleted,
        Self::Rejected,
        Self::Calibrating,
        Self::CheckingCalibrationCompleted,
        Self::ErrorJammed,
        Self::ErrorBothSidesHavePaper,
        Self::Error(RecoveryStep::Disconnecting),
        Self::Error(RecoveryStep::Killing),
        Self::Error(RecoveryStep::CoolingOff),
        Self::Error(RecoveryStep::Reconnecting),
        Self::UnrecoverableError,
    ];

    /// The activity started on entry, if any.
    pub fn activity(&self) -> Option<Activity> {
        match self {
            Self::Connecting | Self::Reconnecting | Self::Error(RecoveryStep::Reconnecting) => {
                Some(Activity::Connect)
            }
            Self::ErrorDisconnected | Self::Error(RecoveryStep::Disconnecting) => Some(Activity::Disconnect),
            Self::Error(RecoveryStep::Killing) => Some(Activity::Kill),
            Self::Scanning => Some(Activity::Scan),
            Self::Interpreting => Some(Activity::Interpret),
            Self::Accepting { .. } => Some(Activity::Accept),
            Self::Returning | Self::Rejecting => Some(Activity::Reject),
            Self::Calibrating => Some(Activity::Calibrate),
            _ => None,
        }
    }

    /// Whether the paper status poller runs in this state.
    pub fn polls_paper_status(&self) -> bool {
        matches!(
            self,
            Self::CheckingInitialPaperStatus
                | Self::NoPaper
                | Self::ReadyToScan
                | Self::CheckingScanningCompleted
                | Self::ErrorScanning
                | Self::CheckingAcceptingCompleted { .. }
                | Self::Accepted { .. }
                | Self::NeedsReview
                | Self::CheckingReturningCompleted
                | Self::Returned
                | Self::CheckingRejectingCompleted
                | Self::Rejected
                | Self::CheckingCalibrationCompleted
                | Self::ErrorJammed
                | Self::ErrorBothSidesHavePaper
        )
    }

    /// Timers armed on entry.
    pub fn timers(&self) -> &'static [DelayName] {
        match self {
            Self::ErrorDisconnected => &[DelayName::Reconnect],
            Self::Scanning => &[DelayName::ScanningTimeout],
            Self::CheckingAcceptingCompleted { .. } => &[DelayName::AcceptingTimeout],
            Self::Accepted { .. } => &[DelayName::AcceptedReadyForNextBallot, DelayName::AcceptedResetToNoPaper],
            Self::CheckingReturningCompleted | Self::CheckingRejectingCompleted => {
                &[DelayName::WaitForHoldAfterReject]
            }
            Self::Error(RecoveryStep::Disconnecting) => &[DelayName::KillAfterDisconnectTimeout],
            Self::Error(RecoveryStep::CoolingOff) => &[DelayName::ReconnectOnUnexpectedError],
            _ => &[],
        }
    }

    /// Coarse state reported in the public status.
    pub fn public_state(&self) -> PublicState {
        match self {
            Self::Connecting | Self::CheckingInitialPaperStatus => PublicState::Connecting,
            Self::WaitingForConfiguration => PublicState::Unconfigured,
            Self::ErrorDisconnected | Self::Reconnecting => PublicState::Disconnected,
            Self::NoPaper => PublicState::NoPaper,
            Self::ReadyToScan => PublicState::ReadyToScan,
            Self::Scanning | Self::CheckingScanningCompleted | Self::ErrorScanning | Self::Interpreting => {
                PublicState::Scanning
            }
            Self::ReadyToAccept => PublicState::ReadyToAccept,
            Self::Accepting { after_review: false }
            | Self::CheckingAcceptingCompleted { after_review: false } => PublicState::Accepting,
            Self::Accepting { after_review: true } | Self::CheckingAcceptingCompleted { after_review: true } => {
                PublicState::AcceptingAfterReview
            }
            Self::Accepted { .. } => PublicState::Accepted,
            Self::NeedsReview => PublicState::NeedsReview,
            Self::Returning | Self::CheckingReturningCompleted => PublicState::Returning,
            Self::Returned => PublicState::Returned,
            Self::Rejecting | Self::CheckingRejectingCompleted => PublicState::Rejecting,
            Self::Rejected => PublicState::Rejected,
            Self::Calibrating | Self::CheckingCalibrationCompleted => PublicState::Calibrating,
            Self::ErrorJammed => PublicState::Jammed,
            Self::ErrorBothSidesHavePaper => PublicState::BothSidesHavePaper,
            Self::Error(_) => PublicState::RecoveringFromError,
            Self::UnrecoverableError => PublicState::UnrecoverableError,
        }
    }
}

/// Represents a single state transition with timestamp.
///
/// # Serialization Note
///
/// The `timestamp` field is not serialized as `Instant` is process-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// The state transitioned from.
    pub from: ScannerState,

    /// The state transitioned to.
    pub to: ScannerState,

    /// Name of the event that caused the transition.
    pub event: String,

    /// When the transition occurred.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: ScannerState, to: ScannerState, event: impl Into<String>) -> Self {
        Self {
            from,
            to,
            event: event.into(),
            timestamp: Instant::now(),
        }
    }

    /// Get the duration since this transition occurred.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Bounded record of recent transitions, oldest first.
#[derive(Debug, Clone)]
pub struct TransitionHistory {
    transitions: VecDeque<StateTransition>,
}

impl TransitionHistory {
    pub fn new() -> Self {
        Self {
            transitions: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn record(&mut self, transition: StateTransition) {
        if self.transitions.len() >= MAX_HISTORY_SIZE {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateTransition> {
        self.transitions.iter()
    }

    pub fn last(&self) -> Option<&StateTransition> {
        self.transitions.back()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// States entered, oldest first.
    pub fn visited(&self) -> Vec<ScannerState> {
        self.transitions.iter().map(|t| t.to).collect()
    }
}

impl Default for TransitionHistory {
    fn default() -> Self {
        Self::new()
    }
}
