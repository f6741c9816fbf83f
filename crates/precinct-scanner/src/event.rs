//! Events consumed by the controller.
//!
//! Events come from three places: the facade (configuration and voter or
//! poll-worker commands), the tasks the current state runs (paper status
//! polls, activity outcomes, timers), and nowhere else. Every event has a
//! stable [`name`](Event::name) that is safe to log; payloads may carry
//! ballot data and are never logged.

use std::fmt;
use std::sync::Arc;

use precinct_core::{InterpretationMode, InterpretationResult, ScannedSheet};
use precinct_hardware::{DriverError, PaperStatusEvent};

use crate::delays::DelayName;
use crate::error::ControllerError;
use crate::state::Activity;
use crate::traits::{SheetInterpreter, SheetStore};

/// Collaborators supplied by `configure`.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub store: Arc<dyn SheetStore>,
    pub interpreter: Arc<dyn SheetInterpreter>,
}

/// Commands from the voter or poll worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Scan,
    Accept,
    Return,
    Calibrate,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Accept => "accept",
            Self::Return => "return",
            Self::Calibrate => "calibrate",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of the activity a state ran.
#[derive(Debug, Clone)]
pub enum ActivityOutcome {
    Connect(Result<(), DriverError>),
    Disconnect(Result<(), DriverError>),
    Kill(Result<(), DriverError>),
    Scan(Result<ScannedSheet, DriverError>),
    Interpret(Result<InterpretationResult, ControllerError>),
    Accept(Result<(), DriverError>),
    Reject(Result<(), DriverError>),
    Calibrate(Result<(), DriverError>),
}

impl ActivityOutcome {
    /// The activity that produced this outcome.
    pub fn activity(&self) -> Activity {
        match self {
            Self::Connect(_) => Activity::Connect,
            Self::Disconnect(_) => Activity::Disconnect,
            Self::Kill(_) => Activity::Kill,
            Self::Scan(_) => Activity::Scan,
            Self::Interpret(_) => Activity::Interpret,
            Self::Accept(_) => Activity::Accept,
            Self::Reject(_) => Activity::Reject,
            Self::Calibrate(_) => Activity::Calibrate,
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Self::Scan(result) => result.is_ok(),
            Self::Interpret(result) => result.is_ok(),
            Self::Connect(result)
            | Self::Disconnect(result)
            | Self::Kill(result)
            | Self::Accept(result)
            | Self::Reject(result)
            | Self::Calibrate(result) => result.is_ok(),
        }
    }

    pub fn name(&self) -> &'static str {
        match (self.activity(), self.is_ok()) {
            (Activity::Connect, true) => "connect.done",
            (Activity::Connect, false) => "connect.error",
            (Activity::Disconnect, true) => "disconnect.done",
            (Activity::Disconnect, false) => "disconnect.error",
            (Activity::Kill, true) => "kill.done",
            (Activity::Kill, false) => "kill.error",
            (Activity::Scan, true) => "scan.done",
            (Activity::Scan, false) => "scan.error",
            (Activity::Interpret, true) => "interpret.done",
            (Activity::Interpret, false) => "interpret.error",
            (Activity::Accept, true) => "accept.done",
            (Activity::Accept, false) => "accept.error",
            (Activity::Reject, true) => "reject.done",
            (Activity::Reject, false) => "reject.error",
            (Activity::Calibrate, true) => "calibrate.done",
            (Activity::Calibrate, false) => "calibrate.error",
        }
    }
}

/// Everything the reducer reacts to.
#[derive(Debug, Clone)]
pub enum Event {
    Configure(Configuration),
    Unconfigure,
    Paper(PaperStatusEvent),
    Command(Command),
    SetInterpretationMode(InterpretationMode),
    Activity(ActivityOutcome),
    /// The poller hit an error it could not map to a paper status event.
    PollFailed(ControllerError),
    Timer(DelayName),
    /// Recording an accepted sheet failed.
    StoreFailed(ControllerError),
}

impl Event {
    /// Name safe to log. Never includes payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure(_) => "configure",
            Self::Unconfigure => "unconfigure",
            Self::Paper(event) => event.name(),
            Self::Command(command) => command.as_str(),
            Self::SetInterpretationMode(_) => "set_interpretation_mode",
            Self::Activity(outcome) => outcome.name(),
            Self::PollFailed(_) => "paper_status.error",
            Self::Timer(delay) => delay.as_str(),
            Self::StoreFailed(_) => "store.error",
        }
    }
}

impl From<PaperStatusEvent> for Event {
    fn from(event: PaperStatusEvent) -> Self {
        Self::Paper(event)
    }
}

impl From<Command> for Event {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl From<ActivityOutcome> for Event {
    fn from(outcome: ActivityOutcome) -> Self {
        Self::Activity(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_hide_payloads() {
        let scan = Event::Activity(ActivityOutcome::Scan(Err(DriverError::ErrorFeeding)));
        assert_eq!(scan.name(), "scan.error");

        let interpret = Event::Activity(ActivityOutcome::Interpret(Ok(InterpretationResult::skipped())));
        assert_eq!(interpret.name(), "interpret.done");

        assert_eq!(Event::from(PaperStatusEvent::ReadyToEject).name(), "scanner_ready_to_eject");
        assert_eq!(Event::from(Command::Return).name(), "return");
        assert_eq!(Event::Timer(DelayName::ScanningTimeout).name(), "scanning_timeout");
        let stored = Event::StoreFailed(ControllerError::Interpreter("sheet 42".to_string()));
        assert_eq!(stored.name(), "store.error");
    }

    #[test]
    fn test_outcome_activity() {
        assert_eq!(ActivityOutcome::Reject(Ok(())).activity(), Activity::Reject);
        assert!(!ActivityOutcome::Kill(Err(DriverError::other("stuck"))).is_ok());
    }
}
