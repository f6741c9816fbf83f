//! The transition table.
//!
//! [`apply_event`] is a pure reducer: given the current state, the context and
//! an event, it mutates the context and returns the next state together with
//! the [`Effect`]s the runtime must carry out. It never touches the driver,
//! the store or a clock, so every transition can be tested synchronously.
//!
//! Each state first gets a chance to handle an event itself. Events a state
//! does not handle fall through to the global handlers (`Disconnected`, `Jam`,
//! `BothSidesHavePaper`, configuration, stale commands). Anything neither
//! handles is an unexpected event and sends the machine into error recovery.

use std::sync::Arc;

use precinct_core::constants::MAX_FAILED_SCAN_ATTEMPTS;
use precinct_core::{Classification, InterpretationMode, InterpretationResult, ScannedSheet};
use precinct_hardware::PaperStatusEvent;
use tracing::debug;

use crate::delays::DelayName;
use crate::error::{ControllerError, ScannerFault};
use crate::event::{ActivityOutcome, Command, Configuration, Event};
use crate::state::{RecoveryStep, ScannerState, StateTransition, TransitionHistory};
use crate::traits::{SheetInterpreter, SheetStore};

/// Data carried across states.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub store: Option<Arc<dyn SheetStore>>,
    pub interpreter: Option<Arc<dyn SheetInterpreter>>,
    pub scanned_sheet: Option<ScannedSheet>,
    pub interpretation: Option<InterpretationResult>,
    pub error: Option<ControllerError>,
    pub interpretation_mode: InterpretationMode,
    pub failed_scan_attempts: u32,
    /// Outcome of the last calibration, cleared when a new one starts.
    pub calibration: Option<Result<(), ControllerError>>,
}

impl Context {
    pub fn is_configured(&self) -> bool {
        self.store.is_some() && self.interpreter.is_some()
    }

    fn clear_sheet(&mut self) {
        self.scanned_sheet = None;
        self.interpretation = None;
    }

    fn fail(&mut self, error: impl Into<ControllerError>, next: ScannerState) -> Step {
        self.error = Some(error.into());
        Step::Go(next)
    }
}

/// Work the runtime performs after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Tear down the current state's tasks and start those of this state.
    Enter(ScannerState),

    /// Move to a sibling phase of the same state. Running tasks are kept.
    Shift(ScannerState),

    /// Persist the current interpretation to the store.
    RecordAcceptedSheet,
}

/// Result of reducing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub state: ScannerState,
    pub effects: Vec<Effect>,
}

impl Outcome {
    fn stay(state: ScannerState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    /// Whether the event was handled without leaving the state.
    pub fn is_internal(&self) -> bool {
        self.effects.is_empty()
    }

    /// States entered, in order.
    pub fn entered(&self) -> impl Iterator<Item = ScannerState> + '_ {
        self.effects.iter().filter_map(|effect| match effect {
            Effect::Enter(state) | Effect::Shift(state) => Some(*state),
            Effect::RecordAcceptedSheet => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stay,
    Go(ScannerState),
    Shift(ScannerState),
    Unhandled,
}

/// Outcome of starting the machine in [`ScannerState::Connecting`].
pub fn start(ctx: &mut Context) -> Outcome {
    let mut outcome = Outcome::stay(ScannerState::Connecting);
    enter(ScannerState::Connecting, ctx, &mut outcome);
    outcome
}

/// Reduce one event.
pub fn apply_event(state: ScannerState, ctx: &mut Context, event: &Event) -> Outcome {
    let step = match on_state_event(state, ctx, event) {
        Step::Unhandled => on_global_event(state, ctx, event),
        step => step,
    };

    let mut outcome = Outcome::stay(state);
    match step {
        Step::Stay | Step::Unhandled => {}
        Step::Shift(next) => {
            outcome.state = next;
            outcome.effects.push(Effect::Shift(next));
        }
        Step::Go(next) => enter(next, ctx, &mut outcome),
    }

    if outcome.state == ScannerState::WaitingForConfiguration && ctx.is_configured() {
        enter(ScannerState::CheckingInitialPaperStatus, ctx, &mut outcome);
    }
    outcome
}

fn enter(state: ScannerState, ctx: &mut Context, outcome: &mut Outcome) {
    use ScannerState as S;

    match state {
        S::ErrorDisconnected => ctx.clear_sheet(),
        S::NoPaper | S::ReadyToScan | S::Scanning => {
            ctx.error = None;
            ctx.clear_sheet();
        }
        S::ErrorScanning => ctx.failed_scan_attempts = ctx.failed_scan_attempts.saturating_add(1),
        S::Calibrating => {
            ctx.error = None;
            ctx.calibration = None;
        }
        S::ErrorBothSidesHavePaper | S::Accepted { .. } => ctx.error = None,
        _ => {}
    }

    outcome.state = state;
    outcome.effects.push(Effect::Enter(state));
    if matches!(state, S::Accepted { .. }) {
        outcome.effects.push(Effect::RecordAcceptedSheet);
    }
}

fn on_state_event(state: ScannerState, ctx: &mut Context, event: &Event) -> Step {
    use ActivityOutcome as Done;
    use PaperStatusEvent as Paper;
    use ScannerState as S;
    use Step::{Go, Stay, Unhandled};

    match (state, event) {
        (S::UnrecoverableError, _) => Stay,

        // Connection
        (S::Connecting | S::Reconnecting, Event::Activity(Done::Connect(result))) => match result {
            Ok(()) => {
                ctx.error = None;
                Go(S::WaitingForConfiguration)
            }
            Err(error) => ctx.fail(error.clone(), S::ErrorDisconnected),
        },
        (S::ErrorDisconnected, Event::Activity(Done::Disconnect(_))) => Stay,
        (S::ErrorDisconnected, Event::Timer(DelayName::Reconnect)) => Go(S::Reconnecting),

        // Setup
        (S::CheckingInitialPaperStatus, Event::Paper(paper)) => match paper {
            Paper::NoPaper => Go(S::NoPaper),
            Paper::ReadyToScan => ctx.fail(ScannerFault::PaperInFrontAfterReconnect, S::Rejected),
            Paper::ReadyToEject => ctx.fail(ScannerFault::PaperInBackAfterReconnect, S::Rejecting),
            _ => Unhandled,
        },

        // Idle
        (S::NoPaper, Event::Paper(Paper::NoPaper)) => Stay,
        (S::NoPaper, Event::Paper(Paper::ReadyToScan)) => Go(S::ReadyToScan),
        (S::ReadyToScan, Event::Paper(Paper::NoPaper)) => Go(S::NoPaper),
        (S::ReadyToScan, Event::Paper(Paper::ReadyToScan)) => Stay,
        (S::ReadyToScan, Event::Command(Command::Scan)) => {
            ctx.failed_scan_attempts = 0;
            Go(S::Scanning)
        }
        (S::ReadyToScan, Event::Command(Command::Calibrate)) => Go(S::Calibrating),

        // Scanning
        (S::Scanning, Event::Activity(Done::Scan(Ok(sheet)))) => {
            ctx.scanned_sheet = Some(sheet.clone());
            Go(S::CheckingScanningCompleted)
        }
        (S::Scanning, Event::Activity(Done::Scan(Err(error)))) => {
            let next = if error.is_retryable_scan_failure() {
                S::ErrorScanning
            } else if error.is_unrecoverable() {
                S::UnrecoverableError
            } else {
                S::Error(RecoveryStep::Disconnecting)
            };
            ctx.fail(error.clone(), next)
        }
        (S::Scanning, Event::Timer(DelayName::ScanningTimeout)) => {
            ctx.fail(ScannerFault::ScanningTimedOut, S::Error(RecoveryStep::Disconnecting))
        }
        (S::CheckingScanningCompleted, Event::Paper(paper)) => match paper {
            Paper::ReadyToEject => Go(S::Interpreting),
            Paper::NoPaper | Paper::ReadyToScan => Go(S::ErrorScanning),
            _ => Unhandled,
        },
        (S::ErrorScanning, Event::Paper(paper)) => match paper {
            Paper::ReadyToScan if ctx.failed_scan_attempts < MAX_FAILED_SCAN_ATTEMPTS => Go(S::Scanning),
            Paper::ReadyToScan => ctx.fail(ScannerFault::ScanningFailed, S::Rejected),
            Paper::NoPaper => Go(S::NoPaper),
            Paper::ReadyToEject => Go(S::Rejecting),
            _ => Unhandled,
        },
        (S::Interpreting, Event::Activity(Done::Interpret(result))) => match result {
            Ok(interpretation) => {
                let next = match interpretation.classification() {
                    Classification::Valid => S::ReadyToAccept,
                    Classification::Invalid { .. } => S::Rejecting,
                    Classification::NeedsReview { .. } => S::NeedsReview,
                };
                ctx.interpretation = Some(interpretation.clone());
                Go(next)
            }
            Err(error) => ctx.fail(error.clone(), S::Rejecting),
        },

        // Accept path
        (S::ReadyToAccept, Event::Command(Command::Accept)) => Go(S::Accepting { after_review: false }),
        (S::Accepting { after_review }, Event::Activity(Done::Accept(result))) => {
            if let Err(error) = result {
                ctx.error = Some(error.clone().into());
            }
            Go(S::CheckingAcceptingCompleted { after_review })
        }
        (S::CheckingAcceptingCompleted { .. }, Event::Paper(paper)) => match paper {
            Paper::NoPaper | Paper::ReadyToScan => Go(S::Accepted {
                ready_for_next_ballot: false,
            }),
            Paper::ReadyToEject => Stay,
            _ => Unhandled,
        },
        (S::CheckingAcceptingCompleted { .. }, Event::Timer(DelayName::AcceptingTimeout)) => {
            ctx.fail(ScannerFault::PaperInBackAfterAccept, S::Rejecting)
        }
        (S::Accepted { .. }, Event::Paper(Paper::NoPaper)) => Stay,
        (
            S::Accepted {
                ready_for_next_ballot: false,
            },
            Event::Paper(Paper::ReadyToScan),
        ) => Stay,
        (
            S::Accepted {
                ready_for_next_ballot: true,
            },
            Event::Paper(Paper::ReadyToScan),
        ) => Go(S::ReadyToScan),
        (
            S::Accepted {
                ready_for_next_ballot: false,
            },
            Event::Timer(DelayName::AcceptedReadyForNextBallot),
        ) => Step::Shift(S::Accepted {
            ready_for_next_ballot: true,
        }),
        (S::Accepted { .. }, Event::Timer(DelayName::AcceptedResetToNoPaper)) => Go(S::NoPaper),

        // Review
        (S::NeedsReview, Event::Command(Command::Accept)) => Go(S::Accepting { after_review: true }),
        (S::NeedsReview, Event::Command(Command::Return)) => Go(S::Returning),
        (S::NeedsReview, Event::Paper(Paper::ReadyToEject)) => Stay,

        // Return and reject paths
        (S::Returning | S::Rejecting, Event::Activity(Done::Reject(result))) => match result {
            Ok(()) if state == S::Returning => Go(S::CheckingReturningCompleted),
            Ok(()) => Go(S::CheckingRejectingCompleted),
            Err(error) => ctx.fail(error.clone(), S::ErrorJammed),
        },
        (S::CheckingReturningCompleted | S::CheckingRejectingCompleted, Event::Paper(paper)) => match paper {
            Paper::NoPaper => Stay,
            Paper::ReadyToScan if state == S::CheckingReturningCompleted => Go(S::Returned),
            Paper::ReadyToScan => Go(S::Rejected),
            Paper::ReadyToEject => Go(S::ErrorJammed),
            _ => Unhandled,
        },
        (
            S::CheckingReturningCompleted | S::CheckingRejectingCompleted,
            Event::Timer(DelayName::WaitForHoldAfterReject),
        ) => Go(S::NoPaper),
        (S::Returned | S::Rejected, Event::Paper(Paper::ReadyToScan)) => Stay,
        (S::Returned | S::Rejected, Event::Paper(Paper::NoPaper)) => Go(S::NoPaper),

        // Calibration
        (S::Calibrating, Event::Activity(Done::Calibrate(result))) => {
            let result = result.clone().map_err(ControllerError::from);
            if let Err(error) = &result {
                ctx.error = Some(error.clone());
            }
            ctx.calibration = Some(result);
            Go(S::CheckingCalibrationCompleted)
        }
        (S::CheckingCalibrationCompleted, Event::Paper(paper)) => match paper {
            Paper::NoPaper => Go(S::NoPaper),
            Paper::ReadyToScan => Go(S::ReadyToScan),
            _ => Unhandled,
        },

        // Hardware conditions
        (S::ErrorJammed, Event::Paper(paper)) => match paper {
            Paper::NoPaper => Go(S::NoPaper),
            Paper::Jam | Paper::ReadyToScan | Paper::ReadyToEject => Stay,
            _ => Unhandled,
        },
        (S::ErrorBothSidesHavePaper, Event::Paper(paper)) => match paper {
            Paper::BothSidesHavePaper => Stay,
            Paper::ReadyToEject | Paper::NoPaper => ctx.fail(ScannerFault::BothSidesHavePaper, S::Rejecting),
            _ => Unhandled,
        },

        // Error recovery
        (S::Error(RecoveryStep::Disconnecting), Event::Activity(Done::Disconnect(result))) => match result {
            Ok(()) => Go(S::Error(RecoveryStep::CoolingOff)),
            Err(_) => Go(S::Error(RecoveryStep::Killing)),
        },
        (S::Error(RecoveryStep::Disconnecting), Event::Timer(DelayName::KillAfterDisconnectTimeout)) => {
            Go(S::Error(RecoveryStep::Killing))
        }
        (S::Error(RecoveryStep::Killing), Event::Activity(Done::Kill(result))) => match result {
            Ok(()) => Go(S::Error(RecoveryStep::CoolingOff)),
            Err(_) => Go(S::UnrecoverableError),
        },
        (S::Error(RecoveryStep::CoolingOff), Event::Timer(DelayName::ReconnectOnUnexpectedError)) => {
            Go(S::Error(RecoveryStep::Reconnecting))
        }
        (S::Error(RecoveryStep::Reconnecting), Event::Activity(Done::Connect(result))) => match result {
            Ok(()) => {
                ctx.error = None;
                Go(S::WaitingForConfiguration)
            }
            Err(_) => Go(S::UnrecoverableError),
        },

        _ => Unhandled,
    }
}

fn on_global_event(state: ScannerState, ctx: &mut Context, event: &Event) -> Step {
    use ScannerState as S;

    match event {
        Event::Configure(Configuration { store, interpreter }) => {
            ctx.store = Some(Arc::clone(store));
            ctx.interpreter = Some(Arc::clone(interpreter));
            Step::Stay
        }
        Event::Unconfigure => {
            ctx.store = None;
            ctx.interpreter = None;
            Step::Go(S::WaitingForConfiguration)
        }
        Event::SetInterpretationMode(mode) => {
            ctx.interpretation_mode = *mode;
            Step::Stay
        }
        Event::Command(command) => {
            debug!("Ignoring {} command in {}", command, state);
            Step::Stay
        }
        Event::Paper(PaperStatusEvent::Disconnected) => Step::Go(S::ErrorDisconnected),
        Event::Paper(PaperStatusEvent::BothSidesHavePaper) => Step::Go(S::ErrorBothSidesHavePaper),
        Event::Paper(PaperStatusEvent::Jam) => Step::Go(S::ErrorJammed),
        Event::PollFailed(error) => ctx.fail(error.clone(), S::Error(RecoveryStep::Disconnecting)),
        Event::StoreFailed(error) => {
            ctx.error = Some(error.clone());
            Step::Stay
        }
        Event::Paper(_) | Event::Activity(_) | Event::Timer(_) => ctx.fail(
            ScannerFault::unexpected_event(event.name()),
            S::Error(RecoveryStep::Disconnecting),
        ),
    }
}

/// The reducer together with the current state and its history.
#[derive(Debug, Clone)]
pub struct Machine {
    state: ScannerState,
    context: Context,
    history: TransitionHistory,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            state: ScannerState::Connecting,
            context: Context::default(),
            history: TransitionHistory::new(),
        }
    }

    /// Enter the initial state.
    pub fn start(&mut self) -> Outcome {
        let outcome = start(&mut self.context);
        self.state = outcome.state;
        outcome
    }

    /// Reduce an event, recording every state entered.
    pub fn dispatch(&mut self, event: &Event) -> Outcome {
        let outcome = apply_event(self.state, &mut self.context, event);
        let mut from = self.state;
        for to in outcome.entered() {
            self.history.record(StateTransition::new(from, to, event.name()));
            from = to;
        }
        self.state = outcome.state;
        outcome
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn history(&self) -> &TransitionHistory {
        &self.history
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemorySheetStore, ScriptedInterpreter};
    use precinct_core::{AdjudicationKind, AdjudicationReason, InvalidSheetReason, SheetId, SheetInterpretation, SheetOf};
    use precinct_hardware::DriverError;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::path::PathBuf;

    use ScannerState as S;

    fn configuration() -> Configuration {
        Configuration {
            store: Arc::new(MemorySheetStore::new()),
            interpreter: Arc::new(ScriptedInterpreter::new()),
        }
    }

    fn configured() -> Context {
        let Configuration { store, interpreter } = configuration();
        Context {
            store: Some(store),
            interpreter: Some(interpreter),
            ..Context::default()
        }
    }

    fn paper(event: PaperStatusEvent) -> Event {
        Event::Paper(event)
    }

    fn sheet() -> ScannedSheet {
        SheetOf::new(PathBuf::from("f.jpg"), PathBuf::from("b.jpg"))
    }

    fn interpreted(classification: Classification) -> Event {
        let interpretation = SheetInterpretation {
            classification,
            ..SheetInterpretation::blank_valid()
        };
        Event::Activity(ActivityOutcome::Interpret(Ok(InterpretationResult::new(
            SheetId::generate(),
            interpretation,
        ))))
    }

    fn run(mut state: ScannerState, ctx: &mut Context, events: &[Event]) -> (ScannerState, Vec<Effect>) {
        let mut effects = Vec::new();
        for event in events {
            let outcome = apply_event(state, ctx, event);
            state = outcome.state;
            effects.extend(outcome.effects);
        }
        (state, effects)
    }

    fn error_tag(ctx: &Context) -> Option<&'static str> {
        ctx.error.as_ref().map(ControllerError::tag)
    }

    #[test]
    fn test_waits_for_configuration_after_connect() {
        let mut ctx = Context::default();
        let started = start(&mut ctx);
        assert_eq!(started.effects, vec![Effect::Enter(S::Connecting)]);

        let outcome = apply_event(S::Connecting, &mut ctx, &Event::Activity(ActivityOutcome::Connect(Ok(()))));
        assert_eq!(outcome.state, S::WaitingForConfiguration);

        let outcome = apply_event(outcome.state, &mut ctx, &Event::Configure(configuration()));
        assert_eq!(outcome.state, S::CheckingInitialPaperStatus);
        assert_eq!(outcome.effects, vec![Effect::Enter(S::CheckingInitialPaperStatus)]);
    }

    #[test]
    fn test_configure_before_connect_passes_gate_immediately() {
        let mut ctx = Context::default();
        let outcome = apply_event(S::Connecting, &mut ctx, &Event::Configure(configuration()));
        assert!(outcome.is_internal());

        let outcome = apply_event(S::Connecting, &mut ctx, &Event::Activity(ActivityOutcome::Connect(Ok(()))));
        assert_eq!(
            outcome.effects,
            vec![
                Effect::Enter(S::WaitingForConfiguration),
                Effect::Enter(S::CheckingInitialPaperStatus)
            ]
        );
    }

    #[test]
    fn test_happy_path_records_sheet_once() {
        let mut ctx = configured();
        let events = [
            paper(PaperStatusEvent::NoPaper),
            paper(PaperStatusEvent::ReadyToScan),
            Event::Command(Command::Scan),
            Event::Activity(ActivityOutcome::Scan(Ok(sheet()))),
            paper(PaperStatusEvent::ReadyToEject),
            interpreted(Classification::Valid),
            Event::Command(Command::Accept),
            Event::Activity(ActivityOutcome::Accept(Ok(()))),
            paper(PaperStatusEvent::ReadyToEject),
            paper(PaperStatusEvent::NoPaper),
            paper(PaperStatusEvent::NoPaper),
            paper(PaperStatusEvent::ReadyToScan),
            Event::Timer(DelayName::AcceptedReadyForNextBallot),
            paper(PaperStatusEvent::NoPaper),
            Event::Timer(DelayName::AcceptedResetToNoPaper),
        ];
        let (state, effects) = run(S::CheckingInitialPaperStatus, &mut ctx, &events);

        assert_eq!(state, S::NoPaper);
        let records = effects.iter().filter(|e| **e == Effect::RecordAcceptedSheet).count();
        assert_eq!(records, 1);
        assert!(effects.contains(&Effect::Shift(S::Accepted {
            ready_for_next_ballot: true
        })));
        assert!(ctx.interpretation.is_none());
    }

    #[rstest]
    #[case(Classification::Valid, S::ReadyToAccept)]
    #[case(Classification::Invalid { reason: InvalidSheetReason::WrongElection }, S::Rejecting)]
    #[case(Classification::NeedsReview { reasons: vec![AdjudicationReason::new(AdjudicationKind::Overvote)] }, S::NeedsReview)]
    fn test_classification_routes_deterministically(
        #[case] classification: Classification,
        #[case] expected: ScannerState,
    ) {
        for _ in 0..3 {
            let mut ctx = configured();
            let outcome = apply_event(S::Interpreting, &mut ctx, &interpreted(classification.clone()));
            assert_eq!(outcome.state, expected);
            assert_eq!(ctx.interpretation.as_ref().map(|i| i.classification()), Some(&classification));
        }
    }

    #[test]
    fn test_interpretation_failure_rejects() {
        let mut ctx = configured();
        let event = Event::Activity(ActivityOutcome::Interpret(Err(ControllerError::Interpreter("bad".into()))));
        let outcome = apply_event(S::Interpreting, &mut ctx, &event);
        assert_eq!(outcome.state, S::Rejecting);
        assert_eq!(error_tag(&ctx), Some("scanner_error"));
    }

    #[test]
    fn test_no_paper_entry_clears_context() {
        let mut ctx = configured();
        ctx.scanned_sheet = Some(sheet());
        ctx.interpretation = Some(InterpretationResult::skipped());
        ctx.error = Some(ScannerFault::ScanningFailed.into());

        let outcome = apply_event(S::Rejected, &mut ctx, &paper(PaperStatusEvent::NoPaper));
        assert_eq!(outcome.state, S::NoPaper);
        assert!(ctx.scanned_sheet.is_none());
        assert!(ctx.interpretation.is_none());
        assert!(ctx.error.is_none());

        let again = apply_event(S::NoPaper, &mut ctx, &paper(PaperStatusEvent::NoPaper));
        assert!(again.is_internal());
        assert_eq!(again.state, S::NoPaper);
    }

    #[rstest]
    #[case(S::NoPaper, PaperStatusEvent::NoPaper)]
    #[case(S::ReadyToScan, PaperStatusEvent::ReadyToScan)]
    #[case(S::NeedsReview, PaperStatusEvent::ReadyToEject)]
    #[case(S::Rejected, PaperStatusEvent::ReadyToScan)]
    #[case(S::Returned, PaperStatusEvent::ReadyToScan)]
    #[case(S::ErrorJammed, PaperStatusEvent::Jam)]
    #[case(S::ErrorBothSidesHavePaper, PaperStatusEvent::BothSidesHavePaper)]
    #[case(S::CheckingAcceptingCompleted { after_review: false }, PaperStatusEvent::ReadyToEject)]
    fn test_duplicate_status_never_reenters(#[case] state: ScannerState, #[case] status: PaperStatusEvent) {
        let mut ctx = configured();
        for _ in 0..5 {
            let outcome = apply_event(state, &mut ctx, &paper(status));
            assert_eq!(outcome.state, state);
            assert!(outcome.is_internal());
        }
    }

    #[rstest]
    #[case(DriverError::ErrorFeeding, S::ErrorScanning)]
    #[case(DriverError::NoPaper, S::ErrorScanning)]
    #[case(DriverError::IncompleteScan { files: 1 }, S::UnrecoverableError)]
    #[case(DriverError::io("usb reset"), S::Error(RecoveryStep::Disconnecting))]
    fn test_scan_failure_classification(#[case] error: DriverError, #[case] expected: ScannerState) {
        let mut ctx = configured();
        let outcome = apply_event(S::Scanning, &mut ctx, &Event::Activity(ActivityOutcome::Scan(Err(error))));
        assert_eq!(outcome.state, expected);
    }

    #[test]
    fn test_scan_retry_ceiling_rejects_sheet() {
        let mut ctx = configured();
        let mut state = apply_event(S::ReadyToScan, &mut ctx, &Event::Command(Command::Scan)).state;
        let mut attempts = 0;

        while state == S::Scanning {
            attempts += 1;
            state = apply_event(state, &mut ctx, &Event::Activity(ActivityOutcome::Scan(Err(DriverError::ErrorFeeding)))).state;
            assert_eq!(state, S::ErrorScanning);
            state = apply_event(state, &mut ctx, &paper(PaperStatusEvent::ReadyToScan)).state;
        }

        assert_eq!(attempts, MAX_FAILED_SCAN_ATTEMPTS);
        assert_eq!(state, S::Rejected);
        assert_eq!(error_tag(&ctx), Some("scanning_failed"));
    }

    #[test]
    fn test_scan_command_resets_attempts() {
        let mut ctx = configured();
        ctx.failed_scan_attempts = 7;
        apply_event(S::ReadyToScan, &mut ctx, &Event::Command(Command::Scan));
        assert_eq!(ctx.failed_scan_attempts, 0);
    }

    #[test]
    fn test_scanning_timeout_enters_recovery() {
        let mut ctx = configured();
        let outcome = apply_event(S::Scanning, &mut ctx, &Event::Timer(DelayName::ScanningTimeout));
        assert_eq!(outcome.state, S::Error(RecoveryStep::Disconnecting));
        assert_eq!(error_tag(&ctx), Some("scanning_timed_out"));
    }

    #[rstest]
    #[case(PaperStatusEvent::NoPaper, S::NoPaper, None)]
    #[case(PaperStatusEvent::ReadyToScan, S::Rejected, Some("paper_in_front_after_reconnect"))]
    #[case(PaperStatusEvent::ReadyToEject, S::Rejecting, Some("paper_in_back_after_reconnect"))]
    fn test_initial_paper_checks(
        #[case] status: PaperStatusEvent,
        #[case] expected: ScannerState,
        #[case] tag: Option<&str>,
    ) {
        let mut ctx = configured();
        let outcome = apply_event(S::CheckingInitialPaperStatus, &mut ctx, &paper(status));
        assert_eq!(outcome.state, expected);
        assert_eq!(error_tag(&ctx), tag);
    }

    #[test]
    fn test_accept_failure_still_checks_for_drop() {
        let mut ctx = configured();
        let failed = Event::Activity(ActivityOutcome::Accept(Err(DriverError::other("nak"))));
        let outcome = apply_event(S::Accepting { after_review: true }, &mut ctx, &failed);
        assert_eq!(outcome.state, S::CheckingAcceptingCompleted { after_review: true });

        assert_eq!(error_tag(&ctx), Some("scanner_error"));

        let outcome = apply_event(outcome.state, &mut ctx, &paper(PaperStatusEvent::NoPaper));
        assert_eq!(outcome.state, S::Accepted {
            ready_for_next_ballot: false
        });
        assert!(ctx.error.is_none());
    }

    #[test]
    fn test_store_failure_is_recorded_without_leaving_accepted() {
        let mut ctx = configured();
        let accepted = S::Accepted {
            ready_for_next_ballot: false,
        };
        let failed = Event::StoreFailed(
            ScannerFault::StoreFailed {
                message: "disk full".to_string(),
            }
            .into(),
        );

        let outcome = apply_event(accepted, &mut ctx, &failed);
        assert!(outcome.is_internal());
        assert_eq!(outcome.state, accepted);
        assert_eq!(error_tag(&ctx), Some("store_failed"));

        // Survives the move to the next-ballot phase, cleared on return to idle.
        let shifted = apply_event(accepted, &mut ctx, &Event::Timer(DelayName::AcceptedReadyForNextBallot));
        assert_eq!(error_tag(&ctx), Some("store_failed"));
        let outcome = apply_event(shifted.state, &mut ctx, &Event::Timer(DelayName::AcceptedResetToNoPaper));
        assert_eq!(outcome.state, S::NoPaper);
        assert!(ctx.error.is_none());
    }

    #[test]
    fn test_accept_timeout_rejects() {
        let mut ctx = configured();
        let outcome = apply_event(
            S::CheckingAcceptingCompleted { after_review: false },
            &mut ctx,
            &Event::Timer(DelayName::AcceptingTimeout),
        );
        assert_eq!(outcome.state, S::Rejecting);
        assert_eq!(error_tag(&ctx), Some("paper_in_back_after_accept"));
    }

    #[test]
    fn test_new_sheet_ignored_until_ready_for_next_ballot() {
        let mut ctx = configured();
        let paused = S::Accepted {
            ready_for_next_ballot: false,
        };
        assert!(apply_event(paused, &mut ctx, &paper(PaperStatusEvent::ReadyToScan)).is_internal());

        let shifted = apply_event(paused, &mut ctx, &Event::Timer(DelayName::AcceptedReadyForNextBallot));
        assert_eq!(shifted.effects, vec![Effect::Shift(S::Accepted {
            ready_for_next_ballot: true
        })]);

        let outcome = apply_event(shifted.state, &mut ctx, &paper(PaperStatusEvent::ReadyToScan));
        assert_eq!(outcome.state, S::ReadyToScan);
    }

    #[test]
    fn test_jam_during_return() {
        let mut ctx = configured();
        let events = [
            Event::Command(Command::Return),
            Event::Activity(ActivityOutcome::Reject(Err(DriverError::FeedInvalid))),
            paper(PaperStatusEvent::Jam),
            paper(PaperStatusEvent::NoPaper),
        ];
        let (state, effects) = run(S::NeedsReview, &mut ctx, &events);
        assert_eq!(state, S::NoPaper);
        assert!(effects.contains(&Effect::Enter(S::ErrorJammed)));
    }

    #[test]
    fn test_paper_still_in_back_after_return_is_a_jam() {
        let mut ctx = configured();
        let outcome = apply_event(S::CheckingReturningCompleted, &mut ctx, &paper(PaperStatusEvent::ReadyToEject));
        assert_eq!(outcome.state, S::ErrorJammed);
    }

    #[test]
    fn test_hold_not_confirmed_falls_back_to_no_paper() {
        let mut ctx = configured();
        let outcome = apply_event(
            S::CheckingRejectingCompleted,
            &mut ctx,
            &Event::Timer(DelayName::WaitForHoldAfterReject),
        );
        assert_eq!(outcome.state, S::NoPaper);
    }

    #[rstest]
    #[case(PaperStatusEvent::ReadyToEject)]
    #[case(PaperStatusEvent::NoPaper)]
    fn test_double_feed_rejects_back_sheet(#[case] front_removed: PaperStatusEvent) {
        let mut ctx = configured();
        let events = [
            paper(PaperStatusEvent::BothSidesHavePaper),
            paper(PaperStatusEvent::BothSidesHavePaper),
            paper(front_removed),
        ];
        let (state, _) = run(S::CheckingScanningCompleted, &mut ctx, &events);
        assert_eq!(state, S::Rejecting);
        assert_eq!(error_tag(&ctx), Some("both_sides_have_paper"));
    }

    #[test]
    fn test_calibration_failure_is_recorded_not_fatal() {
        let mut ctx = configured();
        let events = [
            Event::Command(Command::Calibrate),
            Event::Activity(ActivityOutcome::Calibrate(Err(DriverError::other("no blank sheet")))),
        ];
        let (state, _) = run(S::ReadyToScan, &mut ctx, &events);
        assert_eq!(state, S::CheckingCalibrationCompleted);
        assert!(matches!(ctx.calibration, Some(Err(_))));

        let outcome = apply_event(state, &mut ctx, &paper(PaperStatusEvent::ReadyToScan));
        assert_eq!(outcome.state, S::ReadyToScan);
        assert!(matches!(ctx.calibration, Some(Err(_))));
    }

    #[test]
    fn test_recovery_kill_then_reconnect() {
        let mut ctx = configured();
        ctx.error = Some(ScannerFault::ScanningTimedOut.into());
        let events = [
            Event::Timer(DelayName::KillAfterDisconnectTimeout),
            Event::Activity(ActivityOutcome::Kill(Ok(()))),
            Event::Timer(DelayName::ReconnectOnUnexpectedError),
        ];
        let (state, _) = run(S::Error(RecoveryStep::Disconnecting), &mut ctx, &events);
        assert_eq!(state, S::Error(RecoveryStep::Reconnecting));
        assert_eq!(error_tag(&ctx), Some("scanning_timed_out"));

        let outcome = apply_event(state, &mut ctx, &Event::Activity(ActivityOutcome::Connect(Ok(()))));
        assert_eq!(outcome.state, S::CheckingInitialPaperStatus);
        assert!(ctx.error.is_none());
    }

    #[rstest]
    #[case(S::Error(RecoveryStep::Killing), Event::Activity(ActivityOutcome::Kill(Err(DriverError::other("zombie")))))]
    #[case(S::Error(RecoveryStep::Reconnecting), Event::Activity(ActivityOutcome::Connect(Err(DriverError::disconnected("scanner")))))]
    fn test_failed_recovery_is_unrecoverable(#[case] state: ScannerState, #[case] event: Event) {
        let mut ctx = configured();
        assert_eq!(apply_event(state, &mut ctx, &event).state, S::UnrecoverableError);
    }

    #[test]
    fn test_unrecoverable_error_absorbs_everything() {
        let mut ctx = configured();
        for event in [
            paper(PaperStatusEvent::Disconnected),
            Event::Unconfigure,
            Event::Command(Command::Scan),
            Event::Timer(DelayName::Reconnect),
        ] {
            assert!(apply_event(S::UnrecoverableError, &mut ctx, &event).is_internal());
        }
        assert!(ctx.is_configured());
    }

    #[test]
    fn test_stale_commands_are_ignored() {
        let mut ctx = configured();
        for command in [Command::Scan, Command::Accept, Command::Return, Command::Calibrate] {
            let outcome = apply_event(S::NoPaper, &mut ctx, &Event::Command(command));
            assert_eq!(outcome.state, S::NoPaper);
            assert!(outcome.is_internal());
        }
    }

    #[test]
    fn test_unconfigure_returns_to_gate() {
        let mut ctx = configured();
        let outcome = apply_event(S::NoPaper, &mut ctx, &Event::Unconfigure);
        assert_eq!(outcome.state, S::WaitingForConfiguration);
        assert!(!ctx.is_configured());
    }

    #[test]
    fn test_machine_records_history() {
        let mut machine = Machine::new();
        machine.start();
        machine.dispatch(&Event::Configure(configuration()));
        machine.dispatch(&Event::Activity(ActivityOutcome::Connect(Ok(()))));
        assert_eq!(machine.state(), S::CheckingInitialPaperStatus);
        assert_eq!(
            machine.history().visited(),
            vec![S::WaitingForConfiguration, S::CheckingInitialPaperStatus]
        );
        assert_eq!(machine.history().last().map(|t| t.event.as_str()), Some("connect.done"));
    }

    #[rstest]
    #[case(S::NoPaper, PaperStatusEvent::ReadyToEject)]
    #[case(S::ReadyToScan, PaperStatusEvent::ReadyToEject)]
    #[case(S::NeedsReview, PaperStatusEvent::NoPaper)]
    #[case(S::NeedsReview, PaperStatusEvent::ReadyToScan)]
    #[case(S::Returned, PaperStatusEvent::ReadyToEject)]
    #[case(S::CheckingCalibrationCompleted, PaperStatusEvent::ReadyToEject)]
    #[case(S::ErrorBothSidesHavePaper, PaperStatusEvent::ReadyToScan)]
    fn test_polling_state_rejects_status_it_does_not_handle(#[case] state: ScannerState, #[case] status: PaperStatusEvent) {
        assert!(state.polls_paper_status());
        let mut ctx = configured();
        let outcome = apply_event(state, &mut ctx, &paper(status));
        assert_eq!(outcome.state, S::Error(RecoveryStep::Disconnecting));
        assert_eq!(error_tag(&ctx), Some("unexpected_event"));
        assert!(matches!(
            ctx.error,
            Some(ControllerError::Fault(ScannerFault::UnexpectedEvent { ref event })) if event == status.name()
        ));
    }

    fn sample_outcomes() -> Vec<ActivityOutcome> {
        vec![
            ActivityOutcome::Connect(Ok(())),
            ActivityOutcome::Disconnect(Ok(())),
            ActivityOutcome::Kill(Ok(())),
            ActivityOutcome::Scan(Ok(sheet())),
            ActivityOutcome::Interpret(Ok(InterpretationResult::skipped())),
            ActivityOutcome::Accept(Ok(())),
            ActivityOutcome::Reject(Ok(())),
            ActivityOutcome::Calibrate(Ok(())),
        ]
    }

    proptest! {
        #[test]
        fn prop_paper_status_outside_polling_states_is_unexpected(
            state in prop::sample::select(ScannerState::ALL.to_vec()),
            status in prop::sample::select(vec![
                PaperStatusEvent::NoPaper,
                PaperStatusEvent::ReadyToScan,
                PaperStatusEvent::ReadyToEject,
            ]),
        ) {
            prop_assume!(!state.polls_paper_status() && state != S::UnrecoverableError);
            let mut ctx = Context::default();
            let outcome = apply_event(state, &mut ctx, &paper(status));
            prop_assert_eq!(outcome.state, S::Error(RecoveryStep::Disconnecting));
            prop_assert_eq!(error_tag(&ctx), Some("unexpected_event"));
        }

        #[test]
        fn prop_outcome_of_another_activity_is_unexpected(
            state in prop::sample::select(ScannerState::ALL.to_vec()),
            outcome in prop::sample::select(sample_outcomes()),
        ) {
            prop_assume!(state != S::UnrecoverableError && state.activity() != Some(outcome.activity()));
            let mut ctx = Context::default();
            let result = apply_event(state, &mut ctx, &Event::Activity(outcome));
            prop_assert_eq!(result.state, S::Error(RecoveryStep::Disconnecting));
            prop_assert_eq!(error_tag(&ctx), Some("unexpected_event"));
        }

        #[test]
        fn prop_timer_a_state_did_not_arm_is_unexpected(
            state in prop::sample::select(ScannerState::ALL.to_vec()),
            delay in prop::sample::select(DelayName::ALL.to_vec()),
        ) {
            prop_assume!(state != S::UnrecoverableError && !state.timers().contains(&delay));
            let mut ctx = Context::default();
            let outcome = apply_event(state, &mut ctx, &Event::Timer(delay));
            prop_assert_eq!(outcome.state, S::Error(RecoveryStep::Disconnecting));
            prop_assert_eq!(error_tag(&ctx), Some("unexpected_event"));
        }

        #[test]
        fn prop_global_hardware_events_reach_their_states(
            state in prop::sample::select(ScannerState::ALL.to_vec()),
        ) {
            prop_assume!(state != S::UnrecoverableError);
            let mut ctx = Context::default();
            let outcome = apply_event(state, &mut ctx, &paper(PaperStatusEvent::Disconnected));
            prop_assert_eq!(outcome.state, S::ErrorDisconnected);
        }
    }
}
