//! The controller runtime.
//!
//! A single task owns the [`Machine`] and the driver. It reduces one event at
//! a time and carries out the resulting effects. Everything that runs while a
//! state is active (its activity, the paper status poller, its timers) is
//! spawned into a [`JoinSet`] owned by the runtime. Entering a new state drops
//! that set, aborting every task, and bumps a generation counter. Tasks tag
//! the messages they post with the generation they were started in, so a
//! result that races a teardown is discarded instead of being applied to the
//! wrong state.
//!
//! A snapshot is published only when the reduction moved the machine or
//! changed its context, so a steady stream of identical polls stays quiet.
//!
//! ```text
//! ┌──────────┐ Request  ┌─────────────────────────────┐
//! │  Facade  │─────────►│          Runtime            │ snapshot ┌──────────┐
//! └──────────┘   mpsc   │  Machine::dispatch(event)   │─────────►│  watch   │
//!                       │  apply effects              │          └──────────┘
//! ┌──────────┐ Internal │  JoinSet (generation N)     │
//! │  tasks   │─────────►│   activity / poller / timer │
//! └──────────┘   mpsc   └─────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use precinct_core::InterpretationMode;
use precinct_hardware::{DriverError, PaperStatusPoller, ScannerConnector, ScannerDriver};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::activities::{self, DriverCommand, InterpretJob};
use crate::delays::{DelayName, Delays};
use crate::error::{ControllerError, ScannerFault};
use crate::event::{ActivityOutcome, Event};
use crate::machine::{Context, Effect, Machine, Outcome};
use crate::state::{Activity, ScannerState};
use crate::status::MachineSnapshot;

/// Capacity of the facade request queue.
pub(crate) const REQUEST_QUEUE_CAPACITY: usize = 100;

/// An event from the facade.
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) event: Event,

    /// Receives the state reached once the event has been reduced.
    pub(crate) processed: Option<oneshot::Sender<ScannerState>>,
}

impl Request {
    pub(crate) fn new(event: Event) -> Self {
        Self { event, processed: None }
    }

    pub(crate) fn acknowledged(event: Event) -> (Self, oneshot::Receiver<ScannerState>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                event,
                processed: Some(tx),
            },
            rx,
        )
    }
}

/// A message posted by a task of the current state.
enum Internal<D> {
    Event { generation: u64, event: Event },
    Connected { generation: u64, result: Result<D, DriverError> },
}

enum Message<D> {
    Request(Request),
    Internal(Internal<D>),
}

/// Fields of the context worth logging, without ballot content.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContextSummary {
    configured: bool,
    interpretation_mode: InterpretationMode,
    scanned_sheet: bool,
    interpretation: Option<&'static str>,
    error: Option<&'static str>,
    calibration: Option<Result<(), &'static str>>,
    failed_scan_attempts: u32,
}

impl ContextSummary {
    fn of(ctx: &Context) -> Self {
        Self {
            configured: ctx.is_configured(),
            interpretation_mode: ctx.interpretation_mode,
            scanned_sheet: ctx.scanned_sheet.is_some(),
            interpretation: ctx
                .interpretation
                .as_ref()
                .map(|i| i.classification().type_name()),
            error: ctx.error.as_ref().map(ControllerError::tag),
            calibration: ctx
                .calibration
                .as_ref()
                .map(|result| result.as_ref().map(|_| ()).map_err(ControllerError::tag)),
            failed_scan_attempts: ctx.failed_scan_attempts,
        }
    }

    fn diff(&self, after: &Self) -> Vec<String> {
        let mut changes = Vec::new();
        if self.configured != after.configured {
            changes.push(format!("configured: {} -> {}", self.configured, after.configured));
        }
        if self.interpretation_mode != after.interpretation_mode {
            changes.push(format!(
                "interpretation_mode: {:?} -> {:?}",
                self.interpretation_mode, after.interpretation_mode
            ));
        }
        if self.scanned_sheet != after.scanned_sheet {
            changes.push(format!("scanned_sheet: {} -> {}", self.scanned_sheet, after.scanned_sheet));
        }
        if self.interpretation != after.interpretation {
            changes.push(format!("interpretation: {:?} -> {:?}", self.interpretation, after.interpretation));
        }
        if self.error != after.error {
            changes.push(format!("error: {:?} -> {:?}", self.error, after.error));
        }
        if self.calibration != after.calibration {
            changes.push(format!("calibration: {:?} -> {:?}", self.calibration, after.calibration));
        }
        if self.failed_scan_attempts != after.failed_scan_attempts {
            changes.push(format!(
                "failed_scan_attempts: {} -> {}",
                self.failed_scan_attempts, after.failed_scan_attempts
            ));
        }
        changes
    }
}

/// Owns the machine, the driver and the tasks of the current state.
pub(crate) struct Runtime<C: ScannerConnector> {
    connector: Arc<C>,
    driver: Option<Arc<C::Driver>>,
    machine: Machine,
    delays: Delays,
    generation: u64,
    tasks: JoinSet<()>,
    internal_tx: mpsc::UnboundedSender<Internal<C::Driver>>,
    internal_rx: mpsc::UnboundedReceiver<Internal<C::Driver>>,
    requests: mpsc::Receiver<Request>,
    status: watch::Sender<MachineSnapshot>,
}

impl<C: ScannerConnector> Runtime<C> {
    pub(crate) fn new(
        connector: C,
        delays: Delays,
        requests: mpsc::Receiver<Request>,
        status: watch::Sender<MachineSnapshot>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            connector: Arc::new(connector),
            driver: None,
            machine: Machine::new(),
            delays,
            generation: 0,
            tasks: JoinSet::new(),
            internal_tx,
            internal_rx,
            requests,
            status,
        }
    }

    /// Run until every facade handle is dropped.
    pub(crate) async fn run(mut self) {
        info!("Precinct scanner controller starting");
        let outcome = self.machine.start();
        self.apply(outcome);
        self.publish();

        loop {
            let message = tokio::select! {
                Some(internal) = self.internal_rx.recv() => Message::Internal(internal),
                request = self.requests.recv() => match request {
                    Some(request) => Message::Request(request),
                    None => break,
                },
            };
            match message {
                Message::Request(request) => self.on_request(request),
                Message::Internal(internal) => self.on_internal(internal),
            }
        }

        self.shutdown().await;
    }

    fn on_request(&mut self, request: Request) {
        let Request { event, processed } = request;
        self.dispatch(event);
        if let Some(processed) = processed {
            let _ = processed.send(self.machine.state());
        }
    }

    fn on_internal(&mut self, internal: Internal<C::Driver>) {
        match internal {
            Internal::Event { generation, event } => {
                if generation != self.generation {
                    trace!("Discarding stale {} from generation {}", event.name(), generation);
                    return;
                }
                self.dispatch(event);
            }
            Internal::Connected { generation, result } => {
                if generation != self.generation {
                    trace!("Discarding stale connection from generation {}", generation);
                    return;
                }
                let result = result.map(|driver| {
                    info!("Scanner connected");
                    self.driver = Some(Arc::new(driver));
                });
                self.dispatch(Event::Activity(ActivityOutcome::Connect(result)));
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        let from = self.machine.state();
        if let Event::Activity(outcome) = &event
            && !outcome.is_ok()
        {
            warn!("Activity {} failed in {}", outcome.name(), from);
        }
        debug!("Event: {}", event.name());

        let before = ContextSummary::of(self.machine.context());
        let outcome = self.machine.dispatch(&event);
        let after = ContextSummary::of(self.machine.context());

        let changes = before.diff(&after);
        if !changes.is_empty() {
            debug!("Context updated: {}", changes.join(", "));
        }
        if outcome.is_internal() && changes.is_empty() {
            return;
        }
        self.apply(outcome);
        self.publish();
    }

    fn apply(&mut self, outcome: Outcome) {
        for effect in outcome.effects {
            match effect {
                Effect::Enter(state) => self.enter(state),
                Effect::Shift(state) => info!("Transition: {}", state),
                Effect::RecordAcceptedSheet => self.record_accepted_sheet(),
            }
        }
    }

    fn publish(&self) {
        self.status.send_replace(MachineSnapshot::capture(&self.machine));
    }

    /// Tear down the tasks of the previous state and start those of `state`.
    fn enter(&mut self, state: ScannerState) {
        info!("Transition: {}", state);
        self.tasks = JoinSet::new();
        self.generation += 1;
        let generation = self.generation;

        if let Some(activity) = state.activity() {
            self.spawn_activity(activity, generation);
        }
        if state.polls_paper_status() {
            self.spawn_poller(generation);
        }
        for delay in state.timers() {
            self.spawn_timer(*delay, generation);
        }
    }

    fn spawn_activity(&mut self, activity: Activity, generation: u64) {
        debug!("Starting {:?} activity", activity);
        let tx = self.internal_tx.clone();

        if activity == Activity::Connect {
            let connector = Arc::clone(&self.connector);
            self.tasks.spawn(async move {
                let result = connector.connect().await;
                let _ = tx.send(Internal::Connected { generation, result });
            });
            return;
        }

        if activity == Activity::Interpret {
            let job = InterpretJob::from_context(self.machine.context());
            self.tasks.spawn(async move {
                let event = Event::Activity(job.run().await);
                let _ = tx.send(Internal::Event { generation, event });
            });
            return;
        }

        if let Some(command) = DriverCommand::for_activity(activity) {
            let driver = self.driver.clone();
            self.tasks.spawn(async move {
                let event = Event::Activity(activities::drive(command, driver).await);
                let _ = tx.send(Internal::Event { generation, event });
            });
        }
    }

    fn spawn_poller(&mut self, generation: u64) {
        let tx = self.internal_tx.clone();
        let Some(driver) = self.driver.clone() else {
            let event = Event::Paper(precinct_hardware::PaperStatusEvent::Disconnected);
            let _ = tx.send(Internal::Event { generation, event });
            return;
        };

        let poller = PaperStatusPoller::new(self.delays.poller_config());
        self.tasks.spawn(async move {
            poller
                .run(driver.as_ref(), |result| {
                    let event = match result {
                        Ok(paper) => Event::Paper(paper),
                        Err(error) => Event::PollFailed(error.into()),
                    };
                    tx.send(Internal::Event { generation, event }).is_ok()
                })
                .await;
        });
    }

    fn spawn_timer(&mut self, delay: DelayName, generation: u64) {
        let duration = self.delays.get(delay);
        let tx = self.internal_tx.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(Internal::Event {
                generation,
                event: Event::Timer(delay),
            });
        });
    }

    fn record_accepted_sheet(&self) {
        let ctx = self.machine.context();
        let (Some(store), Some(result)) = (&ctx.store, &ctx.interpretation) else {
            warn!("Accepted a sheet with no store or interpretation to record");
            return;
        };
        match store.store_sheet(&result.sheet_id, &result.interpretation.pages) {
            Ok(()) => info!(
                "Recorded accepted sheet {} ({})",
                result.sheet_id,
                result.classification().type_name()
            ),
            Err(e) => {
                error!("Failed to record accepted sheet {}: {}", result.sheet_id, e);
                let fault = ScannerFault::StoreFailed { message: e.to_string() };
                let _ = self.internal_tx.send(Internal::Event {
                    generation: self.generation,
                    event: Event::StoreFailed(fault.into()),
                });
            }
        }
    }

    /// Abort the current state's tasks and release the driver.
    async fn shutdown(mut self) {
        info!("Precinct scanner controller stopping");
        self.tasks = JoinSet::new();

        let Some(driver) = self.driver.take() else {
            return;
        };
        let timeout = self.delays.get(DelayName::KillAfterDisconnectTimeout);
        if close_or_kill(driver.as_ref(), timeout).await.is_err() {
            error!("Failed to release the scanner driver");
        }
    }
}

/// Close the driver, killing it if the close fails or takes longer than `timeout`.
async fn close_or_kill<D: ScannerDriver>(driver: &D, timeout: Duration) -> Result<(), DriverError> {
    match tokio::time::timeout(timeout, driver.close()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!("Failed to close scanner: {}", e);
            driver.kill()
        }
        Err(_) => {
            warn!("Scanner close timed out after {}ms", timeout.as_millis());
            driver.kill()
        }
    }
}
