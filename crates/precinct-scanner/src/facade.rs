//! Command facade.
//!
//! [`PrecinctScanner`] is the only way the outside world talks to the
//! controller. Configuration and the voter commands are queued and return as
//! soon as the event is enqueued: their effect shows up in a later
//! [`status`](PrecinctScanner::status). `calibrate` is the one command that
//! waits for the machine to finish.

use std::sync::Arc;
use std::time::Duration;

use precinct_core::{InterpretationMode, Result};
use precinct_hardware::ScannerConnector;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::ScannerConfig;
use crate::controller::{REQUEST_QUEUE_CAPACITY, Request, Runtime};
use crate::error::{CalibrateError, ControllerStopped};
use crate::event::{Command, Configuration, Event};
use crate::state::ScannerState;
use crate::status::{MachineSnapshot, PublicStatus};
use crate::traits::{SheetInterpreter, SheetStore};

/// Handle to a running precinct scanner controller.
///
/// Handles are cheap to clone. The controller stops, releasing the driver,
/// once every handle has been dropped.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use precinct_hardware::mock::MockConnector;
/// use precinct_scanner::mock::{MemorySheetStore, ScriptedInterpreter};
/// use precinct_scanner::{PrecinctScanner, ScannerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (connector, voter) = MockConnector::new();
/// let (scanner, _controller) = PrecinctScanner::start(connector, ScannerConfig::default())?;
///
/// scanner
///     .configure(Arc::new(MemorySheetStore::new()), Arc::new(ScriptedInterpreter::new()))
///     .await?;
///
/// voter.load_sheet();
/// scanner.wait_until(|s| s.state == precinct_scanner::ScannerState::ReadyToScan).await?;
/// scanner.scan().await?;
/// println!("{:?}", scanner.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PrecinctScanner {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<MachineSnapshot>,
    calibrate_timeout: Duration,
}

impl PrecinctScanner {
    /// Spawn the controller on the current Tokio runtime.
    ///
    /// The returned join handle completes once the controller has stopped and
    /// released the driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](precinct_core::Error::Config) if the
    /// configuration is inconsistent.
    pub fn start<C: ScannerConnector>(connector: C, config: ScannerConfig) -> Result<(Self, JoinHandle<()>)> {
        config.validate()?;

        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(MachineSnapshot::default());
        let calibrate_timeout = config.calibrate_timeout();
        let runtime = Runtime::new(connector, config.delays, request_rx, status_tx);
        let controller = tokio::spawn(runtime.run());

        Ok((
            Self {
                requests: request_tx,
                status: status_rx,
                calibrate_timeout,
            },
            controller,
        ))
    }

    async fn send(&self, event: Event) -> std::result::Result<(), ControllerStopped> {
        self.requests
            .send(Request::new(event))
            .await
            .map_err(|_| ControllerStopped)
    }

    /// Supply the store and the interpreter.
    pub async fn configure(
        &self,
        store: Arc<dyn SheetStore>,
        interpreter: Arc<dyn SheetInterpreter>,
    ) -> std::result::Result<(), ControllerStopped> {
        self.send(Event::Configure(Configuration { store, interpreter })).await
    }

    pub async fn unconfigure(&self) -> std::result::Result<(), ControllerStopped> {
        self.send(Event::Unconfigure).await
    }

    /// Scan the sheet held at the front. Ignored unless ready to scan.
    pub async fn scan(&self) -> std::result::Result<(), ControllerStopped> {
        self.send(Event::Command(Command::Scan)).await
    }

    /// Accept the sheet held at the back. Ignored unless ready to accept or
    /// awaiting review.
    pub async fn accept(&self) -> std::result::Result<(), ControllerStopped> {
        self.send(Event::Command(Command::Accept)).await
    }

    /// Return a sheet that needs review to the voter.
    pub async fn return_sheet(&self) -> std::result::Result<(), ControllerStopped> {
        self.send(Event::Command(Command::Return)).await
    }

    pub async fn set_interpretation_mode(&self, mode: InterpretationMode) -> std::result::Result<(), ControllerStopped> {
        self.send(Event::SetInterpretationMode(mode)).await
    }

    /// Calibrate the sensors and wait for the result.
    ///
    /// Calibration only starts when a sheet is ready to scan.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrateError::NotReady`] with the public state if the
    /// command was ignored, [`CalibrateError::Failed`] with the error tag if calibration
    /// failed, [`CalibrateError::TimedOut`] if it did not finish within the
    /// configured timeout, and [`CalibrateError::Stopped`] if the controller
    /// exited.
    pub async fn calibrate(&self) -> std::result::Result<(), CalibrateError> {
        let (request, processed) = Request::acknowledged(Event::Command(Command::Calibrate));
        self.requests.send(request).await.map_err(|_| CalibrateError::Stopped)?;
        let state = processed.await.map_err(|_| CalibrateError::Stopped)?;
        if state != ScannerState::Calibrating {
            debug!("Calibrate ignored in {}", state);
            return Err(CalibrateError::NotReady {
                state: state.public_state().to_string(),
            });
        }

        let mut status = self.status.clone();
        let timeout_ms = u64::try_from(self.calibrate_timeout.as_millis()).unwrap_or(u64::MAX);
        let (calibration, error) = {
            let snapshot = tokio::time::timeout(
                self.calibrate_timeout,
                status.wait_for(|s| s.state != ScannerState::Calibrating),
            )
            .await
            .map_err(|_| CalibrateError::TimedOut { timeout_ms })?
            .map_err(|_| CalibrateError::Stopped)?;
            (snapshot.calibration.clone(), snapshot.error.clone())
        };

        // Left without finishing, e.g. unconfigured mid-calibration.
        let result = match calibration {
            Some(result) => result,
            None => error.map_or(Ok(()), Err),
        };
        result.map_err(|error| CalibrateError::Failed {
            tag: error.tag().to_string(),
        })
    }

    /// Current public status.
    pub fn status(&self) -> PublicStatus {
        self.status.borrow().public_status()
    }

    /// Current full snapshot, including history.
    pub fn snapshot(&self) -> MachineSnapshot {
        self.status.borrow().clone()
    }

    /// Receiver notified after every event.
    pub fn subscribe(&self) -> watch::Receiver<MachineSnapshot> {
        self.status.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerStopped`] if the controller exits first.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&MachineSnapshot) -> bool,
    ) -> std::result::Result<MachineSnapshot, ControllerStopped> {
        let mut status = self.status.clone();
        let snapshot = status.wait_for(predicate).await.map_err(|_| ControllerStopped)?;
        Ok(snapshot.clone())
    }
}
