//! Work performed on behalf of a state.
//!
//! Each function here runs inside a task owned by the runtime and turns every
//! failure into an [`ActivityOutcome`]. Nothing here panics or returns early
//! to the runtime: the reducer decides what a failure means.

use std::sync::Arc;

use precinct_core::{InterpretationMode, InterpretationResult, ScannedSheet, SheetId};
use precinct_hardware::{DriverError, ScannerDriver};
use tracing::debug;

use crate::error::ControllerError;
use crate::event::ActivityOutcome;
use crate::machine::Context;
use crate::state::Activity;
use crate::traits::SheetInterpreter;

/// Rejected and returned sheets are always held at the front.
const HOLD_AFTER_REJECT: bool = true;

const MISSING_DRIVER: &str = "scanner";

/// Activities that are a single driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverCommand {
    Close,
    Kill,
    Scan,
    Accept,
    Reject,
    Calibrate,
}

impl DriverCommand {
    pub(crate) fn for_activity(activity: Activity) -> Option<Self> {
        match activity {
            Activity::Disconnect => Some(Self::Close),
            Activity::Kill => Some(Self::Kill),
            Activity::Scan => Some(Self::Scan),
            Activity::Accept => Some(Self::Accept),
            Activity::Reject => Some(Self::Reject),
            Activity::Calibrate => Some(Self::Calibrate),
            Activity::Connect | Activity::Interpret => None,
        }
    }
}

fn disconnected<T>() -> Result<T, DriverError> {
    Err(DriverError::disconnected(MISSING_DRIVER))
}

/// Run one driver command.
///
/// Without a driver, closing and killing trivially succeed and every other
/// command fails as disconnected.
pub(crate) async fn drive<D: ScannerDriver>(command: DriverCommand, driver: Option<Arc<D>>) -> ActivityOutcome {
    let Some(driver) = driver else {
        return match command {
            DriverCommand::Close => ActivityOutcome::Disconnect(Ok(())),
            DriverCommand::Kill => ActivityOutcome::Kill(Ok(())),
            DriverCommand::Scan => ActivityOutcome::Scan(disconnected()),
            DriverCommand::Accept => ActivityOutcome::Accept(disconnected()),
            DriverCommand::Reject => ActivityOutcome::Reject(disconnected()),
            DriverCommand::Calibrate => ActivityOutcome::Calibrate(disconnected()),
        };
    };

    debug!("Driver command: {:?}", command);
    match command {
        DriverCommand::Close => ActivityOutcome::Disconnect(driver.close().await),
        DriverCommand::Kill => ActivityOutcome::Kill(driver.kill()),
        DriverCommand::Scan => ActivityOutcome::Scan(driver.scan().await),
        DriverCommand::Accept => ActivityOutcome::Accept(driver.accept().await),
        DriverCommand::Reject => ActivityOutcome::Reject(driver.reject(HOLD_AFTER_REJECT).await),
        DriverCommand::Calibrate => ActivityOutcome::Calibrate(driver.calibrate().await),
    }
}

/// Inputs of the interpret activity, captured from the context on entry.
#[derive(Debug, Clone)]
pub(crate) struct InterpretJob {
    sheet: Option<ScannedSheet>,
    interpreter: Option<Arc<dyn SheetInterpreter>>,
    mode: InterpretationMode,
}

impl InterpretJob {
    pub(crate) fn from_context(ctx: &Context) -> Self {
        Self {
            sheet: ctx.scanned_sheet.clone(),
            interpreter: ctx.interpreter.clone(),
            mode: ctx.interpretation_mode,
        }
    }

    /// Interpret the scanned sheet on a blocking thread.
    pub(crate) async fn run(self) -> ActivityOutcome {
        ActivityOutcome::Interpret(self.interpret().await)
    }

    async fn interpret(self) -> Result<InterpretationResult, ControllerError> {
        if self.mode == InterpretationMode::Skip {
            debug!("Interpretation skipped");
            return Ok(InterpretationResult::skipped());
        }

        let sheet = self
            .sheet
            .ok_or_else(|| ControllerError::Interpreter("no scanned sheet".to_string()))?;
        let interpreter = self
            .interpreter
            .ok_or_else(|| ControllerError::Interpreter("no interpreter configured".to_string()))?;

        let sheet_id = SheetId::generate();
        debug!("Interpreting sheet {}", sheet_id);
        let interpretation = tokio::task::spawn_blocking(move || {
            interpreter
                .interpret(&sheet_id, &sheet)
                .map(|interpretation| InterpretationResult::new(sheet_id, interpretation))
        })
        .await
        .map_err(|e| ControllerError::Interpreter(e.to_string()))?;

        interpretation.map_err(|e| ControllerError::Interpreter(e.to_string()))
    }
}
