//! Status projection.
//!
//! Whenever an event changes the machine, the runtime publishes a
//! [`MachineSnapshot`] on a watch channel. Store counters are read when asked
//! for, not when the snapshot is taken. The outside world only ever sees the [`PublicStatus`] derived
//! from it: a coarse state name, the classification of the sheet in flight,
//! and an error tag in the states where an error explains what the voter sees.

use std::sync::Arc;

use precinct_core::{Classification, InterpretationMode};
use serde::{Deserialize, Serialize};

use crate::error::ControllerError;
use crate::machine::Machine;
use crate::state::{PublicState, ScannerState, StateTransition};
use crate::traits::SheetStore;

/// Full view of the controller at one point in time.
#[derive(Debug, Clone)]
pub struct MachineSnapshot {
    pub state: ScannerState,
    pub configured: bool,
    pub interpretation: Option<Classification>,
    pub error: Option<ControllerError>,
    pub calibration: Option<Result<(), ControllerError>>,
    pub failed_scan_attempts: u32,
    pub interpretation_mode: InterpretationMode,
    /// Recent transitions, oldest first.
    pub history: Vec<StateTransition>,
    store: Option<Arc<dyn SheetStore>>,
}

impl MachineSnapshot {
    pub fn capture(machine: &Machine) -> Self {
        let ctx = machine.context();
        Self {
            state: machine.state(),
            configured: ctx.is_configured(),
            interpretation: ctx.interpretation.as_ref().map(|i| i.classification().clone()),
            error: ctx.error.clone(),
            calibration: ctx.calibration.clone(),
            failed_scan_attempts: ctx.failed_scan_attempts,
            interpretation_mode: ctx.interpretation_mode,
            history: machine.history().iter().cloned().collect(),
            store: ctx.store.clone(),
        }
    }

    /// Sheets the configured store has counted, 0 when unconfigured.
    pub fn ballots_counted(&self) -> u64 {
        self.store.as_ref().map_or(0, |store| store.ballots_counted())
    }

    /// Whether the configured store allows unconfiguring, true when unconfigured.
    pub fn can_unconfigure(&self) -> bool {
        self.store.as_ref().is_none_or(|store| store.can_unconfigure())
    }

    pub fn public_status(&self) -> PublicStatus {
        let state = self.state.public_state();
        PublicStatus {
            state,
            interpretation: self.interpretation.clone(),
            error: self
                .error
                .as_ref()
                .filter(|_| state.shows_error())
                .map(|error| error.tag().to_string()),
            ballots_counted: self.ballots_counted(),
            can_unconfigure: self.can_unconfigure(),
        }
    }

    /// States entered, oldest first.
    pub fn visited(&self) -> Vec<ScannerState> {
        self.history.iter().map(|t| t.to).collect()
    }
}

impl Default for MachineSnapshot {
    fn default() -> Self {
        Self::capture(&Machine::new())
    }
}

/// What the UI shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicStatus {
    pub state: PublicState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ballots_counted: u64,
    pub can_unconfigure: bool,
}
