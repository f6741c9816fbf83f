//! Shared helpers for the controller integration tests.
//!
//! Every test runs on a paused Tokio clock: the runtime auto-advances to the
//! next timer whenever the controller is idle, so polling intervals and
//! timeouts elapse instantly while keeping their relative order.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use precinct_hardware::mock::{MockConnector, MockScannerHandle};
use precinct_scanner::mock::{MemorySheetStore, ScriptedInterpreter};
use precinct_scanner::{MachineSnapshot, PrecinctScanner, ScannerConfig, ScannerState};
use tokio::task::JoinHandle;

/// Upper bound on any single wait, in virtual time.
pub const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// A running controller wired to in-memory collaborators.
pub struct Harness {
    pub scanner: PrecinctScanner,
    pub controller: JoinHandle<()>,
    pub voter: MockScannerHandle,
    pub store: Arc<MemorySheetStore>,
    pub interpreter: Arc<ScriptedInterpreter>,
}

impl Harness {
    /// Start a controller without configuring it.
    pub fn unconfigured() -> Self {
        let (connector, voter) = MockConnector::new();
        let (scanner, controller) =
            PrecinctScanner::start(connector, ScannerConfig::default()).expect("default config is valid");
        Self {
            scanner,
            controller,
            voter,
            store: Arc::new(MemorySheetStore::new()),
            interpreter: Arc::new(ScriptedInterpreter::new()),
        }
    }

    /// Start and configure a controller, then wait for it to report no paper.
    pub async fn ready() -> Self {
        let harness = Self::unconfigured();
        harness.configure().await;
        harness.wait_for(ScannerState::NoPaper).await;
        harness
    }

    pub async fn configure(&self) {
        self.scanner
            .configure(self.store.clone(), self.interpreter.clone())
            .await
            .expect("controller running");
    }

    /// Wait for the first snapshot matching `predicate`.
    pub async fn wait_until(&self, predicate: impl FnMut(&MachineSnapshot) -> bool) -> MachineSnapshot {
        tokio::time::timeout(WAIT_LIMIT, self.scanner.wait_until(predicate))
            .await
            .unwrap_or_else(|_| panic!("condition not reached, last snapshot: {:?}", self.scanner.snapshot()))
            .expect("controller running")
    }

    pub async fn wait_for(&self, state: ScannerState) -> MachineSnapshot {
        self.wait_until(|s| s.state == state).await
    }

    /// Insert a sheet, scan it, and wait for interpretation to finish.
    pub async fn insert_and_scan(&self) {
        self.voter.load_sheet();
        self.wait_for(ScannerState::ReadyToScan).await;
        self.scanner.scan().await.expect("controller running");
    }
}

/// Assert that `expected` appears in the snapshot history in order, possibly
/// with other states in between.
pub fn assert_visited_in_order(snapshot: &MachineSnapshot, expected: &[ScannerState]) {
    let visited = snapshot.visited();
    let mut remaining = expected.iter().peekable();
    for state in &visited {
        if remaining.peek() == Some(&state) {
            remaining.next();
        }
    }
    assert!(
        remaining.peek().is_none(),
        "expected {expected:?} in order, visited {visited:?}"
    );
}
