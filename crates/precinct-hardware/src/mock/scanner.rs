//! Mock sheet-fed scanner for testing and development.
//!
//! This module simulates a scanner's paper transport so the controller can be
//! driven end to end without hardware. The scanner and its handle share one
//! simulated transport: the handle plays the voter (inserting and removing
//! sheets) and scripts failures, while the controller talks to the scanner
//! through the [`ScannerDriver`] trait.
//!
//! Scanned images are not written to disk; the returned paths are synthetic.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use precinct_core::{ScannedSheet, SheetOf};

use crate::error::{DriverError, Result};
use crate::traits::{ScannerConnector, ScannerDriver};
use crate::types::PaperStatus;

const DEVICE_NAME: &str = "Mock Scanner";

/// Where the simulated sheet currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetPosition {
    #[default]
    Empty,
    Front,
    Back,
    FrontAndBack,
    Jammed,
}

impl SheetPosition {
    fn paper_status(self) -> PaperStatus {
        match self {
            Self::Empty => PaperStatus::NoPaper,
            Self::Front => PaperStatus::ReadyToScan,
            Self::Back => PaperStatus::ReadyToEject,
            Self::FrontAndBack => PaperStatus::BothSidesHavePaper,
            Self::Jammed => PaperStatus::Jam,
        }
    }
}

/// Number of calls made to each driver operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub connect: u32,
    pub paper_status: u32,
    pub scan: u32,
    pub accept: u32,
    pub reject: u32,
    pub calibrate: u32,
    pub close: u32,
    pub kill: u32,
}

#[derive(Debug)]
struct MockState {
    position: SheetPosition,
    status_override: Option<PaperStatus>,
    connected: bool,
    accept_drops_sheet: bool,
    hang_scan: bool,
    hang_paper_status: bool,
    hang_close: bool,
    connect_failures: VecDeque<DriverError>,
    scan_failures: VecDeque<DriverError>,
    accept_failures: VecDeque<DriverError>,
    reject_failures: VecDeque<DriverError>,
    calibrate_failures: VecDeque<DriverError>,
    close_failures: VecDeque<DriverError>,
    kill_failures: VecDeque<DriverError>,
    sheets_scanned: u32,
    image_dir: PathBuf,
    calls: MockCalls,
}

impl MockState {
    fn new(connected: bool) -> Self {
        Self {
            position: SheetPosition::Empty,
            status_override: None,
            connected,
            accept_drops_sheet: true,
            hang_scan: false,
            hang_paper_status: false,
            hang_close: false,
            connect_failures: VecDeque::new(),
            scan_failures: VecDeque::new(),
            accept_failures: VecDeque::new(),
            reject_failures: VecDeque::new(),
            calibrate_failures: VecDeque::new(),
            close_failures: VecDeque::new(),
            kill_failures: VecDeque::new(),
            sheets_scanned: 0,
            image_dir: std::env::temp_dir().join("precinct-mock-scans"),
            calls: MockCalls::default(),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DriverError::disconnected(DEVICE_NAME))
        }
    }

    fn paper_status(&self) -> Result<PaperStatus> {
        self.ensure_connected()?;
        Ok(self.status_override.unwrap_or_else(|| self.position.paper_status()))
    }

    fn scan(&mut self) -> Result<ScannedSheet> {
        self.ensure_connected()?;
        if let Some(error) = self.scan_failures.pop_front() {
            return Err(error);
        }
        match self.position {
            SheetPosition::Front => {
                self.position = SheetPosition::Back;
                self.sheets_scanned += 1;
                let n = self.sheets_scanned;
                Ok(SheetOf::new(
                    self.image_dir.join(format!("sheet-{n:04}-front.jpg")),
                    self.image_dir.join(format!("sheet-{n:04}-back.jpg")),
                ))
            }
            SheetPosition::Empty => Err(DriverError::NoPaper),
            other => Err(DriverError::command_failed("scan", format!("sheet position {other:?}"))),
        }
    }

    fn accept(&mut self) -> Result<()> {
        self.ensure_connected()?;
        if let Some(error) = self.accept_failures.pop_front() {
            return Err(error);
        }
        match self.position {
            SheetPosition::Back if self.accept_drops_sheet => self.position = SheetPosition::Empty,
            SheetPosition::FrontAndBack if self.accept_drops_sheet => self.position = SheetPosition::Front,
            _ => {}
        }
        Ok(())
    }

    fn reject(&mut self, hold: bool) -> Result<()> {
        self.ensure_connected()?;
        if let Some(error) = self.reject_failures.pop_front() {
            return Err(error);
        }
        self.position = match (self.position, hold) {
            (SheetPosition::Back, true) => SheetPosition::Front,
            (SheetPosition::Back, false) => SheetPosition::Empty,
            (SheetPosition::FrontAndBack, false) => SheetPosition::Front,
            (position, _) => position,
        };
        Ok(())
    }

    fn calibrate(&mut self) -> Result<()> {
        self.ensure_connected()?;
        match self.calibrate_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn lock(shared: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock scanner for testing and development.
///
/// # Examples
///
/// ```
/// use precinct_hardware::mock::MockScanner;
/// use precinct_hardware::{PaperStatus, ScannerDriver};
///
/// #[tokio::main]
/// async fn main() -> precinct_hardware::Result<()> {
///     let (scanner, handle) = MockScanner::connected();
///
///     handle.load_sheet();
///     assert_eq!(scanner.get_paper_status().await?, PaperStatus::ReadyToScan);
///
///     let images = scanner.scan().await?;
///     assert!(images.front.to_string_lossy().ends_with("front.jpg"));
///     assert_eq!(scanner.get_paper_status().await?, PaperStatus::ReadyToEject);
///
///     scanner.accept().await?;
///     assert_eq!(scanner.get_paper_status().await?, PaperStatus::NoPaper);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockScanner {
    shared: Arc<Mutex<MockState>>,
}

impl MockScanner {
    /// Create an already connected mock scanner and its control handle.
    pub fn connected() -> (Self, MockScannerHandle) {
        let shared = Arc::new(Mutex::new(MockState::new(true)));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockScannerHandle { shared },
        )
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.shared)
    }
}

impl ScannerDriver for MockScanner {
    async fn get_paper_status(&self) -> Result<PaperStatus> {
        let outcome = {
            let mut state = self.state();
            state.calls.paper_status += 1;
            (!state.hang_paper_status).then(|| state.paper_status())
        };
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn scan(&self) -> Result<ScannedSheet> {
        let outcome = {
            let mut state = self.state();
            state.calls.scan += 1;
            (!state.hang_scan).then(|| state.scan())
        };
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn accept(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.accept += 1;
        state.accept()
    }

    async fn reject(&self, hold: bool) -> Result<()> {
        let mut state = self.state();
        state.calls.reject += 1;
        state.reject(hold)
    }

    async fn calibrate(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.calibrate += 1;
        state.calibrate()
    }

    async fn close(&self) -> Result<()> {
        let outcome = {
            let mut state = self.state();
            state.calls.close += 1;
            if state.hang_close {
                None
            } else if let Some(error) = state.close_failures.pop_front() {
                Some(Err(error))
            } else {
                state.connected = false;
                Some(Ok(()))
            }
        };
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    fn kill(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.kill += 1;
        if let Some(error) = state.kill_failures.pop_front() {
            return Err(error);
        }
        state.connected = false;
        state.hang_close = false;
        Ok(())
    }
}

/// Connector producing [`MockScanner`]s that share one simulated transport.
#[derive(Debug, Clone)]
pub struct MockConnector {
    shared: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Create a connector for a disconnected mock scanner and its control handle.
    pub fn new() -> (Self, MockScannerHandle) {
        let shared = Arc::new(Mutex::new(MockState::new(false)));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockScannerHandle { shared },
        )
    }
}

impl ScannerConnector for MockConnector {
    type Driver = MockScanner;

    async fn connect(&self) -> Result<MockScanner> {
        {
            let mut state = lock(&self.shared);
            state.calls.connect += 1;
            if let Some(error) = state.connect_failures.pop_front() {
                return Err(error);
            }
            state.connected = true;
        }
        Ok(MockScanner {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Handle for simulating the voter and scripting scanner failures.
#[derive(Debug, Clone)]
pub struct MockScannerHandle {
    shared: Arc<Mutex<MockState>>,
}

impl MockScannerHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.shared)
    }

    /// Insert a sheet at the front. A sheet already held at the back stays there.
    pub fn load_sheet(&self) {
        let mut state = self.state();
        state.position = match state.position {
            SheetPosition::Empty => SheetPosition::Front,
            SheetPosition::Back => SheetPosition::FrontAndBack,
            position => position,
        };
    }

    /// Take the sheet out of the scanner. With sheets on both sides only the front one is removed.
    pub fn remove_sheet(&self) {
        let mut state = self.state();
        state.position = match state.position {
            SheetPosition::FrontAndBack => SheetPosition::Back,
            _ => SheetPosition::Empty,
        };
    }

    /// Jam the transport.
    pub fn jam(&self) {
        self.state().position = SheetPosition::Jammed;
    }

    pub fn set_sheet_position(&self, position: SheetPosition) {
        self.state().position = position;
    }

    pub fn sheet_position(&self) -> SheetPosition {
        self.state().position
    }

    /// Report `status` from every poll regardless of the sheet position. `None` clears it.
    pub fn set_paper_status(&self, status: Option<PaperStatus>) {
        self.state().status_override = status;
    }

    /// Drop the connection. Every call fails until the connector reconnects.
    pub fn disconnect(&self) {
        self.state().connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Whether `accept` drops the sheet held at the back. Defaults to `true`.
    pub fn set_accept_drops_sheet(&self, drops: bool) {
        self.state().accept_drops_sheet = drops;
    }

    pub fn hang_scan(&self, hang: bool) {
        self.state().hang_scan = hang;
    }

    pub fn hang_paper_status(&self, hang: bool) {
        self.state().hang_paper_status = hang;
    }

    pub fn hang_close(&self, hang: bool) {
        self.state().hang_close = hang;
    }

    pub fn fail_next_connect(&self, error: DriverError) {
        self.state().connect_failures.push_back(error);
    }

    pub fn fail_next_scan(&self, error: DriverError) {
        self.state().scan_failures.push_back(error);
    }

    pub fn fail_next_accept(&self, error: DriverError) {
        self.state().accept_failures.push_back(error);
    }

    pub fn fail_next_reject(&self, error: DriverError) {
        self.state().reject_failures.push_back(error);
    }

    pub fn fail_next_calibrate(&self, error: DriverError) {
        self.state().calibrate_failures.push_back(error);
    }

    pub fn fail_next_close(&self, error: DriverError) {
        self.state().close_failures.push_back(error);
    }

    pub fn fail_next_kill(&self, error: DriverError) {
        self.state().kill_failures.push_back(error);
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> MockCalls {
        self.state().calls
    }
}
