//! Scanner driver trait definitions.
//!
//! These traits are the whole contract the controller needs from a sheet-fed
//! scanner. A real driver and [`MockScanner`](crate::mock::MockScanner)
//! implement the same traits, so the controller can be exercised without
//! hardware.
//!
//! Methods return `impl Future + Send` rather than using bare `async fn` so
//! that driver calls can be spawned onto the Tokio runtime. Implementations
//! are free to write them as `async fn`.

use std::future::Future;

use precinct_core::ScannedSheet;

use crate::error::Result;
use crate::types::PaperStatus;

/// A connected sheet-fed scanner.
///
/// All methods take `&self`: the controller shares one driver handle between
/// the paper status poller and the activity of the current state.
pub trait ScannerDriver: Send + Sync + 'static {
    /// Read the current paper transport status.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner is disconnected or the status
    /// cannot be read.
    fn get_paper_status(&self) -> impl Future<Output = Result<PaperStatus>> + Send;

    /// Pull the sheet held at the front through the scanner.
    ///
    /// On success the sheet is held at the back and the returned paths point
    /// to the front and back images.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ErrorFeeding`](crate::DriverError::ErrorFeeding)
    /// or [`DriverError::NoPaper`](crate::DriverError::NoPaper) when the sheet
    /// could not be fed, and
    /// [`DriverError::IncompleteScan`](crate::DriverError::IncompleteScan) when
    /// fewer than two images were produced.
    fn scan(&self) -> impl Future<Output = Result<ScannedSheet>> + Send;

    /// Drop the sheet held at the back into the ballot box.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner reports the command failed. The sheet
    /// may still have dropped; callers confirm with the paper status.
    fn accept(&self) -> impl Future<Output = Result<()>> + Send;

    /// Push the sheet held at the back out through the front.
    ///
    /// With `hold` the sheet stays gripped at the front for the voter to
    /// remove; without it the sheet is fully ejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the sheet could not be moved.
    fn reject(&self, hold: bool) -> impl Future<Output = Result<()>> + Send;

    /// Run sensor calibration. Requires a blank sheet at the front.
    ///
    /// # Errors
    ///
    /// Returns an error if calibration failed.
    fn calibrate(&self) -> impl Future<Output = Result<()>> + Send;

    /// Disconnect nicely.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner did not acknowledge the disconnect.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    /// Forcefully terminate the driver without talking to the scanner.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver could not be terminated.
    fn kill(&self) -> Result<()>;
}

/// Produces connected [`ScannerDriver`]s.
pub trait ScannerConnector: Send + Sync + 'static {
    /// The driver type this connector produces.
    type Driver: ScannerDriver;

    /// Connect to the scanner.
    ///
    /// # Errors
    ///
    /// Returns an error if no scanner could be reached.
    fn connect(&self) -> impl Future<Output = Result<Self::Driver>> + Send;
}
