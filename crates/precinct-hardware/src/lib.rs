//! Scanner hardware abstraction layer for the precinct scanner controller.
//!
//! This crate defines the contract the controller requires from a sheet-fed
//! ballot scanner and the pieces built directly on top of it:
//!
//! - [`ScannerDriver`] and [`ScannerConnector`]: the driver contract. All
//!   operations are async and return [`Result`] with a [`DriverError`].
//! - [`PaperStatus`]: raw transport status as the device reports it.
//! - [`poller::PaperStatusPoller`]: polls the paper status on an interval,
//!   with a watchdog, and maps each status or error to a
//!   [`PaperStatusEvent`].
//! - [`mock`]: a scriptable simulated scanner.
//!
//! # Status Mapping
//!
//! | device condition | event |
//! |---|---|
//! | no paper present | `NoPaper` |
//! | paper held at front | `ReadyToScan` |
//! | paper held at back | `ReadyToEject` |
//! | paper at front and back | `BothSidesHavePaper` |
//! | transport jam | `Jam` |
//! | disconnect or I/O failure | `Disconnected` |
//! | feed invalid | `Jam` |
//!
//! Any other status or error is reported as a [`PollError`].
//!
//! # Example
//!
//! ```no_run
//! use precinct_hardware::{Result, ScannerDriver};
//!
//! async fn scan_and_accept<D: ScannerDriver>(scanner: &D) -> Result<()> {
//!     let images = scanner.scan().await?;
//!     println!("front: {}", images.front.display());
//!     scanner.accept().await
//! }
//! ```

pub mod error;
pub mod mock;
pub mod poller;
pub mod traits;
pub mod types;

pub use error::{DriverError, PollError, Result};
pub use poller::{PaperStatusPoller, PollResult, PollerConfig};
pub use traits::{ScannerConnector, ScannerDriver};
pub use types::{PaperStatus, PaperStatusEvent};
