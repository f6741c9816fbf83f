//! Precinct ballot scanner controller.
//!
//! This crate drives a sheet-fed ballot scanner through the life of each
//! sheet: waiting for paper, scanning, interpreting, and then accepting,
//! returning or rejecting it, while recovering from jams, double feeds,
//! disconnects and misbehaving hardware.
//!
//! # Architecture
//!
//! - [`state`] - every state, and what each state runs while active
//! - [`event`] - the events the controller reacts to
//! - [`machine`] - the pure transition table
//! - [`PrecinctScanner`] - the command facade, backed by an async runtime
//!   that supervises the activities, the paper status poller and timers
//! - [`status`] - the snapshot published after every event, and its public
//!   projection
//! - [`delays`] and [`config`] - named timing knobs loaded from TOML
//! - [`mock`] - in-memory store and interpreter for tests and simulation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use precinct_hardware::mock::MockConnector;
//! use precinct_scanner::mock::{MemorySheetStore, ScriptedInterpreter};
//! use precinct_scanner::{PrecinctScanner, PublicState, ScannerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (connector, voter) = MockConnector::new();
//!     let (scanner, controller) = PrecinctScanner::start(connector, ScannerConfig::default())?;
//!     scanner
//!         .configure(Arc::new(MemorySheetStore::new()), Arc::new(ScriptedInterpreter::new()))
//!         .await?;
//!
//!     voter.load_sheet();
//!     scanner.wait_until(|s| s.public_status().state == PublicState::ReadyToScan).await?;
//!     scanner.scan().await?;
//!     scanner.wait_until(|s| s.public_status().state == PublicState::ReadyToAccept).await?;
//!     scanner.accept().await?;
//!     scanner.wait_until(|s| s.ballots_counted() == 1).await?;
//!
//!     drop(scanner);
//!     controller.await?;
//!     Ok(())
//! }
//! ```

mod activities;
pub mod config;
mod controller;
pub mod delays;
pub mod error;
pub mod event;
mod facade;
pub mod machine;
pub mod mock;
pub mod state;
pub mod status;
pub mod traits;

pub use config::ScannerConfig;
pub use delays::{DelayName, Delays};
pub use error::{CalibrateError, ControllerError, ControllerStopped, OPAQUE_ERROR_TAG, ScannerFault};
pub use event::{ActivityOutcome, Command, Configuration, Event};
pub use facade::PrecinctScanner;
pub use machine::{Context, Effect, Machine, Outcome, apply_event};
pub use state::{Activity, PublicState, RecoveryStep, ScannerState, StateTransition, TransitionHistory};
pub use status::{MachineSnapshot, PublicStatus};
pub use traits::{SheetInterpreter, SheetStore};
