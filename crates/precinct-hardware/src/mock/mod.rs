//! Mock scanner implementation for testing and development.
//!
//! The mock simulates a sheet moving through the paper transport and lets
//! tests script failures and hangs for every driver operation.

mod scanner;

pub use scanner::{MockCalls, MockConnector, MockScanner, MockScannerHandle, SheetPosition};
