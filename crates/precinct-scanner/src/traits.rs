//! Collaborators the controller calls but does not own.
//!
//! The store and the interpreter are supplied through `configure` and are
//! shared with the rest of the application, so both are used as
//! `Arc<dyn Trait>`.

use std::fmt;

use precinct_core::{PageInterpretation, Result, ScannedSheet, SheetId, SheetInterpretation, SheetOf};

/// Persists accepted sheets.
///
/// The controller only stores a sheet from the `accepted` entry action, once
/// per sheet, and never concurrently with another store call.
pub trait SheetStore: Send + Sync + fmt::Debug {
    /// Record an accepted sheet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`](precinct_core::Error::Store) if the sheet
    /// could not be persisted.
    fn store_sheet(&self, sheet_id: &SheetId, pages: &SheetOf<PageInterpretation>) -> Result<()>;

    /// Number of ballots accepted so far.
    fn ballots_counted(&self) -> u64;

    /// Whether the machine may be unconfigured without losing data.
    fn can_unconfigure(&self) -> bool;
}

/// Classifies scanned sheets.
///
/// Interpretation is CPU-bound, so the controller calls it on a blocking
/// thread.
pub trait SheetInterpreter: Send + Sync + fmt::Debug {
    /// Interpret the two images of a sheet.
    ///
    /// # Errors
    ///
    /// Returns an error if the images could not be interpreted at all. An
    /// unreadable ballot is an `Invalid` classification, not an error.
    fn interpret(&self, sheet_id: &SheetId, sheet: &ScannedSheet) -> Result<SheetInterpretation>;
}
