//! In-memory collaborators for testing and development.
//!
//! [`MemorySheetStore`] and [`ScriptedInterpreter`] stand in for the real
//! store and interpreter the same way
//! [`MockScanner`](precinct_hardware::mock::MockScanner) stands in for the
//! scanner.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use precinct_core::{
    Classification, Error, PageInterpretation, Result, ScannedSheet, SheetId, SheetInterpretation, SheetOf,
};

use crate::traits::{SheetInterpreter, SheetStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A sheet recorded by [`MemorySheetStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSheet {
    pub sheet_id: SheetId,
    pub pages: SheetOf<PageInterpretation>,
    pub accepted_at: DateTime<Utc>,
}

/// Store that keeps accepted sheets in memory.
#[derive(Debug)]
pub struct MemorySheetStore {
    sheets: Mutex<Vec<StoredSheet>>,
    can_unconfigure: AtomicBool,
    fail_next: AtomicBool,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self {
            sheets: Mutex::new(Vec::new()),
            can_unconfigure: AtomicBool::new(true),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn sheets(&self) -> Vec<StoredSheet> {
        lock(&self.sheets).clone()
    }

    pub fn set_can_unconfigure(&self, allowed: bool) {
        self.can_unconfigure.store(allowed, Ordering::SeqCst);
    }

    /// Make the next `store_sheet` call fail.
    pub fn fail_next_store(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Default for MemorySheetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetStore for MemorySheetStore {
    fn store_sheet(&self, sheet_id: &SheetId, pages: &SheetOf<PageInterpretation>) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Store(format!("could not store sheet {sheet_id}")));
        }
        lock(&self.sheets).push(StoredSheet {
            sheet_id: sheet_id.clone(),
            pages: pages.clone(),
            accepted_at: Utc::now(),
        });
        Ok(())
    }

    fn ballots_counted(&self) -> u64 {
        lock(&self.sheets).len() as u64
    }

    fn can_unconfigure(&self) -> bool {
        self.can_unconfigure.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum Scripted {
    Classify(Classification),
    Fail(String),
}

/// Interpreter that returns queued classifications.
///
/// When the queue is empty it returns the default classification.
#[derive(Debug)]
pub struct ScriptedInterpreter {
    queue: Mutex<VecDeque<Scripted>>,
    default: Classification,
    calls: AtomicU32,
}

impl ScriptedInterpreter {
    /// Interpreter that classifies every sheet as valid.
    pub fn new() -> Self {
        Self::always(Classification::Valid)
    }

    pub fn always(classification: Classification) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: classification,
            calls: AtomicU32::new(0),
        }
    }

    pub fn push(&self, classification: Classification) {
        lock(&self.queue).push_back(Scripted::Classify(classification));
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        lock(&self.queue).push_back(Scripted::Fail(message.into()));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetInterpreter for ScriptedInterpreter {
    fn interpret(&self, _sheet_id: &SheetId, sheet: &ScannedSheet) -> Result<SheetInterpretation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let classification = match lock(&self.queue).pop_front() {
            Some(Scripted::Classify(classification)) => classification,
            Some(Scripted::Fail(message)) => return Err(Error::Interpretation(message)),
            None => self.default.clone(),
        };
        let page = |path: &std::path::PathBuf| PageInterpretation {
            original_filename: path.clone(),
            normalized_filename: path.clone(),
            data: serde_json::json!({ "type": classification.type_name() }),
        };
        Ok(SheetInterpretation {
            pages: SheetOf::new(page(&sheet.front), page(&sheet.back)),
            classification,
        })
    }
}
