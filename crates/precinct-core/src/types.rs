use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::constants::SKIPPED_INTERPRETATION_SHEET_ID;
use crate::{Error, Result};

/// Opaque identifier assigned to a sheet when it is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(String);

impl SheetId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(Error::InvalidSheetId("sheet id must not be empty".to_string()));
        }
        Ok(Self(value))
    }

    /// Fresh random identifier for a newly scanned sheet.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Identifier used for sheets whose interpretation was skipped.
    #[must_use]
    pub fn skipped() -> Self {
        Self(SKIPPED_INTERPRETATION_SHEET_ID.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SheetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A pair of values, one per side of a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetOf<T> {
    pub front: T,
    pub back: T,
}

impl<T> SheetOf<T> {
    pub fn new(front: T, back: T) -> Self {
        Self { front, back }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> SheetOf<U> {
        SheetOf {
            front: f(self.front),
            back: f(self.back),
        }
    }
}

/// Front and back image paths produced by a scan.
pub type ScannedSheet = SheetOf<PathBuf>;

/// Whether scanned sheets go through the interpreter.
///
/// `Skip` is a test-mode switch: every sheet is treated as a valid blank
/// ballot without calling the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationMode {
    #[default]
    Interpret,
    Skip,
}

impl fmt::Display for InterpretationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpret => write!(f, "interpret"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for InterpretationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interpret" => Ok(Self::Interpret),
            "skip" => Ok(Self::Skip),
            other => Err(Error::Config(format!("unknown interpretation mode: {other}"))),
        }
    }
}

/// Why a sheet cannot be counted at this precinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidSheetReason {
    WrongElection,
    WrongPrecinct,
    WrongTestMode,
    Unreadable,
    Unknown,
}

impl fmt::Display for InvalidSheetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::WrongElection => "wrong_election",
            Self::WrongPrecinct => "wrong_precinct",
            Self::WrongTestMode => "wrong_test_mode",
            Self::Unreadable => "unreadable",
            Self::Unknown => "unknown",
        };
        write!(f, "{reason}")
    }
}

/// Kind of condition that sends a sheet to voter review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjudicationKind {
    UninterpretableBallot,
    MarginalMark,
    Overvote,
    Undervote,
    BlankBallot,
    WriteIn,
    UnmarkedWriteIn,
}

/// A single review reason, optionally scoped to a contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjudicationReason {
    pub kind: AdjudicationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contest_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_ids: Vec<String>,
}

impl AdjudicationReason {
    pub fn new(kind: AdjudicationKind) -> Self {
        Self {
            kind,
            contest_id: None,
            option_ids: Vec::new(),
        }
    }

    pub fn for_contest(mut self, contest_id: impl Into<String>) -> Self {
        self.contest_id = Some(contest_id.into());
        self
    }
}

/// The interpreter's verdict on a scanned sheet.
///
/// This is also the public form of an interpretation: it never carries the
/// sheet identifier or per-page data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Classification {
    #[serde(rename = "ValidSheet")]
    Valid,
    #[serde(rename = "InvalidSheet")]
    Invalid { reason: InvalidSheetReason },
    #[serde(rename = "NeedsReviewSheet")]
    NeedsReview { reasons: Vec<AdjudicationReason> },
}

impl Classification {
    /// Type tag as it appears in serialized form. Safe to log.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Valid => "ValidSheet",
            Self::Invalid { .. } => "InvalidSheet",
            Self::NeedsReview { .. } => "NeedsReviewSheet",
        }
    }
}

/// Per-page interpretation data, opaque to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInterpretation {
    pub original_filename: PathBuf,
    pub normalized_filename: PathBuf,
    pub data: serde_json::Value,
}

impl PageInterpretation {
    /// A page with no marks on it.
    pub fn blank(original_filename: impl Into<PathBuf>, normalized_filename: impl Into<PathBuf>) -> Self {
        Self {
            original_filename: original_filename.into(),
            normalized_filename: normalized_filename.into(),
            data: serde_json::json!({ "type": "BlankPage" }),
        }
    }
}

/// Everything the interpreter knows about a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetInterpretation {
    pub classification: Classification,
    pub pages: SheetOf<PageInterpretation>,
}

impl SheetInterpretation {
    /// Valid classification with two blank pages, used when interpretation is skipped.
    pub fn blank_valid() -> Self {
        Self {
            classification: Classification::Valid,
            pages: SheetOf::new(
                PageInterpretation::blank("/front-original-mock", "/front-normalized-mock"),
                PageInterpretation::blank("/back-original-mock", "/back-normalized-mock"),
            ),
        }
    }
}

/// Interpretation of the sheet currently in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationResult {
    pub sheet_id: SheetId,
    pub interpretation: SheetInterpretation,
}

impl InterpretationResult {
    pub fn new(sheet_id: SheetId, interpretation: SheetInterpretation) -> Self {
        Self {
            sheet_id,
            interpretation,
        }
    }

    #[must_use]
    pub fn classification(&self) -> &Classification {
        &self.interpretation.classification
    }

    /// Result synthesized in `Skip` mode.
    pub fn skipped() -> Self {
        Self::new(SheetId::skipped(), SheetInterpretation::blank_valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_sheet_id_rejects_empty() {
        assert!(SheetId::new("").is_err());
        assert!(SheetId::new("   ").is_err());
        assert_eq!(SheetId::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_generated_sheet_ids_are_unique() {
        assert_ne!(SheetId::generate(), SheetId::generate());
    }

    #[test]
    fn test_sheet_of_map() {
        let sheet = SheetOf::new(1, 2).map(|side| side * 10);
        assert_eq!(sheet, SheetOf::new(10, 20));
    }

    #[rstest]
    #[case(Classification::Valid, r#"{"type":"ValidSheet"}"#)]
    #[case(
        Classification::Invalid { reason: InvalidSheetReason::WrongElection },
        r#"{"type":"InvalidSheet","reason":"wrong_election"}"#
    )]
    #[case(
        Classification::NeedsReview { reasons: vec![AdjudicationReason::new(AdjudicationKind::BlankBallot)] },
        r#"{"type":"NeedsReviewSheet","reasons":[{"kind":"blank_ballot"}]}"#
    )]
    fn test_classification_serialization(#[case] classification: Classification, #[case] expected: &str) {
        assert_eq!(serde_json::to_string(&classification).unwrap(), expected);
    }

    #[test]
    fn test_skipped_result_is_blank_valid() {
        let result = InterpretationResult::skipped();
        assert_eq!(result.sheet_id.as_str(), "mock-sheet-id");
        assert_eq!(result.classification(), &Classification::Valid);
        assert_eq!(result.interpretation.pages.front.data["type"], "BlankPage");
    }

    #[rstest]
    #[case("interpret", InterpretationMode::Interpret)]
    #[case("skip", InterpretationMode::Skip)]
    fn test_interpretation_mode_from_str(#[case] input: &str, #[case] expected: InterpretationMode) {
        assert_eq!(input.parse::<InterpretationMode>().unwrap(), expected);
        assert_eq!(expected.to_string(), input);
    }

    #[test]
    fn test_interpretation_mode_unknown() {
        assert!("fast".parse::<InterpretationMode>().is_err());
    }
}
