//! Common types used across the scanner hardware layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw paper transport status as reported by the scanner.
///
/// Vendors report more conditions than the controller cares about. The
/// conditions the controller understands are mapped to a
/// [`PaperStatusEvent`]; everything else is carried as
/// [`PaperStatus::Unrecognized`] with the raw device code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PaperStatus {
    /// No sheet anywhere in the transport.
    NoPaper,

    /// Device idle and ready, no sheet present.
    DevReadyNoPaper,

    /// Sheet held at the front, not yet pulled in.
    ReadyToScan,

    /// Sheet held at the back, ready to be dropped or returned.
    ReadyToEject,

    /// One sheet at the front and another at the back.
    BothSidesHavePaper,

    /// The transport reports a jam.
    Jam,

    /// Front and back sensors both see the same sheet.
    FrontAndBackSensorHavePaperReady,

    /// The motor is moving a sheet.
    Feeding,

    /// Any other status code.
    Unrecognized(u16),
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPaper => write!(f, "NoPaper"),
            Self::DevReadyNoPaper => write!(f, "DevReadyNoPaper"),
            Self::ReadyToScan => write!(f, "ReadyToScan"),
            Self::ReadyToEject => write!(f, "ReadyToEject"),
            Self::BothSidesHavePaper => write!(f, "BothSidesHavePaper"),
            Self::Jam => write!(f, "Jam"),
            Self::FrontAndBackSensorHavePaperReady => write!(f, "FrontAndBackSensorHavePaperReady"),
            Self::Feeding => write!(f, "Feeding"),
            Self::Unrecognized(code) => write!(f, "Unrecognized({code})"),
        }
    }
}

/// Discrete paper status event delivered to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatusEvent {
    NoPaper,
    ReadyToScan,
    ReadyToEject,
    BothSidesHavePaper,
    Jam,
    Disconnected,
}

impl PaperStatusEvent {
    /// Stable event name, safe to log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoPaper => "scanner_no_paper",
            Self::ReadyToScan => "scanner_ready_to_scan",
            Self::ReadyToEject => "scanner_ready_to_eject",
            Self::BothSidesHavePaper => "scanner_both_sides_have_paper",
            Self::Jam => "scanner_jam",
            Self::Disconnected => "scanner_disconnected",
        }
    }
}

impl fmt::Display for PaperStatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
