//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use precinct_core::{AdjudicationKind, AdjudicationReason, Classification, InvalidSheetReason};

/// Precinct ballot scanner controller
#[derive(Debug, Parser)]
#[command(name = "precinct-scan", version, about)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Drive sheets through a mock scanner and print the final status as JSON
    Simulate(SimulateArgs),

    /// Validate a config file and print the effective delays
    CheckConfig {
        /// TOML config file
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// TOML config file, defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of sheets the simulated voter inserts
    #[arg(short = 'n', long, default_value_t = 1)]
    pub sheets: u32,

    /// How the interpreter classifies every sheet
    #[arg(long, value_enum, default_value_t = SheetKind::Valid)]
    pub classification: SheetKind,

    /// Bypass the interpreter and treat every sheet as valid
    #[arg(long)]
    pub skip_interpretation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SheetKind {
    Valid,
    Invalid,
    NeedsReview,
}

impl SheetKind {
    pub fn classification(self) -> Classification {
        match self {
            Self::Valid => Classification::Valid,
            Self::Invalid => Classification::Invalid {
                reason: InvalidSheetReason::WrongPrecinct,
            },
            Self::NeedsReview => Classification::NeedsReview {
                reasons: vec![AdjudicationReason::new(AdjudicationKind::Overvote)],
            },
        }
    }
}
