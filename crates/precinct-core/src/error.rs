use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Sheet errors
    #[error("Invalid sheet id: {0}")]
    InvalidSheetId(String),

    #[error("Interpretation failed: {0}")]
    Interpretation(String),

    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
