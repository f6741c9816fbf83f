//! Controller configuration loaded from TOML.

use std::path::Path;
use std::time::Duration;

use precinct_core::constants::DEFAULT_CALIBRATE_TIMEOUT_MS;
use precinct_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::delays::Delays;

/// Configuration for a [`PrecinctScanner`](crate::PrecinctScanner).
///
/// # Examples
///
/// ```
/// use precinct_scanner::{DelayName, ScannerConfig};
/// use std::time::Duration;
///
/// let config = ScannerConfig::from_toml_str(r#"
///     calibrate_timeout_ms = 10000
///
///     [delays]
///     reconnect = 250
/// "#).unwrap();
///
/// assert_eq!(config.calibrate_timeout(), Duration::from_secs(10));
/// assert_eq!(config.delays.get(DelayName::Reconnect), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScannerConfig {
    #[serde(default)]
    pub delays: Delays,

    #[serde(default = "default_calibrate_timeout_ms")]
    pub calibrate_timeout_ms: u64,
}

fn default_calibrate_timeout_ms() -> u64 {
    DEFAULT_CALIBRATE_TIMEOUT_MS
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            delays: Delays::default(),
            calibrate_timeout_ms: DEFAULT_CALIBRATE_TIMEOUT_MS,
        }
    }
}

impl ScannerConfig {
    pub fn with_delays(delays: Delays) -> Self {
        Self {
            delays,
            ..Self::default()
        }
    }

    pub fn calibrate_timeout(&self) -> Duration {
        Duration::from_millis(self.calibrate_timeout_ms)
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is malformed, names an
    /// unknown key, or fails delay validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if its contents are invalid.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&content)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if the delays are inconsistent or the
    /// calibrate timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.calibrate_timeout_ms == 0 {
            return Err(Error::Config("calibrate_timeout_ms must be positive".to_string()));
        }
        self.delays.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delays::DelayName;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ScannerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ScannerConfig::default());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        assert!(ScannerConfig::from_toml_str("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_unknown_delay_rejected() {
        let result = ScannerConfig::from_toml_str("[delays]\ncoffee_break = 10\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_inconsistent_delays_rejected() {
        let toml = "[delays]\npaper_status_polling_interval = 2000\n";
        assert!(ScannerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ScannerConfig::with_delays(
            Delays::default().with(DelayName::AcceptingTimeout, Duration::from_millis(1234)),
        );
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(ScannerConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[delays]\nreconnect = 42").unwrap();

        let config = ScannerConfig::load(file.path()).await.unwrap();
        assert_eq!(config.delays.get(DelayName::Reconnect), Duration::from_millis(42));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = ScannerConfig::load("/nonexistent/precinct-scanner.toml").await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
