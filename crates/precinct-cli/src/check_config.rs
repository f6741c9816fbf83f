//! `check-config` subcommand.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use precinct_scanner::ScannerConfig;

pub async fn load(path: &Path) -> Result<ScannerConfig> {
    ScannerConfig::load(path)
        .await
        .with_context(|| format!("invalid config file {}", path.display()))
}

/// Effective delay table, one `name = ms` line per delay.
pub fn render(config: &ScannerConfig) -> String {
    let mut out = String::new();
    for (name, duration) in config.delays.iter() {
        let _ = writeln!(out, "{:<32} {} ms", name.as_str(), duration.as_millis());
    }
    let _ = writeln!(out, "{:<32} {} ms", "calibrate_timeout", config.calibrate_timeout_ms);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[tokio::test]
    async fn test_load_and_render() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[delays]\nreconnect = 250").unwrap();

        let config = load(file.path()).await.unwrap();
        let table = render(&config);

        assert_eq!(table.lines().count(), 11);
        assert!(table.lines().any(|l| l.starts_with("reconnect ") && l.ends_with(" 250 ms")));
        assert!(table.lines().any(|l| l.starts_with("scanning_timeout ") && l.ends_with(" 5000 ms")));
        assert!(table.lines().last().unwrap().ends_with(" 20000 ms"));
    }

    #[tokio::test]
    async fn test_invalid_file_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[delays]\npaper_status_polling_interval = 0").unwrap();

        let error = load(file.path()).await.unwrap_err();
        assert!(error.to_string().contains(&file.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(load(Path::new("/nonexistent/scanner.toml")).await.is_err());
    }
}
