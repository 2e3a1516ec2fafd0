use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_URL;
use crate::logger::{parse_log_level, LogConfig};

/// Client settings, read from a YAML file. Every field has a default so a
/// partial (or missing) file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST API, including the `/api` prefix
    pub api_url: String,
    /// SQLite file holding remembered credentials
    pub storage_path: PathBuf,
    /// Seconds between background feed reloads while watching
    pub auto_refresh_secs: u64,
    /// Quiet period before a search string is sent
    pub search_debounce_ms: u64,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            storage_path: PathBuf::from("noticeboard.db"),
            auto_refresh_secs: 300,
            search_debounce_ms: 500,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Read the file at `path`, or `None` when there is no such file. Runs
    /// before logging is set up, so it reports nothing itself.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(Some(config))
    }


    pub fn auto_refresh(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            console_level: parse_log_level(&self.log_level),
            log_file: self.log_file.clone(),
            ..LogConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn read_tells_missing_file_from_present_one() {
        assert_eq!(Config::read(Path::new("/nonexistent/noticeboard.yaml")).unwrap(), None);

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "auto_refresh_secs: 60").unwrap();
        let config = Config::read(file.path()).unwrap().unwrap();
        assert_eq!(config.auto_refresh(), Duration::from_secs(60));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::read(Path::new("/nonexistent/noticeboard.yaml"))
            .unwrap()
            .unwrap_or_default();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url, "http://localhost:5000/api");
        assert_eq!(config.auto_refresh(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "api_url: https://notices.example.edu/api").unwrap();
        writeln!(file, "log_level: debug").unwrap();

        let config = Config::read(file.path()).unwrap().unwrap();
        assert_eq!(config.api_url, "https://notices.example.edu/api");
        assert_eq!(config.search_debounce(), Duration::from_millis(500));
        assert_eq!(config.log_config().console_level, log::LevelFilter::Debug);
    }

    #[test]
    fn bad_yaml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "auto_refresh_secs: [not, a, number]").unwrap();
        assert!(Config::read(file.path()).is_err());
    }
}
