use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contents of `polis-scanner.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Used for the log file name and the feed User-Agent.
    pub app_name: String,
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/logs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/cache`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub feed: FeedConfig,
    pub poll: PollConfig,
    pub shutdown: ShutdownConfig,
    pub console: ConsoleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Attempts per fetch, the first one included.
    pub retries: u32,
    /// Delay before the first retry; doubled after every attempt.
    pub backoff_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub grace_period_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub max_lines: usize,
    pub refresh_millis: u64,
    pub history_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_log_bytes: u64,
    pub log_backups: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            app_name: "polis-scanner".into(),
            data_dir: PathBuf::from("./data"),
            logs_dir: None,
            cache_dir: None,
            feed: FeedConfig::default(),
            poll: PollConfig::default(),
            shutdown: ShutdownConfig::default(),
            console: ConsoleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://polisen.se/api/events".into(),
            timeout_secs: 10,
            retries: 3,
            backoff_secs: 2,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_lines: scanner_core::DEFAULT_MAX_LINES,
            refresh_millis: 500,
            history_len: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_log_bytes: 2_000_000,
            log_backups: 5,
        }
    }
}

impl ScannerConfig {
    /// Parse a config file. Fails if it is missing or malformed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Like [`ScannerConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Human-readable problems; empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.trim().is_empty() {
            errors.push("app_name must not be empty".to_string());
        }
        if self.feed.url.trim().is_empty() {
            errors.push("[feed] url must not be empty".to_string());
        }
        if self.feed.timeout_secs == 0 {
            errors.push("[feed] timeout_secs must be > 0".to_string());
        }
        if self.feed.retries == 0 {
            errors.push("[feed] retries must be >= 1".to_string());
        }
        if self.poll.interval_secs == 0 {
            errors.push("[poll] interval_secs must be > 0".to_string());
        }
        if self.console.max_lines == 0 {
            errors.push("[console] max_lines must be > 0".to_string());
        }
        if self.console.refresh_millis == 0 {
            errors.push("[console] refresh_millis must be > 0".to_string());
        }
        if self.logging.max_log_bytes == 0 {
            errors.push("[logging] max_log_bytes must be > 0".to_string());
        }

        errors
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.logs_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("cache"))
    }

    pub fn events_file(&self) -> PathBuf {
        self.data_dir.join("events.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.cache_dir().join("last_event.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("history.txt")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(format!("{}.log", self.app_name))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_period_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.console.refresh_millis)
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}
