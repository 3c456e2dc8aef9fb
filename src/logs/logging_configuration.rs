use std::path::PathBuf;
use std::str::FromStr;
use tracing_core::Level;
use tracing_subscriber::EnvFilter;

use crate::config::{
    OCKAM_LOG_CRATES_FILTER, OCKAM_LOG_DIR, OCKAM_LOG_FORMAT, OCKAM_LOG_LEVEL, OCKAM_LOG_MAX_FILES,
};
use crate::env::{get_env, get_env_with_default, FromString};
use crate::error::ConfigError;
use crate::logs::{CratesFilter, LogFormat};

/// Maximum number of daily log files to keep
pub(crate) const DEFAULT_LOG_MAX_FILES: u64 = 60;

/// This struct can be used to parse environment variables representing a log level
pub struct LevelVar {
    pub level: Level,
}

impl FromString for LevelVar {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        Ok(LevelVar {
            level: Level::from_str(s).map_err(ConfigError::parse)?,
        })
    }
}

/// List of all the configuration parameters relevant for configuring the logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfiguration {
    /// Verbosity required for a given log record
    level: Level,
    /// Format used for log lines: pretty, json, default
    format: LogFormat,
    /// Specifies if the console output is colored
    colored: bool,
    /// Directory where log files must be created.
    /// If no directory is defined then log messages appear on the console
    log_dir: Option<PathBuf>,
    /// Maximum number of log files
    max_files: u64,
    /// Crates for which we want to keep log messages
    crates: Option<Vec<String>>,
}

impl Default for LoggingConfiguration {
    fn default() -> Self {
        LoggingConfiguration {
            level: Level::INFO,
            format: LogFormat::Default,
            colored: false,
            log_dir: None,
            max_files: DEFAULT_LOG_MAX_FILES,
            crates: CratesFilter::Basic.crates(),
        }
    }
}

impl LoggingConfiguration {
    /// Create a logging configuration from the environment variables
    pub fn from_env() -> Result<LoggingConfiguration, ConfigError> {
        Ok(LoggingConfiguration {
            level: get_env_with_default(OCKAM_LOG_LEVEL, LevelVar { level: Level::INFO })?.level,
            format: get_env_with_default(OCKAM_LOG_FORMAT, LogFormat::Default)?,
            colored: false,
            log_dir: get_env::<PathBuf>(OCKAM_LOG_DIR)?,
            max_files: get_env_with_default(OCKAM_LOG_MAX_FILES, DEFAULT_LOG_MAX_FILES)?,
            crates: get_env_with_default(OCKAM_LOG_CRATES_FILTER, CratesFilter::Basic)?.crates(),
        })
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn format(&self) -> LogFormat {
        self.format.clone()
    }

    pub fn is_colored(&self) -> bool {
        self.colored
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone()
    }

    pub fn max_files(&self) -> u64 {
        self.max_files
    }

    pub fn crates(&self) -> Option<Vec<String>> {
        self.crates.clone()
    }

    pub fn set_log_level(self, level: Level) -> LoggingConfiguration {
        LoggingConfiguration { level, ..self }
    }

    pub fn set_colored(self, colored: bool) -> LoggingConfiguration {
        LoggingConfiguration { colored, ..self }
    }

    pub fn set_log_directory(self, log_dir: PathBuf) -> LoggingConfiguration {
        LoggingConfiguration {
            log_dir: Some(log_dir),
            ..self
        }
    }

    /// Create an EnvFilter which keeps only the log messages
    ///
    ///  - for the configured level
    ///  - for the configured crates
    pub fn env_filter(&self) -> EnvFilter {
        match &self.crates {
            Some(crates) => EnvFilter::builder()
                .with_default_directive(Level::WARN.into())
                .parse_lossy(
                    crates
                        .iter()
                        .map(|c| format!("{c}={}", self.level))
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            None => EnvFilter::builder()
                .with_default_directive(self.level.into())
                .parse_lossy(""),
        }
    }
}
