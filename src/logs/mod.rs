use std::io::stdout;

pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod logging_configuration;
mod logging_options;

pub use logging_configuration::*;
pub use logging_options::*;

/// Errors raised when the global tracing subscriber can not be installed
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LoggingError {
    #[error("failed to create the rolling log file appender")]
    Appender(#[from] InitError),
    #[error("failed to initialize the tracing subscriber")]
    Subscriber(#[from] TryInitError),
}

pub struct Logging;

impl Logging {
    /// Install a global tracing subscriber.
    ///
    /// Log lines are written to the console, or to daily rolling files when a log
    /// directory is configured. The returned guard must be kept alive for buffered
    /// lines to be flushed.
    pub fn setup(configuration: &LoggingConfiguration) -> Result<LoggingGuard, LoggingError> {
        let subscriber = tracing_subscriber::registry().with(configuration.env_filter());

        let (writer, guard) = match configuration.log_dir() {
            None => tracing_appender::non_blocking(stdout()),
            Some(log_dir) => {
                let r = RollingFileAppender::builder()
                    .rotation(Rotation::DAILY)
                    .max_log_files(configuration.max_files() as usize)
                    .filename_prefix("org_token")
                    .filename_suffix("log")
                    .build(log_dir)?;
                tracing_appender::non_blocking(r)
            }
        };
        let colored = configuration.log_dir().is_none() && configuration.is_colored();
        let appender = layer().with_ansi(colored).with_writer(writer);

        match configuration.format() {
            LogFormat::Pretty => subscriber.with(appender.pretty()).try_init()?,
            LogFormat::Json => subscriber.with(appender.json()).try_init()?,
            LogFormat::Default => subscriber.with(appender).try_init()?,
        };

        info!(
            level = %configuration.level(),
            format = %configuration.format(),
            "tracing initialized"
        );
        Ok(LoggingGuard {
            _worker_guard: guard,
        })
    }
}

/// Keeps the background log writer running
pub struct LoggingGuard {
    _worker_guard: WorkerGuard,
}
