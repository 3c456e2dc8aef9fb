use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

use crate::env::FromString;
use crate::error::ConfigError;

/// This struct can be used to parse environment variables representing a Duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationVar {
    pub duration: Duration,
}

impl DurationVar {
    pub fn new(duration: Duration) -> DurationVar {
        DurationVar { duration }
    }
}

/// Regex for durations: (?P<numeric_duration>[0-9]+)(?P<length_sigil>d|h|m|s|ms)?$
/// It accepts a number and a unit:
///
///  - d: day
///  - h: hour
///  - m: minute
///  - s: second
///  - ms: millisecond
///
/// For example: 1ms, 2s, 10m
static DURATION_REGEX: OnceCell<Regex> = OnceCell::new();

impl FromString for DurationVar {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        Ok(DurationVar {
            duration: parse_duration(s)?,
        })
    }
}

/// Parse a duration using a regular expression
pub fn parse_duration(arg: &str) -> Result<Duration, ConfigError> {
    let regex = DURATION_REGEX.get_or_try_init(|| {
        Regex::new(r"^(?P<numeric_duration>[0-9]+)(?P<length_sigil>d|h|m|s|ms)?$")
            .map_err(ConfigError::parse)
    })?;
    let needles = regex
        .captures(arg.trim())
        .ok_or_else(|| ConfigError::parse(format!("Invalid duration: {arg}")))?;
    let time = needles["numeric_duration"]
        .parse::<u64>()
        .map_err(|_| ConfigError::parse(format!("Invalid duration: {arg}")))?;

    let seconds = |factor: u64| {
        time.checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::parse(format!("Duration out of range: {arg}")))
    };
    match needles.name("length_sigil").map(|n| n.as_str()) {
        Some("ms") => Ok(Duration::from_millis(time)),
        Some("s") | None => seconds(1),
        Some("m") => seconds(60),
        Some("h") => seconds(60 * 60),
        Some("d") => seconds(60 * 60 * 24),
        Some(other) => Err(ConfigError::parse(format!("Invalid duration unit: {other}"))),
    }
}
