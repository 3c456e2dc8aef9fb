use std::fmt::{Display, Formatter};

use crate::env::FromString;
use crate::error::ConfigError;

/// Options for selecting the log format used in files or in the console
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Default,
    Pretty,
    Json,
}

impl FromString for LogFormat {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        match s {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Ok(LogFormat::Default),
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Default => write!(f, "default"),
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Crates for which log messages are kept
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CratesFilter {
    All,
    Basic,
    Selected(Vec<String>),
}

impl CratesFilter {
    /// List of crates to keep for log messages
    pub fn crates(&self) -> Option<Vec<String>> {
        match self {
            CratesFilter::All => None,
            CratesFilter::Basic => Some(vec!["ockam_org_token".to_string(), "org_token".to_string()]),
            CratesFilter::Selected(list) => Some(list.clone()),
        }
    }
}

impl FromString for CratesFilter {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        match s {
            "all" => Ok(CratesFilter::All),
            "basic" => Ok(CratesFilter::Basic),
            other => Ok(CratesFilter::Selected(<Vec<String>>::from_string(other)?)),
        }
    }
}

impl Display for CratesFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CratesFilter::All => f.write_str("all"),
            CratesFilter::Basic => f.write_str("basic"),
            CratesFilter::Selected(s) => f.write_str(s.join(",").as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crates_filter() {
        assert_eq!(CratesFilter::from_string("all").unwrap().crates(), None);
        assert_eq!(
            CratesFilter::from_string("ockam_org_token,tokio").unwrap(),
            CratesFilter::Selected(vec!["ockam_org_token".to_string(), "tokio".to_string()])
        );
        assert_eq!(CratesFilter::Basic.to_string(), "basic");
    }

    #[test]
    fn test_log_format() {
        assert_eq!(LogFormat::from_string("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_string("unknown").unwrap(), LogFormat::Default);
    }
}
