use std::time::Duration;

use crate::env::get_env_with_default;
use crate::error::ConfigError;

mod duration_var;

pub use duration_var::*;

/// Maximum time to wait for the issuer account lookup. `0` disables the timeout
pub const OCKAM_ORG_TOKEN_ISSUER_TIMEOUT: &str = "OCKAM_ORG_TOKEN_ISSUER_TIMEOUT";
pub const OCKAM_LOG_LEVEL: &str = "OCKAM_LOG_LEVEL";
pub const OCKAM_LOG_FORMAT: &str = "OCKAM_LOG_FORMAT";
pub const OCKAM_LOG_DIR: &str = "OCKAM_LOG_DIR";
pub const OCKAM_LOG_MAX_FILES: &str = "OCKAM_LOG_MAX_FILES";
pub const OCKAM_LOG_CRATES_FILTER: &str = "OCKAM_LOG_CRATES_FILTER";

pub(crate) const DEFAULT_ISSUER_TIMEOUT: Duration = Duration::from_secs(30);

/// Return the timeout of the issuer account lookup, taken from an environment variable
pub fn issuer_timeout() -> Result<Option<Duration>, ConfigError> {
    let timeout = get_env_with_default(
        OCKAM_ORG_TOKEN_ISSUER_TIMEOUT,
        DurationVar::new(DEFAULT_ISSUER_TIMEOUT),
    )?
    .duration;
    Ok((!timeout.is_zero()).then_some(timeout))
}
