use std::env;
use std::env::VarError;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Get environmental value [var_name]. If value is not found returns Ok(None)
pub fn get_env<T: FromString>(var_name: &str) -> Result<Option<T>, ConfigError> {
    get_env_impl::<Option<T>>(var_name, None)
}

/// Get environmental value [var_name]. If value is not found returns [default_value]
pub fn get_env_with_default<T: FromString>(
    var_name: &str,
    default_value: T,
) -> Result<T, ConfigError> {
    get_env_impl::<T>(var_name, default_value)
}

fn get_env_impl<T: FromString>(var_name: &str, default_value: T) -> Result<T, ConfigError> {
    match env::var(var_name) {
        Ok(val) => T::from_string(&val).map_err(|e| ConfigError::InvalidValue {
            name: var_name.to_string(),
            message: e.to_string(),
        }),
        Err(VarError::NotPresent) => Ok(default_value),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(var_name.to_string())),
    }
}

/// Types that can be parsed from the value of an environment variable
pub trait FromString: Sized {
    fn from_string(s: &str) -> Result<Self, ConfigError>;
}

impl<T: FromString> FromString for Option<T> {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        T::from_string(s).map(Some)
    }
}

impl FromString for bool {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        let s = s.to_lowercase();
        match s.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::parse(format!("bool parsing error: {s}"))),
        }
    }
}

impl FromString for String {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        Ok(s.to_owned())
    }
}

impl<T: FromString> FromString for Vec<T> {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        s.split(',').map(|x| T::from_string(x.trim())).collect()
    }
}

impl FromString for u64 {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        s.parse::<u64>()
            .map_err(|_| ConfigError::parse("u64 parsing error"))
    }
}

impl FromString for PathBuf {
    fn from_string(s: &str) -> Result<Self, ConfigError> {
        Ok(PathBuf::from(&s))
    }
}
