use core::fmt;
use miette::Diagnostic;

use crate::account::IssuerError;
use crate::assets::{AssetName, AssetStoreError};
use crate::envelope::{CertificateError, UnwrapError};

/// Message shown when the certificate or the key needed to unwrap a token is not stored yet
pub const GENERATE_KEY_PAIR_MESSAGE: &str = "Please generate a key pair first.";

/// Message shown when an uploaded token cannot be unwrapped with the stored key pair
pub const INVALID_TOKEN_MESSAGE: &str =
    "Invalid token. Please provide a valid token from the device enrollment issuer.";

/// Message shown when the issuer rejects the credential with a 401
pub const INVALID_CREDENTIAL_MESSAGE: &str = "The device enrollment certificate or server token is invalid. \
Restart with a valid certificate and token.";

/// The kinds of failures a caller can observe when unwrapping, verifying or refreshing
/// an organization token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The certificate or the private key is missing from the asset store
    AssetMissing,
    /// The token could not be unwrapped with the stored key pair
    DecryptionFailed,
    /// The issuer answered the account lookup with a 401
    InvalidCredential,
    /// Any other issuer or transport failure
    VerificationFailed,
    /// The stored certificate cannot be decoded
    InternalFormat,
    /// A store or I/O failure unrelated to the token content
    Internal,
}

impl ErrorKind {
    /// Return true if errors of this kind carry a message meant for the end user
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ErrorKind::AssetMissing | ErrorKind::DecryptionFailed | ErrorKind::InvalidCredential
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::AssetMissing => f.write_str("asset missing"),
            ErrorKind::DecryptionFailed => f.write_str("decryption failed"),
            ErrorKind::InvalidCredential => f.write_str("invalid credential"),
            ErrorKind::VerificationFailed => f.write_str("verification failed"),
            ErrorKind::InternalFormat => f.write_str("internal format error"),
            ErrorKind::Internal => f.write_str("internal error"),
        }
    }
}

/// Errors returned by the organization token operations.
///
/// The `Display` implementation of the user-facing variants only contains guidance text.
/// The underlying failure is kept as the error source so that it can be logged, but it
/// never becomes part of the message returned to a user.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum OrgTokenError {
    #[error("{}", GENERATE_KEY_PAIR_MESSAGE)]
    #[diagnostic(
        code(org_token::asset_missing),
        help("the certificate and the private key used to unwrap tokens must be stored first")
    )]
    AssetMissing { missing: Vec<AssetName> },

    #[error("{}", INVALID_TOKEN_MESSAGE)]
    #[diagnostic(code(org_token::decryption_failed))]
    DecryptionFailed {
        #[source]
        source: UnwrapError,
    },

    #[error("{}", INVALID_CREDENTIAL_MESSAGE)]
    #[diagnostic(code(org_token::invalid_credential))]
    InvalidCredential {
        #[source]
        source: IssuerError,
    },

    #[error("{context}: {source}")]
    #[diagnostic(code(org_token::verification_failed))]
    VerificationFailed {
        context: &'static str,
        #[source]
        source: IssuerError,
    },

    #[error("{context}: {source}")]
    #[diagnostic(code(org_token::internal_format))]
    InternalFormat {
        context: &'static str,
        #[source]
        source: CertificateError,
    },

    #[error("{context}: {message}")]
    #[diagnostic(code(org_token::internal))]
    Internal {
        context: &'static str,
        message: String,
    },
}

impl OrgTokenError {
    /// Return the classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrgTokenError::AssetMissing { .. } => ErrorKind::AssetMissing,
            OrgTokenError::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
            OrgTokenError::InvalidCredential { .. } => ErrorKind::InvalidCredential,
            OrgTokenError::VerificationFailed { .. } => ErrorKind::VerificationFailed,
            OrgTokenError::InternalFormat { .. } => ErrorKind::InternalFormat,
            OrgTokenError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Return the message which can be shown to the end user, if this error has one
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            OrgTokenError::AssetMissing { .. } => Some(GENERATE_KEY_PAIR_MESSAGE),
            OrgTokenError::DecryptionFailed { .. } => Some(INVALID_TOKEN_MESSAGE),
            OrgTokenError::InvalidCredential { .. } => Some(INVALID_CREDENTIAL_MESSAGE),
            _ => None,
        }
    }

    /// Return true if this error is the result of invalid user input rather than a server failure
    pub fn is_user_facing(&self) -> bool {
        self.kind().is_user_facing()
    }

    pub(crate) fn internal<T: fmt::Display>(context: &'static str, m: T) -> OrgTokenError {
        OrgTokenError::Internal {
            context,
            message: m.to_string(),
        }
    }

    /// Classify a failed account lookup. Only a 401 is considered to be a problem with the
    /// credential itself, everything else is passed through.
    pub(crate) fn from_issuer(source: IssuerError) -> OrgTokenError {
        match source.auth_status() {
            Some(401) => OrgTokenError::InvalidCredential { source },
            Some(_) => OrgTokenError::VerificationFailed {
                context: "issuer GET /account request failed with authentication error",
                source,
            },
            None => OrgTokenError::VerificationFailed {
                context: "issuer GET /account request failed",
                source,
            },
        }
    }

    /// Classify a failed read of the key pair assets
    pub(crate) fn from_asset_store(e: AssetStoreError, requested: &[AssetName]) -> OrgTokenError {
        match e {
            AssetStoreError::NotFound(missing) if missing.is_empty() => {
                OrgTokenError::AssetMissing {
                    missing: requested.to_vec(),
                }
            }
            AssetStoreError::NotFound(missing) => OrgTokenError::AssetMissing { missing },
            other => OrgTokenError::internal("retrieving stored organization token assets", other),
        }
    }
}

impl From<UnwrapError> for OrgTokenError {
    fn from(source: UnwrapError) -> Self {
        OrgTokenError::DecryptionFailed { source }
    }
}

impl From<CertificateError> for OrgTokenError {
    fn from(source: CertificateError) -> Self {
        OrgTokenError::InternalFormat {
            context: "parsing the stored organization token certificate",
            source,
        }
    }
}

/// Errors raised while reading configuration values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("environment variable {0} is not valid unicode")]
    NotUnicode(String),

    #[error("{0}")]
    Parse(String),
}

impl ConfigError {
    pub fn parse<T: fmt::Display>(m: T) -> ConfigError {
        ConfigError::Parse(m.to_string())
    }
}
