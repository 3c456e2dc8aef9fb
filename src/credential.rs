use core::fmt;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::envelope::UnwrapError;

const BEGIN_MESSAGE: &str = "-----BEGIN MESSAGE-----";
const END_MESSAGE: &str = "-----END MESSAGE-----";

/// The OAuth1 credential carried inside an organization token.
///
/// It is produced once, when a token is unwrapped, and is never modified afterwards.
/// Secrets are erased from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DecryptedCredential {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_secret: String,
    #[serde(with = "time::serde::rfc3339")]
    #[zeroize(skip)]
    access_token_expiry: OffsetDateTime,
}

impl DecryptedCredential {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
        access_token_expiry: OffsetDateTime,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_secret: access_secret.into(),
            access_token_expiry,
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn access_secret(&self) -> &str {
        &self.access_secret
    }

    /// Expiry as written by the issuer, with its original offset
    pub fn access_token_expiry(&self) -> OffsetDateTime {
        self.access_token_expiry
    }

    /// Expiry normalized to UTC
    pub fn access_token_expiry_utc(&self) -> OffsetDateTime {
        self.access_token_expiry.to_offset(UtcOffset::UTC)
    }

    /// Parse the decrypted content of a token.
    ///
    /// The issuer wraps the JSON document in a small MIME message where the
    /// body sits between `BEGIN MESSAGE` / `END MESSAGE` markers. A bare JSON
    /// document is accepted as well.
    pub fn from_message(plaintext: &[u8]) -> Result<DecryptedCredential, UnwrapError> {
        let text = std::str::from_utf8(plaintext).map_err(|_| UnwrapError::NotUtf8)?;
        let json = match text.find(BEGIN_MESSAGE) {
            Some(start) => {
                let body = &text[start + BEGIN_MESSAGE.len()..];
                let end = body.find(END_MESSAGE).ok_or(UnwrapError::MissingMessage)?;
                &body[..end]
            }
            None if text.trim_start().starts_with('{') => text,
            None => return Err(UnwrapError::MissingMessage),
        };
        serde_json::from_str(json.trim()).map_err(UnwrapError::Json)
    }

    /// Render the credential the way the issuer packages it before encryption
    pub fn to_message(&self) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!(
            "Content-Type: text/plain;charset=UTF-8\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             {BEGIN_MESSAGE}\n{json}\n{END_MESSAGE}\n"
        )
        .into_bytes())
    }
}

impl fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedCredential")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_secret", &"<redacted>")
            .field("access_token_expiry", &self.access_token_expiry)
            .finish()
    }
}
