use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::DecryptedCredential;

mod verifier;

pub use verifier::*;

/// Organization identifier used for tokens which are not saved under an organization name yet
pub const UNSAVED_ORG_NAME: &str = "new_org_token";

/// The credential an account lookup must authenticate with
#[derive(Debug, Clone, Copy)]
pub enum TokenSource<'a> {
    /// A token saved under an organization name. The issuer client retrieves its
    /// credential by name.
    Persisted(&'a str),
    /// A token which only exists in memory, typically one which was just uploaded
    Unsaved(&'a DecryptedCredential),
}

impl<'a> TokenSource<'a> {
    /// Select the source for a token: a token without an organization name is not saved yet
    pub fn for_token(organization_name: &'a str, credential: &'a DecryptedCredential) -> Self {
        if organization_name.is_empty() {
            TokenSource::Unsaved(credential)
        } else {
            TokenSource::Persisted(organization_name)
        }
    }

    /// Identifier sent to the issuer client
    pub fn organization_identifier(&self) -> &'a str {
        match *self {
            TokenSource::Persisted(name) => name,
            TokenSource::Unsaved(_) => UNSAVED_ORG_NAME,
        }
    }

    /// Credential to use instead of a lookup by organization name
    pub fn unsaved_credential(&self) -> Option<&'a DecryptedCredential> {
        match *self {
            TokenSource::Persisted(_) => None,
            TokenSource::Unsaved(credential) => Some(credential),
        }
    }

    pub fn is_unsaved(&self) -> bool {
        matches!(self, TokenSource::Unsaved(_))
    }
}

/// Account details returned by the issuer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountRecord {
    pub server_name: String,
    pub server_uuid: String,
    pub admin_id: String,
    /// Older versions of the issuer API return the administrator here instead of `admin_id`
    pub facilitator_id: String,
    pub org_name: String,
    pub org_email: String,
    pub org_phone: String,
    pub org_address: String,
    pub org_id: String,
    pub org_id_hash: String,
    pub org_type: String,
    pub org_version: String,
}

impl AccountRecord {
    /// Fill the administrator identifier from the facilitator identifier when the
    /// issuer uses the legacy field
    pub fn normalize(mut self) -> Self {
        if self.admin_id.is_empty() {
            self.admin_id = self.facilitator_id.clone();
        }
        self
    }
}

/// Failure of an account lookup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssuerError {
    /// The issuer rejected the credential
    #[error("authentication error, status {status}: {message}")]
    Auth { status: u16, message: String },

    #[error("account request timed out after {0:?}")]
    Timeout(Duration),

    #[error("account request failed: {0}")]
    Transport(String),
}

impl IssuerError {
    pub fn auth(status: u16, message: impl Into<String>) -> Self {
        IssuerError::Auth {
            status,
            message: message.into(),
        }
    }

    pub fn transport<T: core::fmt::Display>(e: T) -> Self {
        IssuerError::Transport(e.to_string())
    }

    /// Return the HTTP status of an authentication error
    pub fn auth_status(&self) -> Option<u16> {
        match self {
            IssuerError::Auth { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Account lookup on the issuer.
///
/// Implementations own the wire protocol. For a [`TokenSource::Persisted`] source they
/// retrieve the credential saved under the organization name, for a
/// [`TokenSource::Unsaved`] source they must use the credential carried by the source.
#[async_trait]
pub trait AccountDetailApi: Send + Sync + 'static {
    async fn account_detail(&self, source: &TokenSource<'_>) -> Result<AccountRecord, IssuerError>;
}

/// Creates issuer clients
pub trait AccountClientFactory: Send + Sync + 'static {
    fn create_client(&self) -> Arc<dyn AccountDetailApi>;
}

impl<T: AccountDetailApi> AccountClientFactory for Arc<T> {
    fn create_client(&self) -> Arc<dyn AccountDetailApi> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    fn credential() -> DecryptedCredential {
        DecryptedCredential::new("CK", "CS", "AT", "AS", datetime!(2026-01-01 00:00:00 UTC))
    }

    #[test]
    fn empty_organization_name_is_an_unsaved_token() {
        let credential = credential();

        let source = TokenSource::for_token("", &credential);
        assert!(source.is_unsaved());
        assert_eq!(source.organization_identifier(), UNSAVED_ORG_NAME);
        assert_eq!(source.unsaved_credential(), Some(&credential));

        let source = TokenSource::for_token("Acme Inc.", &credential);
        assert!(!source.is_unsaved());
        assert_eq!(source.organization_identifier(), "Acme Inc.");
        assert_eq!(source.unsaved_credential(), None);
    }

    #[test]
    fn admin_id_falls_back_to_facilitator_id() {
        let record = AccountRecord {
            org_name: "Acme Inc.".to_string(),
            facilitator_id: "admin@acme.example".to_string(),
            ..Default::default()
        };
        assert_eq!(record.normalize().admin_id, "admin@acme.example");

        let record = AccountRecord {
            admin_id: "it@acme.example".to_string(),
            facilitator_id: "admin@acme.example".to_string(),
            ..Default::default()
        };
        assert_eq!(record.normalize().admin_id, "it@acme.example");
    }

    #[test]
    fn parse_account_response() {
        let json = r#"{
            "server_name": "Acme Enrollment Server",
            "server_uuid": "9b0e1a0c-3f0b-4f4a-9b33-0dc6f4b2c2d1",
            "facilitator_id": "admin@acme.example",
            "org_name": "Acme Inc.",
            "org_email": "it@acme.example",
            "org_phone": "+1 555 0100",
            "org_address": "42 Main Street",
            "urls": [{"uri": "/session", "http_method": ["GET"]}],
            "org_type": "org",
            "org_version": "v2"
        }"#;
        let record: AccountRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.admin_id, "");
        assert_eq!(record.org_version, "v2");
        let record = record.normalize();
        assert_eq!(record.admin_id, "admin@acme.example");
        assert_eq!(record.org_name, "Acme Inc.");
    }
}
