use std::sync::Arc;
use std::time::Duration;

use crate::account::{AccountDetailApi, AccountRecord, IssuerError, TokenSource};
use crate::OrgTokenError;

/// Verifies a credential by looking up its account on the issuer
#[derive(Clone)]
pub struct AccountVerifier {
    client: Arc<dyn AccountDetailApi>,
    timeout: Option<Duration>,
}

impl AccountVerifier {
    pub fn new(client: Arc<dyn AccountDetailApi>) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Give up on the issuer after some time. The timeout is reported as a verification failure.
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// Call the issuer once and return the normalized account record.
    ///
    /// A 401 means that the certificate or the token is invalid, all the other failures
    /// are returned as verification failures without being retried.
    pub async fn verify(&self, source: TokenSource<'_>) -> Result<AccountRecord, OrgTokenError> {
        debug!(
            organization = %source.organization_identifier(),
            unsaved = source.is_unsaved(),
            "looking up the issuer account"
        );
        let lookup = self.client.account_detail(&source);
        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, lookup).await {
                Ok(result) => result,
                Err(_) => Err(IssuerError::Timeout(timeout)),
            },
            None => lookup.await,
        };

        match result {
            Ok(record) => Ok(record.normalize()),
            Err(e) => {
                warn!(
                    organization = %source.organization_identifier(),
                    status = ?e.auth_status(),
                    "issuer account lookup failed"
                );
                Err(OrgTokenError::from_issuer(e))
            }
        }
    }
}
