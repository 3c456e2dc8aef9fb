use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::account::AccountRecord;
use crate::DecryptedCredential;

/// Metadata of an organization token, as it is stored next to the encrypted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationToken {
    /// Name of the organization owning the token. Empty for a token which is not saved yet
    pub organization_name: String,
    /// Identifier of the issuer account administrator
    pub admin_id: String,
    /// Date at which the token must be renewed, in UTC
    #[serde(with = "time::serde::rfc3339")]
    pub renew_at: OffsetDateTime,
}

impl Default for OrganizationToken {
    fn default() -> Self {
        Self::unsaved()
    }
}

impl OrganizationToken {
    pub fn new(organization_name: impl Into<String>) -> Self {
        Self {
            organization_name: organization_name.into(),
            admin_id: String::new(),
            renew_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// A token which was just uploaded and has no organization name yet
    pub fn unsaved() -> Self {
        Self::new("")
    }

    pub fn is_unsaved(&self) -> bool {
        self.organization_name.is_empty()
    }

    /// Copy the verified account fields and the credential expiry into this token.
    /// The renewal date always comes from the credential, never from the issuer response.
    pub fn reconcile(&mut self, credential: &DecryptedCredential, account: &AccountRecord) {
        self.organization_name = account.org_name.clone();
        self.admin_id = account.admin_id.clone();
        self.renew_at = credential.access_token_expiry_utc();
    }
}
