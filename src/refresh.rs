use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::instrument;

use crate::account::{AccountClientFactory, AccountVerifier, TokenSource};
use crate::assets::{load_key_pair, AssetStore};
use crate::config::issuer_timeout;
use crate::error::ConfigError;
use crate::{envelope, DecryptedCredential, ErrorKind, OrgTokenError, OrganizationToken};

/// Stages of a refresh: `Start -> Unwrapping -> Verifying -> Reconciling -> Done`.
/// Any stage can move to `Failed`, which terminates the refresh. Nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    Start,
    Unwrapping,
    Verifying,
    Reconciling,
    Done,
    Failed(ErrorKind),
}

impl RefreshStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefreshStage::Done | RefreshStage::Failed(_))
    }
}

impl Display for RefreshStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshStage::Start => f.write_str("start"),
            RefreshStage::Unwrapping => f.write_str("unwrapping"),
            RefreshStage::Verifying => f.write_str("verifying"),
            RefreshStage::Reconciling => f.write_str("reconciling"),
            RefreshStage::Done => f.write_str("done"),
            RefreshStage::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Per-request settings of the token operations.
///
/// The operations are cancelled by dropping their future. The issuer timeout bounds the
/// account lookup when the caller does not enforce its own deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshContext {
    issuer_timeout: Option<Duration>,
}

impl RefreshContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from the environment configuration
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            issuer_timeout: issuer_timeout()?,
        })
    }

    pub fn with_issuer_timeout(self, issuer_timeout: Duration) -> Self {
        Self {
            issuer_timeout: Some(issuer_timeout),
        }
    }

    pub fn issuer_timeout(&self) -> Option<Duration> {
        self.issuer_timeout
    }
}

/// Refresh the metadata of a token saved under its organization name.
///
/// The token is only modified if every step succeeds.
#[instrument(skip_all, fields(organization = %token.organization_name))]
pub async fn refresh_token_metadata(
    ctx: &RefreshContext,
    token: &mut OrganizationToken,
    assets: &dyn AssetStore,
    clients: &dyn AccountClientFactory,
) -> Result<(), OrgTokenError> {
    trace!(stage = %RefreshStage::Start);
    trace!(stage = %RefreshStage::Unwrapping);
    let credential = stored_credential(assets, &token.organization_name)
        .await
        .map_err(|e| failed(RefreshStage::Unwrapping, e))?;
    verify_and_reconcile(ctx, token, &credential, clients).await
}

/// Refresh the metadata of a token from its decrypted credential.
///
/// A token without an organization name has not been saved yet: its credential is handed to
/// the issuer client directly instead of being looked up by name.
#[instrument(skip_all, fields(organization = %token.organization_name))]
pub async fn refresh_token_metadata_with_credential(
    ctx: &RefreshContext,
    token: &mut OrganizationToken,
    credential: &DecryptedCredential,
    clients: &dyn AccountClientFactory,
) -> Result<(), OrgTokenError> {
    trace!(stage = %RefreshStage::Start);
    verify_and_reconcile(ctx, token, credential, clients).await
}

async fn verify_and_reconcile(
    ctx: &RefreshContext,
    token: &mut OrganizationToken,
    credential: &DecryptedCredential,
    clients: &dyn AccountClientFactory,
) -> Result<(), OrgTokenError> {
    trace!(stage = %RefreshStage::Verifying);
    let verifier = AccountVerifier::new(clients.create_client()).with_timeout(ctx.issuer_timeout());
    let account = verifier
        .verify(TokenSource::for_token(&token.organization_name, credential))
        .await
        .map_err(|e| failed(RefreshStage::Verifying, e))?;

    trace!(stage = %RefreshStage::Reconciling);
    token.reconcile(credential, &account);

    debug!(
        stage = %RefreshStage::Done,
        organization = %token.organization_name,
        renew_at = %token.renew_at,
        "organization token metadata refreshed"
    );
    Ok(())
}

/// Decrypt an uploaded token with the key pair of the asset store.
///
/// Return the encrypted bytes, to be saved as they are, and the decrypted credential.
/// The key pair is checked before the upload is read.
///
/// Only the `Start` and `Unwrapping` stages apply. There is no issuer call, the context
/// is only recorded in the span.
#[instrument(skip_all, fields(issuer_timeout = ?ctx.issuer_timeout()))]
pub async fn unwrap_uploaded_token<R>(
    ctx: &RefreshContext,
    assets: &dyn AssetStore,
    mut token: R,
) -> Result<(Vec<u8>, DecryptedCredential), OrgTokenError>
where
    R: AsyncRead + Unpin,
{
    trace!(stage = %RefreshStage::Start);
    trace!(stage = %RefreshStage::Unwrapping);
    let key_pair = load_key_pair(assets)
        .await
        .map_err(|e| failed(RefreshStage::Unwrapping, e))?;

    let mut encrypted = Vec::new();
    token.read_to_end(&mut encrypted).await.map_err(|e| {
        failed(
            RefreshStage::Unwrapping,
            OrgTokenError::internal("reading token bytes", e),
        )
    })?;

    let credential = envelope::unwrap(&encrypted, &key_pair)
        .map_err(log_unwrap_failure)
        .map_err(|e| failed(RefreshStage::Unwrapping, e))?;
    debug!(
        expiry = %credential.access_token_expiry_utc(),
        "uploaded organization token unwrapped"
    );
    Ok((encrypted, credential))
}

/// Retrieve and decrypt the token saved for an organization
async fn stored_credential(
    assets: &dyn AssetStore,
    organization_name: &str,
) -> Result<DecryptedCredential, OrgTokenError> {
    let key_pair = load_key_pair(assets).await?;
    let encrypted = assets
        .get_encrypted_token(organization_name)
        .await
        .map_err(|e| OrgTokenError::internal("retrieving the stored organization token", e))?;
    envelope::unwrap(&encrypted, &key_pair).map_err(log_unwrap_failure)
}

fn log_unwrap_failure(e: OrgTokenError) -> OrgTokenError {
    // the cryptographic cause is only written to the logs
    if let Some(source) = std::error::Error::source(&e) {
        warn!(kind = %e.kind(), cause = %source, "organization token cannot be unwrapped");
    }
    e
}

fn failed(from: RefreshStage, e: OrgTokenError) -> OrgTokenError {
    debug!(stage = %RefreshStage::Failed(e.kind()), %from, "organization token refresh failed");
    e
}
