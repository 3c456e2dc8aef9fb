use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{PoisonError, RwLock};

use crate::envelope::KeyMaterialPair;
use crate::OrgTokenError;

/// Well-known names of the assets used to unwrap organization tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetName {
    /// PEM-encoded certificate whose public key the issuer encrypts tokens for
    OrgTokenCert,
    /// Private key matching [`AssetName::OrgTokenCert`]
    OrgTokenKey,
}

impl AssetName {
    pub const KEY_PAIR: [AssetName; 2] = [AssetName::OrgTokenCert, AssetName::OrgTokenKey];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetName::OrgTokenCert => "org_token_cert",
            AssetName::OrgTokenKey => "org_token_key",
        }
    }
}

impl Display for AssetName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetStoreError {
    /// Some of the requested assets do not exist.
    /// The list can be empty when the store cannot tell which ones are missing.
    #[error("assets not found: {0:?}")]
    NotFound(Vec<AssetName>),

    #[error("no organization token stored for {0}")]
    TokenNotFound(String),

    #[error("asset store failure: {0}")]
    Backend(String),
}

/// Read access to the store holding the encrypted key pair and the saved organization tokens.
///
/// The store is responsible for its own at-rest encryption: values are returned in clear.
#[async_trait]
pub trait AssetStore: Send + Sync + 'static {
    /// Return all the requested assets, or fail with [`AssetStoreError::NotFound`]
    /// if any of them is missing
    async fn get_assets_by_name(
        &self,
        names: &[AssetName],
    ) -> Result<BTreeMap<AssetName, Vec<u8>>, AssetStoreError>;

    /// Return the encrypted token saved for an organization
    async fn get_encrypted_token(&self, organization_name: &str) -> Result<Vec<u8>, AssetStoreError>;
}

/// Load the certificate and private key used to unwrap tokens
pub async fn load_key_pair(store: &dyn AssetStore) -> Result<KeyMaterialPair, OrgTokenError> {
    let mut assets = store
        .get_assets_by_name(&AssetName::KEY_PAIR)
        .await
        .map_err(|e| OrgTokenError::from_asset_store(e, &AssetName::KEY_PAIR))?;

    // a store returning a partial result is treated like a store reporting the missing names
    let missing: Vec<AssetName> = AssetName::KEY_PAIR
        .into_iter()
        .filter(|n| assets.get(n).map(|v| v.is_empty()).unwrap_or(true))
        .collect();
    if !missing.is_empty() {
        return Err(OrgTokenError::AssetMissing { missing });
    }

    match (
        assets.remove(&AssetName::OrgTokenCert),
        assets.remove(&AssetName::OrgTokenKey),
    ) {
        (Some(certificate), Some(private_key)) => Ok(KeyMaterialPair::new(certificate, private_key)),
        _ => Err(OrgTokenError::AssetMissing {
            missing: AssetName::KEY_PAIR.to_vec(),
        }),
    }
}

/// Asset store keeping everything in memory
#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<BTreeMap<AssetName, Vec<u8>>>,
    tokens: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already containing a key pair
    pub fn with_key_pair(certificate: impl Into<Vec<u8>>, private_key: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        store.insert_asset(AssetName::OrgTokenCert, certificate);
        store.insert_asset(AssetName::OrgTokenKey, private_key);
        store
    }

    // Entries are replaced whole, so a map left behind by a panicking writer is still
    // consistent and a poisoned lock is recovered.

    pub fn insert_asset(&self, name: AssetName, value: impl Into<Vec<u8>>) {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value.into());
    }

    pub fn insert_encrypted_token(&self, organization_name: &str, token: impl Into<Vec<u8>>) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(organization_name.to_string(), token.into());
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get_assets_by_name(
        &self,
        names: &[AssetName],
    ) -> Result<BTreeMap<AssetName, Vec<u8>>, AssetStoreError> {
        let assets = self.assets.read().unwrap_or_else(PoisonError::into_inner);

        let missing: Vec<AssetName> = names
            .iter()
            .filter(|n| !assets.contains_key(n))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(AssetStoreError::NotFound(missing));
        }

        Ok(names
            .iter()
            .filter_map(|n| assets.get(n).map(|v| (*n, v.clone())))
            .collect())
    }

    async fn get_encrypted_token(&self, organization_name: &str) -> Result<Vec<u8>, AssetStoreError> {
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        tokens
            .get(organization_name)
            .cloned()
            .ok_or_else(|| AssetStoreError::TokenNotFound(organization_name.to_string()))
    }
}
