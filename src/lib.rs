//! Organization token lifecycle.
//!
//! An organization token is an encrypted bundle of issuer API credentials. This crate
//! unwraps uploaded tokens with the organization key pair, verifies the credentials
//! against the issuer account service, and reconciles the token metadata
//! (organization name, administrator, renewal date) with the issuer's answer.

pub mod account;
pub mod assets;
pub mod config;
pub mod credential;
pub mod env;
pub mod envelope;
pub mod error;
pub mod logs;
pub mod refresh;
pub mod token;

pub use account::{
    AccountClientFactory, AccountDetailApi, AccountRecord, AccountVerifier, IssuerError,
    TokenSource, UNSAVED_ORG_NAME,
};
pub use assets::{AssetName, AssetStore, AssetStoreError, InMemoryAssetStore};
pub use credential::DecryptedCredential;
pub use envelope::KeyMaterialPair;
pub use error::{ErrorKind, OrgTokenError};
pub use refresh::{
    refresh_token_metadata, refresh_token_metadata_with_credential, unwrap_uploaded_token,
    RefreshContext, RefreshStage,
};
pub use token::OrganizationToken;

#[macro_use]
extern crate tracing;
