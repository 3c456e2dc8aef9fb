mod common;

use pretty_assertions::assert_eq;
use std::error::Error;
use std::time::Duration;
use time::macros::datetime;
use time::UtcOffset;

use common::{account, credential, FakeIssuer, TestKeyPair};
use ockam_org_token::error::{GENERATE_KEY_PAIR_MESSAGE, INVALID_CREDENTIAL_MESSAGE, INVALID_TOKEN_MESSAGE};
use ockam_org_token::{
    refresh_token_metadata, refresh_token_metadata_with_credential, unwrap_uploaded_token,
    ErrorKind, InMemoryAssetStore, IssuerError, OrganizationToken, RefreshContext,
    UNSAVED_ORG_NAME,
};

#[tokio::test]
async fn an_uploaded_token_is_unwrapped_with_the_stored_key_pair() {
    let key_pair = TestKeyPair::generate();
    let sealed = key_pair.seal(&credential());

    let (encrypted, unwrapped) =
        unwrap_uploaded_token(&RefreshContext::new(), &key_pair.asset_store(), sealed.as_slice())
            .await
            .unwrap();

    assert_eq!(encrypted, sealed);
    assert_eq!(unwrapped, credential());
}

#[tokio::test]
async fn an_smime_token_is_unwrapped_with_a_stored_rsa_key_pair() {
    let key_pair = TestKeyPair::rsa();
    let sealed = key_pair.seal(&credential());
    assert!(String::from_utf8_lossy(&sealed).contains("application/pkcs7-mime"));

    let (encrypted, unwrapped) =
        unwrap_uploaded_token(&RefreshContext::new(), &key_pair.asset_store(), sealed.as_slice())
            .await
            .unwrap();

    assert_eq!(encrypted, sealed);
    assert_eq!(unwrapped, credential());
}

#[tokio::test]
async fn a_stored_certificate_chain_uses_its_first_certificate() {
    let key_pair = TestKeyPair::generate();
    let issuer_certificate = TestKeyPair::generate().certificate;
    let chain = format!("{}{}", key_pair.certificate, issuer_certificate);
    let store = InMemoryAssetStore::with_key_pair(chain, key_pair.private_key.as_bytes());

    let sealed = key_pair.seal(&credential());

    let (_, unwrapped) = unwrap_uploaded_token(&RefreshContext::new(), &store, sealed.as_slice())
        .await
        .unwrap();

    assert_eq!(unwrapped, credential());
}

#[tokio::test]
async fn a_token_sealed_for_another_key_pair_is_rejected_without_crypto_details() {
    let sealed = TestKeyPair::generate().seal(&credential());
    let other = TestKeyPair::generate();

    let err = unwrap_uploaded_token(&RefreshContext::new(), &other.asset_store(), sealed.as_slice())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    assert_eq!(err.to_string(), INVALID_TOKEN_MESSAGE);
    assert_eq!(err.user_message(), Some(INVALID_TOKEN_MESSAGE));

    // the cause stays available for the logs
    let cause = err.source().unwrap().to_string();
    assert!(!err.to_string().contains(&cause));
}

#[tokio::test]
async fn garbage_uploads_are_rejected() {
    let key_pair = TestKeyPair::generate();

    let err = unwrap_uploaded_token(
        &RefreshContext::new(),
        &key_pair.asset_store(),
        &b"definitely not a token"[..],
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
}

#[tokio::test]
async fn a_missing_key_pair_is_reported_before_reading_the_upload() {
    let store = InMemoryAssetStore::new();

    let err = unwrap_uploaded_token(&RefreshContext::new(), &store, &b"irrelevant"[..])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AssetMissing);
    assert_eq!(err.to_string(), GENERATE_KEY_PAIR_MESSAGE);
}

#[tokio::test]
async fn an_unsaved_token_is_verified_with_its_own_credential() {
    let issuer = FakeIssuer::answering(account("Acme Inc.", "admin@acme.example"));
    let mut token = OrganizationToken::unsaved();

    refresh_token_metadata_with_credential(&RefreshContext::new(), &mut token, &credential(), &issuer)
        .await
        .unwrap();

    assert_eq!(
        issuer.calls(),
        vec![(UNSAVED_ORG_NAME.to_string(), Some(credential()))]
    );
    assert_eq!(token.organization_name, "Acme Inc.");
    assert_eq!(token.admin_id, "admin@acme.example");
}

#[tokio::test]
async fn the_renewal_date_is_the_credential_expiry_in_utc() {
    let issuer = FakeIssuer::answering(account("Acme Inc.", "admin@acme.example"));
    let mut token = OrganizationToken::unsaved();

    refresh_token_metadata_with_credential(&RefreshContext::new(), &mut token, &credential(), &issuer)
        .await
        .unwrap();

    assert_eq!(token.renew_at, datetime!(2026-04-02 01:00:00 UTC));
    assert_eq!(token.renew_at.offset(), UtcOffset::UTC);
}

#[tokio::test]
async fn the_legacy_facilitator_id_is_used_as_administrator() {
    let mut record = account("Acme Inc.", "");
    record.facilitator_id = "facilitator@acme.example".to_string();
    let issuer = FakeIssuer::answering(record);
    let mut token = OrganizationToken::unsaved();

    refresh_token_metadata_with_credential(&RefreshContext::new(), &mut token, &credential(), &issuer)
        .await
        .unwrap();

    assert_eq!(token.admin_id, "facilitator@acme.example");
}

#[tokio::test]
async fn a_saved_token_is_refreshed_from_the_asset_store() {
    let key_pair = TestKeyPair::generate();
    let store = key_pair.asset_store();
    store.insert_encrypted_token("Acme Inc.", key_pair.seal(&credential()));
    let issuer = FakeIssuer::answering(account("Acme Corporation", "new-admin@acme.example"));
    let mut token = OrganizationToken::new("Acme Inc.");

    refresh_token_metadata(&RefreshContext::new(), &mut token, &store, &issuer)
        .await
        .unwrap();

    assert_eq!(issuer.calls(), vec![("Acme Inc.".to_string(), None)]);
    assert_eq!(
        token,
        OrganizationToken {
            organization_name: "Acme Corporation".to_string(),
            admin_id: "new-admin@acme.example".to_string(),
            renew_at: datetime!(2026-04-02 01:00:00 UTC),
        }
    );
}

#[tokio::test]
async fn a_missing_key_pair_stops_the_refresh_before_calling_the_issuer() {
    let issuer = FakeIssuer::answering(account("Acme Inc.", "admin@acme.example"));
    let mut token = OrganizationToken::new("Acme Inc.");

    let err = refresh_token_metadata(
        &RefreshContext::new(),
        &mut token,
        &InMemoryAssetStore::new(),
        &issuer,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AssetMissing);
    assert!(issuer.calls().is_empty());
    assert_eq!(token, OrganizationToken::new("Acme Inc."));
}

#[tokio::test]
async fn an_undecryptable_stored_token_stops_the_refresh_before_calling_the_issuer() {
    let key_pair = TestKeyPair::generate();
    let store = key_pair.asset_store();
    store.insert_encrypted_token("Acme Inc.", TestKeyPair::generate().seal(&credential()));
    let issuer = FakeIssuer::answering(account("Acme Inc.", "admin@acme.example"));
    let mut token = OrganizationToken::new("Acme Inc.");

    let err = refresh_token_metadata(&RefreshContext::new(), &mut token, &store, &issuer)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    assert_eq!(err.to_string(), INVALID_TOKEN_MESSAGE);
    assert!(issuer.calls().is_empty());
    assert_eq!(token, OrganizationToken::new("Acme Inc."));
}

#[tokio::test]
async fn a_missing_stored_token_is_an_internal_error() {
    let key_pair = TestKeyPair::generate();
    let issuer = FakeIssuer::answering(account("Acme Inc.", "admin@acme.example"));
    let mut token = OrganizationToken::new("Acme Inc.");

    let err = refresh_token_metadata(
        &RefreshContext::new(),
        &mut token,
        &key_pair.asset_store(),
        &issuer,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!err.is_user_facing());
    assert!(issuer.calls().is_empty());
}

#[tokio::test]
async fn a_401_means_the_credential_is_invalid() {
    let issuer = FakeIssuer::failing(IssuerError::auth(401, "unauthorized"));
    let mut token = OrganizationToken::unsaved();

    let err = refresh_token_metadata_with_credential(
        &RefreshContext::new(),
        &mut token,
        &credential(),
        &issuer,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidCredential);
    assert_eq!(err.to_string(), INVALID_CREDENTIAL_MESSAGE);
    assert_eq!(token, OrganizationToken::unsaved());
}

#[tokio::test]
async fn other_issuer_failures_are_verification_failures() {
    for error in [
        IssuerError::auth(403, "forbidden"),
        IssuerError::transport("connection reset by peer"),
    ] {
        let issuer = FakeIssuer::failing(error);
        let mut token = OrganizationToken::new("Acme Inc.");

        let err = refresh_token_metadata_with_credential(
            &RefreshContext::new(),
            &mut token,
            &credential(),
            &issuer,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::VerificationFailed);
        assert_eq!(err.user_message(), None);
        assert_eq!(issuer.calls().len(), 1);
        assert_eq!(token, OrganizationToken::new("Acme Inc."));
    }
}

#[tokio::test]
async fn a_slow_issuer_times_out() {
    let issuer = FakeIssuer::slow(
        account("Acme Inc.", "admin@acme.example"),
        Duration::from_secs(10),
    );
    let ctx = RefreshContext::new().with_issuer_timeout(Duration::from_millis(50));
    let mut token = OrganizationToken::unsaved();

    let err = refresh_token_metadata_with_credential(&ctx, &mut token, &credential(), &issuer)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VerificationFailed);
    assert_eq!(issuer.calls().len(), 1);
    assert!(token.is_unsaved());
}
