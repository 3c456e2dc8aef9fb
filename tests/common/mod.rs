#![allow(dead_code)]

use async_trait::async_trait;
use rand::rngs::OsRng;
use rcgen::{CertificateParams, KeyPair, PKCS_RSA_SHA256};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use time::macros::datetime;

use ockam_org_token::envelope;
use ockam_org_token::{
    AccountDetailApi, AccountRecord, DecryptedCredential, InMemoryAssetStore, IssuerError,
    KeyMaterialPair, TokenSource,
};

/// A generated certificate and its private key, both PEM encoded
#[derive(Clone)]
pub struct TestKeyPair {
    pub certificate: String,
    pub private_key: String,
}

impl TestKeyPair {
    pub fn generate() -> TestKeyPair {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["mdm.example.com".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        TestKeyPair {
            certificate: cert.pem(),
            private_key: key.serialize_pem(),
        }
    }

    /// An RSA 2048 key pair. Generating one is slow, the same pair is returned every time
    pub fn rsa() -> TestKeyPair {
        static PAIR: OnceLock<TestKeyPair> = OnceLock::new();
        PAIR.get_or_init(|| {
            let key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
            let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
            let signer = KeyPair::from_pkcs8_pem_and_sign_algo(&pem, &PKCS_RSA_SHA256).unwrap();
            let cert = CertificateParams::new(vec!["mdm.example.com".to_string()])
                .unwrap()
                .self_signed(&signer)
                .unwrap();
            TestKeyPair {
                certificate: cert.pem(),
                private_key: pem.to_string(),
            }
        })
        .clone()
    }

    pub fn key_material(&self) -> KeyMaterialPair {
        KeyMaterialPair::new(self.certificate.as_bytes(), self.private_key.as_bytes())
    }

    pub fn asset_store(&self) -> InMemoryAssetStore {
        InMemoryAssetStore::with_key_pair(self.certificate.as_bytes(), self.private_key.as_bytes())
    }

    /// Encrypt a credential for this key pair
    pub fn seal(&self, credential: &DecryptedCredential) -> Vec<u8> {
        envelope::seal(self.certificate.as_bytes(), credential).unwrap()
    }
}

pub fn credential() -> DecryptedCredential {
    DecryptedCredential::new(
        "consumer-key",
        "consumer-secret",
        "access-token",
        "access-secret",
        datetime!(2026-04-01 18:00:00 -07:00),
    )
}

pub fn account(org_name: &str, admin_id: &str) -> AccountRecord {
    AccountRecord {
        org_name: org_name.to_string(),
        admin_id: admin_id.to_string(),
        org_email: "it@acme.example".to_string(),
        ..Default::default()
    }
}

/// A call received by the fake issuer: the organization identifier and the credential
/// of an unsaved token
pub type RecordedCall = (String, Option<DecryptedCredential>);

/// Issuer client answering every lookup with the same result and recording its calls
pub struct FakeIssuer {
    result: Result<AccountRecord, IssuerError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeIssuer {
    pub fn answering(account: AccountRecord) -> Arc<FakeIssuer> {
        Arc::new(FakeIssuer {
            result: Ok(account),
            delay: None,
            calls: Mutex::new(vec![]),
        })
    }

    pub fn failing(error: IssuerError) -> Arc<FakeIssuer> {
        Arc::new(FakeIssuer {
            result: Err(error),
            delay: None,
            calls: Mutex::new(vec![]),
        })
    }

    pub fn slow(account: AccountRecord, delay: Duration) -> Arc<FakeIssuer> {
        Arc::new(FakeIssuer {
            result: Ok(account),
            delay: Some(delay),
            calls: Mutex::new(vec![]),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountDetailApi for FakeIssuer {
    async fn account_detail(&self, source: &TokenSource<'_>) -> Result<AccountRecord, IssuerError> {
        self.calls.lock().unwrap().push((
            source.organization_identifier().to_string(),
            source.unsaved_credential().cloned(),
        ));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}
