//! Encryption envelopes of organization tokens.
//!
//! The issuer encrypts a token for the public key of a certificate that was
//! uploaded beforehand. Two envelopes exist, selected by the key type of that
//! certificate:
//!
//!  - P-256 certificates receive an ECIES envelope
//!  - RSA certificates receive an S/MIME message carrying a CMS `EnvelopedData`
//!
//! Both decrypt to the same MIME message which holds the credential JSON.

mod ecies;
mod smime;

use p256::pkcs8::DecodePrivateKey;
use p256::{PublicKey, SecretKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};
use zeroize::Zeroizing;

use crate::DecryptedCredential;

pub use ecies::{ENVELOPE_VERSION, PEM_LABEL};

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// Certificate and private key used to unwrap tokens, as stored in the asset store
#[derive(Clone)]
pub struct KeyMaterialPair {
    certificate: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
}

impl KeyMaterialPair {
    pub fn new(certificate: impl Into<Vec<u8>>, private_key: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate: certificate.into(),
            private_key: Zeroizing::new(private_key.into()),
        }
    }

    /// PEM-encoded certificate
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

impl core::fmt::Debug for KeyMaterialPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyMaterialPair")
            .field("certificate", &format!("{} bytes", self.certificate.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// The stored certificate cannot be decoded
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate in the asset store cannot be parsed as PEM: {0}")]
    Pem(String),

    #[error("invalid X.509 certificate: {0}")]
    X509(String),
}

/// A token cannot be unwrapped with a given key pair.
///
/// These errors describe cryptographic failures and must not be shown to end users.
#[derive(Debug, thiserror::Error)]
pub enum UnwrapError {
    #[error("invalid token armor: {0}")]
    Armor(pem_rfc7468::Error),

    #[error("unexpected token armor label {0}")]
    UnexpectedLabel(String),

    #[error("token envelope is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("unsupported token envelope version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid ephemeral public key")]
    InvalidEphemeralKey,

    #[error("unsupported private key encoding")]
    InvalidPrivateKey,

    #[error("the certificate contains neither a P-256 nor an RSA public key")]
    UnsupportedCertificateKey,

    #[error("the private key does not match the certificate")]
    KeyMismatch,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("aead decryption failed")]
    Aead,

    #[error("token is not a valid S/MIME message")]
    Mime,

    #[error("invalid base64 body: {0}")]
    Base64(base64::DecodeError),

    #[error("invalid CMS structure: {0}")]
    Asn1(yasna::ASN1Error),

    #[error("the token is not CMS enveloped data")]
    NotEnvelopedData,

    #[error("no recipient of the enveloped data matches the certificate")]
    NoRecipient,

    #[error("unsupported key encryption algorithm {0}")]
    UnsupportedKeyEncryption(String),

    #[error("unsupported content encryption algorithm {0}")]
    UnsupportedContentEncryption(String),

    #[error("content key decryption failed")]
    KeyTransport,

    #[error("content decryption failed")]
    ContentDecryption,

    #[error("decrypted token is not valid UTF-8")]
    NotUtf8,

    #[error("decrypted token does not contain a message")]
    MissingMessage,

    #[error("decrypted token is not a valid credential: {0}")]
    Json(serde_json::Error),
}

/// Errors raised when sealing a credential
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("the certificate contains neither a P-256 nor an RSA public key")]
    UnsupportedCertificateKey,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("aead encryption failed")]
    Aead,

    #[error("content key encryption failed")]
    KeyTransport,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Armor(#[from] pem_rfc7468::Error),
}

/// Public key of a recipient certificate
#[derive(Debug, Clone)]
pub enum RecipientKey {
    P256(PublicKey),
    Rsa(RsaPublicKey),
    /// A valid certificate which cannot be used to unwrap tokens
    Unsupported,
}

/// A parsed recipient certificate
pub struct RecipientCertificate {
    der: Vec<u8>,
    issuer: Vec<u8>,
    serial: Vec<u8>,
    key: RecipientKey,
}

impl RecipientCertificate {
    /// Decode the first certificate of a PEM file.
    ///
    /// Certificate chains are accepted, the blocks after the first one are ignored.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertificateError> {
        let (_, pem) = parse_x509_pem(pem).map_err(|e| CertificateError::Pem(e.to_string()))?;
        Self::from_der(pem.contents)
    }

    pub fn from_der(der: Vec<u8>) -> Result<Self, CertificateError> {
        let (issuer, serial, key) = {
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| CertificateError::X509(format!("{e:?}")))?;
            let spki = cert.public_key();
            let key = if spki.algorithm.algorithm.to_id_string() == OID_RSA_ENCRYPTION {
                RsaPublicKey::from_public_key_der(spki.raw)
                    .map(RecipientKey::Rsa)
                    .unwrap_or(RecipientKey::Unsupported)
            } else {
                PublicKey::from_sec1_bytes(spki.subject_public_key.data.as_ref())
                    .map(RecipientKey::P256)
                    .unwrap_or(RecipientKey::Unsupported)
            };
            (
                cert.issuer().as_raw().to_vec(),
                cert.raw_serial().to_vec(),
                key,
            )
        };
        Ok(Self {
            der,
            issuer,
            serial,
            key,
        })
    }

    /// SHA-256 digest of the DER certificate, used to bind the key derivation to the recipient
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }

    pub fn key(&self) -> &RecipientKey {
        &self.key
    }

    /// DER encoded issuer name
    pub fn issuer(&self) -> &[u8] {
        &self.issuer
    }

    /// Big-endian serial number, as encoded in the certificate
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }
}

/// Private key of the stored key pair
pub(crate) enum PrivateKey {
    P256(SecretKey),
    Rsa(Box<RsaPrivateKey>),
}

/// Unwrap an encrypted token with a stored key pair.
///
/// A certificate which cannot be decoded is reported as an internal error since the
/// certificate was provisioned by the operator. Every other failure is a decryption failure.
pub fn unwrap(
    encrypted: &[u8],
    key_pair: &KeyMaterialPair,
) -> Result<DecryptedCredential, crate::OrgTokenError> {
    let certificate = RecipientCertificate::from_pem(key_pair.certificate())?;
    Ok(unwrap_with_certificate(
        encrypted,
        &certificate,
        key_pair.private_key(),
    )?)
}

/// Unwrap an encrypted token with an already parsed certificate
pub fn unwrap_with_certificate(
    encrypted: &[u8],
    certificate: &RecipientCertificate,
    private_key: &[u8],
) -> Result<DecryptedCredential, UnwrapError> {
    if let RecipientKey::Unsupported = certificate.key() {
        return Err(UnwrapError::UnsupportedCertificateKey);
    }
    let plaintext = match (certificate.key(), parse_private_key(private_key)?) {
        (RecipientKey::P256(public_key), PrivateKey::P256(secret_key)) => {
            if &secret_key.public_key() != public_key {
                return Err(UnwrapError::KeyMismatch);
            }
            ecies::open(encrypted, certificate, &secret_key)?
        }
        (RecipientKey::Rsa(public_key), PrivateKey::Rsa(secret_key)) => {
            if &secret_key.to_public_key() != public_key {
                return Err(UnwrapError::KeyMismatch);
            }
            smime::open(encrypted, certificate, &secret_key)?
        }
        _ => return Err(UnwrapError::KeyMismatch),
    };
    DecryptedCredential::from_message(&plaintext)
}

/// Encrypt a credential for the public key of a certificate.
///
/// This is what the issuer does when a token is downloaded. A P-256 certificate gets a
/// PEM-armored ECIES envelope, an RSA certificate gets an S/MIME message.
pub fn seal(certificate_pem: &[u8], credential: &DecryptedCredential) -> Result<Vec<u8>, SealError> {
    let certificate = RecipientCertificate::from_pem(certificate_pem)?;
    let envelope = seal_with_certificate(&certificate, credential)?;
    match certificate.key() {
        RecipientKey::Rsa(_) => Ok(smime::to_mime(&envelope)),
        _ => ecies::armor(&envelope),
    }
}

/// Encrypt a credential for a parsed certificate and return the binary envelope: the
/// ECIES envelope for P-256, the DER `ContentInfo` for RSA
pub fn seal_with_certificate(
    certificate: &RecipientCertificate,
    credential: &DecryptedCredential,
) -> Result<Vec<u8>, SealError> {
    let message = Zeroizing::new(credential.to_message()?);
    match certificate.key() {
        RecipientKey::P256(public_key) => ecies::seal(certificate, public_key, &message),
        RecipientKey::Rsa(public_key) => smime::seal(certificate, public_key, &message),
        RecipientKey::Unsupported => Err(SealError::UnsupportedCertificateKey),
    }
}

/// Accept P-256 keys as PKCS#8 or SEC1 PEM, PKCS#8 DER or a raw scalar, and RSA keys
/// as PKCS#8 or PKCS#1, PEM or DER
fn parse_private_key(private_key: &[u8]) -> Result<PrivateKey, UnwrapError> {
    let trimmed = private_key.trim_ascii();
    let key = if trimmed.starts_with(b"-----BEGIN") {
        let pem = std::str::from_utf8(trimmed).map_err(|_| UnwrapError::InvalidPrivateKey)?;
        SecretKey::from_pkcs8_pem(pem)
            .or_else(|_| SecretKey::from_sec1_pem(pem))
            .map(PrivateKey::P256)
            .or_else(|_| {
                RsaPrivateKey::from_pkcs8_pem(pem)
                    .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
                    .map(|key| PrivateKey::Rsa(Box::new(key)))
            })
    } else {
        SecretKey::from_pkcs8_der(private_key)
            .or_else(|_| SecretKey::from_slice(private_key))
            .map(PrivateKey::P256)
            .or_else(|_| {
                RsaPrivateKey::from_pkcs8_der(private_key)
                    .or_else(|_| RsaPrivateKey::from_pkcs1_der(private_key))
                    .map(|key| PrivateKey::Rsa(Box::new(key)))
            })
    };
    key.map_err(|_| UnwrapError::InvalidPrivateKey)
}
