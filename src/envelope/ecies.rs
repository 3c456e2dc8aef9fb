//! ECIES envelope for P-256 certificates:
//!
//! ```text
//! version (1) | ephemeral P-256 public key, SEC1 uncompressed (65) | nonce (12) | ciphertext + tag
//! ```
//!
//! The AES-256-GCM key is derived with HKDF-SHA256 from the ECDH shared secret,
//! salted with the SHA-256 digest of the recipient certificate. The version byte
//! and the ephemeral key are authenticated as additional data.
//!
//! Envelopes are usually delivered PEM-armored with the `ORG TOKEN` label.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use pem_rfc7468::LineEnding;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{RecipientCertificate, SealError, UnwrapError};

pub const ENVELOPE_VERSION: u8 = 1;
pub const PEM_LABEL: &str = "ORG TOKEN";

const EPHEMERAL_KEY_LENGTH: usize = 65;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const HEADER_LENGTH: usize = 1 + EPHEMERAL_KEY_LENGTH + NONCE_LENGTH;
const HKDF_INFO: &[u8] = b"ockam org token v1";

/// Decrypt an envelope, armored or binary, and return the plaintext message
pub(super) fn open(
    encrypted: &[u8],
    certificate: &RecipientCertificate,
    secret_key: &SecretKey,
) -> Result<Zeroizing<Vec<u8>>, UnwrapError> {
    let envelope = dearmor(encrypted)?;
    if envelope.len() < HEADER_LENGTH + TAG_LENGTH {
        return Err(UnwrapError::Truncated(envelope.len()));
    }
    let version = envelope[0];
    if version != ENVELOPE_VERSION {
        return Err(UnwrapError::UnsupportedVersion(version));
    }
    let (aad, rest) = envelope.split_at(1 + EPHEMERAL_KEY_LENGTH);
    let (nonce, ciphertext) = rest.split_at(NONCE_LENGTH);

    let ephemeral =
        PublicKey::from_sec1_bytes(&aad[1..]).map_err(|_| UnwrapError::InvalidEphemeralKey)?;
    let shared = p256::ecdh::diffie_hellman(secret_key.to_nonzero_scalar(), ephemeral.as_affine());
    let key = derive_key(shared.raw_secret_bytes(), &certificate.fingerprint())
        .map_err(|_| UnwrapError::KeyDerivation)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| UnwrapError::KeyDerivation)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| UnwrapError::Aead)?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt a message for a P-256 recipient and return the binary envelope
pub(super) fn seal(
    certificate: &RecipientCertificate,
    recipient: &PublicKey,
    message: &[u8],
) -> Result<Vec<u8>, SealError> {
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(recipient);
    let key = derive_key(shared.raw_secret_bytes(), &certificate.fingerprint())
        .map_err(|_| SealError::KeyDerivation)?;

    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);

    let mut envelope = Vec::with_capacity(HEADER_LENGTH + message.len() + TAG_LENGTH);
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(ephemeral_public.as_bytes());

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| SealError::KeyDerivation)?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: message,
                aad: &envelope,
            },
        )
        .map_err(|_| SealError::Aead)?;

    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

pub(super) fn armor(envelope: &[u8]) -> Result<Vec<u8>, SealError> {
    Ok(pem_rfc7468::encode_string(PEM_LABEL, LineEnding::LF, envelope)?.into_bytes())
}

fn derive_key(shared_secret: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, hkdf::InvalidLength> {
    let mut key = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(Some(salt), shared_secret).expand(HKDF_INFO, key.as_mut_slice())?;
    Ok(key)
}

/// Remove the PEM armor if there is one
fn dearmor(encrypted: &[u8]) -> Result<Vec<u8>, UnwrapError> {
    let trimmed = encrypted.trim_ascii_start();
    if !trimmed.starts_with(b"-----BEGIN") {
        return Ok(encrypted.to_vec());
    }
    let (label, envelope) = pem_rfc7468::decode_vec(trimmed).map_err(UnwrapError::Armor)?;
    if label != PEM_LABEL {
        return Err(UnwrapError::UnexpectedLabel(label.to_string()));
    }
    Ok(envelope)
}
