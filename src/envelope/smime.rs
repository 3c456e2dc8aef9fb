//! S/MIME envelope for RSA certificates.
//!
//! The token is a CMS `ContentInfo` holding `EnvelopedData` (RFC 5652): the content
//! key is transported with RSA PKCS#1 v1.5 to a recipient identified by the issuer
//! and serial number of its certificate, the content is encrypted with AES-CBC or
//! Triple DES. It is usually delivered as an `application/pkcs7-mime` message with a
//! base64 body, and is also accepted PEM-armored or as raw BER.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use des::TdesEde3;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use yasna::models::ObjectIdentifier;
use yasna::tags::TAG_SEQUENCE;
use yasna::{ASN1Result, BERReader, Tag};
use zeroize::Zeroizing;

use super::{RecipientCertificate, SealError, UnwrapError};

const ID_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const ID_ENVELOPED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 3];
const RSA_ENCRYPTION: &[u64] = &[1, 2, 840, 113549, 1, 1, 1];
const AES128_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 2];
const AES192_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 22];
const AES256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];
const DES_EDE3_CBC: &[u64] = &[1, 2, 840, 113549, 3, 7];

const MIME_HEADERS: &str = "MIME-Version: 1.0\r\n\
Content-Disposition: attachment; filename=\"smime.p7m\"\r\n\
Content-Type: application/pkcs7-mime; smime-type=enveloped-data; name=\"smime.p7m\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n";
const BASE64_LINE_LENGTH: usize = 76;

struct EnvelopedData {
    recipients: Vec<KeyTransRecipient>,
    content: EncryptedContent,
}

/// A `KeyTransRecipientInfo` addressed by issuer and serial number
struct KeyTransRecipient {
    issuer: Vec<u8>,
    serial: Vec<u8>,
    key_encryption: ObjectIdentifier,
    encrypted_key: Vec<u8>,
}

impl KeyTransRecipient {
    fn is_for(&self, certificate: &RecipientCertificate) -> bool {
        self.issuer == certificate.issuer()
            && strip_leading_zeros(&self.serial) == strip_leading_zeros(certificate.serial())
    }
}

struct EncryptedContent {
    algorithm: ObjectIdentifier,
    parameters: Option<Vec<u8>>,
    ciphertext: Vec<u8>,
}

/// Decrypt an S/MIME token and return the plaintext message
pub(super) fn open(
    encrypted: &[u8],
    certificate: &RecipientCertificate,
    private_key: &RsaPrivateKey,
) -> Result<Zeroizing<Vec<u8>>, UnwrapError> {
    let ber = decode_message(encrypted)?;
    let enveloped = parse_content_info(&ber)?;
    let recipient = enveloped
        .recipients
        .iter()
        .find(|r| r.is_for(certificate))
        .ok_or(UnwrapError::NoRecipient)?;
    if recipient.key_encryption.components().as_slice() != RSA_ENCRYPTION {
        return Err(UnwrapError::UnsupportedKeyEncryption(dotted(
            &recipient.key_encryption,
        )));
    }
    let content_key = Zeroizing::new(
        private_key
            .decrypt(Pkcs1v15Encrypt, &recipient.encrypted_key)
            .map_err(|_| UnwrapError::KeyTransport)?,
    );
    decrypt_content(&enveloped.content, &content_key)
}

/// Encrypt a message for an RSA recipient with AES-256-CBC and return the DER `ContentInfo`
pub(super) fn seal(
    certificate: &RecipientCertificate,
    recipient: &RsaPublicKey,
    message: &[u8],
) -> Result<Vec<u8>, SealError> {
    let mut content_key = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(content_key.as_mut_slice());
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);

    let ciphertext =
        cbc::Encryptor::<Aes256>::new(content_key.as_slice().into(), iv.as_slice().into())
            .encrypt_padded_vec_mut::<Pkcs7>(message);
    let encrypted_key = recipient
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, content_key.as_slice())
        .map_err(|_| SealError::KeyTransport)?;

    Ok(yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_oid(&oid(ID_ENVELOPED_DATA));
            w.next().write_tagged(Tag::context(0), |w| {
                w.write_sequence(|w| {
                    w.next().write_u8(0);
                    w.next().write_set(|w| {
                        w.next().write_sequence(|w| {
                            w.next().write_u8(0);
                            w.next().write_sequence(|w| {
                                w.next().write_der(certificate.issuer());
                                w.next().write_bigint_bytes(certificate.serial(), true);
                            });
                            w.next().write_sequence(|w| {
                                w.next().write_oid(&oid(RSA_ENCRYPTION));
                                w.next().write_null();
                            });
                            w.next().write_bytes(&encrypted_key);
                        });
                    });
                    w.next().write_sequence(|w| {
                        w.next().write_oid(&oid(ID_DATA));
                        w.next().write_sequence(|w| {
                            w.next().write_oid(&oid(AES256_CBC));
                            w.next().write_bytes(&iv);
                        });
                        w.next()
                            .write_tagged_implicit(Tag::context(0), |w| w.write_bytes(&ciphertext));
                    });
                });
            });
        });
    }))
}

/// Wrap a DER `ContentInfo` in an `application/pkcs7-mime` message
pub(super) fn to_mime(content_info: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(content_info);
    let lines = encoded.len() / BASE64_LINE_LENGTH + 1;
    let mut message = String::with_capacity(MIME_HEADERS.len() + encoded.len() + 2 * lines);
    message.push_str(MIME_HEADERS);
    for line in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        message.extend(line.iter().map(|&b| b as char));
        message.push_str("\r\n");
    }
    message.into_bytes()
}

/// Extract the BER `ContentInfo` from a MIME message, a PEM block or raw BER
fn decode_message(encrypted: &[u8]) -> Result<Vec<u8>, UnwrapError> {
    let trimmed = encrypted.trim_ascii_start();
    if trimmed.first() == Some(&0x30) {
        return Ok(trimmed.to_vec());
    }
    if trimmed.starts_with(b"-----BEGIN") {
        let (_label, ber) = pem_rfc7468::decode_vec(trimmed).map_err(UnwrapError::Armor)?;
        return Ok(ber);
    }
    let text = std::str::from_utf8(trimmed)
        .map_err(|_| UnwrapError::Mime)?
        .replace("\r\n", "\n");
    let body = match text.split_once("\n\n") {
        Some((_headers, body)) => body,
        None => text.as_str(),
    };
    let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if body.is_empty() {
        return Err(UnwrapError::Mime);
    }
    STANDARD.decode(body).map_err(UnwrapError::Base64)
}

fn parse_content_info(ber: &[u8]) -> Result<EnvelopedData, UnwrapError> {
    let enveloped = yasna::parse_ber(ber, |r| {
        r.read_sequence(|r| {
            let content_type = r.next().read_oid()?;
            if content_type.components().as_slice() != ID_ENVELOPED_DATA {
                r.next().read_der()?;
                return Ok(None);
            }
            r.next()
                .read_tagged(Tag::context(0), |r| read_enveloped_data(r))
                .map(Some)
        })
    })
    .map_err(UnwrapError::Asn1)?;
    enveloped.ok_or(UnwrapError::NotEnvelopedData)
}

fn read_enveloped_data(r: BERReader<'_, '_>) -> ASN1Result<EnvelopedData> {
    r.read_sequence(|r| {
        let _version = r.next().read_u8()?;
        // originatorInfo
        if r.next().lookahead_tag()? == Tag::context(0) {
            r.next().read_der()?;
        }
        let recipients = r
            .next()
            .collect_set_of(|r| read_recipient_info(r))?
            .into_iter()
            .flatten()
            .collect();
        let content = read_encrypted_content(r.next())?;
        // unprotectedAttrs
        r.read_optional(|r| r.read_der())?;
        Ok(EnvelopedData {
            recipients,
            content,
        })
    })
}

/// Only `KeyTransRecipientInfo` with an issuer and serial number is kept, the other
/// recipient kinds are tagged and skipped
fn read_recipient_info(r: BERReader<'_, '_>) -> ASN1Result<Option<KeyTransRecipient>> {
    if r.lookahead_tag()? != TAG_SEQUENCE {
        r.read_der()?;
        return Ok(None);
    }
    r.read_sequence(|r| {
        let _version = r.next().read_u8()?;
        let issuer_and_serial = if r.next().lookahead_tag()? == TAG_SEQUENCE {
            Some(r.next().read_sequence(|r| {
                let issuer = r.next().read_der()?;
                let (serial, _) = r.next().read_bigint_bytes()?;
                Ok((issuer, serial))
            })?)
        } else {
            r.next().read_der()?;
            None
        };
        let (key_encryption, _) = read_algorithm(r.next())?;
        let encrypted_key = r.next().read_bytes()?;
        Ok(issuer_and_serial.map(|(issuer, serial)| KeyTransRecipient {
            issuer,
            serial,
            key_encryption,
            encrypted_key,
        }))
    })
}

fn read_encrypted_content(r: BERReader<'_, '_>) -> ASN1Result<EncryptedContent> {
    r.read_sequence(|r| {
        let _content_type = r.next().read_oid()?;
        let (algorithm, parameters) = read_algorithm(r.next())?;
        let ciphertext =
            r.read_optional(|r| r.read_tagged_implicit(Tag::context(0), |r| r.read_bytes()))?;
        Ok(EncryptedContent {
            algorithm,
            parameters,
            ciphertext: ciphertext.unwrap_or_default(),
        })
    })
}

/// `AlgorithmIdentifier` with its raw parameters
fn read_algorithm(r: BERReader<'_, '_>) -> ASN1Result<(ObjectIdentifier, Option<Vec<u8>>)> {
    r.read_sequence(|r| {
        let algorithm = r.next().read_oid()?;
        let parameters = r.read_optional(|r| r.read_der())?;
        Ok((algorithm, parameters))
    })
}

fn decrypt_content(
    content: &EncryptedContent,
    content_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, UnwrapError> {
    let algorithm = content.algorithm.components().as_slice();
    let decrypt: CbcDecrypt = if algorithm == AES128_CBC {
        cbc_decrypt::<Aes128>
    } else if algorithm == AES192_CBC {
        cbc_decrypt::<Aes192>
    } else if algorithm == AES256_CBC {
        cbc_decrypt::<Aes256>
    } else if algorithm == DES_EDE3_CBC {
        cbc_decrypt::<TdesEde3>
    } else {
        return Err(UnwrapError::UnsupportedContentEncryption(dotted(
            &content.algorithm,
        )));
    };
    let iv = match &content.parameters {
        Some(parameters) => {
            yasna::parse_ber(parameters, |r| r.read_bytes()).map_err(UnwrapError::Asn1)?
        }
        None => return Err(UnwrapError::ContentDecryption),
    };
    decrypt(content_key, &iv, &content.ciphertext).map(Zeroizing::new)
}

type CbcDecrypt = fn(&[u8], &[u8], &[u8]) -> Result<Vec<u8>, UnwrapError>;

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, UnwrapError>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| UnwrapError::ContentDecryption)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| UnwrapError::ContentDecryption)
}

fn oid(components: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(components)
}

fn dotted(oid: &ObjectIdentifier) -> String {
    oid.components()
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
