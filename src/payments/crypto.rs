//! Payload sealing for the gateway wire format.
//!
//! `EncryptInfo` is `hex(base64(ciphertext) ":::" base64(tag))` where the ciphertext is
//! AES-256-GCM over the URL-encoded field map. The gateway pins one 16-byte IV per
//! merchant key pair, so the nonce is not random; that is a provider constraint.
//! `HashInfo` is `UPPER(hex(sha256(key + EncryptInfo + iv)))`.

use crate::config::SettingsHandle;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{FieldMap, SignedEnvelope};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

type PayuniCipher = AesGcm<Aes256, U16>;

pub const SEGMENT_DELIMITER: &str = ":::";
pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Merchant id plus key material for one gateway environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub merchant_id: String,
    pub hash_key: String,
    pub hash_iv: String,
}

impl Credentials {
    pub fn new(
        merchant_id: impl Into<String>,
        hash_key: impl Into<String>,
        hash_iv: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            hash_key: hash_key.into(),
            hash_iv: hash_iv.into(),
        }
    }

    pub fn merchant_id(&self) -> &str {
        self.merchant_id.trim()
    }

    fn key(&self) -> &str {
        self.hash_key.trim()
    }

    fn iv(&self) -> &str {
        self.hash_iv.trim()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.merchant_id().is_empty() {
            return Err("merchant id is empty".to_string());
        }
        if self.key().len() != KEY_LEN {
            return Err(format!("hash key must be {} bytes", KEY_LEN));
        }
        if self.iv().len() != IV_LEN {
            return Err(format!("hash iv must be {} bytes", IV_LEN));
        }
        Ok(())
    }

    fn cipher(&self) -> PaymentResult<(PayuniCipher, &[u8])> {
        let iv = self.iv().as_bytes();
        if iv.len() != IV_LEN {
            return Err(PaymentError::crypto(format!(
                "hash iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        let cipher = PayuniCipher::new_from_slice(self.key().as_bytes()).map_err(|_| {
            PaymentError::crypto(format!("hash key must be {} bytes", KEY_LEN))
        })?;
        Ok((cipher, iv))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("merchant_id", &self.merchant_id)
            .field("hash_key", &"[redacted]")
            .field("hash_iv", &"[redacted]")
            .finish()
    }
}

pub fn encode_query(fields: &FieldMap) -> PaymentResult<String> {
    serde_urlencoded::to_string(fields)
        .map_err(|e| PaymentError::crypto(format!("failed to encode payload: {}", e)))
}

/// Parses a form/query string; repeated keys keep the last value.
pub fn parse_query(raw: &str) -> PaymentResult<FieldMap> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
        .map_err(|e| PaymentError::crypto(format!("failed to parse payload: {}", e)))?;
    Ok(pairs.into_iter().collect())
}

pub fn encrypt(credentials: &Credentials, fields: &FieldMap) -> PaymentResult<String> {
    let (cipher, iv) = credentials.cipher()?;
    let plaintext = encode_query(fields)?;

    let sealed = cipher
        .encrypt(Nonce::<U16>::from_slice(iv), plaintext.as_bytes())
        .map_err(|_| PaymentError::crypto("encryption failed"))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let joined = format!(
        "{}{}{}",
        STANDARD.encode(ciphertext),
        SEGMENT_DELIMITER,
        STANDARD.encode(tag)
    );
    Ok(hex::encode(joined))
}

pub fn decrypt(credentials: &Credentials, encrypt_info: &str) -> PaymentResult<FieldMap> {
    let (cipher, iv) = credentials.cipher()?;

    let raw = hex::decode(encrypt_info.trim())
        .map_err(|e| PaymentError::crypto(format!("invalid hex payload: {}", e)))?;
    let raw = String::from_utf8(raw)
        .map_err(|_| PaymentError::crypto("payload is not valid UTF-8"))?;
    let (ciphertext_b64, tag_b64) = raw
        .split_once(SEGMENT_DELIMITER)
        .ok_or_else(|| PaymentError::crypto("payload delimiter missing"))?;

    let mut sealed = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| PaymentError::crypto(format!("invalid ciphertext encoding: {}", e)))?;
    let tag = STANDARD
        .decode(tag_b64)
        .map_err(|e| PaymentError::crypto(format!("invalid tag encoding: {}", e)))?;
    if tag.len() != TAG_LEN {
        return Err(PaymentError::crypto("authentication tag has wrong length"));
    }
    sealed.extend_from_slice(&tag);

    let plaintext = cipher
        .decrypt(Nonce::<U16>::from_slice(iv), sealed.as_slice())
        .map_err(|_| PaymentError::crypto("authentication failed"))?;
    let plaintext = String::from_utf8(plaintext)
        .map_err(|_| PaymentError::crypto("decrypted payload is not valid UTF-8"))?;

    parse_query(&plaintext)
}

pub fn hash(credentials: &Credentials, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credentials.key().as_bytes());
    hasher.update(content.as_bytes());
    hasher.update(credentials.iv().as_bytes());
    hex::encode_upper(hasher.finalize())
}

pub fn seal(
    credentials: &Credentials,
    version: &str,
    fields: &FieldMap,
) -> PaymentResult<SignedEnvelope> {
    let encrypt_info = encrypt(credentials, fields)?;
    let hash_info = hash(credentials, &encrypt_info);
    Ok(SignedEnvelope {
        merchant_id: credentials.merchant_id().to_string(),
        version: version.to_string(),
        encrypt_info,
        hash_info,
    })
}

/// Codec bound to live settings; key material is re-read on every call.
#[derive(Clone)]
pub struct CryptoCodec {
    settings: SettingsHandle,
}

impl CryptoCodec {
    pub fn new(settings: SettingsHandle) -> Self {
        Self { settings }
    }

    pub fn credentials(&self) -> Credentials {
        self.settings.snapshot().active_credentials().clone()
    }

    pub fn encrypt(&self, fields: &FieldMap) -> PaymentResult<String> {
        encrypt(&self.credentials(), fields)
    }

    pub fn decrypt(&self, encrypt_info: &str) -> PaymentResult<FieldMap> {
        decrypt(&self.credentials(), encrypt_info)
    }

    pub fn hash(&self, content: &str) -> String {
        hash(&self.credentials(), content)
    }

    pub fn seal(&self, version: &str, fields: &FieldMap) -> PaymentResult<SignedEnvelope> {
        seal(&self.credentials(), version, fields)
    }
}
