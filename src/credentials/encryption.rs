//! AES-256-GCM sealing and HMAC-SHA256 signing for cookie values.
//!
//! Sealed tokens have the shape `nonce.tag.ciphertext`, each segment
//! base64url-encoded without padding. The cipher key is the SHA-256 digest of
//! the deployment's session secret; the signing key is the secret itself.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
const TAG_SIZE: usize = 16;

/// Separator between sealed segments and between a signed value and its signature
const SEPARATOR: &str = ".";

type HmacSha256 = Hmac<Sha256>;

/// Sealing and signing primitives bound to one session secret.
#[derive(Clone)]
pub struct CookieCodec {
    cipher: Aes256Gcm,
    mac: HmacSha256,
}

impl std::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCodec").finish_non_exhaustive()
    }
}

impl CookieCodec {
    /// Derive the cipher and signing keys from the session secret.
    ///
    /// # Returns
    /// * `Err` - If the secret is empty
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(anyhow!("Session secret must not be empty"));
        }

        let digest = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(digest.as_slice()));
        let mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow!("Failed to create HMAC key: {}", e))?;

        Ok(Self { cipher, mac })
    }

    /// Keyed signature over `value`, base64url encoded. Deterministic per secret.
    pub fn sign(&self, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        BASE64URL.encode(mac.finalize().into_bytes())
    }

    /// `value.signature`
    pub fn sign_value(&self, value: &str) -> String {
        format!("{}{}{}", value, SEPARATOR, self.sign(value))
    }

    /// Inverse of [`sign_value`](Self::sign_value).
    ///
    /// Splits on the last separator and returns the value only if it is
    /// non-empty and its signature matches.
    pub fn unsign_value(&self, raw: &str) -> Option<String> {
        let (value, signature) = raw.rsplit_once(SEPARATOR)?;
        if value.is_empty() {
            return None;
        }

        constant_time_eq(signature, &self.sign(value)).then(|| value.to_string())
    }

    /// Serializes `payload` to JSON and encrypts it under a fresh random nonce.
    ///
    /// # Returns
    /// * `Ok(String)` - `nonce.tag.ciphertext`, base64url segments
    /// * `Err` - If serialization or encryption fails
    pub fn seal<T: Serialize>(&self, payload: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(payload).context("Failed to serialize sealed payload")?;

        // Generate random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        // aes-gcm appends the tag to the ciphertext
        let mut ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;
        let tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);

        Ok([nonce.as_slice(), tag.as_slice(), ciphertext.as_slice()]
            .map(|segment| BASE64URL.encode(segment))
            .join(SEPARATOR))
    }

    /// Decrypts and parses a token produced by [`seal`](Self::seal).
    ///
    /// Returns `None` for any structural, cryptographic, or parse failure: a
    /// wrong segment count, bad base64, wrong nonce or tag length, a failed tag
    /// check, invalid JSON, or JSON that is not an object.
    pub fn unseal<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        let mut segments = token.split(SEPARATOR);
        let (nonce, tag, ciphertext) = (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }

        let nonce = BASE64URL.decode(nonce).ok()?;
        let tag = BASE64URL.decode(tag).ok()?;
        let mut buffer = BASE64URL.decode(ciphertext).ok()?;

        if nonce.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
            return None;
        }
        buffer.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), buffer.as_ref())
            .ok()?;

        let value: serde_json::Value = serde_json::from_slice(&plaintext).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

/// Constant-time string comparison.
///
/// Unequal lengths return early; only equal-length inputs reach the byte
/// comparison, which does not short-circuit.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}
