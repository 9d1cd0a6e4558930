//! Key and value encryption.
//!
//! A [`Cipher`] turns plaintext into a string that is safe to use as a file
//! name and back. The store applies it to key names and values when a cipher
//! is configured.
//!
//! # Default cipher
//!
//! [`SecretCipher`] is keyed by a secret string:
//!
//! - **Algorithm**: AES-256-GCM (authenticated encryption)
//! - **Keys**: two 32-byte keys derived from the secret with HMAC-SHA256
//! - **Nonce**: synthetic, the first 12 bytes of HMAC-SHA256 over the plaintext
//! - **Format**: lowercase hex of `nonce || ciphertext || tag`
//!
//! The synthetic nonce makes encryption deterministic. An encrypted key name
//! must resolve to the same remote file on every call, so a random nonce is
//! not an option. Equal plaintexts therefore produce equal ciphertexts; no
//! other information leaks.
//!
//! Hex doubles the length and adds 56 characters, so keys longer than about
//! 99 bytes exceed the 255 byte file name limit once encrypted.
//!
//! # Example
//!
//! ```rust
//! use gitkv::security::{Cipher, SecretCipher};
//! use secrecy::SecretString;
//!
//! let cipher = SecretCipher::new(&SecretString::from("hello world".to_string())).unwrap();
//! let encoded = cipher.encode("mykey").unwrap();
//! assert_ne!(encoded, "mykey");
//! assert_eq!(cipher.decode(&encoded).unwrap(), "mykey");
//! ```

use crate::{Error, Result};
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-256-GCM.
const TAG_SIZE: usize = 16;

/// Key size for AES-256 and HMAC-SHA256 output (32 bytes).
const KEY_SIZE: usize = 32;

/// Derivation labels for the two keys.
const ENCRYPTION_LABEL: &[u8] = b"gitkv/v1/encryption";
const NONCE_LABEL: &[u8] = b"gitkv/v1/nonce";

/// Reversible transform applied to key names and values.
///
/// Implementations must form an exact inverse pair:
/// `decode(encode(x)) == x` for every `x`.
pub trait Cipher: Send + Sync {
    /// Encrypts plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    fn encode(&self, plaintext: &str) -> Result<String>;

    /// Decrypts ciphertext produced by [`Cipher::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the input was not produced by this cipher.
    fn decode(&self, ciphertext: &str) -> Result<String>;

    /// Plaintext byte length for a ciphertext of `encoded_len` bytes, when it
    /// can be known without decrypting.
    ///
    /// The default returns `None`; the store then reads and decrypts the
    /// value to learn its size.
    fn plaintext_len(&self, encoded_len: usize) -> Option<usize> {
        let _ = encoded_len;
        None
    }
}

/// Default cipher keyed by a secret string.
pub struct SecretCipher {
    cipher: Aes256Gcm,
    nonce_key: [u8; KEY_SIZE],
}

impl SecretCipher {
    /// Creates a cipher from a secret.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn new(secret: &SecretString) -> Result<Self> {
        let secret = secret.expose_secret().as_bytes();
        let encryption_key = hmac_sha256(secret, ENCRYPTION_LABEL)?;
        let nonce_key = hmac_sha256(secret, NONCE_LABEL)?;

        let key = Key::<Aes256Gcm>::from(encryption_key);
        Ok(Self {
            cipher: Aes256Gcm::new(&key),
            nonce_key,
        })
    }

    fn synthetic_nonce(&self, plaintext: &[u8]) -> Result<[u8; NONCE_SIZE]> {
        let digest = hmac_sha256(&self.nonce_key, plaintext)?;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&digest[..NONCE_SIZE]);
        Ok(nonce)
    }
}

impl Cipher for SecretCipher {
    fn encode(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = self.synthetic_nonce(plaintext.as_bytes())?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| Error::Cipher(format!("AES-256-GCM encryption failed: {e}")))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(hex::encode(output))
    }

    fn decode(&self, ciphertext: &str) -> Result<String> {
        let raw = hex::decode(ciphertext)
            .map_err(|e| Error::Cipher(format!("ciphertext is not hex: {e}")))?;

        let min_size = NONCE_SIZE + TAG_SIZE;
        if raw.len() < min_size {
            return Err(Error::Cipher(format!(
                "ciphertext too short: {} bytes, minimum {min_size}",
                raw.len()
            )));
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| {
                Error::Cipher(format!(
                    "AES-256-GCM decryption failed (wrong secret or foreign data): {e}"
                ))
            })?;

        if self.synthetic_nonce(&plaintext)?.as_slice() != nonce_bytes {
            return Err(Error::Cipher("synthetic nonce mismatch".to_string()));
        }

        String::from_utf8(plaintext)
            .map_err(|e| Error::Cipher(format!("plaintext is not UTF-8: {e}")))
    }

    fn plaintext_len(&self, encoded_len: usize) -> Option<usize> {
        if encoded_len % 2 != 0 {
            return None;
        }
        (encoded_len / 2).checked_sub(NONCE_SIZE + TAG_SIZE)
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Cipher(format!("invalid HMAC key: {e}")))?;
    mac.update(data);

    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

type CodecFn = dyn Fn(&str) -> String + Send + Sync;

/// Cipher built from a caller-supplied encode/decode pair.
///
/// The pair is trusted to be an exact inverse; nothing is validated.
pub struct FnCipher {
    encode: Box<CodecFn>,
    decode: Box<CodecFn>,
}

impl FnCipher {
    /// Creates a cipher from two functions.
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&str) -> String + Send + Sync + 'static,
        D: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }
}

impl Cipher for FnCipher {
    fn encode(&self, plaintext: &str) -> Result<String> {
        Ok((self.encode)(plaintext))
    }

    fn decode(&self, ciphertext: &str) -> Result<String> {
        Ok((self.decode)(ciphertext))
    }
}

impl fmt::Debug for FnCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCipher").finish_non_exhaustive()
    }
}
