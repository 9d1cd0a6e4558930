//! Security features.
//!
//! Transparent encryption of key names and values before they leave the
//! process.

mod cipher;

pub use cipher::{Cipher, FnCipher, SecretCipher};
