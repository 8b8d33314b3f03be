//! Pluggable value encryption.
//!
//! A [`Cipher`] turns value bytes into ciphertext right before a record is
//! written and back right after it is read. Keys are never encrypted, so
//! lookups and compaction work without the cipher.
//!
//! String, byte-array, string-set and object values are always encrypted
//! when a cipher is configured; fixed-width values only when
//! [`Config::encrypt_primitives`](crate::Config::encrypt_primitives) is set.
//!
//! With the `encryption` feature (on by default) [`AesGcmCipher`] provides
//! AES-256-GCM:
//!
//! ```rust
//! # #[cfg(feature = "encryption")]
//! # {
//! use mapkv_core::{AesGcmCipher, Cipher, EncryptionKey};
//!
//! let cipher = AesGcmCipher::new(EncryptionKey::generate());
//! let sealed = cipher.encrypt(b"secret").unwrap();
//! assert_eq!(cipher.decrypt(&sealed).unwrap(), b"secret");
//! # }
//! ```

use crate::error::CoreResult;

#[cfg(feature = "encryption")]
mod aes;

#[cfg(feature = "encryption")]
pub use aes::{AesGcmCipher, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Encrypts and decrypts value bytes.
///
/// Implementations must be deterministic in length: equal plaintext lengths
/// must give equal ciphertext lengths, or in-place updates will never apply.
/// Key management stays outside the store; the cipher arrives fully keyed
/// through [`Builder::cipher`](crate::Builder::cipher).
pub trait Cipher: Send + Sync {
    /// Encrypts `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails; the write is then rejected.
    fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypts bytes produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns an error for wrong keys or damaged data; the read then
    /// falls back to the caller's default.
    fn decrypt(&self, ciphertext: &[u8]) -> CoreResult<Vec<u8>>;
}
