//! Conversion between values and stored record bytes.

use crate::cipher::Cipher;
use crate::error::{CoreError, CoreResult};
use crate::record::RecordKind;
use mapkv_codec::{Value, ValueType};
use std::sync::Arc;

/// Applies value encoding and the optional cipher.
#[derive(Clone)]
pub(crate) struct PayloadCodec {
    cipher: Option<Arc<dyn Cipher>>,
    encrypt_primitives: bool,
}

impl PayloadCodec {
    pub(crate) fn new(cipher: Option<Arc<dyn Cipher>>, encrypt_primitives: bool) -> Self {
        Self {
            cipher,
            encrypt_primitives,
        }
    }

    pub(crate) fn has_cipher(&self) -> bool {
        self.cipher.is_some()
    }

    /// Whether values of `value_type` are written encrypted.
    pub(crate) fn encrypts(&self, value_type: ValueType) -> bool {
        self.cipher.is_some() && (self.encrypt_primitives || !value_type.is_primitive())
    }

    /// Encodes `value` into its record kind and stored bytes.
    pub(crate) fn encode(&self, value: &Value) -> CoreResult<(RecordKind, Vec<u8>)> {
        let value_type = value.value_type();
        let plain = value.encode_payload()?;
        match &self.cipher {
            Some(cipher) if self.encrypts(value_type) => Ok((
                RecordKind::Value {
                    value_type,
                    encrypted: true,
                },
                cipher.encrypt(&plain)?,
            )),
            _ => Ok((RecordKind::plain(value_type), plain)),
        }
    }

    /// Decodes stored bytes of a value record.
    pub(crate) fn decode(&self, kind: RecordKind, stored: &[u8]) -> CoreResult<Value> {
        let RecordKind::Value {
            value_type,
            encrypted,
        } = kind
        else {
            return Err(CoreError::corruption("tombstone has no value"));
        };
        if !encrypted {
            return Ok(Value::decode_payload(value_type, stored)?);
        }
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| CoreError::decryption_failed("value is encrypted but no cipher is set"))?;
        let plain = cipher.decrypt(stored)?;
        Ok(Value::decode_payload(value_type, &plain)?)
    }

    /// Whether a readable record should be rewritten under the cipher.
    pub(crate) fn needs_encryption(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Value {
                value_type,
                encrypted: false,
            } => self.encrypts(value_type),
            _ => false,
        }
    }
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("cipher", &self.cipher.is_some())
            .field("encrypt_primitives", &self.encrypt_primitives)
            .finish()
    }
}

#[cfg(all(test, feature = "encryption"))]
mod tests {
    use super::*;
    use crate::cipher::{AesGcmCipher, EncryptionKey};

    fn aes() -> Arc<dyn Cipher> {
        Arc::new(AesGcmCipher::new(EncryptionKey::generate()))
    }

    #[test]
    fn plain_codec_never_encrypts() {
        let codec = PayloadCodec::new(None, true);
        let (kind, bytes) = codec.encode(&Value::from("text")).unwrap();
        assert!(!kind.is_encrypted());
        assert_eq!(bytes, b"text");
        assert_eq!(codec.decode(kind, &bytes).unwrap(), Value::from("text"));
    }

    #[test]
    fn primitives_stay_plain_by_default() {
        let codec = PayloadCodec::new(Some(aes()), false);
        let (kind, bytes) = codec.encode(&Value::Int(9)).unwrap();
        assert!(!kind.is_encrypted());
        assert_eq!(bytes.len(), 4);

        let (kind, _) = codec.encode(&Value::from("s")).unwrap();
        assert!(kind.is_encrypted());
    }

    #[test]
    fn primitives_encrypted_when_configured() {
        let codec = PayloadCodec::new(Some(aes()), true);
        let (kind, bytes) = codec.encode(&Value::Long(5)).unwrap();
        assert!(kind.is_encrypted());
        assert_eq!(codec.decode(kind, &bytes).unwrap(), Value::Long(5));
    }

    #[test]
    fn encrypted_without_cipher_fails() {
        let sealed = PayloadCodec::new(Some(aes()), false);
        let (kind, bytes) = sealed.encode(&Value::from("secret")).unwrap();

        let plain = PayloadCodec::new(None, false);
        assert!(matches!(
            plain.decode(kind, &bytes),
            Err(CoreError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn needs_encryption_only_for_plain_records() {
        let codec = PayloadCodec::new(Some(aes()), false);
        assert!(codec.needs_encryption(RecordKind::plain(ValueType::String)));
        assert!(!codec.needs_encryption(RecordKind::plain(ValueType::Int)));
        assert!(!codec.needs_encryption(RecordKind::Value {
            value_type: ValueType::String,
            encrypted: true
        }));
        assert!(!codec.needs_encryption(RecordKind::Tombstone));
    }
}
