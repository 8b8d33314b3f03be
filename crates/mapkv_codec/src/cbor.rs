//! Generic object encoder for serde types, backed by CBOR.

use crate::encoder::ObjectEncoder;
use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Encodes any `Serialize + DeserializeOwned` type as CBOR.
///
/// # Example
///
/// ```rust
/// use mapkv_codec::{CborEncoder, ObjectEncoder};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, PartialEq, Debug)]
/// struct Account { name: String, age: u32 }
///
/// let encoder = CborEncoder::<Account>::new("Account");
/// let account = Account { name: "ada".into(), age: 36 };
/// let bytes = encoder.encode(&account).unwrap();
/// assert_eq!(encoder.decode(&bytes).unwrap(), account);
/// ```
pub struct CborEncoder<T> {
    tag: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborEncoder<T> {
    /// Creates an encoder registered under `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for CborEncoder<T> {
    fn clone(&self) -> Self {
        Self::new(self.tag.clone())
    }
}

impl<T> fmt::Debug for CborEncoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CborEncoder").field("tag", &self.tag).finish()
    }
}

impl<T> ObjectEncoder for CborEncoder<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Object = T;

    fn tag(&self) -> &str {
        &self.tag
    }

    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}
