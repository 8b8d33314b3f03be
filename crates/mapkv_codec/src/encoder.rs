//! Object encoders and the tag-addressed encoder registry.

use crate::error::{CodecError, CodecResult};
use crate::string_set;
use crate::value::validate_tag;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// A pluggable codec for one object type.
///
/// The tag is written next to every encoded object so a store can hold
/// objects of many types and find the right decoder at read time. Tags must
/// be unique within a registry and stable across releases.
///
/// # Example
///
/// ```rust
/// use mapkv_codec::{CodecError, CodecResult, ObjectEncoder};
///
/// struct Point { x: i32, y: i32 }
///
/// struct PointEncoder;
///
/// impl ObjectEncoder for PointEncoder {
///     type Object = Point;
///
///     fn tag(&self) -> &str {
///         "Point"
///     }
///
///     fn encode(&self, p: &Point) -> CodecResult<Vec<u8>> {
///         let mut out = p.x.to_le_bytes().to_vec();
///         out.extend_from_slice(&p.y.to_le_bytes());
///         Ok(out)
///     }
///
///     fn decode(&self, bytes: &[u8]) -> CodecResult<Point> {
///         let raw: [u8; 8] = bytes
///             .try_into()
///             .map_err(|_| CodecError::decoding_failed("point must be 8 bytes"))?;
///         Ok(Point {
///             x: i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
///             y: i32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
///         })
///     }
/// }
/// ```
pub trait ObjectEncoder: Send + Sync + 'static {
    /// The Rust type this encoder handles.
    type Object: Send + Sync + 'static;

    /// The stable tag identifying this encoder on disk.
    fn tag(&self) -> &str;

    /// Encodes an object into bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be encoded.
    fn encode(&self, value: &Self::Object) -> CodecResult<Vec<u8>>;

    /// Decodes bytes produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed.
    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Object>;
}

/// Type-erased view of an [`ObjectEncoder`], as held by the registry.
pub trait DynEncoder: Send + Sync {
    /// The encoder's tag.
    fn tag(&self) -> &str;

    /// Encodes a value that must be the encoder's object type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] if `value` has another type.
    fn encode_dyn(&self, value: &dyn Any) -> CodecResult<Vec<u8>>;

    /// Decodes bytes into a shared, type-erased object.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed.
    fn decode_dyn(&self, bytes: &[u8]) -> CodecResult<Arc<dyn Any + Send + Sync>>;
}

impl<E: ObjectEncoder> DynEncoder for E {
    fn tag(&self) -> &str {
        ObjectEncoder::tag(self)
    }

    fn encode_dyn(&self, value: &dyn Any) -> CodecResult<Vec<u8>> {
        let value = value
            .downcast_ref::<E::Object>()
            .ok_or_else(|| CodecError::TypeMismatch {
                tag: ObjectEncoder::tag(self).to_string(),
            })?;
        self.encode(value)
    }

    fn decode_dyn(&self, bytes: &[u8]) -> CodecResult<Arc<dyn Any + Send + Sync>> {
        Ok(Arc::new(self.decode(bytes)?))
    }
}

/// Built-in encoder for string sets stored as objects.
///
/// Always present in an [`EncoderRegistry`] under the tag `"StringSet"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSetCodec;

impl StringSetCodec {
    /// The reserved tag of the built-in string-set encoder.
    pub const TAG: &'static str = "StringSet";
}

impl ObjectEncoder for StringSetCodec {
    type Object = BTreeSet<String>;

    fn tag(&self) -> &str {
        Self::TAG
    }

    fn encode(&self, value: &BTreeSet<String>) -> CodecResult<Vec<u8>> {
        Ok(string_set::encode(value))
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<BTreeSet<String>> {
        string_set::decode(bytes)
    }
}

/// Immutable set of encoders keyed by tag.
///
/// Built once per store with [`EncoderRegistry::builder`]; duplicate tags
/// are rejected at build time.
#[derive(Clone)]
pub struct EncoderRegistry {
    encoders: HashMap<String, Arc<dyn DynEncoder>>,
}

impl EncoderRegistry {
    /// Starts a registry containing only the built-in encoders.
    #[must_use]
    pub fn builder() -> EncoderRegistryBuilder {
        EncoderRegistryBuilder::new()
    }

    /// Returns the encoder registered under `tag`.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&Arc<dyn DynEncoder>> {
        self.encoders.get(tag)
    }

    /// Returns `true` if an encoder is registered under `tag`.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.encoders.contains_key(tag)
    }

    /// Decodes `bytes` with the encoder registered under `tag`.
    ///
    /// Returns `None` when no such encoder is registered.
    ///
    /// # Errors
    ///
    /// Returns the encoder's error if the bytes are malformed.
    pub fn decode(&self, tag: &str, bytes: &[u8]) -> Option<CodecResult<Arc<dyn Any + Send + Sync>>> {
        self.encoders.get(tag).map(|e| e.decode_dyn(bytes))
    }

    /// Returns all registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.encoders.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Returns the number of registered encoders, built-ins included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    /// Returns `true` if no encoders are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        EncoderRegistryBuilder::new().build()
    }
}

impl fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Builder for [`EncoderRegistry`].
pub struct EncoderRegistryBuilder {
    encoders: HashMap<String, Arc<dyn DynEncoder>>,
}

impl EncoderRegistryBuilder {
    fn new() -> Self {
        let mut encoders: HashMap<String, Arc<dyn DynEncoder>> = HashMap::new();
        encoders.insert(StringSetCodec::TAG.to_string(), Arc::new(StringSetCodec));
        Self { encoders }
    }

    /// Adds an encoder.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DuplicateTag`] if the tag is already taken and
    /// [`CodecError::InvalidTag`] if it is empty or too long.
    pub fn register<E: ObjectEncoder>(self, encoder: E) -> CodecResult<Self> {
        self.register_shared(Arc::new(encoder))
    }

    /// Adds an already shared encoder.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_shared(mut self, encoder: Arc<dyn DynEncoder>) -> CodecResult<Self> {
        let tag = encoder.tag().to_string();
        validate_tag(&tag)?;
        if self.encoders.contains_key(&tag) {
            return Err(CodecError::duplicate_tag(tag));
        }
        self.encoders.insert(tag, encoder);
        Ok(self)
    }

    /// Finishes the registry.
    #[must_use]
    pub fn build(self) -> EncoderRegistry {
        EncoderRegistry {
            encoders: self.encoders,
        }
    }
}

impl fmt::Debug for EncoderRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderRegistryBuilder")
            .field("count", &self.encoders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct U32Encoder(&'static str);

    impl ObjectEncoder for U32Encoder {
        type Object = u32;

        fn tag(&self) -> &str {
            self.0
        }

        fn encode(&self, value: &u32) -> CodecResult<Vec<u8>> {
            Ok(value.to_le_bytes().to_vec())
        }

        fn decode(&self, bytes: &[u8]) -> CodecResult<u32> {
            let raw: [u8; 4] = bytes
                .try_into()
                .map_err(|_| CodecError::decoding_failed("need 4 bytes"))?;
            Ok(u32::from_le_bytes(raw))
        }
    }

    #[test]
    fn default_registry_has_string_set() {
        let registry = EncoderRegistry::default();
        assert!(registry.contains(StringSetCodec::TAG));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_and_decode() {
        let registry = EncoderRegistry::builder()
            .register(U32Encoder("u32"))
            .unwrap()
            .build();

        let decoded = registry.decode("u32", &7u32.to_le_bytes()).unwrap().unwrap();
        assert_eq!(decoded.downcast_ref::<u32>(), Some(&7));
        assert_eq!(registry.tags(), vec!["StringSet", "u32"]);
    }

    #[test]
    fn duplicate_tag_rejected() {
        let result = EncoderRegistry::builder()
            .register(U32Encoder("dup"))
            .unwrap()
            .register(U32Encoder("dup"));
        assert!(matches!(result, Err(CodecError::DuplicateTag { tag }) if tag == "dup"));
    }

    #[test]
    fn builtin_tag_is_reserved() {
        let result = EncoderRegistry::builder().register(U32Encoder("StringSet"));
        assert!(matches!(result, Err(CodecError::DuplicateTag { .. })));
    }

    #[test]
    fn empty_tag_rejected() {
        let result = EncoderRegistry::builder().register(U32Encoder(""));
        assert!(matches!(result, Err(CodecError::InvalidTag { .. })));
    }

    #[test]
    fn unknown_tag_is_none() {
        let registry = EncoderRegistry::default();
        assert!(registry.decode("missing", &[]).is_none());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn malformed_bytes_surface_encoder_error() {
        let registry = EncoderRegistry::builder()
            .register(U32Encoder("u32"))
            .unwrap()
            .build();
        let result = registry.decode("u32", &[1, 2]).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn encode_dyn_checks_type() {
        let encoder = U32Encoder("u32");
        assert_eq!(encoder.encode_dyn(&5u32).unwrap(), vec![5, 0, 0, 0]);
        assert!(matches!(
            encoder.encode_dyn(&"not a u32"),
            Err(CodecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn string_set_codec_roundtrip() {
        let set: BTreeSet<String> = ["a", "b"].iter().map(|s| (*s).to_string()).collect();
        let bytes = StringSetCodec.encode(&set).unwrap();
        assert_eq!(StringSetCodec.decode(&bytes).unwrap(), set);
    }
}
