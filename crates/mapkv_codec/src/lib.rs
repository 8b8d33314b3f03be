//! # MapKV Codec
//!
//! Value model and binary encodings for MapKV.
//!
//! This crate defines what can be stored and how each value becomes the
//! payload bytes of a record:
//! - Fixed-width little-endian primitives (bool, i32, f32, i64, f64)
//! - Raw UTF-8 strings and byte arrays
//! - Varint length-prefixed string sets
//! - Tagged objects produced by pluggable [`ObjectEncoder`]s
//!
//! ## Object payloads
//!
//! Objects are stored as `tag_len (1) | tag | encoder bytes`. The tag picks
//! the decoder at read time, so several object types can live in one store
//! and a store opened without some encoder can still read everything else.
//!
//! ## Usage
//!
//! ```
//! use mapkv_codec::{CborEncoder, EncoderRegistry, Value, ValueType};
//!
//! // Primitive payloads
//! let bytes = Value::Int(42).encode_payload().unwrap();
//! assert_eq!(Value::decode_payload(ValueType::Int, &bytes).unwrap(), Value::Int(42));
//!
//! // Encoder registry
//! let registry = EncoderRegistry::builder()
//!     .register(CborEncoder::<Vec<String>>::new("Names"))
//!     .unwrap()
//!     .build();
//! assert!(registry.contains("Names"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod encoder;
mod error;
pub mod string_set;
mod value;

pub use cbor::CborEncoder;
pub use encoder::{DynEncoder, EncoderRegistry, EncoderRegistryBuilder, ObjectEncoder, StringSetCodec};
pub use error::{CodecError, CodecResult};
pub use value::{encode_object, split_object, validate_tag, Value, ValueType, MAX_TAG_LEN};
