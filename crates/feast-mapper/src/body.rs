//! Body decoding for body-bound properties.
//!
//! The payload is decoded to text first. Scalar property types go through
//! their registered converter; every other type goes through the configured
//! [`Deserializer`].

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::BindRequest;
use crate::marker::TypeKey;
use crate::parser::BoxedValue;
use crate::BindError;

/// Largest payload that can be held in one string.
pub const MAX_TEXT_LENGTH: u64 = isize::MAX as u64;

/// Text encoding used to decode request payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyEncoding {
    /// UTF-8; invalid sequences become U+FFFD.
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// UTF-16, little endian.
    #[serde(rename = "utf-16le")]
    Utf16Le,
    /// UTF-16, big endian.
    #[serde(rename = "utf-16be")]
    Utf16Be,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    #[serde(rename = "iso-8859-1", alias = "latin1")]
    Latin1,
    /// US-ASCII; bytes above 0x7F become `?`.
    #[serde(rename = "us-ascii", alias = "ascii")]
    Ascii,
}

impl BodyEncoding {
    /// Decodes `bytes`, stripping a byte-order mark that matches the encoding.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => {
                let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
                String::from_utf8_lossy(bytes).into_owned()
            }
            Self::Utf16Le => {
                let bytes = bytes.strip_prefix(&[0xFF, 0xFE]).unwrap_or(bytes);
                decode_utf16(bytes, u16::from_le_bytes)
            }
            Self::Utf16Be => {
                let bytes = bytes.strip_prefix(&[0xFE, 0xFF]).unwrap_or(bytes);
                decode_utf16(bytes, u16::from_be_bytes)
            }
            Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
                .collect(),
        }
    }
}

impl fmt::Display for BodyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Latin1 => "iso-8859-1",
            Self::Ascii => "us-ascii",
        })
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks(2).map(|pair| match *pair {
        [a, b] => unit([a, b]),
        _ => 0xFFFD,
    });
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decodes request payloads into text.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyDecoder {
    encoding: BodyEncoding,
    max_body_size: Option<usize>,
}

impl BodyDecoder {
    /// Creates a decoder.
    #[must_use]
    pub fn new(encoding: BodyEncoding, max_body_size: Option<usize>) -> Self {
        Self {
            encoding,
            max_body_size,
        }
    }

    /// Returns the configured encoding.
    #[must_use]
    pub fn encoding(&self) -> BodyEncoding {
        self.encoding
    }

    /// Reads the whole payload of `request` as text.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::PayloadTooLarge`] if the declared length exceeds
    /// the configured limit or [`MAX_TEXT_LENGTH`].
    pub fn decode(&self, request: &dyn BindRequest) -> Result<String, BindError> {
        let body = request.body();
        let declared = request.content_length().unwrap_or(body.len() as u64);
        let limit = self
            .max_body_size
            .map_or(MAX_TEXT_LENGTH, |max| (max as u64).min(MAX_TEXT_LENGTH));

        let length = declared.max(body.len() as u64);
        if length > limit {
            return Err(BindError::payload_too_large(length, limit));
        }
        Ok(self.encoding.decode(body))
    }
}

/// Decodes text into values of types outside the scalar converter domain.
///
/// Implementations return `None` when the text cannot be decoded into
/// `target`; body binding treats that as a skipped field.
pub trait Deserializer: Send + Sync {
    /// Decodes `input` into a value of type `target`.
    fn deserialize(&self, input: &str, target: TypeKey) -> Option<BoxedValue>;

    /// Returns `false` if `target` can never be produced.
    ///
    /// Checked once when a binder is compiled, to report body-bound
    /// properties that will never be assigned.
    fn supports(&self, _target: TypeKey) -> bool {
        true
    }
}

/// Deserializer that never produces a value.
///
/// This is the default, so body binding to complex types does nothing until a
/// host installs a real deserializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDeserializer;

impl Deserializer for NoopDeserializer {
    fn deserialize(&self, _input: &str, _target: TypeKey) -> Option<BoxedValue> {
        None
    }

    fn supports(&self, _target: TypeKey) -> bool {
        false
    }
}

type JsonDecodeFn = Arc<dyn Fn(&str) -> Option<BoxedValue> + Send + Sync>;

/// JSON deserializer for an explicit set of types.
///
/// # Example
///
/// ```rust
/// use feast_mapper::{Deserializer, JsonDeserializer, TypeKey};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// let json = JsonDeserializer::new().with_type::<Point>();
/// let value = json.deserialize(r#"{"x":1,"y":2}"#, TypeKey::of::<Point>()).unwrap();
/// let point = value.downcast::<Point>().unwrap();
/// assert_eq!((point.x, point.y), (1, 2));
/// ```
#[derive(Clone, Default)]
pub struct JsonDeserializer {
    decoders: HashMap<TypeId, (TypeKey, JsonDecodeFn)>,
}

impl JsonDeserializer {
    /// Creates a deserializer with no registered types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` as decodable from JSON.
    #[must_use]
    pub fn with_type<T: DeserializeOwned + Send + 'static>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Registers `T` as decodable from JSON.
    pub fn register<T: DeserializeOwned + Send + 'static>(&mut self) {
        let key = TypeKey::of::<T>();
        let decode: JsonDecodeFn = Arc::new(move |input: &str| {
            match serde_json::from_str::<T>(input) {
                Ok(value) => Some(Box::new(value) as BoxedValue),
                Err(e) => {
                    tracing::trace!(target_type = key.name(), error = %e, "JSON body rejected");
                    None
                }
            }
        });
        self.decoders.insert(key.id(), (key, decode));
    }
}

impl Deserializer for JsonDeserializer {
    fn deserialize(&self, input: &str, target: TypeKey) -> Option<BoxedValue> {
        let (_, decode) = self.decoders.get(&target.id())?;
        decode(input)
    }

    fn supports(&self, target: TypeKey) -> bool {
        self.decoders.contains_key(&target.id())
    }
}

impl fmt::Debug for JsonDeserializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonDeserializer")
            .field("types", &self.decoders.values().map(|(key, _)| key).collect::<Vec<_>>())
            .finish()
    }
}
