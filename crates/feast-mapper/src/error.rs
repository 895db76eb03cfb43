//! Binding error types.
//!
//! Configuration-time conditions (unregistered converters, invalid markers,
//! unbindable property names) surface when a target type's binder is compiled.
//! Resource and form conditions surface while a request is being read or bound.
//! Per-field parse failures are never errors: the field is skipped.

use std::fmt;
use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

use crate::source::SourceCategory;

/// Location of a property inside a target type, attached to errors so hosts
/// can log a useful diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    /// Name of the target type.
    pub target: &'static str,
    /// Declared property name.
    pub property: String,
    /// Source category the property was classified into, if any.
    pub category: Option<SourceCategory>,
}

impl PropertyRef {
    /// Creates a property reference.
    #[must_use]
    pub fn new(
        target: &'static str,
        property: impl Into<String>,
        category: Option<SourceCategory>,
    ) -> Self {
        Self {
            target,
            property: property.into(),
            category,
        }
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}::{}`", self.target, self.property)?;
        if let Some(category) = self.category {
            write!(f, " ({category} source)")?;
        }
        Ok(())
    }
}

fn located(at: Option<&PropertyRef>) -> String {
    at.map(|p| format!(" for {p}")).unwrap_or_default()
}

/// Error raised while compiling a binder or binding a request.
#[derive(Debug, Error)]
pub enum BindError {
    /// A bound property's value type has no scalar converter.
    #[error("no converter registered for `{value_type}`{}", located(.at.as_ref()))]
    NoConverterRegistered {
        /// Name of the value type that has no converter.
        value_type: &'static str,
        /// Property that required the converter.
        at: Option<PropertyRef>,
    },

    /// A type that is not a marker was registered as one.
    #[error("`{marker}` is not a marker type and cannot select the {category} source")]
    InvalidMarker {
        /// Name of the rejected type.
        marker: &'static str,
        /// Category the registration targeted.
        category: SourceCategory,
    },

    /// A property name is empty.
    #[error("property name must contain at least one character{}", located(.at.as_ref()))]
    InvalidName {
        /// Property carrying the empty name.
        at: Option<PropertyRef>,
    },

    /// A property name does not start with an ASCII letter.
    #[error("property name `{name}` must start with an ASCII letter, found {character:?}")]
    UnsupportedCharacter {
        /// The offending name.
        name: String,
        /// Its first character.
        character: char,
        /// Target type declaring the property.
        target: Option<&'static str>,
    },

    /// The request body cannot be held as a single string.
    #[error("payload too large: limit {limit} bytes, declared {declared} bytes{}", located(.at.as_ref()))]
    PayloadTooLarge {
        /// Declared payload length.
        declared: u64,
        /// Applicable limit.
        limit: u64,
        /// Body-bound property that read the payload.
        at: Option<PropertyRef>,
    },

    /// Form data could not be parsed.
    #[error("malformed form data: {reason}")]
    MalformedForm {
        /// Parser diagnostic.
        reason: String,
    },

    /// The request content type cannot be read as a form.
    #[error("unsupported content type: expected '{expected}', got '{}'", .actual.as_deref().unwrap_or("none"))]
    UnsupportedMediaType {
        /// Expected media type.
        expected: &'static str,
        /// Media type sent by the client.
        actual: Option<String>,
    },

    /// The binder cache held an entry of the wrong type for a target.
    #[error("binder cache entry for `{target}` has an unexpected type")]
    BinderMismatch {
        /// Target type name.
        target: &'static str,
    },
}

impl BindError {
    /// Creates a [`BindError::NoConverterRegistered`] without a location.
    #[must_use]
    pub fn no_converter(value_type: &'static str) -> Self {
        Self::NoConverterRegistered {
            value_type,
            at: None,
        }
    }

    /// Creates a [`BindError::PayloadTooLarge`] without a location.
    #[must_use]
    pub fn payload_too_large(declared: u64, limit: u64) -> Self {
        Self::PayloadTooLarge {
            declared,
            limit,
            at: None,
        }
    }

    /// Attaches a property location to configuration-time conditions and
    /// oversized payloads.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn at(self, property: PropertyRef) -> Self {
        match self {
            Self::NoConverterRegistered { value_type, .. } => Self::NoConverterRegistered {
                value_type,
                at: Some(property),
            },
            Self::InvalidName { .. } => Self::InvalidName { at: Some(property) },
            Self::PayloadTooLarge {
                declared, limit, ..
            } => Self::PayloadTooLarge {
                declared,
                limit,
                at: Some(property),
            },
            Self::UnsupportedCharacter {
                name, character, ..
            } => Self::UnsupportedCharacter {
                name,
                character,
                target: Some(property.target),
            },
            other => other,
        }
    }

    /// Returns the property location if the error carries one.
    #[must_use]
    pub fn property(&self) -> Option<&PropertyRef> {
        match self {
            Self::NoConverterRegistered { at, .. }
            | Self::InvalidName { at }
            | Self::PayloadTooLarge { at, .. } => at.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` for conditions caused by type design or registry setup.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoConverterRegistered { .. }
                | Self::InvalidMarker { .. }
                | Self::InvalidName { .. }
                | Self::UnsupportedCharacter { .. }
                | Self::BinderMismatch { .. }
        )
    }

    /// Returns the HTTP status code a host should answer with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MalformedForm { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code suitable for error envelopes.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoConverterRegistered { .. } => "NO_CONVERTER_REGISTERED",
            Self::InvalidMarker { .. } => "INVALID_MARKER",
            Self::InvalidName { .. } => "INVALID_NAME",
            Self::UnsupportedCharacter { .. } => "UNSUPPORTED_CHARACTER",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::MalformedForm { .. } => "MALFORMED_FORM",
            Self::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            Self::BinderMismatch { .. } => "BINDER_MISMATCH",
        }
    }
}

/// Errors that can occur while loading a [`MapperConfig`](crate::MapperConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The file extension names no supported format.
    #[error("unsupported configuration file format: {path}")]
    UnsupportedFormat {
        /// Path to the file.
        path: PathBuf,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },
}
