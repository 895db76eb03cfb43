//! Mapper configuration.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or JSON
//! file, then environment variables of the form `PREFIX__KEY` or
//! `PREFIX__MULTIPART__KEY`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::de::IntoDeserializer;
use serde::{Deserialize, Serialize};

use crate::body::{BodyDecoder, BodyEncoding};
use crate::form::MultipartConfig;
use crate::ConfigError;

/// Settings shared by every binder a mapper compiles.
///
/// # Example
///
/// ```
/// use feast_mapper::{BodyEncoding, MapperConfig};
///
/// let config = MapperConfig::from_toml_str(
///     r#"
///     body_encoding = "iso-8859-1"
///     max_body_size = 65536
///
///     [multipart]
///     max_fields = 10
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.body_encoding, BodyEncoding::Latin1);
/// assert_eq!(config.max_body_size, Some(65536));
/// assert_eq!(config.multipart.max_fields, 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    /// Encoding used to read body-bound payloads.
    pub body_encoding: BodyEncoding,
    /// Upper bound on body-bound payloads, in bytes.
    ///
    /// `None` leaves only the addressable-size limit.
    pub max_body_size: Option<usize>,
    /// Limits for multipart form parsing.
    pub multipart: MultipartConfig,
}

impl MapperConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads a `.toml` or `.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Applies environment overrides named `PREFIX__...`.
    ///
    /// Recognized keys: `BODY_ENCODING`, `MAX_BODY_SIZE` (`none` clears it),
    /// `MULTIPART__MAX_BODY_SIZE`, `MULTIPART__MAX_FIELD_SIZE`,
    /// `MULTIPART__MAX_FIELDS`. Unrecognized keys under the prefix are ignored.
    pub fn with_env_prefix(mut self, prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(&prefix))
            .collect();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, &prefix)?;
        }
        Ok(self)
    }

    /// Builds the body decoder described by this configuration.
    #[must_use]
    pub fn body_decoder(&self) -> BodyDecoder {
        BodyDecoder::new(self.body_encoding, self.max_body_size)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };
        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["BODY_ENCODING"] => {
                self.body_encoding = BodyEncoding::deserialize(
                    IntoDeserializer::<serde::de::value::Error>::into_deserializer(
                        value.to_lowercase(),
                    ),
                )
                .map_err(|e| env_error(key, e.to_string()))?;
            }
            ["MAX_BODY_SIZE"] => {
                self.max_body_size = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(parse_size(key, value)?)
                };
            }
            ["MULTIPART", "MAX_BODY_SIZE"] => {
                self.multipart.max_body_size = parse_size(key, value)?;
            }
            ["MULTIPART", "MAX_FIELD_SIZE"] => {
                self.multipart.max_field_size = parse_size(key, value)?;
            }
            ["MULTIPART", "MAX_FIELDS"] => {
                self.multipart.max_fields = parse_size(key, value)?;
            }
            _ => {
                tracing::debug!(var = key, "ignoring unknown configuration variable");
            }
        }
        Ok(())
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| env_error(key, "expected integer".to_string()))
}

fn env_error(var: &str, reason: String) -> ConfigError {
    ConfigError::EnvParseError {
        var: var.to_string(),
        reason,
    }
}
