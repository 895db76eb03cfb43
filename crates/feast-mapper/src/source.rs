//! Source categories and the marker registry.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::marker::{FromBody, FromForm, FromHeader, FromQuery, Marker, TypeKey};
use crate::BindError;

/// Request sub-structure a property can be bound from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    /// HTTP headers.
    Header,
    /// Form fields and uploaded files.
    Form,
    /// Query string parameters.
    Query,
    /// The request payload.
    Body,
}

impl SourceCategory {
    /// Categories in classification order. The first match wins.
    pub const PRECEDENCE: [Self; 4] = [Self::Header, Self::Form, Self::Query, Self::Body];

    /// Returns the lowercase category name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Form => "form",
            Self::Query => "query",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping from each [`SourceCategory`] to the marker types selecting it.
///
/// Sets only grow; there is no removal.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    markers: HashMap<SourceCategory, HashSet<TypeKey>>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SourceRegistry {
    /// Creates a registry with no markers in any category.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            markers: SourceCategory::PRECEDENCE
                .into_iter()
                .map(|category| (category, HashSet::new()))
                .collect(),
        }
    }

    /// Creates a registry holding the built-in markers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_marker::<FromHeader>(SourceCategory::Header);
        registry.register_marker::<FromForm>(SourceCategory::Form);
        registry.register_marker::<FromQuery>(SourceCategory::Query);
        registry.register_marker::<FromBody>(SourceCategory::Body);
        registry
    }

    /// Adds a marker type to a category.
    ///
    /// Returns `true` if the marker was not already present.
    pub fn register_marker<M: Marker>(&mut self, category: SourceCategory) -> bool {
        self.markers
            .entry(category)
            .or_default()
            .insert(TypeKey::marker::<M>())
    }

    /// Adds a marker to a category from its [`TypeKey`].
    ///
    /// # Errors
    ///
    /// Returns [`BindError::InvalidMarker`] if `key` was not built from a
    /// [`Marker`] type.
    pub fn register(&mut self, category: SourceCategory, key: TypeKey) -> Result<bool, BindError> {
        if !key.is_marker() {
            return Err(BindError::InvalidMarker {
                marker: key.name(),
                category,
            });
        }
        Ok(self.markers.entry(category).or_default().insert(key))
    }

    /// Returns `true` if any marker of `category` is present in `markers`.
    #[must_use]
    pub fn classify(&self, category: SourceCategory, markers: &[TypeKey]) -> bool {
        self.markers
            .get(&category)
            .is_some_and(|set| markers.iter().any(|m| set.contains(m)))
    }

    /// Returns the first category, in [`SourceCategory::PRECEDENCE`] order,
    /// selected by `markers`.
    #[must_use]
    pub fn resolve(&self, markers: &[TypeKey]) -> Option<SourceCategory> {
        if markers.is_empty() {
            return None;
        }
        SourceCategory::PRECEDENCE
            .into_iter()
            .find(|category| self.classify(*category, markers))
    }

    /// Returns the markers registered for a category.
    pub fn markers(&self, category: SourceCategory) -> impl Iterator<Item = &TypeKey> {
        self.markers.get(&category).into_iter().flatten()
    }
}
