//! Marker types and type identity.
//!
//! A marker is a zero-sized type attached to a property (or to a whole target
//! type) while it is described. Markers carry no data; only their presence is
//! tested when a binder is compiled.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Trait for declarative tags that select a [`SourceCategory`](crate::SourceCategory).
///
/// # Example
///
/// ```rust
/// use feast_mapper::{Marker, RequestMapper, SourceCategory};
///
/// /// Legacy name for query parameters.
/// struct FromUri;
/// impl Marker for FromUri {}
///
/// let mapper = RequestMapper::new();
/// mapper.register_marker::<FromUri>(SourceCategory::Query);
/// ```
pub trait Marker: Send + Sync + 'static {}

/// Selects request headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FromHeader;

/// Selects form fields and uploaded files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FromForm;

/// Selects query string parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct FromQuery;

/// Selects the request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct FromBody;

impl Marker for FromHeader {}
impl Marker for FromForm {}
impl Marker for FromQuery {}
impl Marker for FromBody {}

/// Identity and readable name of a Rust type.
///
/// Equality and hashing use the [`TypeId`] only.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    marker: bool,
}

impl TypeKey {
    /// Key for an arbitrary type.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            marker: false,
        }
    }

    /// Key for a [`Marker`] type.
    #[must_use]
    pub fn marker<M: Marker>() -> Self {
        Self {
            marker: true,
            ..Self::of::<M>()
        }
    }

    /// Returns the type id.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the full type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if the key was built from a [`Marker`] type.
    #[must_use]
    pub fn is_marker(&self) -> bool {
        self.marker
    }

    /// Returns `true` if this key identifies `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeKey").field(&self.name).finish()
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_key_is_flagged() {
        assert!(TypeKey::marker::<FromQuery>().is_marker());
        assert!(!TypeKey::of::<FromQuery>().is_marker());
    }

    #[test]
    fn test_equality_ignores_marker_flag() {
        assert_eq!(TypeKey::marker::<FromForm>(), TypeKey::of::<FromForm>());
        assert_ne!(TypeKey::of::<FromForm>(), TypeKey::of::<FromBody>());
    }

    #[test]
    fn test_is_and_name() {
        let key = TypeKey::of::<u32>();
        assert!(key.is::<u32>());
        assert!(!key.is::<i32>());
        assert_eq!(key.name(), "u32");
        assert_eq!(key.to_string(), "u32");
    }
}
