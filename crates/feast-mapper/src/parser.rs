//! Scalar converter registry.
//!
//! A converter turns a multi-valued field into one typed value. Conversion
//! failures are represented as `None` and never panic.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::marker::TypeKey;
use crate::{BindError, FieldValues};

/// A type-erased value produced by a converter or deserializer.
pub type BoxedValue = Box<dyn Any + Send>;

/// Type-erased conversion function stored in the registry.
pub type Converter = Arc<dyn Fn(&FieldValues) -> Option<BoxedValue> + Send + Sync>;

/// Mapping from value types to their scalar converters.
///
/// The built-in domain covers `String`, `u8`, `char`, `u16`, `i16`, `u32`,
/// `i32`, `u64`, `i64`, `f32`, `f64`, [`FieldValues`] and `Vec<String>`.
/// Registering a type again replaces its converter.
///
/// # Example
///
/// ```rust
/// use feast_mapper::{FieldValues, ParserRegistry};
///
/// let mut parsers = ParserRegistry::with_defaults();
/// parsers.register(|v: &FieldValues| v.first().map(|s| s == "on"));
///
/// assert_eq!(parsers.convert::<bool>(&FieldValues::from("on")), Some(true));
/// assert_eq!(parsers.convert::<i32>(&FieldValues::from("x")), None);
/// ```
#[derive(Clone)]
pub struct ParserRegistry {
    converters: HashMap<TypeId, (TypeKey, Converter)>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ParserRegistry {
    /// Creates a registry without any converter.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in converters.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(|v: &FieldValues| Some(v.joined().into_owned()));
        registry.register(parse_number::<u8>);
        registry.register(parse_char);
        registry.register(parse_number::<u16>);
        registry.register(parse_number::<i16>);
        registry.register(parse_number::<u32>);
        registry.register(parse_number::<i32>);
        registry.register(parse_number::<u64>);
        registry.register(parse_number::<i64>);
        registry.register(parse_number::<f32>);
        registry.register(parse_number::<f64>);
        registry.register(|v: &FieldValues| Some(v.clone()));
        registry.register(|v: &FieldValues| Some(v.to_vec()));
        registry
    }

    /// Registers or replaces the converter for `V`.
    pub fn register<V, F>(&mut self, convert: F)
    where
        V: Send + 'static,
        F: Fn(&FieldValues) -> Option<V> + Send + Sync + 'static,
    {
        let erased: Converter =
            Arc::new(move |values: &FieldValues| convert(values).map(|v| Box::new(v) as BoxedValue));
        self.converters
            .insert(TypeId::of::<V>(), (TypeKey::of::<V>(), erased));
    }

    /// Returns the converter registered for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::NoConverterRegistered`] if the type is unknown.
    pub fn get(&self, key: TypeKey) -> Result<Converter, BindError> {
        self.lookup(key)
            .cloned()
            .ok_or_else(|| BindError::no_converter(key.name()))
    }

    /// Returns the converter registered for `key`, if any.
    #[must_use]
    pub fn lookup(&self, key: TypeKey) -> Option<&Converter> {
        self.converters.get(&key.id()).map(|(_, converter)| converter)
    }

    /// Returns `true` if a converter for `key` is registered.
    #[must_use]
    pub fn contains(&self, key: TypeKey) -> bool {
        self.converters.contains_key(&key.id())
    }

    /// Converts `values` into a `V` using the registered converter.
    ///
    /// Returns `None` if no converter is registered or conversion fails.
    #[must_use]
    pub fn convert<V: 'static>(&self, values: &FieldValues) -> Option<V> {
        let converter = self.lookup(TypeKey::of::<V>())?;
        converter(values)?.downcast::<V>().ok().map(|v| *v)
    }

    /// Returns the number of registered converters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Returns `true` if no converter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("types", &self.converters.values().map(|(key, _)| key).collect::<Vec<_>>())
            .finish()
    }
}

fn parse_number<T: FromStr>(values: &FieldValues) -> Option<T> {
    values.joined().trim().parse().ok()
}

fn parse_char(values: &FieldValues) -> Option<char> {
    let joined = values.joined();
    let mut chars = joined.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
