//! The request mapper and its binder cache.
//!
//! A [`RequestMapper`] owns the marker and converter registries and compiles
//! one [`CompiledBinder`] per target type on first use. Compilation happens
//! exactly once per type no matter how many threads race on first use, and
//! the result is kept for the mapper's lifetime.
//!
//! Registries may be extended at any time, but a binder already compiled for
//! a type keeps the converters and markers it was compiled with.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::body::{Deserializer, NoopDeserializer};
use crate::compiler::CompiledBinder;
use crate::config::MapperConfig;
use crate::context::BindRequest;
use crate::describe::Bindable;
use crate::field::FieldBinderFactory;
use crate::marker::{Marker, TypeKey};
use crate::parser::ParserRegistry;
use crate::source::{SourceCategory, SourceRegistry};
use crate::{BindError, FieldValues};

type ErasedBinder = Arc<dyn Any + Send + Sync>;
type BinderSlot = Arc<OnceCell<ErasedBinder>>;

/// Binds requests onto target types.
///
/// # Example
///
/// ```rust
/// use feast_mapper::{Bindable, FromHeader, FromQuery, Properties, RequestContextBuilder, RequestMapper};
/// use http::Uri;
///
/// #[derive(Debug, Default)]
/// struct Session {
///     user_id: i32,
///     session_token: String,
/// }
///
/// impl Bindable for Session {
///     fn describe(props: &mut Properties<Self>) {
///         props
///             .property("UserId", |s: &mut Self, v: i32| s.user_id = v)
///             .marked::<FromQuery>();
///         props
///             .property("SessionToken", |s: &mut Self, v: String| s.session_token = v)
///             .marked::<FromHeader>();
///     }
/// }
///
/// let mapper = RequestMapper::new();
/// let request = RequestContextBuilder::new()
///     .uri(Uri::from_static("/?userId=42"))
///     .header("sessionToken", "abc")
///     .build();
///
/// let session: Session = mapper.generate(&request, true).unwrap();
/// assert_eq!(session.user_id, 42);
/// assert_eq!(session.session_token, "abc");
/// ```
pub struct RequestMapper {
    sources: RwLock<SourceRegistry>,
    parsers: RwLock<ParserRegistry>,
    deserializer: RwLock<Arc<dyn Deserializer>>,
    config: MapperConfig,
    binders: DashMap<TypeId, BinderSlot>,
}

impl Default for RequestMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMapper {
    /// Creates a mapper with the built-in markers and converters.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a mapper with the built-in registries and `config`.
    #[must_use]
    pub fn with_config(config: MapperConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Starts building a mapper.
    #[must_use]
    pub fn builder() -> MapperBuilder {
        MapperBuilder::new()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Binds `request` onto `target` in place.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from compiling the binder for `T`, or
    /// [`BindError::PayloadTooLarge`] from a body-bound property.
    pub fn bind<T: Bindable>(&self, target: &mut T, request: &dyn BindRequest) -> Result<(), BindError> {
        self.binder::<T>()?.apply(target, request)
    }

    /// Binds `request` onto `target` and returns it.
    ///
    /// # Errors
    ///
    /// See [`RequestMapper::bind`].
    pub fn map<T: Bindable>(&self, mut target: T, request: &dyn BindRequest) -> Result<T, BindError> {
        self.bind(&mut target, request)?;
        Ok(target)
    }

    /// Creates a `T` and binds `request` onto it.
    ///
    /// With `construct` the instance comes from [`Default`]; otherwise from
    /// [`Bindable::bare`]. The default `bare` also calls [`Default`], so the
    /// two modes differ only for types that override [`Bindable::bare`].
    ///
    /// # Errors
    ///
    /// See [`RequestMapper::bind`].
    pub fn generate<T: Bindable + Default>(
        &self,
        request: &dyn BindRequest,
        construct: bool,
    ) -> Result<T, BindError> {
        let target = if construct { T::default() } else { T::bare() };
        self.map(target, request)
    }

    /// Returns the compiled binder for `T`, compiling it on first use.
    ///
    /// A failed compilation is not cached; the next call retries it.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::NoConverterRegistered`] if a bound property has no
    /// converter, or a name error for an unbindable property name.
    pub fn binder<T: Bindable>(&self) -> Result<Arc<CompiledBinder<T>>, BindError> {
        let key = TypeId::of::<T>();
        // Shared shard lock once the slot exists; the write lock only on first use.
        let existing = self.binders.get(&key).map(|slot| Arc::clone(slot.value()));
        let slot = match existing {
            Some(slot) => slot,
            None => Arc::clone(&*self.binders.entry(key).or_default()),
        };

        let erased = slot.get_or_try_init(|| {
            let binder = self.compile::<T>()?;
            Ok::<ErasedBinder, BindError>(Arc::new(binder))
        })?;

        Arc::clone(erased)
            .downcast::<CompiledBinder<T>>()
            .map_err(|_| BindError::BinderMismatch {
                target: type_name::<T>(),
            })
    }

    /// Returns `true` if a binder for `T` has been compiled.
    #[must_use]
    pub fn is_compiled<T: 'static>(&self) -> bool {
        self.binders
            .get(&TypeId::of::<T>())
            .is_some_and(|slot| slot.value().get().is_some())
    }

    /// Returns the number of compiled binders.
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.binders
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    /// Adds marker `M` to `category`. Returns `false` if it was already there.
    pub fn register_marker<M: Marker>(&self, category: SourceCategory) -> bool {
        self.sources.write().register_marker::<M>(category)
    }

    /// Adds the marker identified by `key` to `category`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::InvalidMarker`] if `key` was not built from a
    /// [`Marker`] type.
    pub fn register_marker_type(&self, category: SourceCategory, key: TypeKey) -> Result<bool, BindError> {
        self.sources.write().register(category, key)
    }

    /// Registers or replaces the converter for `V`.
    pub fn register_converter<V, F>(&self, convert: F)
    where
        V: Send + 'static,
        F: Fn(&FieldValues) -> Option<V> + Send + Sync + 'static,
    {
        self.parsers.write().register(convert);
    }

    /// Replaces the deserializer used for body-bound properties.
    pub fn set_deserializer(&self, deserializer: impl Deserializer + 'static) {
        *self.deserializer.write() = Arc::new(deserializer);
    }

    fn compile<T: Bindable>(&self) -> Result<CompiledBinder<T>, BindError> {
        let sources = self.sources.read();
        let parsers = self.parsers.read();
        let deserializer = Arc::clone(&self.deserializer.read());
        let factory = FieldBinderFactory::new(&parsers, self.config.body_decoder(), deserializer);
        CompiledBinder::compile(&sources, &factory)
    }
}

impl fmt::Debug for RequestMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMapper")
            .field("sources", &*self.sources.read())
            .field("parsers", &*self.parsers.read())
            .field("config", &self.config)
            .field("compiled", &self.compiled_count())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`RequestMapper`].
pub struct MapperBuilder {
    sources: SourceRegistry,
    parsers: ParserRegistry,
    deserializer: Arc<dyn Deserializer>,
    config: MapperConfig,
}

impl Default for MapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MapperBuilder {
    /// Starts from the built-in markers and converters and the no-op
    /// deserializer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: SourceRegistry::with_defaults(),
            parsers: ParserRegistry::with_defaults(),
            deserializer: Arc::new(NoopDeserializer),
            config: MapperConfig::default(),
        }
    }

    /// Replaces the marker registry.
    #[must_use]
    pub fn sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    /// Replaces the converter registry.
    #[must_use]
    pub fn parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    /// Adds marker `M` to `category`.
    #[must_use]
    pub fn marker<M: Marker>(mut self, category: SourceCategory) -> Self {
        self.sources.register_marker::<M>(category);
        self
    }

    /// Adds or replaces the converter for `V`.
    #[must_use]
    pub fn converter<V, F>(mut self, convert: F) -> Self
    where
        V: Send + 'static,
        F: Fn(&FieldValues) -> Option<V> + Send + Sync + 'static,
    {
        self.parsers.register(convert);
        self
    }

    /// Sets the deserializer for body-bound properties.
    #[must_use]
    pub fn deserializer(mut self, deserializer: impl Deserializer + 'static) -> Self {
        self.deserializer = Arc::new(deserializer);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the mapper.
    #[must_use]
    pub fn build(self) -> RequestMapper {
        RequestMapper {
            sources: RwLock::new(self.sources),
            parsers: RwLock::new(self.parsers),
            deserializer: RwLock::new(self.deserializer),
            config: self.config,
            binders: DashMap::new(),
        }
    }
}

impl fmt::Debug for MapperBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperBuilder")
            .field("sources", &self.sources)
            .field("parsers", &self.parsers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<RequestMapper> = OnceLock::new();

/// Returns the process-wide mapper, creating it with defaults on first use.
pub fn global() -> &'static RequestMapper {
    GLOBAL.get_or_init(RequestMapper::new)
}

/// Installs `mapper` as the process-wide mapper.
///
/// Returns the mapper back if the global mapper was already created.
pub fn init_global(mapper: RequestMapper) -> Result<(), RequestMapper> {
    GLOBAL.set(mapper)
}

/// Binds `request` onto `target` with the global mapper.
pub fn bind<T: Bindable>(target: &mut T, request: &dyn BindRequest) -> Result<(), BindError> {
    global().bind(target, request)
}

/// Binds `request` onto `target` with the global mapper and returns it.
pub fn map<T: Bindable>(target: T, request: &dyn BindRequest) -> Result<T, BindError> {
    global().map(target, request)
}

/// Creates a `T` and binds `request` onto it with the global mapper.
pub fn generate<T: Bindable + Default>(request: &dyn BindRequest, construct: bool) -> Result<T, BindError> {
    global().generate(request, construct)
}

/// Adds marker `M` to `category` on the global mapper.
pub fn register_marker<M: Marker>(category: SourceCategory) -> bool {
    global().register_marker::<M>(category)
}

/// Adds the marker identified by `key` to `category` on the global mapper.
pub fn register_marker_type(category: SourceCategory, key: TypeKey) -> Result<bool, BindError> {
    global().register_marker_type(category, key)
}

/// Registers or replaces the converter for `V` on the global mapper.
pub fn register_converter<V, F>(convert: F)
where
    V: Send + 'static,
    F: Fn(&FieldValues) -> Option<V> + Send + Sync + 'static,
{
    global().register_converter(convert);
}

/// Replaces the body deserializer of the global mapper.
pub fn set_deserializer(deserializer: impl Deserializer + 'static) {
    global().set_deserializer(deserializer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContextBuilder;
    use crate::describe::Properties;
    use crate::marker::{FromBody, FromQuery};
    use http::Uri;

    #[derive(Debug, Default)]
    struct Paging {
        page: u32,
        size: u32,
    }

    impl Bindable for Paging {
        fn describe(props: &mut Properties<Self>) {
            props.marked::<FromQuery>();
            props.property("Page", |p: &mut Self, v: u32| p.page = v);
            props.property("Size", |p: &mut Self, v: u32| p.size = v);
        }
    }

    #[derive(Debug, Default)]
    struct Toggle {
        enabled: bool,
    }

    impl Bindable for Toggle {
        fn describe(props: &mut Properties<Self>) {
            props
                .property("Enabled", |t: &mut Self, v: bool| t.enabled = v)
                .marked::<FromQuery>();
        }
    }

    #[derive(Debug, Default)]
    struct Note {
        text: String,
    }

    impl Bindable for Note {
        fn describe(props: &mut Properties<Self>) {
            props
                .property("Text", |n: &mut Self, v: String| n.text = v)
                .marked::<FromBody>();
        }
    }

    #[test]
    fn test_binder_is_cached() {
        let mapper = RequestMapper::new();
        assert!(!mapper.is_compiled::<Paging>());

        let first = mapper.binder::<Paging>().unwrap();
        let second = mapper.binder::<Paging>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(mapper.is_compiled::<Paging>());
        assert_eq!(mapper.compiled_count(), 1);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_cached_binder_lookup_is_shared() {
        let mapper = RequestMapper::new();
        let compiled = mapper.binder::<Paging>().unwrap();

        // A held read guard on the slot must not block later lookups.
        let guard = mapper.binders.get(&TypeId::of::<Paging>()).unwrap();
        let again = mapper.binder::<Paging>().unwrap();
        drop(guard);

        assert!(Arc::ptr_eq(&compiled, &again));
        assert_eq!(mapper.binders.len(), 1);
    }

    #[test]
    fn test_map_binds_type_level_markers() {
        let mapper = RequestMapper::new();
        let request = RequestContextBuilder::new()
            .uri(Uri::from_static("/?page=2&size=50"))
            .build();

        let paging = mapper.map(Paging::default(), &request).unwrap();
        assert_eq!((paging.page, paging.size), (2, 50));
    }

    #[test]
    fn test_generate_modes_match_without_bare_override() {
        let mapper = RequestMapper::new();
        let request = RequestContextBuilder::new()
            .uri(Uri::from_static("/?page=3"))
            .build();

        let constructed: Paging = mapper.generate(&request, true).unwrap();
        let bare: Paging = mapper.generate(&request, false).unwrap();

        assert_eq!((constructed.page, constructed.size), (bare.page, bare.size));
        assert_eq!(bare.page, 3);
    }

    #[test]
    fn test_failed_compilation_is_not_cached() {
        let mapper = RequestMapper::new();

        let err = mapper.binder::<Toggle>().unwrap_err();
        assert!(matches!(err, BindError::NoConverterRegistered { .. }));
        assert!(!mapper.is_compiled::<Toggle>());
        assert_eq!(mapper.compiled_count(), 0);

        mapper.register_converter(|v: &FieldValues| v.first().map(|s| s == "true"));
        let request = RequestContextBuilder::new()
            .uri(Uri::from_static("/?enabled=true"))
            .build();
        let toggle: Toggle = mapper.generate(&request, true).unwrap();
        assert!(toggle.enabled);
    }

    #[test]
    fn test_body_limit_from_config() {
        let mut config = MapperConfig::default();
        config.max_body_size = Some(4);
        let mapper = RequestMapper::with_config(config);

        let request = RequestContextBuilder::new().body("too long").build();
        let err = mapper.generate::<Note>(&request, true).unwrap_err();
        assert!(matches!(err, BindError::PayloadTooLarge { limit: 4, .. }));
    }

    #[test]
    fn test_register_marker_type_rejects_plain_type() {
        let mapper = RequestMapper::new();
        assert!(mapper
            .register_marker_type(SourceCategory::Query, TypeKey::of::<String>())
            .is_err());
        assert!(!mapper
            .register_marker_type(SourceCategory::Query, TypeKey::marker::<FromQuery>())
            .unwrap());
    }

    #[test]
    fn test_builder() {
        let mapper = RequestMapper::builder()
            .sources(SourceRegistry::empty())
            .marker::<FromQuery>(SourceCategory::Query)
            .converter(|v: &FieldValues| v.first().map(|s| s == "yes"))
            .build();

        let request = RequestContextBuilder::new()
            .uri(Uri::from_static("/?Enabled=yes"))
            .build();
        let toggle: Toggle = mapper.generate(&request, false).unwrap();
        assert!(toggle.enabled);
    }
}
