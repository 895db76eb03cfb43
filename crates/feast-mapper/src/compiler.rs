//! Binder compilation.
//!
//! A [`CompiledBinder`] is the ordered list of binding operations for one
//! target type. It is produced from the type's description in a single pass
//! and is immutable afterwards.

use std::fmt;

use crate::context::BindRequest;
use crate::describe::{Bindable, Properties};
use crate::field::{BindingOperation, FieldBinderFactory};
use crate::source::SourceRegistry;
use crate::BindError;

/// The compiled binding plan for target type `T`.
pub struct CompiledBinder<T> {
    target: &'static str,
    operations: Vec<BindingOperation<T>>,
}

impl<T: Bindable> CompiledBinder<T> {
    /// Classifies every declared property of `T` and builds its operation.
    ///
    /// Property-level markers take precedence over type-level markers.
    /// Properties selecting no category are skipped.
    pub(crate) fn compile(
        sources: &SourceRegistry,
        factory: &FieldBinderFactory<'_>,
    ) -> Result<Self, BindError> {
        let target = std::any::type_name::<T>();
        let properties = Properties::<T>::of();
        let type_category = sources.resolve(properties.type_markers());

        let mut operations = Vec::with_capacity(properties.properties().len());
        for property in properties.properties() {
            let Some(category) = sources.resolve(property.markers()).or(type_category) else {
                tracing::trace!(
                    target_type = target,
                    property = property.name(),
                    "property selects no source, skipped"
                );
                continue;
            };
            operations.push(factory.build(target, property, category)?);
        }

        tracing::debug!(
            target_type = target,
            operations = operations.len(),
            skipped = properties.properties().len() - operations.len(),
            "compiled binder"
        );

        Ok(Self { target, operations })
    }
}

impl<T> CompiledBinder<T> {
    /// Applies every operation, in declaration order, to `target`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an operation. Operations before it
    /// have already been applied.
    pub fn apply(&self, target: &mut T, request: &dyn BindRequest) -> Result<(), BindError> {
        for operation in &self.operations {
            operation.apply(target, request)?;
        }
        Ok(())
    }

    /// The binding operations in declaration order.
    #[must_use]
    pub fn operations(&self) -> &[BindingOperation<T>] {
        &self.operations
    }

    /// Number of bound properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if no property of the type is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Name of the target type.
    #[must_use]
    pub fn target_name(&self) -> &'static str {
        self.target
    }
}

impl<T> fmt::Debug for CompiledBinder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledBinder")
            .field("target", &self.target)
            .field("operations", &self.operations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::body::{BodyDecoder, NoopDeserializer};
    use crate::field::BindingKind;
    use crate::marker::{FromBody, FromForm, FromHeader, FromQuery, Marker};
    use crate::parser::ParserRegistry;
    use crate::source::SourceCategory;

    struct Audited;
    impl Marker for Audited {}

    #[derive(Debug, Default)]
    struct Search {
        term: String,
        page: u32,
        trace: String,
        comment: String,
        internal: String,
    }

    impl Bindable for Search {
        fn describe(props: &mut Properties<Self>) {
            props.marked::<FromForm>();
            props
                .property("Term", |s: &mut Self, v: String| s.term = v)
                .marked::<FromQuery>()
                .marked::<FromHeader>();
            props
                .property("Page", |s: &mut Self, v: u32| s.page = v)
                .marked::<FromQuery>();
            props
                .property("Trace", |s: &mut Self, v: String| s.trace = v)
                .marked::<Audited>();
            props
                .property("Comment", |s: &mut Self, v: String| s.comment = v)
                .marked::<FromBody>();
            props.property("Internal", |s: &mut Self, v: String| s.internal = v);
        }
    }

    #[derive(Debug, Default)]
    struct Unmarked {
        value: String,
    }

    impl Bindable for Unmarked {
        fn describe(props: &mut Properties<Self>) {
            props.property("Value", |u: &mut Self, v: String| u.value = v);
        }
    }

    fn compile<T: Bindable>(sources: &SourceRegistry) -> Result<CompiledBinder<T>, BindError> {
        let parsers = ParserRegistry::with_defaults();
        let factory =
            FieldBinderFactory::new(&parsers, BodyDecoder::default(), Arc::new(NoopDeserializer));
        CompiledBinder::compile(sources, &factory)
    }

    #[test]
    fn test_categories_follow_precedence() {
        let binder = compile::<Search>(&SourceRegistry::with_defaults()).unwrap();

        let categories: Vec<_> = binder
            .operations()
            .iter()
            .map(|op| (op.property(), op.category()))
            .collect();
        assert_eq!(
            categories,
            [
                ("Term", SourceCategory::Header),
                ("Page", SourceCategory::Query),
                ("Trace", SourceCategory::Form),
                ("Comment", SourceCategory::Body),
                ("Internal", SourceCategory::Form),
            ]
        );
        assert_eq!(binder.operations()[3].kind(), BindingKind::BodyScalar);
    }

    #[test]
    fn test_unmarked_properties_are_skipped() {
        let binder = compile::<Unmarked>(&SourceRegistry::with_defaults()).unwrap();
        assert!(binder.is_empty());
        assert!(binder.target_name().ends_with("Unmarked"));
    }

    #[test]
    fn test_custom_marker_selects_category() {
        let mut sources = SourceRegistry::with_defaults();
        sources.register_marker::<Audited>(SourceCategory::Header);

        let binder = compile::<Search>(&sources).unwrap();
        assert_eq!(binder.operations()[2].category(), SourceCategory::Header);
    }

    #[test]
    fn test_empty_registry_binds_nothing() {
        let binder = compile::<Search>(&SourceRegistry::empty()).unwrap();
        assert_eq!(binder.len(), 0);
    }
}
