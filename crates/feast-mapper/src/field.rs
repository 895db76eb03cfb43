//! Binding operations and the factory that builds them.
//!
//! Each operation captures everything it needs when it is built (names,
//! converter or deserializer, setter), so applying it to a request performs
//! no lookups beyond the request itself.

use std::fmt;
use std::sync::Arc;

use crate::body::{BodyDecoder, Deserializer};
use crate::context::BindRequest;
use crate::describe::PropertyDescriptor;
use crate::error::PropertyRef;
use crate::form::{FormFile, FormFiles};
use crate::name::{resolve_name, ResolvedName};
use crate::parser::ParserRegistry;
use crate::source::SourceCategory;
use crate::{BindError, FieldValues};

type ApplyFn<T> = Box<dyn Fn(&mut T, &dyn BindRequest) -> Result<(), BindError> + Send + Sync>;

type Lookup = fn(&dyn BindRequest, &str) -> Option<FieldValues>;

/// How a binding operation reads its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A header, query or form value converted by a scalar converter.
    Value,
    /// A single uploaded file.
    File,
    /// Every file uploaded under the property name.
    FileCollection,
    /// The body text converted by a scalar converter.
    BodyScalar,
    /// The body text decoded by the configured deserializer.
    BodyDeserialized,
}

/// One unit of work reading one request field into one property.
pub struct BindingOperation<T> {
    property: String,
    category: SourceCategory,
    kind: BindingKind,
    names: ResolvedName,
    apply: ApplyFn<T>,
}

impl<T> BindingOperation<T> {
    /// Name of the bound property.
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Category the property binds from.
    #[must_use]
    pub fn category(&self) -> SourceCategory {
        self.category
    }

    /// How the source is read.
    #[must_use]
    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// Lookup names used for the source field.
    #[must_use]
    pub fn names(&self) -> &ResolvedName {
        &self.names
    }

    /// Reads the source field from `request` and assigns the property.
    ///
    /// Absent or unparsable fields leave the property unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::PayloadTooLarge`] when a body-bound property
    /// cannot read the payload.
    pub fn apply(&self, target: &mut T, request: &dyn BindRequest) -> Result<(), BindError> {
        (self.apply)(target, request)
    }
}

impl<T> fmt::Debug for BindingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingOperation")
            .field("property", &self.property)
            .field("category", &self.category)
            .field("kind", &self.kind)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// Builds binding operations for classified properties.
pub(crate) struct FieldBinderFactory<'a> {
    parsers: &'a ParserRegistry,
    decoder: BodyDecoder,
    deserializer: Arc<dyn Deserializer>,
}

impl<'a> FieldBinderFactory<'a> {
    pub(crate) fn new(
        parsers: &'a ParserRegistry,
        decoder: BodyDecoder,
        deserializer: Arc<dyn Deserializer>,
    ) -> Self {
        Self {
            parsers,
            decoder,
            deserializer,
        }
    }

    /// Builds the operation binding `property` from `category`.
    pub(crate) fn build<T: 'static>(
        &self,
        target: &'static str,
        property: &PropertyDescriptor<T>,
        category: SourceCategory,
    ) -> Result<BindingOperation<T>, BindError> {
        let at = || PropertyRef::new(target, property.name(), Some(category));
        let names = resolve_name(property.name()).map_err(|e| e.at(at()))?;
        let value_type = property.value_type();

        let (kind, apply) = match category {
            SourceCategory::Header => {
                self.value_binder(property, &names, category, |r, n| r.header(n))
                    .map_err(|e| e.at(at()))?
            }
            SourceCategory::Query => {
                self.value_binder(property, &names, category, |r, n| r.query(n))
                    .map_err(|e| e.at(at()))?
            }
            SourceCategory::Form if value_type.is::<FormFile>() => file_binder(property, &names),
            SourceCategory::Form if value_type.is::<FormFiles>() => files_binder(property, &names),
            SourceCategory::Form => {
                self.value_binder(property, &names, category, |r, n| r.form(n))
                    .map_err(|e| e.at(at()))?
            }
            SourceCategory::Body => self.body_binder(at(), property),
        };

        Ok(BindingOperation {
            property: property.name().to_string(),
            category,
            kind,
            names,
            apply,
        })
    }

    fn value_binder<T: 'static>(
        &self,
        property: &PropertyDescriptor<T>,
        names: &ResolvedName,
        category: SourceCategory,
        lookup: Lookup,
    ) -> Result<(BindingKind, ApplyFn<T>), BindError> {
        let converter = self.parsers.get(property.value_type())?;
        let setter = property.setter();
        let names = names.clone();

        let apply: ApplyFn<T> = Box::new(move |target: &mut T, request: &dyn BindRequest| {
            let Some(values) = names.find(|name| lookup(request, name)) else {
                tracing::trace!(property = names.canonical(), %category, "field absent");
                return Ok(());
            };
            match converter(&values) {
                Some(value) => setter(target, value),
                None => {
                    tracing::trace!(property = names.canonical(), %category, "field not convertible, skipped");
                }
            }
            Ok(())
        });
        Ok((BindingKind::Value, apply))
    }

    fn body_binder<T: 'static>(
        &self,
        at: PropertyRef,
        property: &PropertyDescriptor<T>,
    ) -> (BindingKind, ApplyFn<T>) {
        let decoder = self.decoder;
        let setter = property.setter();
        let value_type = property.value_type();

        if let Some(converter) = self.parsers.lookup(value_type).cloned() {
            let apply: ApplyFn<T> = Box::new(move |target: &mut T, request: &dyn BindRequest| {
                let text = decoder.decode(request).map_err(|e| e.at(at.clone()))?;
                if text.is_empty() {
                    return Ok(());
                }
                if let Some(value) = converter(&FieldValues::from(text)) {
                    setter(target, value);
                }
                Ok(())
            });
            return (BindingKind::BodyScalar, apply);
        }

        if !self.deserializer.supports(value_type) {
            tracing::warn!(
                target_type = at.target,
                property = property.name(),
                value_type = value_type.name(),
                "body-bound property has no deserializer and will never be assigned"
            );
        }

        let deserializer = Arc::clone(&self.deserializer);
        let apply: ApplyFn<T> = Box::new(move |target: &mut T, request: &dyn BindRequest| {
            let text = decoder.decode(request).map_err(|e| e.at(at.clone()))?;
            if text.is_empty() {
                return Ok(());
            }
            if let Some(value) = deserializer.deserialize(&text, value_type) {
                setter(target, value);
            }
            Ok(())
        });
        (BindingKind::BodyDeserialized, apply)
    }
}

fn file_binder<T: 'static>(
    property: &PropertyDescriptor<T>,
    names: &ResolvedName,
) -> (BindingKind, ApplyFn<T>) {
    let setter = property.setter();
    let names = names.clone();

    let apply: ApplyFn<T> = Box::new(move |target: &mut T, request: &dyn BindRequest| {
        if let Some(file) = names.find(|name| request.file(name)) {
            setter(target, Box::new(file));
        }
        Ok(())
    });
    (BindingKind::File, apply)
}

fn files_binder<T: 'static>(
    property: &PropertyDescriptor<T>,
    names: &ResolvedName,
) -> (BindingKind, ApplyFn<T>) {
    let setter = property.setter();
    let names = names.clone();

    let apply: ApplyFn<T> = Box::new(move |target: &mut T, request: &dyn BindRequest| {
        let files: FormFiles = names.find(|name| {
            let files = request.files(name);
            (!files.is_empty()).then_some(files)
        });
        setter(target, Box::new(files));
        Ok(())
    });
    (BindingKind::FileCollection, apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyEncoding, NoopDeserializer};
    use crate::context::RequestContextBuilder;
    use crate::describe::{Bindable, Properties};
    use crate::form::FormData;
    use http::Uri;

    #[derive(Debug, Default)]
    struct Upload {
        page: i32,
        title: String,
        avatar: Option<FormFile>,
        attachments: FormFiles,
        note: String,
        flag: bool,
    }

    impl Bindable for Upload {
        fn describe(props: &mut Properties<Self>) {
            props.property("Page", |u: &mut Self, v: i32| u.page = v);
            props.property("Title", |u: &mut Self, v: String| u.title = v);
            props.property("Avatar", |u: &mut Self, v: FormFile| u.avatar = Some(v));
            props.property("Attachments", |u: &mut Self, v: FormFiles| u.attachments = v);
            props.property("Note", |u: &mut Self, v: String| u.note = v);
            props.property("Flag", |u: &mut Self, v: bool| u.flag = v);
        }
    }

    fn build(index: usize, category: SourceCategory) -> Result<BindingOperation<Upload>, BindError> {
        let parsers = ParserRegistry::with_defaults();
        let factory = FieldBinderFactory::new(
            &parsers,
            BodyDecoder::new(BodyEncoding::Utf8, None),
            Arc::new(NoopDeserializer),
        );
        let props = Properties::<Upload>::of();
        factory.build("Upload", &props.properties()[index], category)
    }

    #[test]
    fn test_value_binder_uses_alternate_name() {
        let op = build(0, SourceCategory::Query).unwrap();
        assert_eq!(op.kind(), BindingKind::Value);
        assert_eq!(op.names().alternate(), "page");

        let ctx = RequestContextBuilder::new()
            .uri(Uri::from_static("/?page=3"))
            .build();
        let mut upload = Upload::default();
        op.apply(&mut upload, &ctx).unwrap();
        assert_eq!(upload.page, 3);
    }

    #[test]
    fn test_value_binder_canonical_wins() {
        let op = build(0, SourceCategory::Query).unwrap();
        let ctx = RequestContextBuilder::new()
            .uri(Uri::from_static("/?page=3&Page=5"))
            .build();

        let mut upload = Upload::default();
        op.apply(&mut upload, &ctx).unwrap();
        assert_eq!(upload.page, 5);
    }

    #[test]
    fn test_value_binder_soft_failures() {
        let op = build(0, SourceCategory::Query).unwrap();
        let mut upload = Upload {
            page: 9,
            ..Upload::default()
        };

        let malformed = RequestContextBuilder::new()
            .uri(Uri::from_static("/?Page=abc"))
            .build();
        op.apply(&mut upload, &malformed).unwrap();
        assert_eq!(upload.page, 9);

        let absent = RequestContextBuilder::new().build();
        op.apply(&mut upload, &absent).unwrap();
        assert_eq!(upload.page, 9);
    }

    #[test]
    fn test_header_binder() {
        let op = build(1, SourceCategory::Header).unwrap();
        let ctx = RequestContextBuilder::new().header("title", "hello").build();

        let mut upload = Upload::default();
        op.apply(&mut upload, &ctx).unwrap();
        assert_eq!(upload.title, "hello");
        assert_eq!(op.category(), SourceCategory::Header);
    }

    #[test]
    fn test_file_binders_selected_by_type() {
        assert_eq!(build(2, SourceCategory::Form).unwrap().kind(), BindingKind::File);
        assert_eq!(
            build(3, SourceCategory::Form).unwrap().kind(),
            BindingKind::FileCollection
        );
        assert_eq!(build(1, SourceCategory::Form).unwrap().kind(), BindingKind::Value);
    }

    #[test]
    fn test_file_binders_apply() {
        let mut form = FormData::new();
        form.add_file(FormFile::new("avatar", Some("me.png".into()), None, "png"));
        form.add_file(FormFile::new("Attachments", Some("a.txt".into()), None, "a"));
        form.add_file(FormFile::new("Attachments", Some("b.txt".into()), None, "b"));
        let ctx = RequestContextBuilder::new().form(form).build();

        let mut upload = Upload::default();
        build(2, SourceCategory::Form).unwrap().apply(&mut upload, &ctx).unwrap();
        build(3, SourceCategory::Form).unwrap().apply(&mut upload, &ctx).unwrap();

        assert_eq!(upload.avatar.unwrap().file_name(), Some("me.png"));
        assert_eq!(upload.attachments.unwrap().len(), 2);
    }

    #[test]
    fn test_file_collection_absent_assigns_none() {
        let mut upload = Upload {
            attachments: Some(vec![FormFile::new("x", None, None, "")]),
            ..Upload::default()
        };

        let ctx = RequestContextBuilder::new().build();
        build(3, SourceCategory::Form).unwrap().apply(&mut upload, &ctx).unwrap();
        assert!(upload.attachments.is_none());
    }

    #[test]
    fn test_body_scalar() {
        let op = build(4, SourceCategory::Body).unwrap();
        assert_eq!(op.kind(), BindingKind::BodyScalar);

        let ctx = RequestContextBuilder::new().body("free text").build();
        let mut upload = Upload::default();
        op.apply(&mut upload, &ctx).unwrap();
        assert_eq!(upload.note, "free text");
    }

    #[test]
    fn test_body_without_converter_uses_deserializer() {
        let op = build(5, SourceCategory::Body).unwrap();
        assert_eq!(op.kind(), BindingKind::BodyDeserialized);

        let ctx = RequestContextBuilder::new().body("true").build();
        let mut upload = Upload::default();
        op.apply(&mut upload, &ctx).unwrap();
        assert!(!upload.flag);
    }

    #[test]
    fn test_missing_converter_is_reported_with_location() {
        let err = build(5, SourceCategory::Query).unwrap_err();
        match err {
            BindError::NoConverterRegistered { value_type, at } => {
                assert_eq!(value_type, "bool");
                let at = at.unwrap();
                assert_eq!(at.target, "Upload");
                assert_eq!(at.property, "Flag");
                assert_eq!(at.category, Some(SourceCategory::Query));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_file_type_outside_form_needs_converter() {
        assert!(matches!(
            build(2, SourceCategory::Header),
            Err(BindError::NoConverterRegistered { .. })
        ));
    }
}
