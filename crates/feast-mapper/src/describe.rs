//! Target type descriptions.
//!
//! A target type lists its bindable properties once, through
//! [`Bindable::describe`]. The description is consumed by the binder compiler
//! and never consulted again for that type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::marker::{Marker, TypeKey};
use crate::parser::BoxedValue;

/// Type-erased property setter.
pub(crate) type Setter<T> = Arc<dyn Fn(&mut T, BoxedValue) + Send + Sync>;

/// A type whose properties can be bound from a request.
///
/// # Example
///
/// ```rust
/// use feast_mapper::{Bindable, FromHeader, FromQuery, Properties};
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
/// ```
pub trait Bindable: Sized + Send + 'static {
    /// Declares the writable properties of the type and their markers.
    fn describe(properties: &mut Properties<Self>);

    /// Creates an instance without running the type's normal constructor.
    ///
    /// Used by `generate(request, false)`. The default implementation calls
    /// [`Default::default`], making that mode identical to
    /// `generate(request, true)`. Types whose [`Default`] has side effects
    /// should override this with a plain field-default value.
    fn bare() -> Self
    where
        Self: Default,
    {
        Self::default()
    }
}

/// One declared property of a target type.
pub struct PropertyDescriptor<T> {
    name: String,
    value_type: TypeKey,
    markers: Vec<TypeKey>,
    setter: Setter<T>,
}

impl<T> PropertyDescriptor<T> {
    /// Declared property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value type.
    #[must_use]
    pub fn value_type(&self) -> TypeKey {
        self.value_type
    }

    /// Markers attached to the property itself.
    #[must_use]
    pub fn markers(&self) -> &[TypeKey] {
        &self.markers
    }

    pub(crate) fn setter(&self) -> Setter<T> {
        Arc::clone(&self.setter)
    }
}

impl<T> fmt::Debug for PropertyDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

/// The property list of a target type, filled in by [`Bindable::describe`].
pub struct Properties<T> {
    type_markers: Vec<TypeKey>,
    properties: Vec<PropertyDescriptor<T>>,
}

impl<T: 'static> Properties<T> {
    pub(crate) fn new() -> Self {
        Self {
            type_markers: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Builds the description of `T`.
    #[must_use]
    pub fn of() -> Self
    where
        T: Bindable,
    {
        let mut properties = Self::new();
        T::describe(&mut properties);
        properties
    }

    /// Attaches a marker to the whole type.
    ///
    /// Type-level markers apply to properties that carry no marker selecting
    /// a category.
    pub fn marked<M: Marker>(&mut self) -> &mut Self {
        self.type_markers.push(TypeKey::marker::<M>());
        self
    }

    /// Declares a writable property of value type `V`.
    pub fn property<V, F>(&mut self, name: impl Into<String>, setter: F) -> PropertyBuilder<'_, T>
    where
        V: Any + Send,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let setter: Setter<T> = Arc::new(move |target: &mut T, value: BoxedValue| {
            if let Ok(value) = value.downcast::<V>() {
                setter(target, *value);
            }
        });

        self.properties.push(PropertyDescriptor {
            name: name.into(),
            value_type: TypeKey::of::<V>(),
            markers: Vec::new(),
            setter,
        });

        let index = self.properties.len() - 1;
        PropertyBuilder {
            descriptor: &mut self.properties[index],
        }
    }

    /// Markers attached to the whole type.
    #[must_use]
    pub fn type_markers(&self) -> &[TypeKey] {
        &self.type_markers
    }

    /// Declared properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor<T>] {
        &self.properties
    }
}

impl<T> fmt::Debug for Properties<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Properties")
            .field("type_markers", &self.type_markers)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Attaches markers to a property just declared with [`Properties::property`].
pub struct PropertyBuilder<'a, T> {
    descriptor: &'a mut PropertyDescriptor<T>,
}

impl<T> PropertyBuilder<'_, T> {
    /// Attaches a marker to the property.
    pub fn marked<M: Marker>(self) -> Self {
        self.descriptor.markers.push(TypeKey::marker::<M>());
        self
    }
}

impl<T> fmt::Debug for PropertyBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyBuilder").field(&self.descriptor).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{FromForm, FromHeader, FromQuery};

    #[derive(Debug, Default)]
    struct Profile {
        name: String,
        age: u32,
        ignored: bool,
    }

    impl Bindable for Profile {
        fn describe(props: &mut Properties<Self>) {
            props.marked::<FromForm>();
            props
                .property("Name", |p: &mut Self, v: String| p.name = v)
                .marked::<FromQuery>()
                .marked::<FromHeader>();
            props.property("Age", |p: &mut Self, v: u32| p.age = v);
        }
    }

    #[test]
    fn test_description_in_declaration_order() {
        let props = Properties::<Profile>::of();

        let names: Vec<_> = props.properties().iter().map(PropertyDescriptor::name).collect();
        assert_eq!(names, ["Name", "Age"]);
        assert_eq!(props.type_markers(), [TypeKey::marker::<FromForm>()]);
        assert_eq!(props.properties()[0].markers().len(), 2);
        assert!(props.properties()[1].markers().is_empty());
        assert!(props.properties()[1].value_type().is::<u32>());
    }

    #[test]
    fn test_setter_downcasts() {
        let props = Properties::<Profile>::of();
        let mut profile = Profile::default();

        (props.properties()[1].setter())(&mut profile, Box::new(7_u32));
        assert_eq!(profile.age, 7);

        // A value of the wrong type is ignored.
        (props.properties()[1].setter())(&mut profile, Box::new("seven"));
        assert_eq!(profile.age, 7);
        assert!(!profile.ignored);
    }

    #[test]
    fn test_bare_defaults_to_default() {
        let profile = Profile::bare();
        assert!(profile.name.is_empty());
        assert_eq!(profile.age, 0);
    }
}
