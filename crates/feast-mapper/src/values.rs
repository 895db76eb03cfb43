//! Multi-valued request fields.

use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;

/// Zero or more text values sent under one field name.
///
/// Headers, query parameters and form fields may repeat; all occurrences are
/// kept in arrival order. Most fields carry a single value, which is stored
/// inline.
///
/// # Example
///
/// ```rust
/// use feast_mapper::FieldValues;
///
/// let mut tags = FieldValues::from("rust");
/// tags.push("http");
///
/// assert_eq!(tags.len(), 2);
/// assert_eq!(tags.joined(), "rust,http");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldValues(SmallVec<[String; 1]>);

impl FieldValues {
    /// Creates an empty value list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value.
    pub fn push(&mut self, value: impl Into<String>) {
        self.0.push(value.into());
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no value is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first value.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Iterates over the values.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the values as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Copies the values into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.0.to_vec()
    }

    /// Returns every value joined with `,`.
    ///
    /// Borrows when there is exactly one value.
    #[must_use]
    pub fn joined(&self) -> Cow<'_, str> {
        match self.0.as_slice() {
            [] => Cow::Borrowed(""),
            [single] => Cow::Borrowed(single),
            many => Cow::Owned(many.join(",")),
        }
    }
}

impl fmt::Display for FieldValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl From<&str> for FieldValues {
    fn from(value: &str) -> Self {
        Self(SmallVec::from_elem(value.to_string(), 1))
    }
}

impl From<String> for FieldValues {
    fn from(value: String) -> Self {
        Self(SmallVec::from_elem(value, 1))
    }
}

impl From<Vec<String>> for FieldValues {
    fn from(values: Vec<String>) -> Self {
        Self(SmallVec::from_vec(values))
    }
}

impl<S: Into<String>> FromIterator<S> for FieldValues {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a FieldValues {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_borrows() {
        let values = FieldValues::from("42");
        assert!(matches!(values.joined(), Cow::Borrowed("42")));
        assert_eq!(values.first(), Some("42"));
    }

    #[test]
    fn test_multiple_values_join_with_comma() {
        let values: FieldValues = ["a", "b", "c"].into_iter().collect();
        assert_eq!(values.joined(), "a,b,c");
        assert_eq!(values.to_string(), "a,b,c");
        assert_eq!(values.to_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty() {
        let values = FieldValues::new();
        assert!(values.is_empty());
        assert_eq!(values.joined(), "");
        assert_eq!(values.first(), None);
    }

    #[test]
    fn test_push_and_iter() {
        let mut values = FieldValues::from(String::from("x"));
        values.push("y");

        let collected: Vec<&str> = values.iter().collect();
        assert_eq!(collected, ["x", "y"]);
        assert_eq!((&values).into_iter().count(), 2);
    }
}
