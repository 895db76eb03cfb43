//! Property name resolution.
//!
//! Every bound property is looked up under its declared name first and then
//! under an alternate spelling whose first character has the opposite case,
//! so `UserId` also matches `userId` and vice versa. No other case conversion
//! takes place.

use crate::BindError;

/// Distance between an ASCII lowercase letter and its uppercase form.
const CASE_OFFSET: u8 = 32;

/// Canonical and alternate lookup keys for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    canonical: String,
    alternate: String,
}

impl ResolvedName {
    /// The declared property name.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The declared name with its first character's case flipped.
    #[must_use]
    pub fn alternate(&self) -> &str {
        &self.alternate
    }

    /// Looks `lookup` up under the canonical name, then the alternate one.
    pub fn find<V>(&self, mut lookup: impl FnMut(&str) -> Option<V>) -> Option<V> {
        lookup(&self.canonical).or_else(|| lookup(&self.alternate))
    }
}

/// Resolves a property name into its canonical and alternate forms.
///
/// # Errors
///
/// Returns [`BindError::InvalidName`] for an empty name and
/// [`BindError::UnsupportedCharacter`] when the first character is not an
/// ASCII letter.
///
/// # Example
///
/// ```rust
/// let names = feast_mapper::resolve_name("UserId").unwrap();
/// assert_eq!(names.canonical(), "UserId");
/// assert_eq!(names.alternate(), "userId");
/// ```
pub fn resolve_name(name: &str) -> Result<ResolvedName, BindError> {
    Ok(ResolvedName {
        canonical: name.to_string(),
        alternate: alternate_case(name)?,
    })
}

/// Flips the case of the first character of `name`.
///
/// # Errors
///
/// Same conditions as [`resolve_name`].
pub fn alternate_case(name: &str) -> Result<String, BindError> {
    let Some(first) = name.chars().next() else {
        return Err(BindError::InvalidName { at: None });
    };

    let flipped = match first {
        'a'..='z' => first as u8 - CASE_OFFSET,
        'A'..='Z' => first as u8 + CASE_OFFSET,
        _ => {
            return Err(BindError::UnsupportedCharacter {
                name: name.to_string(),
                character: first,
                target: None,
            })
        }
    };

    let mut alternate = String::with_capacity(name.len());
    alternate.push(char::from(flipped));
    alternate.push_str(&name[first.len_utf8()..]);
    Ok(alternate)
}
