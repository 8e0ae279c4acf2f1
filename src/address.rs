//! Path addresses: ordered `(key, value)` pairs identifying a node in the
//! [model tree](crate::model).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single segment of a [`PathAddress`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathElement {
    pub key: String,
    pub value: String,
}

impl PathElement {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl From<(&str, &str)> for PathElement {
    fn from((k, v): (&str, &str)) -> Self {
        PathElement::new(k, v)
    }
}

/// An immutable, ordered sequence of [`PathElement`]s identifying a node in
/// the model tree. The empty address denotes the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathAddress(Vec<PathElement>);

impl PathAddress {
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_elements<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = PathElement>,
    {
        Self(elements.into_iter().collect())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.0
    }

    /// Append one element, returning a new address.
    #[must_use]
    pub fn append(&self, element: PathElement) -> Self {
        let mut elements = self.0.clone();
        elements.push(element);
        Self(elements)
    }

    /// A view over `self[start..end]`.
    ///
    /// # Panics
    /// Panics if `start > end` or `end > self.len()`, mirroring slice
    /// indexing semantics rather than silently clamping.
    #[must_use]
    pub fn sub_address(&self, start: usize, end: usize) -> Self {
        Self(self.0[start..end].to_vec())
    }

    /// `true` if `self` is `other` or a descendant of `other` — i.e. `other`
    /// is an element-wise prefix of `self`.
    #[must_use]
    pub fn starts_with(&self, other: &PathAddress) -> bool {
        other.0.len() <= self.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    /// The address relative to `prefix`, i.e. `self` with `prefix`'s
    /// elements stripped from the front. Returns `None` if `prefix` is not
    /// a prefix of `self`.
    #[must_use]
    pub fn relative_to(&self, prefix: &PathAddress) -> Option<PathAddress> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(self.sub_address(prefix.len(), self.len()))
    }

    /// Canonical location string, e.g. `/host=A/subsystem=web`, used for
    /// diagnostics and registry node location rendering.
    #[must_use]
    pub fn to_location_string(&self) -> String {
        if self.0.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for element in &self.0 {
            out.push('/');
            out.push_str(&element.to_string());
        }
        out
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_location_string())
    }
}

impl FromIterator<PathElement> for PathAddress {
    fn from_iter<I: IntoIterator<Item = PathElement>>(iter: I) -> Self {
        Self::from_elements(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(pairs: &[(&str, &str)]) -> PathAddress {
        PathAddress::from_elements(pairs.iter().map(|&(k, v)| PathElement::new(k, v)))
    }

    #[test]
    fn root_is_empty() {
        assert!(PathAddress::root().is_root());
    }

    #[test]
    fn starts_with_checks_element_wise_prefix() {
        let full = addr(&[("host", "A"), ("subsystem", "web")]);
        let prefix = addr(&[("host", "A")]);
        assert!(full.starts_with(&prefix));
        assert!(!prefix.starts_with(&full));
    }

    #[test]
    fn relative_to_strips_prefix() {
        let full = addr(&[("host", "A"), ("subsystem", "web")]);
        let prefix = addr(&[("host", "A")]);
        let rel = full.relative_to(&prefix).unwrap();
        assert_eq!(rel, addr(&[("subsystem", "web")]));
    }

    #[test]
    fn relative_to_non_prefix_is_none() {
        let full = addr(&[("host", "A")]);
        let other = addr(&[("host", "B")]);
        assert!(full.relative_to(&other).is_none());
    }

    #[test]
    fn location_string_format() {
        let a = addr(&[("host", "A"), ("subsystem", "web")]);
        assert_eq!(a.to_location_string(), "/host=A/subsystem=web");
        assert_eq!(PathAddress::root().to_location_string(), "/");
    }
}
