//! Structured record values.
//!
//! Object stores hold [`Datum`] values. A datum is a small dynamic
//! value tree; key paths (`"a.b"`) resolve through nested maps, which
//! is how in-line store keys and index keys are derived from records.

use crate::key::Key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record value stored in an object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    /// Absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A text value.
    Text(String),
    /// A binary value.
    Bytes(Vec<u8>),
    /// An ordered sequence of values.
    Array(Vec<Datum>),
    /// A string-keyed map of values.
    Map(BTreeMap<String, Datum>),
}

impl Datum {
    /// Builds a map datum from string/value pairs.
    pub fn map<'a>(entries: impl IntoIterator<Item = (&'a str, Datum)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Resolves a dotted key path against this value.
    ///
    /// Returns `None` if any path segment is missing or crosses a
    /// non-map value.
    #[must_use]
    pub fn at_path(&self, path: &str) -> Option<&Datum> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                Self::Map(entries) => current = entries.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Writes a value at a dotted key path, creating intermediate
    /// maps as needed.
    ///
    /// Returns `false` without modifying anything when a path segment
    /// crosses an existing non-map value.
    pub fn set_path(&mut self, path: &str, value: Datum) -> bool {
        let mut current = self;
        let segments: Vec<&str> = path.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            let entries = match current {
                Self::Map(entries) => entries,
                _ => return false,
            };
            if i == segments.len() - 1 {
                entries.insert((*segment).to_string(), value);
                return true;
            }
            current = entries
                .entry((*segment).to_string())
                .or_insert_with(|| Datum::Map(BTreeMap::new()));
        }
        false
    }

    /// Converts this value into a key, if it is key-convertible.
    ///
    /// Numbers, text, and bytes convert directly; arrays convert when
    /// every element does. Everything else yields `None`.
    #[must_use]
    pub fn to_key(&self) -> Option<Key> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(Key::Number(*n)),
            Self::Text(s) => Some(Key::Text(s.clone())),
            Self::Bytes(b) => Some(Key::Bytes(b.clone())),
            Self::Array(items) => items
                .iter()
                .map(Datum::to_key)
                .collect::<Option<Vec<Key>>>()
                .map(Key::Array),
            _ => None,
        }
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Key> for Datum {
    fn from(key: Key) -> Self {
        match key {
            Key::Number(n) => Self::Number(n),
            Key::Text(s) => Self::Text(s),
            Key::Bytes(b) => Self::Bytes(b),
            Key::Array(items) => Self::Array(items.into_iter().map(Datum::from).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_resolution() {
        let datum = Datum::map([
            ("name", Datum::from("alice")),
            ("address", Datum::map([("city", Datum::from("lund"))])),
        ]);

        assert_eq!(datum.at_path("name"), Some(&Datum::from("alice")));
        assert_eq!(datum.at_path("address.city"), Some(&Datum::from("lund")));
        assert!(datum.at_path("address.zip").is_none());
        assert!(datum.at_path("name.inner").is_none());
    }

    #[test]
    fn set_path_creates_intermediates() {
        let mut datum = Datum::map([]);
        assert!(datum.set_path("a.b.c", Datum::from(1)));
        assert_eq!(datum.at_path("a.b.c"), Some(&Datum::from(1)));
    }

    #[test]
    fn set_path_refuses_non_map_segment() {
        let mut datum = Datum::map([("a", Datum::from(1))]);
        assert!(!datum.set_path("a.b", Datum::from(2)));
        assert_eq!(datum.at_path("a"), Some(&Datum::from(1)));
    }

    #[test]
    fn key_conversion() {
        assert_eq!(Datum::from(3).to_key(), Some(Key::from(3)));
        assert_eq!(Datum::from("x").to_key(), Some(Key::from("x")));
        assert!(Datum::Bool(true).to_key().is_none());
        assert!(Datum::Null.to_key().is_none());

        let array = Datum::Array(vec![Datum::from(1), Datum::from("a")]);
        assert_eq!(
            array.to_key(),
            Some(Key::Array(vec![Key::from(1), Key::from("a")]))
        );

        let mixed = Datum::Array(vec![Datum::from(1), Datum::Null]);
        assert!(mixed.to_key().is_none());
    }
}
