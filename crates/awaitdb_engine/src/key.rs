//! Record keys and key ranges.
//!
//! Keys order records within an object store and within an index.
//! Cross-variant ordering is fixed: numbers sort before text, text
//! before binary, binary before arrays. Within a variant the natural
//! ordering applies; numbers use IEEE total ordering.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A record key.
///
/// Keys are totally ordered so that object stores and indexes can be
/// traversed deterministically. `NaN` is not a valid key; use
/// [`Key::number`] to construct numeric keys safely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    /// A numeric key.
    ///
    /// The variant is public, so constructing `Key::Number(f64::NAN)`
    /// directly bypasses the [`Key::number`] guard. Ordering stays
    /// total either way (`f64::total_cmp` places positive `NaN` after
    /// every other number), but a `NaN` key is never equal to a key
    /// parsed from record data, so it should not be stored.
    Number(f64),
    /// A text key.
    Text(String),
    /// A binary key.
    Bytes(Vec<u8>),
    /// A composite key; compared element-wise.
    Array(Vec<Key>),
}

impl Key {
    /// Creates a numeric key, rejecting `NaN`.
    ///
    /// # Errors
    ///
    /// Returns a data error if `value` is `NaN`.
    pub fn number(value: f64) -> EngineResult<Self> {
        if value.is_nan() {
            return Err(EngineError::data("NaN is not a valid key"));
        }
        Ok(Self::Number(value))
    }

    /// Rank used for cross-variant ordering.
    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Bytes(_) => 2,
            Self::Array(_) => 3,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A contiguous range of keys.
///
/// Used to restrict queries and cursor traversals. Bounds are
/// inclusive unless the corresponding `open` flag is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    /// Lower bound, if any.
    pub lower: Option<Key>,
    /// Upper bound, if any.
    pub upper: Option<Key>,
    /// Whether the lower bound is exclusive.
    pub lower_open: bool,
    /// Whether the upper bound is exclusive.
    pub upper_open: bool,
}

impl KeyRange {
    /// A range matching exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// A range bounded below only.
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(key.into()),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// A range bounded above only.
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(key.into()),
            lower_open: false,
            upper_open: open,
        }
    }

    /// A range bounded on both sides.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: Some(upper.into()),
            lower_open,
            upper_open,
        }
    }

    /// Checks whether a key falls inside this range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        if let Some(lower) = &self.lower {
            match key.cmp(lower) {
                Ordering::Less => return false,
                Ordering::Equal if self.lower_open => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match key.cmp(upper) {
                Ordering::Greater => return false,
                Ordering::Equal if self.upper_open => return false,
                _ => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_order_naturally() {
        let a = Key::from(1);
        let b = Key::from(2);
        assert!(a < b);
        assert_eq!(a, Key::Number(1.0));
    }

    #[test]
    fn nan_rejected_by_guard_but_total_if_forced() {
        assert!(Key::number(f64::NAN).is_err());
        // direct construction stays totally ordered: positive NaN
        // sorts after every finite number and equals itself
        let forced = Key::Number(f64::NAN);
        assert!(Key::Number(f64::MAX) < forced);
        assert_eq!(forced.cmp(&forced.clone()), Ordering::Equal);
    }

    #[test]
    fn cross_variant_ordering() {
        let number = Key::from(99);
        let text = Key::from("a");
        let bytes = Key::Bytes(vec![0]);
        let array = Key::Array(vec![Key::from(0)]);
        assert!(number < text);
        assert!(text < bytes);
        assert!(bytes < array);
    }

    #[test]
    fn arrays_compare_elementwise() {
        let a = Key::Array(vec![Key::from(1), Key::from(2)]);
        let b = Key::Array(vec![Key::from(1), Key::from(3)]);
        let c = Key::Array(vec![Key::from(1)]);
        assert!(a < b);
        assert!(c < a);
    }

    #[test]
    fn nan_rejected() {
        assert!(Key::number(f64::NAN).is_err());
        assert!(Key::number(1.5).is_ok());
    }

    #[test]
    fn only_range_contains_single_key() {
        let range = KeyRange::only(5);
        assert!(range.contains(&Key::from(5)));
        assert!(!range.contains(&Key::from(4)));
        assert!(!range.contains(&Key::from(6)));
    }

    #[test]
    fn open_bounds_are_exclusive() {
        let range = KeyRange::bound(1, 5, true, true);
        assert!(!range.contains(&Key::from(1)));
        assert!(range.contains(&Key::from(2)));
        assert!(range.contains(&Key::from(4)));
        assert!(!range.contains(&Key::from(5)));
    }

    #[test]
    fn half_bounded_ranges() {
        let lower = KeyRange::lower_bound(3, false);
        assert!(!lower.contains(&Key::from(2)));
        assert!(lower.contains(&Key::from(3)));
        assert!(lower.contains(&Key::from(1000)));

        let upper = KeyRange::upper_bound(3, true);
        assert!(upper.contains(&Key::from(2)));
        assert!(!upper.contains(&Key::from(3)));
    }
}
