//! Shared type definitions for the host engine contract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
    /// Schema changes; only ever created by the open machinery.
    VersionChange,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
            Self::VersionChange => "versionchange",
        };
        f.write_str(name)
    }
}

/// Durability preference for a transaction's writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Durability {
    /// Host decides.
    #[default]
    Default,
    /// Flush before reporting completion.
    Strict,
    /// Completion may be reported before flushing.
    Relaxed,
}

/// Traversal direction of a cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Next,
    /// Ascending key order, first record of each distinct key.
    NextUnique,
    /// Descending key order.
    Prev,
    /// Descending key order, first record of each distinct key.
    PrevUnique,
}

impl Direction {
    /// Whether this direction traverses keys in descending order.
    #[must_use]
    pub fn is_descending(self) -> bool {
        matches!(self, Self::Prev | Self::PrevUnique)
    }

    /// Whether this direction skips duplicate keys.
    #[must_use]
    pub fn is_unique(self) -> bool {
        matches!(self, Self::NextUnique | Self::PrevUnique)
    }
}

/// Result of a cursor movement operation.
///
/// Movement never mutates cursor fields observably mid-flight; the
/// step result says whether the cursor landed on a row or ran off the
/// end of its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStep {
    /// The cursor is positioned on a record.
    Row,
    /// The traversal is exhausted; key accessors now return `None`.
    Done,
}

/// Options for creating an object store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Path within each record that supplies the primary key.
    pub key_path: Option<String>,
    /// Whether missing keys are generated from a monotonic counter.
    pub auto_increment: bool,
}

impl StoreOptions {
    /// Options for an out-of-line-key store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key path.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<String>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Enables key generation.
    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

/// Options for creating an index.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Whether two records may share one index key.
    pub unique: bool,
    /// Whether an array value indexes each element separately.
    pub multi_entry: bool,
}

impl IndexOptions {
    /// Non-unique, single-entry options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the unique flag.
    #[must_use]
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Sets the multi-entry flag.
    #[must_use]
    pub const fn multi_entry(mut self, value: bool) -> Self {
        self.multi_entry = value;
        self
    }
}

/// Name and version of an existing database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Stored version.
    pub version: u64,
}
