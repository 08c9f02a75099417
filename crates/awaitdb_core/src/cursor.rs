//! Cursor wrappers.
//!
//! Movement operations are async and single-outstanding: await each
//! one before issuing the next against the same cursor. Each returns
//! a [`CursorStep`] rather than mutating fields in place, so "the
//! position is stale until the step completes" is visible in the
//! types: the accessors report the position of the last *completed*
//! step.

use crate::error::Result;
use crate::promise;
use awaitdb_engine::{CursorStep, Datum, Direction, HostCursor, Key};

/// A value-bearing cursor, from `open_cursor`.
///
/// Carries the record under the cursor, captured when the cursor
/// landed on it; [`Cursor::update`] does not refresh it.
pub struct Cursor {
    host: Box<dyn HostCursor>,
}

/// A key-only cursor, from `open_key_cursor`. No value access, no
/// mutation.
pub struct KeyCursor {
    host: Box<dyn HostCursor>,
}

impl Cursor {
    pub(crate) fn new(host: Box<dyn HostCursor>) -> Self {
        Self { host }
    }

    /// Traversal direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.host.direction()
    }

    /// Key at the current position; `None` once the traversal is
    /// done.
    #[must_use]
    pub fn key(&self) -> Option<Key> {
        self.host.key()
    }

    /// Primary key at the current position.
    #[must_use]
    pub fn primary_key(&self) -> Option<Key> {
        self.host.primary_key()
    }

    /// Record at the current position.
    #[must_use]
    pub fn value(&self) -> Option<Datum> {
        self.host.value()
    }

    /// Moves forward by `count` steps in traversal order. The count
    /// is a repeat of "next step", not a signed offset.
    ///
    /// # Errors
    ///
    /// `DataError` for a count of zero, `InvalidState` after the
    /// traversal completed.
    pub async fn advance(&self, count: u32) -> Result<CursorStep> {
        promise::settle(self.host.advance(count)).await
    }

    /// Moves to the next position.
    pub async fn continue_next(&self) -> Result<CursorStep> {
        promise::settle(self.host.continue_to(None)).await
    }

    /// Moves forward to the first position at or past `key`.
    ///
    /// # Errors
    ///
    /// `DataError` when `key` is not past the current position for
    /// the active direction.
    pub async fn continue_to(&self, key: Key) -> Result<CursorStep> {
        promise::settle(self.host.continue_to(Some(key))).await
    }

    /// Moves forward to the first entry at or past `(key,
    /// primary_key)`, resuming past a specific record within a run
    /// of duplicate index keys.
    ///
    /// # Errors
    ///
    /// `InvalidState` for store cursors or unique directions,
    /// `DataError` for a backward target.
    pub async fn continue_primary_key(&self, key: Key, primary_key: Key) -> Result<CursorStep> {
        promise::settle(self.host.continue_primary_key(key, primary_key)).await
    }

    /// Replaces the record under the cursor. The cursor's reported
    /// key and primary key are unchanged.
    ///
    /// # Errors
    ///
    /// `DataError` when the new value resolves to a different key
    /// through the store's key path.
    pub async fn update(&self, value: Datum) -> Result<Key> {
        promise::settle(self.host.update(value)).await
    }

    /// Deletes the record under the cursor. The cursor's position
    /// fields are unchanged; subsequent reads find the record absent.
    pub async fn delete(&self) -> Result<()> {
        promise::settle(self.host.delete()).await
    }
}

impl KeyCursor {
    pub(crate) fn new(host: Box<dyn HostCursor>) -> Self {
        Self { host }
    }

    /// Traversal direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.host.direction()
    }

    /// Key at the current position; `None` once the traversal is
    /// done.
    #[must_use]
    pub fn key(&self) -> Option<Key> {
        self.host.key()
    }

    /// Primary key at the current position.
    #[must_use]
    pub fn primary_key(&self) -> Option<Key> {
        self.host.primary_key()
    }

    /// Moves forward by `count` steps in traversal order.
    pub async fn advance(&self, count: u32) -> Result<CursorStep> {
        promise::settle(self.host.advance(count)).await
    }

    /// Moves to the next position.
    pub async fn continue_next(&self) -> Result<CursorStep> {
        promise::settle(self.host.continue_to(None)).await
    }

    /// Moves forward to the first position at or past `key`.
    pub async fn continue_to(&self, key: Key) -> Result<CursorStep> {
        promise::settle(self.host.continue_to(Some(key))).await
    }
}
