//! Index facade.

use crate::cursor::{Cursor, KeyCursor};
use crate::error::Result;
use crate::promise;
use awaitdb_engine::{Datum, Direction, HostIndex, Key, KeyRange};

/// A secondary ordered view over an object store, keyed by a derived
/// path. Entries are ordered by index key, then by primary key.
pub struct Index {
    host: Box<dyn HostIndex>,
}

impl Index {
    pub(crate) fn new(host: Box<dyn HostIndex>) -> Self {
        Self { host }
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> String {
        self.host.name()
    }

    /// Key path the index is derived from.
    #[must_use]
    pub fn key_path(&self) -> String {
        self.host.key_path()
    }

    /// Whether index keys are unique across records.
    #[must_use]
    pub fn unique(&self) -> bool {
        self.host.unique()
    }

    /// Whether array values index each element separately.
    #[must_use]
    pub fn multi_entry(&self) -> bool {
        self.host.multi_entry()
    }

    /// Fetches the first record with the given index key.
    pub async fn get(&self, key: Key) -> Result<Option<Datum>> {
        promise::settle(self.host.get(key)).await
    }

    /// Fetches the primary key of the first record with the given
    /// index key.
    pub async fn get_key(&self, key: Key) -> Result<Option<Key>> {
        promise::settle(self.host.get_key(key)).await
    }

    /// Fetches records in index-key order, optionally bounded and
    /// limited.
    pub async fn get_all(
        &self,
        range: Option<KeyRange>,
        limit: Option<u32>,
    ) -> Result<Vec<Datum>> {
        promise::settle(self.host.get_all(range, limit)).await
    }

    /// Fetches primary keys in index-key order.
    pub async fn get_all_keys(
        &self,
        range: Option<KeyRange>,
        limit: Option<u32>,
    ) -> Result<Vec<Key>> {
        promise::settle(self.host.get_all_keys(range, limit)).await
    }

    /// Counts index entries, optionally inside a range.
    pub async fn count(&self, range: Option<KeyRange>) -> Result<u64> {
        promise::settle(self.host.count(range)).await
    }

    /// Opens a value cursor over the index ordering; `None` when
    /// nothing matches.
    pub async fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> Result<Option<Cursor>> {
        let host = promise::settle(self.host.open_cursor(range, direction)).await?;
        Ok(host.map(Cursor::new))
    }

    /// Opens a key-only cursor over the index ordering.
    pub async fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> Result<Option<KeyCursor>> {
        let host = promise::settle(self.host.open_key_cursor(range, direction)).await?;
        Ok(host.map(KeyCursor::new))
    }
}
