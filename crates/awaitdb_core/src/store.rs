//! Object store facade.
//!
//! Stateless pass-through: each method issues exactly one host
//! request and resolves with its completion.

use crate::cursor::{Cursor, KeyCursor};
use crate::error::Result;
use crate::index::Index;
use crate::promise;
use awaitdb_engine::{Datum, Direction, HostStore, IndexOptions, Key, KeyRange};

/// A named, key-ordered collection of records, scoped to one
/// transaction (or, during an upgrade, to the version-change
/// transaction that created it).
pub struct ObjectStore {
    host: Box<dyn HostStore>,
}

impl ObjectStore {
    pub(crate) fn new(host: Box<dyn HostStore>) -> Self {
        Self { host }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> String {
        self.host.name()
    }

    /// In-line key path, if any.
    #[must_use]
    pub fn key_path(&self) -> Option<String> {
        self.host.key_path()
    }

    /// Whether missing keys are generated.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.host.auto_increment()
    }

    /// Names of the indexes over this store.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.host.index_names()
    }

    /// Inserts a record, resolving its key from the key path or the
    /// key generator.
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` when the key already exists.
    pub async fn add(&self, value: Datum) -> Result<Key> {
        promise::settle(self.host.add(value, None)).await
    }

    /// Inserts a record under an explicit key.
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` when the key already exists, `DataError`
    /// when the store resolves keys from a key path.
    pub async fn add_with_key(&self, value: Datum, key: Key) -> Result<Key> {
        promise::settle(self.host.add(value, Some(key))).await
    }

    /// Inserts or replaces a record.
    pub async fn put(&self, value: Datum) -> Result<Key> {
        promise::settle(self.host.put(value, None)).await
    }

    /// Inserts or replaces a record under an explicit key.
    pub async fn put_with_key(&self, value: Datum, key: Key) -> Result<Key> {
        promise::settle(self.host.put(value, Some(key))).await
    }

    /// Fetches the record with the given key.
    pub async fn get(&self, key: Key) -> Result<Option<Datum>> {
        promise::settle(self.host.get(key)).await
    }

    /// Fetches records in key order, optionally bounded and limited.
    pub async fn get_all(
        &self,
        range: Option<KeyRange>,
        limit: Option<u32>,
    ) -> Result<Vec<Datum>> {
        promise::settle(self.host.get_all(range, limit)).await
    }

    /// Fetches the first key inside a range.
    pub async fn get_key(&self, range: KeyRange) -> Result<Option<Key>> {
        promise::settle(self.host.get_key(range)).await
    }

    /// Fetches keys in order, optionally bounded and limited.
    pub async fn get_all_keys(
        &self,
        range: Option<KeyRange>,
        limit: Option<u32>,
    ) -> Result<Vec<Key>> {
        promise::settle(self.host.get_all_keys(range, limit)).await
    }

    /// Counts all records.
    pub async fn count(&self) -> Result<u64> {
        promise::settle(self.host.count(None)).await
    }

    /// Counts the records inside a range.
    pub async fn count_range(&self, range: KeyRange) -> Result<u64> {
        promise::settle(self.host.count(Some(range))).await
    }

    /// Removes every record.
    pub async fn clear(&self) -> Result<()> {
        promise::settle(self.host.clear()).await
    }

    /// Removes the records inside a range.
    pub async fn delete(&self, range: KeyRange) -> Result<()> {
        promise::settle(self.host.delete(range)).await
    }

    /// Creates an index over this store; existing records populate
    /// it immediately.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside a version-change transaction,
    /// `SchemaConflict` on a duplicate name, `ConstraintViolation`
    /// when existing records violate a unique flag.
    pub fn create_index(
        &self,
        name: &str,
        key_path: &str,
        options: IndexOptions,
    ) -> Result<Index> {
        Ok(Index::new(self.host.create_index(name, key_path, options)?))
    }

    /// Deletes an index.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside a version-change transaction,
    /// `NotFound` for an unknown name.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        Ok(self.host.delete_index(name)?)
    }

    /// Resolves an index facade.
    pub fn index(&self, name: &str) -> Result<Index> {
        Ok(Index::new(self.host.index(name)?))
    }

    /// Opens a value cursor; `None` when nothing matches.
    pub async fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> Result<Option<Cursor>> {
        let host = promise::settle(self.host.open_cursor(range, direction)).await?;
        Ok(host.map(Cursor::new))
    }

    /// Opens a key-only cursor; `None` when nothing matches.
    pub async fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> Result<Option<KeyCursor>> {
        let host = promise::settle(self.host.open_key_cursor(range, direction)).await?;
        Ok(host.map(KeyCursor::new))
    }
}
