//! The host engine contract.
//!
//! These traits describe the event-driven embedded-database API that
//! the adapter layer sits on. The host owns storage, index
//! maintenance, transaction isolation, and durability; the contract
//! only fixes how those capabilities are reached and how completions
//! are reported.
//!
//! All traits are object-safe. Per-operation completions are
//! [`HostRequest`]s; the open lifecycle uses the multi-event
//! [`OpenRequest`].

use crate::datum::Datum;
use crate::error::EngineResult;
use crate::key::{Key, KeyRange};
use crate::request::{HostRequest, OpenRequest};
use crate::types::{
    CursorStep, DatabaseInfo, Direction, Durability, IndexOptions, Mode, StoreOptions,
};
use crate::EngineError;

/// A long-lived notification hook armed on a connection.
pub type ConnectionHook = Box<dyn Fn() + Send + Sync>;

/// Entry point of a host engine: open, enumerate, and delete
/// databases.
///
/// # Implementors
///
/// - [`crate::MemoryEngine`] - in-memory reference engine
pub trait HostEngine: Send + Sync {
    /// Starts opening a named database at a version.
    ///
    /// The returned request yields one of success / upgrade-needed /
    /// blocked / error; after an upgrade-needed, a second terminal
    /// event follows once the version-change transaction finishes.
    fn open(&self, name: &str, version: u64) -> OpenRequest;

    /// Deletes a database.
    ///
    /// Completes with [`EngineError::Blocked`] while other
    /// connections hold the database open; the deletion itself stays
    /// pending and proceeds once the last connection closes.
    fn delete_database(&self, name: &str) -> HostRequest<()>;

    /// Lists existing databases with their stored versions.
    fn databases(&self) -> HostRequest<Vec<DatabaseInfo>>;
}

/// A live connection to one database.
pub trait HostConnection: Send + Sync {
    /// Database name.
    fn name(&self) -> String;

    /// Version this connection sees.
    fn version(&self) -> u64;

    /// Names of the object stores in the schema, in order.
    fn object_store_names(&self) -> Vec<String>;

    /// Closes the connection. Safe to call more than once.
    fn close(&self);

    /// Creates an object store.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidState` outside an active version-change
    /// transaction, or `SchemaConflict` on a duplicate name.
    fn create_object_store(
        &self,
        name: &str,
        options: StoreOptions,
    ) -> EngineResult<Box<dyn HostStore>>;

    /// Deletes an object store.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidState` outside an active version-change
    /// transaction, or `NotFound` for an unknown name.
    fn delete_object_store(&self, name: &str) -> EngineResult<()>;

    /// Begins a transaction over the named stores.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if any named store does not exist, or
    /// `InvalidState` while a version-change transaction is active on
    /// this connection.
    fn transaction(
        &self,
        store_names: &[&str],
        mode: Mode,
        durability: Durability,
    ) -> EngineResult<Box<dyn HostTransaction>>;

    /// Arms the unexpected-close notification for this connection's
    /// lifetime. Not fired by [`HostConnection::close`].
    fn set_close_hook(&self, hook: ConnectionHook);

    /// Arms the version-change-from-elsewhere notification.
    fn set_version_change_hook(&self, hook: ConnectionHook);

    /// Clones the handle; both point at the same live connection.
    fn boxed_clone(&self) -> Box<dyn HostConnection>;
}

/// A bounded unit of work over one or more object stores.
pub trait HostTransaction: Send + Sync {
    /// Access mode.
    fn mode(&self) -> Mode;

    /// Durability preference.
    fn durability(&self) -> Durability;

    /// Stores this transaction was created over.
    fn store_names(&self) -> Vec<String>;

    /// The error that terminated this transaction, if any.
    fn error(&self) -> Option<EngineError>;

    /// Resolves a store handle scoped to this transaction.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` when `name` was not part of the
    /// transaction's scope.
    fn object_store(&self, name: &str) -> EngineResult<Box<dyn HostStore>>;

    /// Requests durable application of all issued operations.
    fn commit(&self) -> HostRequest<()>;

    /// Requests rollback of all issued operations.
    fn abort(&self) -> HostRequest<()>;
}

/// A named, key-ordered collection of records, scoped to one
/// transaction.
pub trait HostStore: Send + Sync {
    /// Store name.
    fn name(&self) -> String;

    /// In-line key path, if any.
    fn key_path(&self) -> Option<String>;

    /// Whether missing keys are generated.
    fn auto_increment(&self) -> bool;

    /// Names of the indexes over this store.
    fn index_names(&self) -> Vec<String>;

    /// Inserts a record, failing if its key already exists.
    fn add(&self, value: Datum, key: Option<Key>) -> HostRequest<Key>;

    /// Inserts or replaces a record.
    fn put(&self, value: Datum, key: Option<Key>) -> HostRequest<Key>;

    /// Fetches the record with the given key.
    fn get(&self, key: Key) -> HostRequest<Option<Datum>>;

    /// Fetches records in key order, optionally limited.
    fn get_all(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Datum>>;

    /// Fetches the first key inside a range.
    fn get_key(&self, range: KeyRange) -> HostRequest<Option<Key>>;

    /// Fetches keys in order, optionally limited.
    fn get_all_keys(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Key>>;

    /// Counts records, optionally inside a range.
    fn count(&self, range: Option<KeyRange>) -> HostRequest<u64>;

    /// Removes every record.
    fn clear(&self) -> HostRequest<()>;

    /// Removes the records inside a range.
    fn delete(&self, range: KeyRange) -> HostRequest<()>;

    /// Creates an index over this store.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidState` outside a version-change
    /// transaction, `SchemaConflict` on a duplicate name, or
    /// `ConstraintViolation` if existing records violate a unique
    /// flag.
    fn create_index(
        &self,
        name: &str,
        key_path: &str,
        options: IndexOptions,
    ) -> EngineResult<Box<dyn HostIndex>>;

    /// Deletes an index.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidState` outside a version-change
    /// transaction, or `NotFound` for an unknown name.
    fn delete_index(&self, name: &str) -> EngineResult<()>;

    /// Resolves an index handle.
    fn index(&self, name: &str) -> EngineResult<Box<dyn HostIndex>>;

    /// Opens a value cursor; completes with `None` when nothing
    /// matches.
    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>>;

    /// Opens a key-only cursor.
    fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>>;
}

/// A secondary ordered view over an object store.
pub trait HostIndex: Send + Sync {
    /// Index name.
    fn name(&self) -> String;

    /// Key path the index is derived from.
    fn key_path(&self) -> String;

    /// Whether index keys are unique across records.
    fn unique(&self) -> bool;

    /// Whether array values index each element separately.
    fn multi_entry(&self) -> bool;

    /// Fetches the first record with the given index key.
    fn get(&self, key: Key) -> HostRequest<Option<Datum>>;

    /// Fetches the primary key of the first record with the given
    /// index key.
    fn get_key(&self, key: Key) -> HostRequest<Option<Key>>;

    /// Fetches records in index-key order, optionally limited.
    fn get_all(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Datum>>;

    /// Fetches primary keys in index-key order.
    fn get_all_keys(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Key>>;

    /// Counts index entries, optionally inside a range.
    fn count(&self, range: Option<KeyRange>) -> HostRequest<u64>;

    /// Opens a value cursor over the index ordering.
    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>>;

    /// Opens a key-only cursor over the index ordering.
    fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>>;
}

/// A position within an ordered traversal.
///
/// Only one movement operation may be outstanding at a time; the
/// position is unspecified from the moment a movement is issued until
/// its request completes.
pub trait HostCursor: Send + Sync {
    /// Traversal direction.
    fn direction(&self) -> Direction;

    /// Key at the current position (`None` once done).
    fn key(&self) -> Option<Key>;

    /// Primary key at the current position (`None` once done).
    fn primary_key(&self) -> Option<Key>;

    /// Record at the current position, captured when the cursor
    /// landed there. `None` for key-only cursors and once done.
    fn value(&self) -> Option<Datum>;

    /// Moves forward by `count` steps in traversal order.
    fn advance(&self, count: u32) -> HostRequest<CursorStep>;

    /// Moves to the next position, or forward to `key` when given.
    fn continue_to(&self, key: Option<Key>) -> HostRequest<CursorStep>;

    /// Moves forward to the first entry at or past `(key,
    /// primary_key)`. Index cursors with non-unique directions only.
    fn continue_primary_key(&self, key: Key, primary_key: Key) -> HostRequest<CursorStep>;

    /// Replaces the record under the cursor without moving it.
    fn update(&self, value: Datum) -> HostRequest<Key>;

    /// Deletes the record under the cursor without moving it.
    fn delete(&self) -> HostRequest<()>;
}
