//! Handle types returned by the in-memory engine.
//!
//! Each handle is a thin `(shared, ids)` pair; every operation takes
//! the engine lock, validates the transaction it is scoped to, and
//! works on the live state. Completions are produced already settled,
//! since nothing here is actually asynchronous.

use super::cursor;
use super::state::{ConnSlot, EngineState, IndexState, StoreState, TxnState, TxnStatus};
use super::EngineShared;
use crate::datum::Datum;
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyRange};
use crate::request::HostRequest;
use crate::traits::{
    ConnectionHook, HostConnection, HostCursor, HostIndex, HostStore, HostTransaction,
};
use crate::types::{Direction, Durability, IndexOptions, Mode, StoreOptions};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

pub(super) fn connection(
    shared: &Arc<EngineShared>,
    db: &str,
    conn_id: u64,
) -> Box<dyn HostConnection> {
    Box::new(MemoryConnection {
        shared: Arc::clone(shared),
        db: db.to_string(),
        conn_id,
    })
}

pub(super) fn transaction(
    shared: &Arc<EngineShared>,
    db: &str,
    txn_id: u64,
) -> Box<dyn HostTransaction> {
    Box::new(MemoryTransaction {
        shared: Arc::clone(shared),
        db: db.to_string(),
        txn_id,
    })
}

fn in_range(range: Option<&KeyRange>, key: &Key) -> bool {
    range.is_none_or(|r| r.contains(key))
}

fn usize_limit(limit: Option<u32>) -> usize {
    limit.map_or(usize::MAX, |n| n as usize)
}

impl EngineShared {
    /// Runs a read against one store after validating the scoping
    /// transaction is still active.
    pub(super) fn store_read<R>(
        &self,
        db: &str,
        txn_id: u64,
        store: &str,
        f: impl FnOnce(&StoreState) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let state = self.state.read();
        let (store_state, _) = resolve_store(&state, db, txn_id, store, false)?;
        f(store_state)
    }

    /// Runs a mutation against one store; rejects read-only
    /// transactions.
    pub(super) fn store_write<R>(
        &self,
        db: &str,
        txn_id: u64,
        store: &str,
        f: impl FnOnce(&mut StoreState) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut state = self.state.write();
        let db_state = state.databases.get_mut(db).ok_or(EngineError::Closed)?;
        let txn = db_state
            .txns
            .get(&txn_id)
            .ok_or_else(|| EngineError::invalid_state("no such transaction"))?;
        check_active(txn, store)?;
        if txn.mode == Mode::ReadOnly {
            return Err(EngineError::ReadOnly);
        }
        let store_state = db_state
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::not_found(store))?;
        f(store_state)
    }

    /// Like [`EngineShared::store_write`] but only inside the
    /// version-change transaction; used for schema changes.
    pub(super) fn store_schema<R>(
        &self,
        db: &str,
        txn_id: u64,
        store: &str,
        f: impl FnOnce(&mut StoreState) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut state = self.state.write();
        let db_state = state.databases.get_mut(db).ok_or(EngineError::Closed)?;
        let txn = db_state
            .txns
            .get(&txn_id)
            .ok_or_else(|| EngineError::invalid_state("no such transaction"))?;
        check_active(txn, store)?;
        if txn.mode != Mode::VersionChange {
            return Err(EngineError::invalid_state(
                "schema changes require a version change transaction",
            ));
        }
        let store_state = db_state
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::not_found(store))?;
        f(store_state)
    }

    /// Runs a read against one index.
    pub(super) fn index_read<R>(
        &self,
        db: &str,
        txn_id: u64,
        store: &str,
        index: &str,
        f: impl FnOnce(&StoreState, &IndexState) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let state = self.state.read();
        let (store_state, _) = resolve_store(&state, db, txn_id, store, false)?;
        let index_state = store_state
            .indexes
            .get(index)
            .ok_or_else(|| EngineError::not_found(index))?;
        f(store_state, index_state)
    }
}

fn check_active(txn: &TxnState, store: &str) -> EngineResult<()> {
    if txn.status != TxnStatus::Active {
        return Err(EngineError::invalid_state("transaction finished"));
    }
    if !txn.in_scope(store) {
        return Err(EngineError::not_found(format!(
            "store {store} outside transaction scope"
        )));
    }
    Ok(())
}

fn resolve_store<'a>(
    state: &'a EngineState,
    db: &str,
    txn_id: u64,
    store: &str,
    writable: bool,
) -> EngineResult<(&'a StoreState, &'a TxnState)> {
    let db_state = state.databases.get(db).ok_or(EngineError::Closed)?;
    let txn = db_state
        .txns
        .get(&txn_id)
        .ok_or_else(|| EngineError::invalid_state("no such transaction"))?;
    check_active(txn, store)?;
    if writable && txn.mode == Mode::ReadOnly {
        return Err(EngineError::ReadOnly);
    }
    let store_state = db_state
        .stores
        .get(store)
        .ok_or_else(|| EngineError::not_found(store))?;
    Ok((store_state, txn))
}

// ---------------------------------------------------------------------
// connection

struct MemoryConnection {
    shared: Arc<EngineShared>,
    db: String,
    conn_id: u64,
}

impl MemoryConnection {
    fn with_slot(&self, f: impl FnOnce(&mut ConnSlot)) {
        let mut state = self.shared.state.write();
        if let Some(db) = state.databases.get_mut(&self.db) {
            if let Some(slot) = db.connections.iter_mut().find(|s| s.id == self.conn_id) {
                f(slot);
            }
        }
    }
}

impl HostConnection for MemoryConnection {
    fn name(&self) -> String {
        self.db.clone()
    }

    fn version(&self) -> u64 {
        let state = self.shared.state.read();
        state.databases.get(&self.db).map_or(0, |db| db.version)
    }

    fn object_store_names(&self) -> Vec<String> {
        let state = self.shared.state.read();
        state
            .databases
            .get(&self.db)
            .map_or_else(Vec::new, |db| db.stores.keys().cloned().collect())
    }

    fn close(&self) {
        self.shared.close_connection(&self.db, self.conn_id);
    }

    fn create_object_store(
        &self,
        name: &str,
        options: StoreOptions,
    ) -> EngineResult<Box<dyn HostStore>> {
        let mut state = self.shared.state.write();
        let db = state.databases.get_mut(&self.db).ok_or(EngineError::Closed)?;
        let upgrade = db.upgrade.as_ref().ok_or_else(|| {
            EngineError::invalid_state("schema changes require a version change transaction")
        })?;
        if upgrade.conn_id != self.conn_id {
            return Err(EngineError::invalid_state(
                "version change belongs to another connection",
            ));
        }
        if db.stores.contains_key(name) {
            return Err(EngineError::schema_conflict(format!(
                "object store {name} already exists"
            )));
        }
        let txn_id = upgrade.txn_id;
        trace!(database = %self.db, store = name, "object store created");
        db.stores.insert(
            name.to_string(),
            StoreState::new(options.key_path, options.auto_increment),
        );
        Ok(Box::new(MemoryStore {
            shared: Arc::clone(&self.shared),
            db: self.db.clone(),
            txn_id,
            store: name.to_string(),
        }))
    }

    fn delete_object_store(&self, name: &str) -> EngineResult<()> {
        let mut state = self.shared.state.write();
        let db = state.databases.get_mut(&self.db).ok_or(EngineError::Closed)?;
        let upgrade = db.upgrade.as_ref().ok_or_else(|| {
            EngineError::invalid_state("schema changes require a version change transaction")
        })?;
        if upgrade.conn_id != self.conn_id {
            return Err(EngineError::invalid_state(
                "version change belongs to another connection",
            ));
        }
        if db.stores.remove(name).is_none() {
            return Err(EngineError::not_found(name));
        }
        trace!(database = %self.db, store = name, "object store deleted");
        Ok(())
    }

    fn transaction(
        &self,
        store_names: &[&str],
        mode: Mode,
        durability: Durability,
    ) -> EngineResult<Box<dyn HostTransaction>> {
        if mode == Mode::VersionChange {
            return Err(EngineError::invalid_state(
                "version change transactions are created by open",
            ));
        }
        if store_names.is_empty() {
            return Err(EngineError::invalid_state("transaction scope is empty"));
        }
        let mut state = self.shared.state.write();
        state.next_txn_id += 1;
        let txn_id = state.next_txn_id;
        let db = state.databases.get_mut(&self.db).ok_or(EngineError::Closed)?;
        if !db.connections.iter().any(|s| s.id == self.conn_id) {
            return Err(EngineError::Closed);
        }
        if db.upgrade.is_some() {
            return Err(EngineError::invalid_state(
                "version change transaction in progress",
            ));
        }
        let mut snapshot = BTreeMap::new();
        for name in store_names {
            let store = db
                .stores
                .get(*name)
                .ok_or_else(|| EngineError::not_found(*name))?;
            snapshot.insert((*name).to_string(), store.clone());
        }
        db.txns.insert(
            txn_id,
            TxnState {
                mode,
                durability,
                scope: store_names.iter().map(|s| (*s).to_string()).collect(),
                status: TxnStatus::Active,
                snapshot,
                error: None,
            },
        );
        trace!(database = %self.db, txn_id, %mode, "transaction started");
        Ok(transaction(&self.shared, &self.db, txn_id))
    }

    fn set_close_hook(&self, hook: ConnectionHook) {
        self.with_slot(|slot| slot.close_hook = Some(Arc::from(hook)));
    }

    fn set_version_change_hook(&self, hook: ConnectionHook) {
        self.with_slot(|slot| slot.version_change_hook = Some(Arc::from(hook)));
    }

    fn boxed_clone(&self) -> Box<dyn HostConnection> {
        connection(&self.shared, &self.db, self.conn_id)
    }
}

// ---------------------------------------------------------------------
// transaction

struct MemoryTransaction {
    shared: Arc<EngineShared>,
    db: String,
    txn_id: u64,
}

impl MemoryTransaction {
    fn with_txn<R>(&self, default: R, f: impl FnOnce(&TxnState) -> R) -> R {
        let state = self.shared.state.read();
        state
            .databases
            .get(&self.db)
            .and_then(|db| db.txns.get(&self.txn_id))
            .map_or(default, f)
    }
}

impl HostTransaction for MemoryTransaction {
    fn mode(&self) -> Mode {
        self.with_txn(Mode::ReadOnly, |txn| txn.mode)
    }

    fn durability(&self) -> Durability {
        self.with_txn(Durability::Default, |txn| txn.durability)
    }

    fn store_names(&self) -> Vec<String> {
        let state = self.shared.state.read();
        let db = match state.databases.get(&self.db) {
            Some(db) => db,
            None => return Vec::new(),
        };
        match db.txns.get(&self.txn_id) {
            Some(txn) if txn.scope.is_empty() => db.stores.keys().cloned().collect(),
            Some(txn) => txn.scope.clone(),
            None => Vec::new(),
        }
    }

    fn error(&self) -> Option<EngineError> {
        self.with_txn(None, |txn| txn.error.clone())
    }

    fn object_store(&self, name: &str) -> EngineResult<Box<dyn HostStore>> {
        let state = self.shared.state.read();
        let db = state.databases.get(&self.db).ok_or(EngineError::Closed)?;
        let txn = db
            .txns
            .get(&self.txn_id)
            .ok_or_else(|| EngineError::invalid_state("no such transaction"))?;
        check_active(txn, name)?;
        if !db.stores.contains_key(name) {
            return Err(EngineError::not_found(name));
        }
        Ok(Box::new(MemoryStore {
            shared: Arc::clone(&self.shared),
            db: self.db.clone(),
            txn_id: self.txn_id,
            store: name.to_string(),
        }))
    }

    fn commit(&self) -> HostRequest<()> {
        HostRequest::ready(self.shared.finish_transaction(&self.db, self.txn_id, true))
    }

    fn abort(&self) -> HostRequest<()> {
        HostRequest::ready(self.shared.finish_transaction(&self.db, self.txn_id, false))
    }
}

impl Drop for MemoryTransaction {
    /// A transaction handle dropped while still active commits, in
    /// line with auto-committing hosts.
    fn drop(&mut self) {
        let _ = self.shared.finish_transaction(&self.db, self.txn_id, true);
    }
}

// ---------------------------------------------------------------------
// object store

pub(super) struct MemoryStore {
    pub(super) shared: Arc<EngineShared>,
    pub(super) db: String,
    pub(super) txn_id: u64,
    pub(super) store: String,
}

impl MemoryStore {
    fn meta<R>(&self, default: R, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.shared.state.read();
        state
            .databases
            .get(&self.db)
            .and_then(|db| db.stores.get(&self.store))
            .map_or(default, f)
    }
}

impl HostStore for MemoryStore {
    fn name(&self) -> String {
        self.store.clone()
    }

    fn key_path(&self) -> Option<String> {
        self.meta(None, |s| s.key_path.clone())
    }

    fn auto_increment(&self) -> bool {
        self.meta(false, |s| s.auto_increment)
    }

    fn index_names(&self) -> Vec<String> {
        self.meta(Vec::new(), |s| s.indexes.keys().cloned().collect())
    }

    fn add(&self, value: Datum, key: Option<Key>) -> HostRequest<Key> {
        HostRequest::ready(self.shared.store_write(&self.db, self.txn_id, &self.store, |s| {
            s.put(value, key, true)
        }))
    }

    fn put(&self, value: Datum, key: Option<Key>) -> HostRequest<Key> {
        HostRequest::ready(self.shared.store_write(&self.db, self.txn_id, &self.store, |s| {
            s.put(value, key, false)
        }))
    }

    fn get(&self, key: Key) -> HostRequest<Option<Datum>> {
        HostRequest::ready(self.shared.store_read(&self.db, self.txn_id, &self.store, |s| {
            Ok(s.records.get(&key).cloned())
        }))
    }

    fn get_all(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Datum>> {
        HostRequest::ready(self.shared.store_read(&self.db, self.txn_id, &self.store, |s| {
            Ok(s
                .records
                .iter()
                .filter(|(k, _)| in_range(range.as_ref(), k))
                .take(usize_limit(limit))
                .map(|(_, v)| v.clone())
                .collect())
        }))
    }

    fn get_key(&self, range: KeyRange) -> HostRequest<Option<Key>> {
        HostRequest::ready(self.shared.store_read(&self.db, self.txn_id, &self.store, |s| {
            Ok(s.records.keys().find(|k| range.contains(k)).cloned())
        }))
    }

    fn get_all_keys(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Key>> {
        HostRequest::ready(self.shared.store_read(&self.db, self.txn_id, &self.store, |s| {
            Ok(s
                .records
                .keys()
                .filter(|k| in_range(range.as_ref(), k))
                .take(usize_limit(limit))
                .cloned()
                .collect())
        }))
    }

    fn count(&self, range: Option<KeyRange>) -> HostRequest<u64> {
        HostRequest::ready(self.shared.store_read(&self.db, self.txn_id, &self.store, |s| {
            Ok(s
                .records
                .keys()
                .filter(|k| in_range(range.as_ref(), k))
                .count() as u64)
        }))
    }

    fn clear(&self) -> HostRequest<()> {
        HostRequest::ready(self.shared.store_write(&self.db, self.txn_id, &self.store, |s| {
            s.clear_records();
            Ok(())
        }))
    }

    fn delete(&self, range: KeyRange) -> HostRequest<()> {
        HostRequest::ready(self.shared.store_write(&self.db, self.txn_id, &self.store, |s| {
            let doomed: Vec<Key> = s
                .records
                .keys()
                .filter(|k| range.contains(k))
                .cloned()
                .collect();
            for key in &doomed {
                s.remove(key);
            }
            Ok(())
        }))
    }

    fn create_index(
        &self,
        name: &str,
        key_path: &str,
        options: IndexOptions,
    ) -> EngineResult<Box<dyn HostIndex>> {
        self.shared.store_schema(&self.db, self.txn_id, &self.store, |s| {
            if s.indexes.contains_key(name) {
                return Err(EngineError::schema_conflict(format!(
                    "index {name} already exists"
                )));
            }
            let mut index = IndexState {
                key_path: key_path.to_string(),
                unique: options.unique,
                multi_entry: options.multi_entry,
                entries: Default::default(),
            };
            // Existing records populate the index; a unique clash
            // fails the whole creation.
            for (primary, value) in &s.records {
                for index_key in index.keys_for(value) {
                    if index.unique {
                        let taken = index
                            .entries
                            .iter()
                            .any(|(k, p)| *k == index_key && p != primary);
                        if taken {
                            return Err(EngineError::constraint(format!(
                                "unique index {name} already contains key {index_key}"
                            )));
                        }
                    }
                    index.entries.insert((index_key, primary.clone()));
                }
            }
            s.indexes.insert(name.to_string(), index);
            Ok(())
        })?;
        trace!(database = %self.db, store = %self.store, index = name, "index created");
        Ok(Box::new(MemoryIndex {
            shared: Arc::clone(&self.shared),
            db: self.db.clone(),
            txn_id: self.txn_id,
            store: self.store.clone(),
            index: name.to_string(),
        }))
    }

    fn delete_index(&self, name: &str) -> EngineResult<()> {
        self.shared.store_schema(&self.db, self.txn_id, &self.store, |s| {
            if s.indexes.remove(name).is_none() {
                return Err(EngineError::not_found(name));
            }
            Ok(())
        })
    }

    fn index(&self, name: &str) -> EngineResult<Box<dyn HostIndex>> {
        self.shared.store_read(&self.db, self.txn_id, &self.store, |s| {
            if !s.indexes.contains_key(name) {
                return Err(EngineError::not_found(name));
            }
            Ok(())
        })?;
        Ok(Box::new(MemoryIndex {
            shared: Arc::clone(&self.shared),
            db: self.db.clone(),
            txn_id: self.txn_id,
            store: self.store.clone(),
            index: name.to_string(),
        }))
    }

    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>> {
        HostRequest::ready(cursor::open(
            &self.shared,
            &self.db,
            self.txn_id,
            &self.store,
            None,
            range,
            direction,
            true,
        ))
    }

    fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>> {
        HostRequest::ready(cursor::open(
            &self.shared,
            &self.db,
            self.txn_id,
            &self.store,
            None,
            range,
            direction,
            false,
        ))
    }
}

// ---------------------------------------------------------------------
// index

struct MemoryIndex {
    shared: Arc<EngineShared>,
    db: String,
    txn_id: u64,
    store: String,
    index: String,
}

impl MemoryIndex {
    fn meta<R>(&self, default: R, f: impl FnOnce(&IndexState) -> R) -> R {
        let state = self.shared.state.read();
        state
            .databases
            .get(&self.db)
            .and_then(|db| db.stores.get(&self.store))
            .and_then(|s| s.indexes.get(&self.index))
            .map_or(default, f)
    }
}

impl HostIndex for MemoryIndex {
    fn name(&self) -> String {
        self.index.clone()
    }

    fn key_path(&self) -> String {
        self.meta(String::new(), |i| i.key_path.clone())
    }

    fn unique(&self) -> bool {
        self.meta(false, |i| i.unique)
    }

    fn multi_entry(&self) -> bool {
        self.meta(false, |i| i.multi_entry)
    }

    fn get(&self, key: Key) -> HostRequest<Option<Datum>> {
        HostRequest::ready(self.shared.index_read(
            &self.db,
            self.txn_id,
            &self.store,
            &self.index,
            |s, i| {
                Ok(i
                    .entries
                    .iter()
                    .find(|(k, _)| *k == key)
                    .and_then(|(_, primary)| s.records.get(primary).cloned()))
            },
        ))
    }

    fn get_key(&self, key: Key) -> HostRequest<Option<Key>> {
        HostRequest::ready(self.shared.index_read(
            &self.db,
            self.txn_id,
            &self.store,
            &self.index,
            |_, i| {
                Ok(i
                    .entries
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, primary)| primary.clone()))
            },
        ))
    }

    fn get_all(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Datum>> {
        HostRequest::ready(self.shared.index_read(
            &self.db,
            self.txn_id,
            &self.store,
            &self.index,
            |s, i| {
                Ok(i
                    .entries
                    .iter()
                    .filter(|(k, _)| in_range(range.as_ref(), k))
                    .take(usize_limit(limit))
                    .filter_map(|(_, primary)| s.records.get(primary).cloned())
                    .collect())
            },
        ))
    }

    fn get_all_keys(&self, range: Option<KeyRange>, limit: Option<u32>) -> HostRequest<Vec<Key>> {
        HostRequest::ready(self.shared.index_read(
            &self.db,
            self.txn_id,
            &self.store,
            &self.index,
            |_, i| {
                Ok(i
                    .entries
                    .iter()
                    .filter(|(k, _)| in_range(range.as_ref(), k))
                    .take(usize_limit(limit))
                    .map(|(_, primary)| primary.clone())
                    .collect())
            },
        ))
    }

    fn count(&self, range: Option<KeyRange>) -> HostRequest<u64> {
        HostRequest::ready(self.shared.index_read(
            &self.db,
            self.txn_id,
            &self.store,
            &self.index,
            |_, i| {
                Ok(i
                    .entries
                    .iter()
                    .filter(|(k, _)| in_range(range.as_ref(), k))
                    .count() as u64)
            },
        ))
    }

    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>> {
        HostRequest::ready(cursor::open(
            &self.shared,
            &self.db,
            self.txn_id,
            &self.store,
            Some(&self.index),
            range,
            direction,
            true,
        ))
    }

    fn open_key_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> HostRequest<Option<Box<dyn HostCursor>>> {
        HostRequest::ready(cursor::open(
            &self.shared,
            &self.db,
            self.txn_id,
            &self.store,
            Some(&self.index),
            range,
            direction,
            false,
        ))
    }
}
