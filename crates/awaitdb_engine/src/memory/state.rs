//! Internal state of the in-memory engine.

use crate::datum::Datum;
use crate::error::{EngineError, EngineResult};
use crate::key::Key;
use crate::request::OpenSender;
use crate::types::{Durability, Mode};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// A long-lived connection notification, shared so it can be fired
/// outside the state lock.
pub(crate) type SharedHook = Arc<dyn Fn() + Send + Sync>;

/// Whole-engine state behind one lock.
#[derive(Default)]
pub(crate) struct EngineState {
    pub databases: HashMap<String, DbState>,
    pub next_conn_id: u64,
    pub next_txn_id: u64,
}

/// One named database.
#[derive(Default)]
pub(crate) struct DbState {
    /// Committed version; 0 means "does not exist yet".
    pub version: u64,
    pub stores: BTreeMap<String, StoreState>,
    pub connections: Vec<ConnSlot>,
    /// At most one version-change transaction at a time.
    pub upgrade: Option<UpgradeState>,
    pub txns: HashMap<u64, TxnState>,
    /// Opens blocked by live connections, in arrival order.
    pub waiting: VecDeque<WaitingOpen>,
    /// A deletion was requested while connections were open.
    pub delete_pending: bool,
}

pub(crate) struct ConnSlot {
    pub id: u64,
    pub close_hook: Option<SharedHook>,
    pub version_change_hook: Option<SharedHook>,
}

pub(crate) struct UpgradeState {
    pub txn_id: u64,
    pub conn_id: u64,
    pub old_version: u64,
    pub events: OpenSender,
    /// Stores as they were before the upgrade began.
    pub snapshot: BTreeMap<String, StoreState>,
}

pub(crate) struct WaitingOpen {
    pub version: u64,
    pub events: OpenSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

pub(crate) struct TxnState {
    pub mode: Mode,
    pub durability: Durability,
    /// Scope store names; empty means every store (version change).
    pub scope: Vec<String>,
    pub status: TxnStatus,
    /// Scoped stores as they were at begin, for rollback.
    pub snapshot: BTreeMap<String, StoreState>,
    pub error: Option<EngineError>,
}

impl TxnState {
    pub fn in_scope(&self, store: &str) -> bool {
        self.scope.is_empty() || self.scope.iter().any(|s| s == store)
    }
}

/// One object store: ordered records plus secondary indexes.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub key_path: Option<String>,
    pub auto_increment: bool,
    /// Next generated key.
    pub next_auto_key: u64,
    pub records: BTreeMap<Key, Datum>,
    pub indexes: BTreeMap<String, IndexState>,
}

/// One secondary index: (index key, primary key) pairs.
#[derive(Debug, Clone)]
pub(crate) struct IndexState {
    pub key_path: String,
    pub unique: bool,
    pub multi_entry: bool,
    pub entries: BTreeSet<(Key, Key)>,
}

impl IndexState {
    /// Index keys a record contributes. Records whose path value is
    /// not key-convertible contribute nothing.
    pub fn keys_for(&self, value: &Datum) -> Vec<Key> {
        let resolved = match value.at_path(&self.key_path) {
            Some(v) => v,
            None => return Vec::new(),
        };
        if self.multi_entry {
            if let Datum::Array(items) = resolved {
                let distinct: BTreeSet<Key> =
                    items.iter().filter_map(Datum::to_key).collect();
                return distinct.into_iter().collect();
            }
        }
        resolved.to_key().into_iter().collect()
    }
}

impl StoreState {
    pub fn new(key_path: Option<String>, auto_increment: bool) -> Self {
        Self {
            key_path,
            auto_increment,
            next_auto_key: 1,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Inserts or replaces a record, maintaining every index.
    ///
    /// Nothing is applied when the operation fails.
    pub fn put(
        &mut self,
        mut value: Datum,
        explicit: Option<Key>,
        add_only: bool,
    ) -> EngineResult<Key> {
        let key = self.resolve_key(&mut value, explicit)?;

        if self.auto_increment {
            if let Key::Number(n) = &key {
                if n.is_finite() && *n >= self.next_auto_key as f64 {
                    self.next_auto_key = n.floor() as u64 + 1;
                }
            }
        }

        if add_only && self.records.contains_key(&key) {
            return Err(EngineError::constraint(format!(
                "key {key} already exists"
            )));
        }

        for (name, index) in &self.indexes {
            if !index.unique {
                continue;
            }
            for index_key in index.keys_for(&value) {
                let taken = index
                    .entries
                    .iter()
                    .any(|(k, p)| *k == index_key && *p != key);
                if taken {
                    return Err(EngineError::constraint(format!(
                        "unique index {name} already contains key {index_key}"
                    )));
                }
            }
        }

        for index in self.indexes.values_mut() {
            index.entries.retain(|(_, primary)| *primary != key);
        }
        for index in self.indexes.values_mut() {
            for index_key in index.keys_for(&value) {
                index.entries.insert((index_key, key.clone()));
            }
        }
        self.records.insert(key.clone(), value);
        Ok(key)
    }

    /// Removes one record and its index entries.
    pub fn remove(&mut self, key: &Key) {
        if self.records.remove(key).is_some() {
            for index in self.indexes.values_mut() {
                index.entries.retain(|(_, primary)| primary != key);
            }
        }
    }

    /// Removes every record and index entry; the schema stays.
    pub fn clear_records(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    fn resolve_key(&mut self, value: &mut Datum, explicit: Option<Key>) -> EngineResult<Key> {
        if let Some(key) = explicit {
            if self.key_path.is_some() {
                return Err(EngineError::data(
                    "explicit key given for a store with an in-line key path",
                ));
            }
            return Ok(key);
        }
        match self.key_path.clone() {
            Some(path) => {
                if let Some(key) = value.at_path(&path).and_then(Datum::to_key) {
                    return Ok(key);
                }
                if self.auto_increment {
                    let key = Key::Number(self.next_auto_key as f64);
                    if !value.set_path(&path, Datum::from(key.clone())) {
                        return Err(EngineError::data(format!(
                            "cannot inject generated key at path {path}"
                        )));
                    }
                    return Ok(key);
                }
                Err(EngineError::data(format!(
                    "record yields no key at path {path}"
                )))
            }
            None if self.auto_increment => Ok(Key::Number(self.next_auto_key as f64)),
            None => Err(EngineError::data(
                "no key supplied and store has no key generator",
            )),
        }
    }
}
