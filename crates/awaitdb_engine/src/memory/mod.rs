//! In-memory reference engine.
//!
//! `MemoryEngine` implements the full host contract against plain
//! in-process data structures: ordered records in `BTreeMap`s, index
//! entries in `BTreeSet`s, and one `RwLock` over the whole engine
//! state. It exists so the adapter layer can be exercised without a
//! real storage host, and doubles as the executable definition of the
//! contract's semantics (blocking, version-change rollback, cursor
//! ordering).
//!
//! # Locking discipline
//!
//! Connection hooks and anything else that can re-enter the engine
//! are collected under the lock and invoked after it is released.
//! Undeliverable open events are likewise dropped outside the lock,
//! because dropping a transaction handle may call back in.

mod cursor;
mod handles;
mod state;

use crate::error::{EngineError, EngineResult};
use crate::request::{HostRequest, OpenEvent, OpenRequest, OpenSender};
use crate::traits::HostEngine;
use crate::types::{DatabaseInfo, Durability, Mode};
use parking_lot::RwLock;
use state::{ConnSlot, EngineState, SharedHook, TxnState, TxnStatus, UpgradeState, WaitingOpen};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The in-memory host engine.
///
/// Databases live for the lifetime of the engine value; handles
/// cloned from it share one state. Suitable for tests and ephemeral
/// use.
///
/// # Example
///
/// ```rust,ignore
/// use awaitdb_engine::{HostEngine, MemoryEngine};
///
/// let engine = MemoryEngine::new();
/// let mut request = engine.open("inventory", 1);
/// ```
#[derive(Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<EngineShared>,
}

#[derive(Default)]
pub(crate) struct EngineShared {
    state: RwLock<EngineState>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Severs every connection of a database as if the host had
    /// failed, firing the unexpected-close notification of each.
    ///
    /// Active transactions are rolled back first. Intended for tests
    /// of the unexpected-close path.
    pub fn force_close(&self, name: &str) {
        let mut hooks: Vec<SharedHook> = Vec::new();
        let mut dropped: Vec<OpenEvent> = Vec::new();
        {
            let mut state = self.shared.state.write();
            if let Some(db) = state.databases.get_mut(name) {
                warn!(database = name, "force-closing all connections");
                for slot in db.connections.drain(..) {
                    if let Some(hook) = slot.close_hook {
                        hooks.push(hook);
                    }
                }
                // roll back whatever was in flight
                if let Some(upgrade) = db.upgrade.take() {
                    db.stores = upgrade.snapshot;
                    db.version = upgrade.old_version;
                    db.txns.remove(&upgrade.txn_id);
                    let _ = upgrade
                        .events
                        .send(OpenEvent::Error(EngineError::aborted("connection lost")));
                }
                let active: Vec<u64> = db
                    .txns
                    .iter()
                    .filter(|(_, t)| t.status == TxnStatus::Active)
                    .map(|(id, _)| *id)
                    .collect();
                for txn_id in active {
                    if let Some(txn) = db.txns.get_mut(&txn_id) {
                        txn.status = TxnStatus::Aborted;
                        txn.error = Some(EngineError::aborted("connection lost"));
                        let snapshot = std::mem::take(&mut txn.snapshot);
                        for (store_name, store) in snapshot {
                            db.stores.insert(store_name, store);
                        }
                    }
                }
            }
            self.shared.process_unblocked(&mut state, name, &mut dropped);
        }
        drop(dropped);
        for hook in hooks {
            hook();
        }
    }
}

impl HostEngine for MemoryEngine {
    fn open(&self, name: &str, version: u64) -> OpenRequest {
        let (sender, request) = OpenRequest::channel();
        if version == 0 {
            let _ = sender.send(OpenEvent::Error(EngineError::InvalidVersion(version)));
            return request;
        }

        // Version-change-from-elsewhere notifications go out before
        // the blocked decision, giving other connections a chance to
        // close. Fired outside the lock.
        let hooks: Vec<SharedHook> = {
            let state = self.shared.state.read();
            match state.databases.get(name) {
                Some(db) if version > db.version && !db.connections.is_empty() => db
                    .connections
                    .iter()
                    .filter_map(|slot| slot.version_change_hook.clone())
                    .collect(),
                _ => Vec::new(),
            }
        };
        for hook in hooks {
            hook();
        }

        let mut dropped: Vec<OpenEvent> = Vec::new();
        {
            let mut state = self.shared.state.write();
            self.shared
                .continue_open(&mut state, name, version, sender, &mut dropped);
        }
        drop(dropped);
        request
    }

    fn delete_database(&self, name: &str) -> HostRequest<()> {
        let hooks: Vec<SharedHook> = {
            let state = self.shared.state.read();
            match state.databases.get(name) {
                Some(db) => db
                    .connections
                    .iter()
                    .filter_map(|slot| slot.version_change_hook.clone())
                    .collect(),
                None => Vec::new(),
            }
        };
        for hook in hooks {
            hook();
        }

        let mut state = self.shared.state.write();
        let result = match state.databases.get_mut(name) {
            None => Ok(()),
            Some(db) if db.connections.is_empty() && db.upgrade.is_none() => {
                debug!(database = name, "database deleted");
                state.databases.remove(name);
                Ok(())
            }
            Some(db) => {
                // The deletion stays pending engine-side; the request
                // itself reports blocked.
                debug!(database = name, "delete blocked by open connections");
                db.delete_pending = true;
                Err(EngineError::Blocked)
            }
        };
        HostRequest::ready(result)
    }

    fn databases(&self) -> HostRequest<Vec<DatabaseInfo>> {
        let state = self.shared.state.read();
        let mut list: Vec<DatabaseInfo> = state
            .databases
            .iter()
            .filter(|(_, db)| db.version > 0)
            .map(|(name, db)| DatabaseInfo {
                name: name.clone(),
                version: db.version,
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        HostRequest::ready(Ok(list))
    }
}

impl EngineShared {
    /// Advances one open attempt as far as the current state allows.
    ///
    /// Called under the state lock. Undeliverable events are pushed
    /// onto `dropped` for disposal after the lock is released.
    fn continue_open(
        self: &Arc<Self>,
        state: &mut EngineState,
        name: &str,
        version: u64,
        events: OpenSender,
        dropped: &mut Vec<OpenEvent>,
    ) {
        state.next_conn_id += 1;
        let conn_id = state.next_conn_id;
        state.next_txn_id += 1;
        let txn_id = state.next_txn_id;

        let db = state.databases.entry(name.to_string()).or_default();

        if db.delete_pending {
            // New opens queue behind the deletion instead of keeping
            // it pending forever; they re-run against the fresh
            // database once it has gone through.
            debug!(database = name, "open queued behind pending deletion");
            if events.send(OpenEvent::Blocked).is_ok() {
                db.waiting.push_back(WaitingOpen { version, events });
            }
            return;
        }

        if db.version > 0 && version < db.version {
            debug!(
                database = name,
                requested = version,
                stored = db.version,
                "version too low"
            );
            let _ = events.send(OpenEvent::Error(EngineError::VersionTooLow {
                requested: version,
                stored: db.version,
            }));
            return;
        }

        if db.upgrade.is_some() || (version > db.version && !db.connections.is_empty()) {
            debug!(database = name, requested = version, "open blocked");
            if events.send(OpenEvent::Blocked).is_ok() {
                db.waiting.push_back(WaitingOpen { version, events });
            }
            return;
        }

        if version == db.version {
            db.connections.push(ConnSlot {
                id: conn_id,
                close_hook: None,
                version_change_hook: None,
            });
            trace!(database = name, version, conn_id, "connection opened");
            let handle = handles::connection(self, name, conn_id);
            if events.send(OpenEvent::Success(handle)).is_err() {
                db.connections.retain(|slot| slot.id != conn_id);
            }
            return;
        }

        // version > stored: begin the version-change transaction.
        let old_version = db.version;
        let snapshot = db.stores.clone();
        db.connections.push(ConnSlot {
            id: conn_id,
            close_hook: None,
            version_change_hook: None,
        });
        db.txns.insert(
            txn_id,
            TxnState {
                mode: Mode::VersionChange,
                durability: Durability::Default,
                scope: Vec::new(),
                status: TxnStatus::Active,
                snapshot: BTreeMap::new(),
                error: None,
            },
        );
        db.upgrade = Some(UpgradeState {
            txn_id,
            conn_id,
            old_version,
            events: events.clone(),
            snapshot,
        });
        db.version = version;
        debug!(database = name, old_version, new_version = version, "upgrade needed");

        let event = OpenEvent::UpgradeNeeded {
            connection: handles::connection(self, name, conn_id),
            old_version,
            new_version: version,
            transaction: handles::transaction(self, name, txn_id),
        };
        if let Err(event) = events.send(event) {
            // The opener is gone; unwind the implicit upgrade rather
            // than leaving a version-change transaction hanging. The
            // rejected event holds a transaction handle whose drop
            // re-enters the engine, so it goes in `dropped`.
            if let Some(upgrade) = db.upgrade.take() {
                db.stores = upgrade.snapshot;
                db.version = upgrade.old_version;
            }
            db.txns.remove(&txn_id);
            db.connections.retain(|slot| slot.id != conn_id);
            if db.version == 0 && db.connections.is_empty() && db.waiting.is_empty() {
                state.databases.remove(name);
            }
            dropped.push(event);
        }
    }

    /// Runs whatever was waiting on the last connection closing:
    /// pending deletion first, then queued opens in arrival order.
    fn process_unblocked(
        self: &Arc<Self>,
        state: &mut EngineState,
        name: &str,
        dropped: &mut Vec<OpenEvent>,
    ) {
        loop {
            let db = match state.databases.get_mut(name) {
                Some(db) => db,
                None => return,
            };
            if !db.connections.is_empty() || db.upgrade.is_some() {
                return;
            }
            if db.delete_pending {
                debug!(database = name, "running pending deletion");
                let waiting: Vec<WaitingOpen> = db.waiting.drain(..).collect();
                state.databases.remove(name);
                for open in waiting {
                    self.continue_open(state, name, open.version, open.events, dropped);
                }
                continue;
            }
            let next = match db.waiting.pop_front() {
                Some(open) => open,
                None => {
                    if db.version == 0 && db.txns.is_empty() {
                        state.databases.remove(name);
                    }
                    return;
                }
            };
            self.continue_open(state, name, next.version, next.events, dropped);
        }
    }

    /// Removes a connection and continues anything it was blocking.
    pub(crate) fn close_connection(self: &Arc<Self>, name: &str, conn_id: u64) {
        let mut dropped: Vec<OpenEvent> = Vec::new();
        {
            let mut state = self.state.write();
            let db = match state.databases.get_mut(name) {
                Some(db) => db,
                None => return,
            };
            let before = db.connections.len();
            db.connections.retain(|slot| slot.id != conn_id);
            if db.connections.len() == before {
                return;
            }
            trace!(database = name, conn_id, "connection closed");
            if db.connections.is_empty() {
                self.process_unblocked(&mut state, name, &mut dropped);
            }
        }
        drop(dropped);
    }

    /// Finishes a transaction by commit or rollback.
    ///
    /// For the version-change transaction this also emits the open
    /// request's terminal event.
    pub(crate) fn finish_transaction(
        self: &Arc<Self>,
        name: &str,
        txn_id: u64,
        commit: bool,
    ) -> EngineResult<()> {
        let mut dropped: Vec<OpenEvent> = Vec::new();
        let result = {
            let mut state = self.state.write();
            self.finish_transaction_locked(&mut state, name, txn_id, commit, &mut dropped)
        };
        drop(dropped);
        result
    }

    fn finish_transaction_locked(
        self: &Arc<Self>,
        state: &mut EngineState,
        name: &str,
        txn_id: u64,
        commit: bool,
        dropped: &mut Vec<OpenEvent>,
    ) -> EngineResult<()> {
        let db = state
            .databases
            .get_mut(name)
            .ok_or(EngineError::Closed)?;
        let is_upgrade = db
            .upgrade
            .as_ref()
            .is_some_and(|upgrade| upgrade.txn_id == txn_id);

        let snapshot = {
            let txn = db
                .txns
                .get_mut(&txn_id)
                .ok_or_else(|| EngineError::invalid_state("no such transaction"))?;
            if txn.status != TxnStatus::Active {
                return Err(EngineError::invalid_state("transaction already finished"));
            }
            txn.status = if commit {
                TxnStatus::Committed
            } else {
                TxnStatus::Aborted
            };
            std::mem::take(&mut txn.snapshot)
        };
        let upgrade = if is_upgrade { db.upgrade.take() } else { None };

        if commit {
            if let Some(upgrade) = upgrade {
                debug!(database = name, version = db.version, "version change committed");
                let handle = handles::connection(self, name, upgrade.conn_id);
                if upgrade.events.send(OpenEvent::Success(handle)).is_err() {
                    db.connections.retain(|slot| slot.id != upgrade.conn_id);
                }
                self.process_unblocked(state, name, dropped);
            } else {
                trace!(database = name, txn_id, "transaction committed");
            }
            return Ok(());
        }

        if let Some(upgrade) = upgrade {
            debug!(
                database = name,
                restored = upgrade.old_version,
                "version change rolled back"
            );
            db.stores = upgrade.snapshot;
            db.version = upgrade.old_version;
            db.connections.retain(|slot| slot.id != upgrade.conn_id);
            let _ = upgrade
                .events
                .send(OpenEvent::Error(EngineError::aborted(
                    "version change transaction aborted",
                )));
            self.process_unblocked(state, name, dropped);
        } else {
            trace!(database = name, txn_id, "transaction rolled back");
            for (store_name, store) in snapshot {
                db.stores.insert(store_name, store);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Datum;
    use crate::key::{Key, KeyRange};
    use crate::traits::{HostConnection, HostStore, HostTransaction};
    use crate::types::{CursorStep, Direction, IndexOptions, StoreOptions};
    use futures_util::FutureExt;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    // The in-memory engine settles everything inline, so events and
    // completions can be drained without an executor.
    fn next(request: &mut OpenRequest) -> OpenEvent {
        request
            .next_event()
            .now_or_never()
            .flatten()
            .expect("an event should be ready")
    }

    fn wait<T: Send + 'static>(request: HostRequest<T>) -> EngineResult<T> {
        let out = Arc::new(PlMutex::new(None));
        let sink = Arc::clone(&out);
        request.on_complete(move |result| {
            *sink.lock() = Some(result);
        });
        let settled = out.lock().take().expect("request should be settled");
        settled
    }

    fn record(id: i64, label: &str) -> Datum {
        Datum::map([("id", Datum::from(id)), ("label", Datum::from(label))])
    }

    /// Engine with database "db" at version 1 holding store "items"
    /// seeded with keys 1..=3, plus the surviving connection.
    fn seeded() -> (MemoryEngine, Box<dyn HostConnection>) {
        let engine = MemoryEngine::new();
        let mut request = engine.open("db", 1);
        let (connection, upgrade_txn) = match next(&mut request) {
            OpenEvent::UpgradeNeeded {
                connection,
                old_version: 0,
                new_version: 1,
                transaction,
            } => (connection, transaction),
            other => panic!("unexpected event: {other:?}"),
        };
        let store = connection
            .create_object_store("items", StoreOptions::new())
            .unwrap();
        for id in 1..=3 {
            wait(store.put(record(id, "seed"), Some(Key::from(id)))).unwrap();
        }
        drop(store);
        wait(upgrade_txn.commit()).unwrap();
        drop(connection);
        match next(&mut request) {
            OpenEvent::Success(connection) => (engine, connection),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn open_reports_versions_and_schema() {
        let (engine, connection) = seeded();
        assert_eq!(connection.version(), 1);
        assert_eq!(connection.object_store_names(), vec!["items".to_string()]);
        let infos = wait(engine.databases()).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "db");
        assert_eq!(infos[0].version, 1);
    }

    #[test]
    fn reopen_at_same_version_succeeds_directly() {
        let (engine, connection) = seeded();
        connection.close();
        let mut request = engine.open("db", 1);
        assert!(matches!(next(&mut request), OpenEvent::Success(_)));
    }

    #[test]
    fn open_below_stored_version_fails() {
        let (engine, connection) = seeded();
        let mut request = engine.open("db", 1);
        let second = match next(&mut request) {
            OpenEvent::Success(second) => second,
            other => panic!("unexpected event: {other:?}"),
        };
        second.close();
        connection.close();

        // bump to 2 first
        let mut request = engine.open("db", 2);
        let txn = match next(&mut request) {
            OpenEvent::UpgradeNeeded { transaction, .. } => transaction,
            other => panic!("unexpected event: {other:?}"),
        };
        wait(txn.commit()).unwrap();
        assert!(matches!(next(&mut request), OpenEvent::Success(_)));

        let mut request = engine.open("db", 1);
        match next(&mut request) {
            OpenEvent::Error(EngineError::VersionTooLow { requested: 1, stored: 2 }) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn open_at_version_zero_fails() {
        let engine = MemoryEngine::new();
        let mut request = engine.open("db", 0);
        assert!(matches!(
            next(&mut request),
            OpenEvent::Error(EngineError::InvalidVersion(0))
        ));
    }

    #[test]
    fn upgrade_blocks_until_other_connection_closes() {
        let (engine, connection) = seeded();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        connection.set_version_change_hook(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut request = engine.open("db", 2);
        assert!(matches!(next(&mut request), OpenEvent::Blocked));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        connection.close();
        let txn = match next(&mut request) {
            OpenEvent::UpgradeNeeded {
                old_version: 1,
                new_version: 2,
                transaction,
                ..
            } => transaction,
            other => panic!("unexpected event: {other:?}"),
        };
        wait(txn.commit()).unwrap();
        assert!(matches!(next(&mut request), OpenEvent::Success(_)));
    }

    #[test]
    fn aborted_upgrade_restores_schema_and_version() {
        let (engine, connection) = seeded();
        connection.close();

        let mut request = engine.open("db", 2);
        let (upgrade_conn, txn) = match next(&mut request) {
            OpenEvent::UpgradeNeeded { connection, transaction, .. } => (connection, transaction),
            other => panic!("unexpected event: {other:?}"),
        };
        upgrade_conn
            .create_object_store("extra", StoreOptions::new())
            .unwrap();
        wait(txn.abort()).unwrap();
        assert!(matches!(
            next(&mut request),
            OpenEvent::Error(EngineError::TransactionAborted { .. })
        ));

        let infos = wait(engine.databases()).unwrap();
        assert_eq!(infos[0].version, 1);
        let mut request = engine.open("db", 1);
        match next(&mut request) {
            OpenEvent::Success(connection) => {
                assert_eq!(connection.object_store_names(), vec!["items".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn aborted_first_open_leaves_no_database() {
        let engine = MemoryEngine::new();
        let mut request = engine.open("db", 1);
        let txn = match next(&mut request) {
            OpenEvent::UpgradeNeeded { transaction, .. } => transaction,
            other => panic!("unexpected event: {other:?}"),
        };
        wait(txn.abort()).unwrap();
        assert!(matches!(next(&mut request), OpenEvent::Error(_)));
        assert!(wait(engine.databases()).unwrap().is_empty());
    }

    #[test]
    fn delete_waits_for_open_connections() {
        let (engine, connection) = seeded();
        assert_eq!(
            wait(engine.delete_database("db")).unwrap_err(),
            EngineError::Blocked
        );
        // still listed while the deletion is pending
        assert_eq!(wait(engine.databases()).unwrap().len(), 1);
        connection.close();
        assert!(wait(engine.databases()).unwrap().is_empty());
    }

    #[test]
    fn open_during_pending_delete_queues_behind_deletion() {
        let (engine, connection) = seeded();
        assert_eq!(
            wait(engine.delete_database("db")).unwrap_err(),
            EngineError::Blocked
        );

        // a same-version open must not sneak in and starve the delete
        let mut request = engine.open("db", 1);
        assert!(matches!(next(&mut request), OpenEvent::Blocked));

        connection.close();
        // the deletion ran first; the queued open sees a fresh database
        let (new_connection, upgrade_txn) = match next(&mut request) {
            OpenEvent::UpgradeNeeded {
                connection,
                old_version: 0,
                new_version: 1,
                transaction,
            } => (connection, transaction),
            other => panic!("unexpected event: {other:?}"),
        };
        assert!(new_connection.object_store_names().is_empty());
        wait(upgrade_txn.commit()).unwrap();
        assert!(matches!(next(&mut request), OpenEvent::Success(_)));
    }

    #[test]
    fn delete_of_missing_database_is_ok() {
        let engine = MemoryEngine::new();
        wait(engine.delete_database("nope")).unwrap();
    }

    #[test]
    fn data_transaction_abort_rolls_back() {
        let (_engine, connection) = seeded();
        let txn = connection
            .transaction(&["items"], Mode::ReadWrite, Durability::Default)
            .unwrap();
        let store = txn.object_store("items").unwrap();
        wait(store.put(record(9, "doomed"), Some(Key::from(9i64)))).unwrap();
        wait(store.delete(KeyRange::only(Key::from(1i64)))).unwrap();
        drop(store);
        wait(txn.abort()).unwrap();

        let txn = connection
            .transaction(&["items"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("items").unwrap();
        assert_eq!(wait(store.count(None)).unwrap(), 3);
        assert!(wait(store.get(Key::from(1i64))).unwrap().is_some());
        assert!(wait(store.get(Key::from(9i64))).unwrap().is_none());
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let (_engine, connection) = seeded();
        let txn = connection
            .transaction(&["items"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("items").unwrap();
        assert_eq!(
            wait(store.put(record(9, "x"), Some(Key::from(9i64)))).unwrap_err(),
            EngineError::ReadOnly
        );
    }

    #[test]
    fn transaction_scope_is_enforced() {
        let (_engine, connection) = seeded();
        assert!(matches!(
            connection.transaction(&[], Mode::ReadOnly, Durability::Default),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            connection.transaction(&["ghosts"], Mode::ReadOnly, Durability::Default),
            Err(EngineError::NotFound { .. })
        ));
        let txn = connection
            .transaction(&["items"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        assert!(matches!(
            txn.object_store("ghosts"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn schema_changes_outside_version_change_fail() {
        let (_engine, connection) = seeded();
        assert!(matches!(
            connection.create_object_store("extra", StoreOptions::new()),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            connection.delete_object_store("items"),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn dropped_transaction_commits() {
        let (_engine, connection) = seeded();
        {
            let txn = connection
                .transaction(&["items"], Mode::ReadWrite, Durability::Default)
                .unwrap();
            let store = txn.object_store("items").unwrap();
            wait(store.put(record(4, "kept"), Some(Key::from(4i64)))).unwrap();
        }
        let txn = connection
            .transaction(&["items"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("items").unwrap();
        assert_eq!(wait(store.count(None)).unwrap(), 4);
    }

    #[test]
    fn force_close_fires_close_hooks_and_unblocks() {
        let (engine, connection) = seeded();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        connection.set_close_hook(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut request = engine.open("db", 2);
        assert!(matches!(next(&mut request), OpenEvent::Blocked));

        engine.force_close("db");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(matches!(
            next(&mut request),
            OpenEvent::UpgradeNeeded { old_version: 1, new_version: 2, .. }
        ));
    }

    #[test]
    fn orderly_close_does_not_fire_close_hook() {
        let (_engine, connection) = seeded();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        connection.set_close_hook(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        connection.close();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    fn cursor_fixture() -> (Box<dyn HostTransaction>, Box<dyn HostStore>) {
        let (_engine, connection) = seeded();
        let txn = connection
            .transaction(&["items"], Mode::ReadWrite, Durability::Default)
            .unwrap();
        let store = txn.object_store("items").unwrap();
        (txn, store)
    }

    #[test]
    fn cursor_walks_in_key_order() {
        let (_txn, store) = cursor_fixture();
        let cursor = wait(store.open_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty store");
        let mut seen = vec![cursor.key().unwrap()];
        while wait(cursor.continue_to(None)).unwrap() == CursorStep::Row {
            seen.push(cursor.key().unwrap());
        }
        assert_eq!(seen, vec![Key::from(1i64), Key::from(2i64), Key::from(3i64)]);
        assert!(cursor.key().is_none());
        assert!(matches!(
            wait(cursor.continue_to(None)),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn cursor_walks_backwards() {
        let (_txn, store) = cursor_fixture();
        let cursor = wait(store.open_cursor(None, Direction::Prev))
            .unwrap()
            .expect("non-empty store");
        assert_eq!(cursor.key(), Some(Key::from(3i64)));
        assert_eq!(wait(cursor.continue_to(None)).unwrap(), CursorStep::Row);
        assert_eq!(cursor.key(), Some(Key::from(2i64)));
    }

    #[test]
    fn cursor_advance_skips_and_rejects_zero() {
        let (_txn, store) = cursor_fixture();
        let cursor = wait(store.open_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty store");
        assert!(matches!(
            wait(cursor.advance(0)),
            Err(EngineError::DataError { .. })
        ));
        assert_eq!(wait(cursor.advance(2)).unwrap(), CursorStep::Row);
        assert_eq!(cursor.key(), Some(Key::from(3i64)));
        assert_eq!(wait(cursor.advance(1)).unwrap(), CursorStep::Done);
    }

    #[test]
    fn cursor_continue_to_is_forward_only() {
        let (_txn, store) = cursor_fixture();
        let cursor = wait(store.open_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty store");
        assert_eq!(
            wait(cursor.continue_to(Some(Key::from(3i64)))).unwrap(),
            CursorStep::Row
        );
        assert!(matches!(
            wait(cursor.continue_to(Some(Key::from(1i64)))),
            Err(EngineError::DataError { .. })
        ));
    }

    #[test]
    fn cursor_range_bounds_traversal() {
        let (_txn, store) = cursor_fixture();
        let range = KeyRange::bound(Key::from(1i64), Key::from(3i64), true, true);
        let cursor = wait(store.open_cursor(Some(range), Direction::Next))
            .unwrap()
            .expect("key 2 matches");
        assert_eq!(cursor.key(), Some(Key::from(2i64)));
        assert_eq!(wait(cursor.continue_to(None)).unwrap(), CursorStep::Done);
    }

    #[test]
    fn empty_range_opens_no_cursor() {
        let (_txn, store) = cursor_fixture();
        let range = KeyRange::lower_bound(Key::from(10i64), false);
        assert!(wait(store.open_cursor(Some(range), Direction::Next))
            .unwrap()
            .is_none());
    }

    #[test]
    fn cursor_update_and_delete_in_place() {
        let (_txn, store) = cursor_fixture();
        let cursor = wait(store.open_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty store");
        assert_eq!(
            wait(cursor.update(record(1, "patched"))).unwrap(),
            Key::from(1i64)
        );
        assert_eq!(wait(cursor.continue_to(None)).unwrap(), CursorStep::Row);
        wait(cursor.delete()).unwrap();
        assert!(wait(store.get(Key::from(2i64))).unwrap().is_none());
        assert_eq!(
            wait(store.get(Key::from(1i64)))
                .unwrap()
                .and_then(|v| v.at_path("label").cloned()),
            Some(Datum::from("patched"))
        );
    }

    #[test]
    fn key_cursor_carries_no_value_and_rejects_writes() {
        let (_txn, store) = cursor_fixture();
        let cursor = wait(store.open_key_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty store");
        assert_eq!(cursor.key(), Some(Key::from(1i64)));
        assert!(cursor.value().is_none());
        assert!(matches!(
            wait(cursor.update(record(1, "x"))),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            wait(cursor.delete()),
            Err(EngineError::InvalidState { .. })
        ));
    }

    fn indexed_fixture() -> (MemoryEngine, Box<dyn HostConnection>) {
        let engine = MemoryEngine::new();
        let mut request = engine.open("db", 1);
        let (connection, txn) = match next(&mut request) {
            OpenEvent::UpgradeNeeded { connection, transaction, .. } => (connection, transaction),
            other => panic!("unexpected event: {other:?}"),
        };
        let store = connection
            .create_object_store("people", StoreOptions::new().key_path("id"))
            .unwrap();
        store.create_index("by_team", "team", IndexOptions::new()).unwrap();
        let rows = [
            (1i64, "red"),
            (2, "blue"),
            (3, "red"),
            (4, "blue"),
        ];
        for (id, team) in rows {
            let row = Datum::map([("id", Datum::from(id)), ("team", Datum::from(team))]);
            wait(store.put(row, None)).unwrap();
        }
        drop(store);
        wait(txn.commit()).unwrap();
        drop(connection);
        match next(&mut request) {
            OpenEvent::Success(connection) => (engine, connection),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn index_cursor_orders_by_index_key_then_primary() {
        let (_engine, connection) = indexed_fixture();
        let txn = connection
            .transaction(&["people"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("people").unwrap();
        let index = store.index("by_team").unwrap();

        let cursor = wait(index.open_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty index");
        let mut seen = vec![(cursor.key().unwrap(), cursor.primary_key().unwrap())];
        while wait(cursor.continue_to(None)).unwrap() == CursorStep::Row {
            seen.push((cursor.key().unwrap(), cursor.primary_key().unwrap()));
        }
        assert_eq!(
            seen,
            vec![
                (Key::from("blue"), Key::from(2i64)),
                (Key::from("blue"), Key::from(4i64)),
                (Key::from("red"), Key::from(1i64)),
                (Key::from("red"), Key::from(3i64)),
            ]
        );
    }

    #[test]
    fn unique_direction_visits_each_key_once() {
        let (_engine, connection) = indexed_fixture();
        let txn = connection
            .transaction(&["people"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("people").unwrap();
        let index = store.index("by_team").unwrap();

        let cursor = wait(index.open_cursor(None, Direction::NextUnique))
            .unwrap()
            .expect("non-empty index");
        assert_eq!(cursor.primary_key(), Some(Key::from(2i64)));
        assert_eq!(wait(cursor.continue_to(None)).unwrap(), CursorStep::Row);
        assert_eq!(cursor.key(), Some(Key::from("red")));
        assert_eq!(cursor.primary_key(), Some(Key::from(1i64)));
        assert_eq!(wait(cursor.continue_to(None)).unwrap(), CursorStep::Done);
    }

    #[test]
    fn continue_primary_key_seeks_within_a_key() {
        let (_engine, connection) = indexed_fixture();
        let txn = connection
            .transaction(&["people"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("people").unwrap();
        let index = store.index("by_team").unwrap();

        let cursor = wait(index.open_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty index");
        assert_eq!(
            wait(cursor.continue_primary_key(Key::from("red"), Key::from(3i64))).unwrap(),
            CursorStep::Row
        );
        assert_eq!(cursor.primary_key(), Some(Key::from(3i64)));
        // backward seek is rejected
        assert!(matches!(
            wait(cursor.continue_primary_key(Key::from("blue"), Key::from(2i64))),
            Err(EngineError::DataError { .. })
        ));
    }

    #[test]
    fn continue_primary_key_requires_index_and_non_unique() {
        let (_engine, connection) = indexed_fixture();
        let txn = connection
            .transaction(&["people"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("people").unwrap();

        let cursor = wait(store.open_cursor(None, Direction::Next))
            .unwrap()
            .expect("non-empty store");
        assert!(matches!(
            wait(cursor.continue_primary_key(Key::from(2i64), Key::from(2i64))),
            Err(EngineError::InvalidState { .. })
        ));

        let index = store.index("by_team").unwrap();
        let unique_cursor = wait(index.open_cursor(None, Direction::NextUnique))
            .unwrap()
            .expect("non-empty index");
        assert!(matches!(
            wait(unique_cursor.continue_primary_key(Key::from("red"), Key::from(1i64))),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn index_get_returns_first_match() {
        let (_engine, connection) = indexed_fixture();
        let txn = connection
            .transaction(&["people"], Mode::ReadOnly, Durability::Default)
            .unwrap();
        let store = txn.object_store("people").unwrap();
        let index = store.index("by_team").unwrap();
        assert_eq!(wait(index.get_key(Key::from("red"))).unwrap(), Some(Key::from(1i64)));
        assert_eq!(wait(index.count(None)).unwrap(), 4);
        assert_eq!(
            wait(index.get_all_keys(None, Some(2))).unwrap(),
            vec![Key::from(2i64), Key::from(4i64)]
        );
    }
}
