//! Cursor traversal over the in-memory engine.
//!
//! A cursor remembers only its current `(key, primary key)` pair plus
//! the value captured when it landed there. Every movement re-reads
//! the live store under the engine lock and searches for the next
//! position relative to the remembered pair, so records inserted or
//! deleted mid-traversal are picked up the way an ordered scan would
//! see them.

use super::state::StoreState;
use super::EngineShared;
use crate::datum::Datum;
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyRange};
use crate::request::HostRequest;
use crate::traits::HostCursor;
use crate::types::{CursorStep, Direction};
use parking_lot::Mutex;
use std::sync::Arc;

/// Opens a cursor; `Ok(None)` when nothing matches the range.
#[allow(clippy::too_many_arguments)]
pub(super) fn open(
    shared: &Arc<EngineShared>,
    db: &str,
    txn_id: u64,
    store: &str,
    index: Option<&str>,
    range: Option<KeyRange>,
    direction: Direction,
    with_value: bool,
) -> EngineResult<Option<Box<dyn HostCursor>>> {
    let cursor = MemoryCursor {
        shared: Arc::clone(shared),
        db: db.to_string(),
        txn_id,
        store: store.to_string(),
        index: index.map(str::to_string),
        range,
        direction,
        with_value,
        pos: Mutex::new(None),
    };
    let first = cursor.with_items(|seq, store_state| {
        Ok(seq.first().map(|(key, primary)| {
            let value = cursor.capture(store_state, primary);
            Position {
                key: key.clone(),
                primary: primary.clone(),
                value,
            }
        }))
    })?;
    match first {
        Some(position) => {
            *cursor.pos.lock() = Some(position);
            Ok(Some(Box::new(cursor)))
        }
        None => Ok(None),
    }
}

/// Current landing spot of a live cursor.
struct Position {
    key: Key,
    primary: Key,
    /// Captured at landing time; not refreshed by later writes.
    value: Option<Datum>,
}

struct MemoryCursor {
    shared: Arc<EngineShared>,
    db: String,
    txn_id: u64,
    store: String,
    index: Option<String>,
    range: Option<KeyRange>,
    direction: Direction,
    with_value: bool,
    /// `None` once the traversal is exhausted.
    pos: Mutex<Option<Position>>,
}

enum MoveOp {
    Advance(u32),
    Continue(Option<Key>),
    ContinuePrimary(Key, Key),
}

impl MemoryCursor {
    /// Reads the traversal sequence (direction-ordered, range
    /// filtered, deduplicated for unique directions) and hands it to
    /// `f` together with the store, all under one engine read lock.
    fn with_items<R>(
        &self,
        f: impl FnOnce(&[(Key, Key)], &StoreState) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let range = self.range.as_ref();
        let build = |items: Vec<(Key, Key)>, store_state: &StoreState| {
            let mut seq: Vec<(Key, Key)> = if self.direction.is_unique() {
                let mut out: Vec<(Key, Key)> = Vec::with_capacity(items.len());
                for item in items {
                    if out.last().is_none_or(|(k, _)| *k != item.0) {
                        out.push(item);
                    }
                }
                out
            } else {
                items
            };
            if self.direction.is_descending() {
                seq.reverse();
            }
            f(&seq, store_state)
        };
        match &self.index {
            Some(index) => self.shared.index_read(
                &self.db,
                self.txn_id,
                &self.store,
                index,
                |store_state, index_state| {
                    let items: Vec<(Key, Key)> = index_state
                        .entries
                        .iter()
                        .filter(|(k, _)| range.is_none_or(|r| r.contains(k)))
                        .cloned()
                        .collect();
                    build(items, store_state)
                },
            ),
            None => self
                .shared
                .store_read(&self.db, self.txn_id, &self.store, |store_state| {
                    let items: Vec<(Key, Key)> = store_state
                        .records
                        .keys()
                        .filter(|k| range.is_none_or(|r| r.contains(k)))
                        .map(|k| (k.clone(), k.clone()))
                        .collect();
                    build(items, store_state)
                }),
        }
    }

    fn capture(&self, store_state: &StoreState, primary: &Key) -> Option<Datum> {
        if self.with_value {
            store_state.records.get(primary).cloned()
        } else {
            None
        }
    }

    /// True when `candidate` lies strictly past `current` in
    /// traversal order.
    fn past(&self, candidate: &(Key, Key), current: &(Key, Key)) -> bool {
        match self.direction {
            Direction::Next => candidate > current,
            Direction::Prev => candidate < current,
            Direction::NextUnique => candidate.0 > current.0,
            Direction::PrevUnique => candidate.0 < current.0,
        }
    }

    /// True when `candidate` is at or past `target` in traversal
    /// order (key comparison only).
    fn reaches_key(&self, candidate: &Key, target: &Key) -> bool {
        if self.direction.is_descending() {
            candidate <= target
        } else {
            candidate >= target
        }
    }

    fn do_move(&self, op: MoveOp) -> HostRequest<CursorStep> {
        HostRequest::ready(self.try_move(op))
    }

    fn try_move(&self, op: MoveOp) -> EngineResult<CursorStep> {
        let mut pos = self.pos.lock();
        let current = match pos.as_ref() {
            Some(p) => (p.key.clone(), p.primary.clone()),
            None => {
                return Err(EngineError::invalid_state(
                    "cursor traversal already completed",
                ))
            }
        };

        let next = self.with_items(|seq, store_state| {
            let found: Option<&(Key, Key)> = match &op {
                MoveOp::Advance(count) => {
                    if *count == 0 {
                        return Err(EngineError::data("cannot advance by zero"));
                    }
                    seq.iter()
                        .filter(|item| self.past(item, &current))
                        .nth(*count as usize - 1)
                }
                MoveOp::Continue(None) => {
                    seq.iter().find(|item| self.past(item, &current))
                }
                MoveOp::Continue(Some(target)) => {
                    if !self.reaches_key(target, &current.0) || *target == current.0 {
                        return Err(EngineError::data(
                            "continue target is not past the current position",
                        ));
                    }
                    seq.iter().find(|(k, _)| self.reaches_key(k, target))
                }
                MoveOp::ContinuePrimary(key, primary) => {
                    if self.index.is_none() {
                        return Err(EngineError::invalid_state(
                            "continue by primary key requires an index cursor",
                        ));
                    }
                    if self.direction.is_unique() {
                        return Err(EngineError::invalid_state(
                            "continue by primary key requires a non-unique direction",
                        ));
                    }
                    let target = (key.clone(), primary.clone());
                    let backward = if self.direction.is_descending() {
                        target >= current
                    } else {
                        target <= current
                    };
                    if backward {
                        return Err(EngineError::data(
                            "continue target is not past the current position",
                        ));
                    }
                    seq.iter().find(|item| {
                        if self.direction.is_descending() {
                            **item <= target
                        } else {
                            **item >= target
                        }
                    })
                }
            };
            Ok(found.map(|(key, primary)| Position {
                key: key.clone(),
                primary: primary.clone(),
                value: self.capture(store_state, primary),
            }))
        })?;

        match next {
            Some(position) => {
                *pos = Some(position);
                Ok(CursorStep::Row)
            }
            None => {
                *pos = None;
                Ok(CursorStep::Done)
            }
        }
    }
}

impl HostCursor for MemoryCursor {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn key(&self) -> Option<Key> {
        self.pos.lock().as_ref().map(|p| p.key.clone())
    }

    fn primary_key(&self) -> Option<Key> {
        self.pos.lock().as_ref().map(|p| p.primary.clone())
    }

    fn value(&self) -> Option<Datum> {
        self.pos.lock().as_ref().and_then(|p| p.value.clone())
    }

    fn advance(&self, count: u32) -> HostRequest<CursorStep> {
        self.do_move(MoveOp::Advance(count))
    }

    fn continue_to(&self, key: Option<Key>) -> HostRequest<CursorStep> {
        self.do_move(MoveOp::Continue(key))
    }

    fn continue_primary_key(&self, key: Key, primary_key: Key) -> HostRequest<CursorStep> {
        self.do_move(MoveOp::ContinuePrimary(key, primary_key))
    }

    fn update(&self, value: Datum) -> HostRequest<Key> {
        let pos = self.pos.lock();
        let result = (|| {
            if !self.with_value {
                return Err(EngineError::invalid_state(
                    "key-only cursors cannot update",
                ));
            }
            let primary = pos
                .as_ref()
                .map(|p| p.primary.clone())
                .ok_or_else(|| {
                    EngineError::invalid_state("cursor traversal already completed")
                })?;
            self.shared
                .store_write(&self.db, self.txn_id, &self.store, |s| {
                    let explicit = match &s.key_path {
                        Some(path) => {
                            let extracted =
                                value.at_path(path).and_then(Datum::to_key);
                            if extracted.as_ref() != Some(&primary) {
                                return Err(EngineError::data(
                                    "updated value resolves to a different key",
                                ));
                            }
                            None
                        }
                        None => Some(primary.clone()),
                    };
                    s.put(value, explicit, false)
                })
        })();
        HostRequest::ready(result)
    }

    fn delete(&self) -> HostRequest<()> {
        let pos = self.pos.lock();
        let result = (|| {
            if !self.with_value {
                return Err(EngineError::invalid_state(
                    "key-only cursors cannot delete",
                ));
            }
            let primary = pos
                .as_ref()
                .map(|p| p.primary.clone())
                .ok_or_else(|| {
                    EngineError::invalid_state("cursor traversal already completed")
                })?;
            self.shared
                .store_write(&self.db, self.txn_id, &self.store, |s| {
                    s.remove(&primary);
                    Ok(())
                })
        })();
        HostRequest::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use crate::request::{OpenEvent, OpenRequest};
    use crate::traits::{HostConnection, HostEngine, HostIndex, HostStore, HostTransaction};
    use crate::types::{Durability, IndexOptions, Mode, StoreOptions};
    use futures_util::FutureExt;
    use proptest::prelude::*;

    fn next(request: &mut OpenRequest) -> OpenEvent {
        request
            .next_event()
            .now_or_never()
            .flatten()
            .expect("an event should be ready")
    }

    fn wait<T: Send + 'static>(request: HostRequest<T>) -> EngineResult<T> {
        let out = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&out);
        request.on_complete(move |result| {
            *sink.lock() = Some(result);
        });
        let settled = out.lock().take().expect("request should be settled");
        settled
    }

    /// Database "db" v1 with store "people" (key path "id", keys
    /// 1..=n) and non-unique index "by_age" on "age".
    fn people(ages: &[i64]) -> (MemoryEngine, Box<dyn HostConnection>) {
        let engine = MemoryEngine::new();
        let mut request = engine.open("db", 1);
        let (connection, txn) = match next(&mut request) {
            OpenEvent::UpgradeNeeded {
                connection,
                transaction,
                ..
            } => (connection, transaction),
            other => panic!("unexpected event: {other:?}"),
        };
        let store = connection
            .create_object_store("people", StoreOptions::new().key_path("id"))
            .unwrap();
        store
            .create_index("by_age", "age", IndexOptions::new())
            .unwrap();
        for (i, age) in ages.iter().enumerate() {
            let row = Datum::map([
                ("id", Datum::from(i as i64 + 1)),
                ("age", Datum::from(*age)),
            ]);
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

    fn walk(cursor: Option<Box<dyn HostCursor>>) -> Vec<(Key, Key)> {
        let mut seen = Vec::new();
        let Some(cursor) = cursor else {
            return seen;
        };
        seen.push((cursor.key().unwrap(), cursor.primary_key().unwrap()));
        while wait(cursor.continue_to(None)).unwrap() == CursorStep::Row {
            seen.push((cursor.key().unwrap(), cursor.primary_key().unwrap()));
        }
        seen
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn index_traversal_is_sorted_and_reversible(
            ages in proptest::collection::vec(-50i64..50, 1..20),
        ) {
            let (_engine, connection) = people(&ages);
            let txn = connection
                .transaction(&["people"], Mode::ReadOnly, Durability::Default)
                .unwrap();
            let store = txn.object_store("people").unwrap();
            let index = store.index("by_age").unwrap();

            let forward = walk(wait(index.open_cursor(None, Direction::Next)).unwrap());
            prop_assert_eq!(forward.len(), ages.len());
            for pair in forward.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }

            let mut backward = walk(wait(index.open_cursor(None, Direction::Prev)).unwrap());
            backward.reverse();
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn unique_traversal_visits_distinct_keys_in_order(
            ages in proptest::collection::vec(-50i64..50, 1..20),
        ) {
            let (_engine, connection) = people(&ages);
            let txn = connection
                .transaction(&["people"], Mode::ReadOnly, Durability::Default)
                .unwrap();
            let store = txn.object_store("people").unwrap();
            let index = store.index("by_age").unwrap();

            let mut distinct: Vec<i64> = ages.clone();
            distinct.sort_unstable();
            distinct.dedup();
            let expected: Vec<Key> = distinct.into_iter().map(Key::from).collect();

            let seen: Vec<Key> = walk(wait(index.open_cursor(None, Direction::NextUnique)).unwrap())
                .into_iter()
                .map(|(key, _)| key)
                .collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
