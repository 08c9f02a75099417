//! # AwaitDB Core
//!
//! Future-based adapter over an event-driven embedded-database host.
//!
//! A host engine (see [`awaitdb_engine`]) reports every operation
//! through one-shot callbacks and drives the open lifecycle through
//! an event stream. This crate turns that surface into ordinary async
//! Rust:
//!
//! - [`Database`] - open/upgrade state machine with a typed
//!   [`UpgradeHandler`] for schema migration
//! - [`Transaction`] - awaitable commit/abort over scoped stores
//! - [`ObjectStore`] / [`Index`] - one host request, one resolution,
//!   per call
//! - [`Cursor`] / [`KeyCursor`] - stateful key-ordered traversal
//! - [`Factory`] - enumeration and deletion
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use awaitdb_core::{
//!     Database, Datum, Key, MemoryEngine, Mode, Result, StoreOptions,
//!     UpgradeContext, UpgradeHandler,
//! };
//!
//! struct Schema;
//!
//! impl UpgradeHandler for Schema {
//!     async fn upgrade(&self, ctx: &UpgradeContext, _old: u64, _new: u64) -> Result<()> {
//!         ctx.create_object_store("books", StoreOptions::new().key_path("isbn"))?;
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let db = Database::new(Arc::new(MemoryEngine::new()), "library", 1, Schema);
//! db.open().await?;
//!
//! let txn = db.transaction(&["books"], Mode::ReadWrite)?;
//! let books = txn.object_store("books")?;
//! books
//!     .add(Datum::map([
//!         ("isbn", Datum::from("0-201-03801-3")),
//!         ("title", Datum::from("The Art of Computer Programming")),
//!     ]))
//!     .await?;
//! txn.commit().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod database;
mod error;
mod factory;
mod index;
mod promise;
mod store;
mod transaction;

pub use cursor::{Cursor, KeyCursor};
pub use database::{Database, UpgradeContext, UpgradeHandler};
pub use error::{Error, Result};
pub use factory::Factory;
pub use index::Index;
pub use store::ObjectStore;
pub use transaction::Transaction;

// Host-contract types that appear in this crate's public API.
pub use awaitdb_engine::{
    CursorStep, DatabaseInfo, Datum, Direction, Durability, EngineError, HostEngine, IndexOptions,
    Key, KeyRange, MemoryEngine, Mode, StoreOptions,
};
