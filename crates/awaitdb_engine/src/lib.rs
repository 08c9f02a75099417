//! # AwaitDB Engine
//!
//! Host engine contract and reference implementation for AwaitDB.
//!
//! This crate defines the event-driven embedded-database API that the
//! `awaitdb_core` adapter layer sits on. A host engine owns storage,
//! transactions, and index maintenance; this crate only fixes the
//! shape of the contract:
//!
//! - A value model ([`Datum`]) and ordered key model ([`Key`],
//!   [`KeyRange`])
//! - Per-operation completions ([`HostRequest`]) and the multi-event
//!   open lifecycle ([`OpenRequest`])
//! - Object-safe host traits ([`HostEngine`] down to [`HostCursor`])
//! - [`MemoryEngine`], a complete in-memory host for testing and
//!   ephemeral use
//!
//! ## Example
//!
//! ```rust
//! use awaitdb_engine::{Datum, Key};
//!
//! let record = Datum::map([("id", Datum::from(7i64)), ("name", Datum::from("ada"))]);
//! assert_eq!(record.at_path("id").and_then(Datum::to_key), Some(Key::from(7i64)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod datum;
mod error;
mod key;
mod memory;
mod request;
pub mod traits;
mod types;

pub use datum::Datum;
pub use error::{EngineError, EngineResult};
pub use key::{Key, KeyRange};
pub use memory::MemoryEngine;
pub use request::{Completion, HostRequest, OpenEvent, OpenRequest, OpenSender};
pub use traits::{
    ConnectionHook, HostConnection, HostCursor, HostEngine, HostIndex, HostStore, HostTransaction,
};
pub use types::{
    CursorStep, DatabaseInfo, Direction, Durability, IndexOptions, Mode, StoreOptions,
};
