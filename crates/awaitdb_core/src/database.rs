//! Database handle and the open/upgrade state machine.
//!
//! `open` drives a single attempt from "not connected" to either a
//! live connection or a rejection, sequencing the version-change
//! transaction in between. The host reports the attempt as a stream
//! of events; four outcomes race:
//!
//! - success: capture the connection, arm the long-lived hooks,
//!   resolve;
//! - upgrade needed: run the handler's upgrade hook against the
//!   version-change transaction, commit on success, abort on failure,
//!   then keep consuming events until the terminal one;
//! - blocked: reject immediately (the host request stays pending on
//!   its own and is not retried);
//! - error: reject, with the remembered hook error taking precedence
//!   over whatever the host reports.
//!
//! The precedence rule also covers the contradiction case: a host
//! that reports success after the hook failed must still surface the
//! hook's error, never success.

use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::transaction::Transaction;
use awaitdb_engine::{
    Durability, EngineError, HostConnection, HostEngine, Mode, OpenEvent, StoreOptions,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Caller-supplied schema and lifecycle logic for one database.
///
/// [`UpgradeHandler::upgrade`] is the mandatory part: it runs inside
/// the version-change transaction whenever an open finds a lower
/// stored version (0 on first creation). The two notification hooks
/// default to no-ops and are armed on the live connection after a
/// successful open.
///
/// # Example
///
/// ```rust
/// use awaitdb_core::{Result, StoreOptions, UpgradeContext, UpgradeHandler};
///
/// struct Schema;
///
/// impl UpgradeHandler for Schema {
///     async fn upgrade(&self, ctx: &UpgradeContext, _old: u64, _new: u64) -> Result<()> {
///         ctx.create_object_store("books", StoreOptions::new().key_path("isbn"))?;
///         Ok(())
///     }
/// }
/// ```
pub trait UpgradeHandler: Send + Sync + 'static {
    /// Performs schema and data migration from `old_version` to
    /// `new_version`.
    ///
    /// Runs exactly once per open attempt that needs it, before the
    /// open resolves. Must not create transactions of its own; all
    /// work goes through `ctx`. Returning an error rolls the
    /// version-change transaction back and fails the open with
    /// [`Error::UpgradeFailed`].
    fn upgrade(
        &self,
        ctx: &UpgradeContext,
        old_version: u64,
        new_version: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Called when the host severs the connection without a `close`
    /// call. Not called on orderly close.
    fn unexpected_close(&self) {}

    /// Called when another handle starts a version change or
    /// deletion on this database. Closing promptly lets it proceed.
    fn version_change(&self) {}
}

/// The window during which schema may be mutated.
///
/// Valid only while the version-change transaction is active; the
/// host answers `InvalidState` outside that window.
pub struct UpgradeContext {
    connection: Box<dyn HostConnection>,
    transaction: Transaction,
    old_version: u64,
    new_version: u64,
}

impl UpgradeContext {
    /// Version stored before this open (0 on first creation).
    #[must_use]
    pub fn old_version(&self) -> u64 {
        self.old_version
    }

    /// Version being upgraded to.
    #[must_use]
    pub fn new_version(&self) -> u64 {
        self.new_version
    }

    /// The version-change transaction, for data migration over
    /// existing stores.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Creates an object store.
    ///
    /// # Errors
    ///
    /// `SchemaConflict` on a duplicate name.
    pub fn create_object_store(&self, name: &str, options: StoreOptions) -> Result<ObjectStore> {
        Ok(ObjectStore::new(
            self.connection.create_object_store(name, options)?,
        ))
    }

    /// Deletes an object store and everything in it.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown name.
    pub fn delete_object_store(&self, name: &str) -> Result<()> {
        Ok(self.connection.delete_object_store(name)?)
    }
}

/// A handle to one named database at one target version.
///
/// The handle owns at most one live connection; `open` establishes
/// it, `close` releases it. Handles are independent: two handles to
/// the same name behave like two separate clients, including blocking
/// each other's upgrades.
pub struct Database<H: UpgradeHandler> {
    engine: Arc<dyn HostEngine>,
    name: String,
    version: u64,
    handler: Arc<H>,
    connection: Mutex<Option<Box<dyn HostConnection>>>,
}

impl<H: UpgradeHandler> Database<H> {
    /// Creates a closed handle for `name` at `version`.
    pub fn new(
        engine: Arc<dyn HostEngine>,
        name: impl Into<String>,
        version: u64,
        handler: H,
    ) -> Self {
        Self {
            engine,
            name: name.into(),
            version,
            handler: Arc::new(handler),
            connection: Mutex::new(None),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a live connection is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Version of the live connection; `None` while closed.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.connection.lock().as_ref().map(|conn| conn.version())
    }

    /// Names of the object stores in the schema; empty while closed.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.connection
            .lock()
            .as_ref()
            .map_or_else(Vec::new, |conn| conn.object_store_names())
    }

    /// Opens the database, upgrading it first when the stored version
    /// is lower than this handle's target.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyOpen`] synchronously when connected;
    /// [`Error::Blocked`] when another connection holds the database
    /// at a lower version; [`Error::UpgradeFailed`] carrying the
    /// hook's error when the upgrade hook fails, regardless of what
    /// the host reports afterwards; the host's error otherwise. Every
    /// rejection leaves the handle closed.
    pub async fn open(&self) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        debug!(database = %self.name, version = self.version, "opening database");

        let mut request = self.engine.open(&self.name, self.version);
        let mut upgrade_error: Option<Error> = None;
        loop {
            let event = request.next_event().await.ok_or_else(|| {
                Error::Host(EngineError::invalid_state(
                    "host ended the open request without a terminal event",
                ))
            })?;
            match event {
                OpenEvent::Blocked => {
                    debug!(database = %self.name, "open blocked");
                    return Err(Error::Blocked);
                }
                OpenEvent::Error(error) => {
                    debug!(database = %self.name, %error, "open failed");
                    return Err(match upgrade_error.take() {
                        Some(hook_error) => Error::upgrade_failed(hook_error),
                        None => Error::Host(error),
                    });
                }
                OpenEvent::UpgradeNeeded {
                    connection,
                    old_version,
                    new_version,
                    transaction,
                } => {
                    debug!(
                        database = %self.name,
                        old_version,
                        new_version,
                        "running upgrade hook"
                    );
                    let ctx = UpgradeContext {
                        connection,
                        transaction: Transaction::new(transaction),
                        old_version,
                        new_version,
                    };
                    match self.handler.upgrade(&ctx, old_version, new_version).await {
                        Ok(()) => {
                            // The terminal event carries the real
                            // outcome; a commit rejection here means
                            // the hook already finished the
                            // transaction itself.
                            let _ = ctx.transaction.commit().await;
                        }
                        Err(hook_error) => {
                            warn!(
                                database = %self.name,
                                error = %hook_error,
                                "upgrade hook failed, aborting version change"
                            );
                            upgrade_error = Some(hook_error);
                            // The host does not abort on its own.
                            let _ = ctx.transaction.abort().await;
                        }
                    }
                }
                OpenEvent::Success(connection) => {
                    if let Some(hook_error) = upgrade_error.take() {
                        // Host-reported success after a failed hook
                        // must not surface as success.
                        connection.close();
                        return Err(Error::upgrade_failed(hook_error));
                    }
                    self.arm_hooks(connection.as_ref());
                    debug!(
                        database = %self.name,
                        version = connection.version(),
                        "database open"
                    );
                    *self.connection.lock() = Some(connection);
                    return Ok(());
                }
            }
        }
    }

    /// Closes the connection. Idempotent; a closed handle stays
    /// closed.
    pub fn close(&self) {
        if let Some(connection) = self.connection.lock().take() {
            debug!(database = %self.name, "closing database");
            connection.close();
        }
    }

    /// Begins a transaction over the named stores with default
    /// durability.
    ///
    /// # Errors
    ///
    /// `Closed` while no connection is held; `NotFound` when a named
    /// store does not exist.
    pub fn transaction(&self, store_names: &[&str], mode: Mode) -> Result<Transaction> {
        self.transaction_with_durability(store_names, mode, Durability::Default)
    }

    /// Begins a transaction with an explicit durability preference.
    pub fn transaction_with_durability(
        &self,
        store_names: &[&str],
        mode: Mode,
        durability: Durability,
    ) -> Result<Transaction> {
        let guard = self.connection.lock();
        let connection = guard.as_ref().ok_or(Error::Host(EngineError::Closed))?;
        Ok(Transaction::new(connection.transaction(
            store_names,
            mode,
            durability,
        )?))
    }

    fn arm_hooks(&self, connection: &dyn HostConnection) {
        let handler = Arc::clone(&self.handler);
        connection.set_close_hook(Box::new(move || handler.unexpected_close()));
        let handler = Arc::clone(&self.handler);
        connection.set_version_change_hook(Box::new(move || handler.version_change()));
    }
}

impl<H: UpgradeHandler> Drop for Database<H> {
    fn drop(&mut self) {
        self.close();
    }
}
