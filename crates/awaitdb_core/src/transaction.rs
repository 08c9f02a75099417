//! Transaction wrapper.

use crate::error::Result;
use crate::promise;
use crate::store::ObjectStore;
use awaitdb_engine::{Durability, EngineError, HostTransaction, Mode};

/// A bounded unit of work over one or more object stores.
///
/// The host auto-finalizes a transaction that is neither committed
/// nor aborted, but explicit [`Transaction::commit`] /
/// [`Transaction::abort`] is the discipline here: it is the only way
/// to observe completion as an awaitable outcome.
pub struct Transaction {
    host: Box<dyn HostTransaction>,
}

impl Transaction {
    pub(crate) fn new(host: Box<dyn HostTransaction>) -> Self {
        Self { host }
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.host.mode()
    }

    /// Durability preference.
    #[must_use]
    pub fn durability(&self) -> Durability {
        self.host.durability()
    }

    /// Stores this transaction was created over.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.host.store_names()
    }

    /// The error that terminated this transaction, if any.
    #[must_use]
    pub fn error(&self) -> Option<EngineError> {
        self.host.error()
    }

    /// Resolves a store facade scoped to this transaction.
    ///
    /// # Errors
    ///
    /// `NotFound` when `name` was not part of the set the transaction
    /// was created over.
    pub fn object_store(&self, name: &str) -> Result<ObjectStore> {
        Ok(ObjectStore::new(self.host.object_store(name)?))
    }

    /// Commits, resolving once every issued operation is durably
    /// applied.
    ///
    /// # Errors
    ///
    /// The host's error when the transaction could not complete.
    pub async fn commit(&self) -> Result<()> {
        promise::settle(self.host.commit()).await
    }

    /// Aborts, resolving once rollback completes.
    ///
    /// # Errors
    ///
    /// Only if the host reports an error during the abort itself.
    pub async fn abort(&self) -> Result<()> {
        promise::settle(self.host.abort()).await
    }
}
