//! Factory: enumeration, deletion, and handle construction.

use crate::database::{Database, UpgradeHandler};
use crate::error::{Error, Result};
use crate::promise;
use awaitdb_engine::{DatabaseInfo, EngineError, HostEngine};
use std::sync::Arc;
use tracing::debug;

/// Entry point over one host engine.
///
/// Handles are constructed with their name, target version, and
/// upgrade handler spelled out per call; no process-wide bookkeeping
/// ties handles to each other.
pub struct Factory {
    engine: Arc<dyn HostEngine>,
}

impl Factory {
    /// Wraps a host engine.
    pub fn new(engine: Arc<dyn HostEngine>) -> Self {
        Self { engine }
    }

    /// Creates a closed database handle.
    pub fn database<H: UpgradeHandler>(
        &self,
        name: impl Into<String>,
        version: u64,
        handler: H,
    ) -> Database<H> {
        Database::new(Arc::clone(&self.engine), name, version, handler)
    }

    /// Lists existing databases with their stored versions.
    pub async fn databases(&self) -> Result<Vec<DatabaseInfo>> {
        promise::settle(self.engine.databases()).await
    }

    /// Deletes a database.
    ///
    /// # Errors
    ///
    /// [`Error::Blocked`] while other connections hold the database
    /// open; as with a blocked open, the underlying deletion stays
    /// pending host-side and proceeds once the last connection
    /// closes.
    pub async fn delete_database(&self, name: &str) -> Result<()> {
        debug!(database = name, "deleting database");
        match promise::settle(self.engine.delete_database(name)).await {
            Err(Error::Host(EngineError::Blocked)) => Err(Error::Blocked),
            other => other,
        }
    }
}
