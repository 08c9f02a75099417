//! Bridging host completions to futures.
//!
//! Every facade method funnels through [`settle`]: the one place
//! where a callback-based host completion becomes an awaitable
//! outcome. The host settles each request exactly once, so a oneshot
//! channel is the whole mechanism.

use crate::error::{Error, Result};
use awaitdb_engine::{EngineError, HostRequest};
use futures_channel::oneshot;

/// Awaits a host request's single completion.
pub(crate) async fn settle<T: Send + 'static>(request: HostRequest<T>) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    request.on_complete(move |result| {
        let _ = tx.send(result);
    });
    match rx.await {
        Ok(result) => result.map_err(Error::from),
        // The host dropped the completion without settling it; the
        // contract forbids this, but a vanished host reads best as a
        // closed connection.
        Err(oneshot::Canceled) => Err(Error::Host(EngineError::Closed)),
    }
}
