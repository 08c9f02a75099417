//! One-shot request completions and the multi-event open request.
//!
//! Every host operation that finishes reports through a pair of
//! mutually exclusive one-shot outcomes. [`HostRequest`] models that
//! pair as a single completion slot: the engine settles it exactly
//! once, the consumer registers a callback exactly once, and both
//! sides enforce this by move semantics. Whichever side arrives
//! second triggers delivery, so the scheme works whether the engine
//! completes before or after the consumer registers.
//!
//! Opening a database is the one operation with more than one event:
//! an upgrade interleaves `UpgradeNeeded` between the request and its
//! terminal outcome. [`OpenRequest`] therefore carries an ordered
//! event stream instead of a single completion.

use crate::error::{EngineError, EngineResult};
use crate::traits::{HostConnection, HostTransaction};
use futures_channel::mpsc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;

type Callback<T> = Box<dyn FnOnce(EngineResult<T>) + Send>;

enum Slot<T> {
    Empty,
    Settled(EngineResult<T>),
    Armed(Callback<T>),
    Delivered,
}

/// A one-shot completion for a single host operation.
///
/// Consume with [`HostRequest::on_complete`]; the registered callback
/// fires exactly once with the operation's outcome.
pub struct HostRequest<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

/// The engine-side half of a [`HostRequest`].
pub struct Completion<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> HostRequest<T> {
    /// Creates an unsettled request and its completion half.
    #[must_use]
    pub fn channel() -> (Self, Completion<T>) {
        let slot = Arc::new(Mutex::new(Slot::Empty));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            Completion { slot },
        )
    }

    /// Creates a request that is already settled.
    #[must_use]
    pub fn ready(result: EngineResult<T>) -> Self {
        let (request, completion) = Self::channel();
        completion.settle(result);
        request
    }

    /// Registers the completion callback.
    ///
    /// If the request is already settled the callback runs
    /// immediately; otherwise it runs when the engine settles the
    /// request. Consuming `self` makes re-arming impossible.
    pub fn on_complete(self, callback: impl FnOnce(EngineResult<T>) + Send + 'static) {
        let pending = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Delivered) {
                Slot::Settled(result) => Some(result),
                Slot::Empty => {
                    *slot = Slot::Armed(Box::new(callback));
                    return;
                }
                // channel() hands out exactly one request half, so the
                // slot cannot already be armed or delivered here.
                Slot::Armed(_) | Slot::Delivered => None,
            }
        };
        if let Some(result) = pending {
            callback(result);
        }
    }
}

impl<T> Completion<T> {
    /// Settles the request with its outcome.
    ///
    /// Delivery happens inline when a callback is already registered.
    pub fn settle(self, result: EngineResult<T>) {
        let callback = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Delivered) {
                Slot::Armed(callback) => Some(callback),
                Slot::Empty => {
                    *slot = Slot::Settled(result);
                    return;
                }
                Slot::Settled(_) | Slot::Delivered => None,
            }
        };
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

/// One event in the life of an open request.
pub enum OpenEvent {
    /// The open finished; the live connection is attached.
    Success(Box<dyn HostConnection>),
    /// The stored version is below the requested one. The host has
    /// begun a version-change transaction; schema mutation is only
    /// valid until that transaction finishes.
    UpgradeNeeded {
        /// Connection being upgraded.
        connection: Box<dyn HostConnection>,
        /// Version stored before this open (0 on first creation).
        old_version: u64,
        /// Version being upgraded to.
        new_version: u64,
        /// The version-change transaction.
        transaction: Box<dyn HostTransaction>,
    },
    /// Another connection holds the database at a lower version. The
    /// request stays alive host-side and continues once unblocked.
    Blocked,
    /// The open failed.
    Error(EngineError),
}

impl std::fmt::Debug for OpenEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(_) => f.write_str("Success"),
            Self::UpgradeNeeded {
                old_version,
                new_version,
                ..
            } => write!(f, "UpgradeNeeded({old_version} -> {new_version})"),
            Self::Blocked => f.write_str("Blocked"),
            Self::Error(error) => write!(f, "Error({error})"),
        }
    }
}

/// An in-flight open request.
///
/// Yields [`OpenEvent`]s in host order. The stream ends after a
/// terminal event, except for `Blocked`, after which the host side
/// may push further events that the consumer is free to ignore.
pub struct OpenRequest {
    events: mpsc::UnboundedReceiver<OpenEvent>,
}

/// The engine-side sender for an open request's events.
#[derive(Clone)]
pub struct OpenSender {
    events: mpsc::UnboundedSender<OpenEvent>,
}

impl OpenRequest {
    /// Creates an open request and its event sender.
    #[must_use]
    pub fn channel() -> (OpenSender, Self) {
        let (tx, rx) = mpsc::unbounded();
        (OpenSender { events: tx }, Self { events: rx })
    }

    /// Waits for the next open event.
    ///
    /// Returns `None` if the host side has gone away without a
    /// terminal event.
    pub async fn next_event(&mut self) -> Option<OpenEvent> {
        self.events.next().await
    }
}

impl OpenSender {
    /// Pushes an event toward the consumer.
    ///
    /// When the consumer has dropped the request the event comes back
    /// as the error value, so the engine can unwind whatever it would
    /// have handed over (and dispose of any handles it carries at a
    /// point of its own choosing).
    pub fn send(&self, event: OpenEvent) -> Result<(), OpenEvent> {
        self.events
            .unbounded_send(event)
            .map_err(|err| err.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn settle_then_register_delivers() {
        let request = HostRequest::ready(Ok(7u32));
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        request.on_complete(move |result| {
            seen2.store(result.unwrap(), Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn register_then_settle_delivers() {
        let (request, completion) = HostRequest::<u32>::channel();
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        request.on_complete(move |result| {
            seen2.store(result.unwrap(), Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        completion.settle(Ok(42));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn errors_pass_through() {
        let request = HostRequest::<()>::ready(Err(EngineError::Blocked));
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        request.on_complete(move |result| {
            if matches!(result, Err(EngineError::Blocked)) {
                seen2.store(1, Ordering::SeqCst);
            }
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_sender_reports_dropped_consumer() {
        let (sender, request) = OpenRequest::channel();
        assert!(sender.send(OpenEvent::Blocked).is_ok());
        drop(request);
        assert!(sender.send(OpenEvent::Blocked).is_err());
    }
}
