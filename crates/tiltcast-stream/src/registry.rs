//! Registry of connected clients.
//!
//! Each connection task creates a [`ClientHandle`] / [`ClientMailbox`]
//! pair with [`channel`], registers the handle, and drains the mailbox
//! into its socket. The broadcast loop only ever sees handles: it takes
//! a [`snapshot`](ClientRegistry::snapshot), pushes the tick's frame into
//! each handle's bounded queue, and asks failing clients to tear down.
//!
//! Removal belongs to the connection task. [`ClientRegistry::register`]
//! returns a [`Registration`] guard that removes the entry when dropped,
//! so every exit path of the task (return, error, cancellation)
//! unregisters exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Default number of frames buffered per client.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

/// Unique identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a new time-ordered identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a send to a client failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection task is gone.
    #[error("client connection closed")]
    Closed,
    /// The client's queue stayed full for the whole send timeout.
    #[error("client send timed out after {0:?}")]
    TimedOut(Duration),
}

/// Sending side of a client connection, held by the registry.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    outbound: mpsc::Sender<Utf8Bytes>,
    teardown: Arc<Notify>,
}

impl ClientHandle {
    /// Identity of the connection.
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Queue one frame for the client, waiting at most `timeout` for room.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the connection task has exited and
    /// [`SendError::TimedOut`] if the queue stayed full.
    pub async fn send(&self, frame: Utf8Bytes, timeout: Duration) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.outbound.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::TimedOut(timeout)),
        }
    }

    /// Ask the connection task to close the socket and exit.
    ///
    /// Idempotent; the request is remembered if the task is not
    /// currently waiting for it.
    pub fn close(&self) {
        self.teardown.notify_one();
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Receiving side of a client connection, owned by the connection task.
#[derive(Debug)]
pub struct ClientMailbox {
    frames: mpsc::Receiver<Utf8Bytes>,
    teardown: Arc<Notify>,
}

impl ClientMailbox {
    /// Next queued frame, or `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<Utf8Bytes> {
        self.frames.recv().await
    }

    /// The teardown signal, for waiting on alongside [`recv`](Self::recv).
    pub fn teardown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.teardown)
    }
}

/// Create a connected handle/mailbox pair with room for `capacity` frames.
pub fn channel(capacity: usize) -> (ClientHandle, ClientMailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let teardown = Arc::new(Notify::new());
    (
        ClientHandle {
            id: ClientId::new(),
            outbound: tx,
            teardown: Arc::clone(&teardown),
        },
        ClientMailbox {
            frames: rx,
            teardown,
        },
    )
}

/// Concurrency-safe set of connected clients keyed by [`ClientId`].
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client. Returns `false` if the id was already present, in
    /// which case the registry is unchanged.
    pub fn add(&self, handle: ClientHandle) -> bool {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        match clients.entry(handle.id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Remove a client. Returns `false` if it was not present.
    pub fn remove(&self, id: ClientId) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Point-in-time copy of every registered handle.
    ///
    /// The copy is independent of the registry, so callers may iterate
    /// and await while connections come and go.
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Whether a client is registered.
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a client and return a guard that removes it on drop.
    pub fn register(self: &Arc<Self>, handle: ClientHandle) -> Registration {
        let id = handle.id;
        self.add(handle);
        Registration {
            registry: Arc::clone(self),
            id,
        }
    }
}

/// Removes its client from the registry when dropped.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ClientRegistry>,
    id: ClientId,
}

impl Registration {
    /// The registered client.
    pub const fn id(&self) -> ClientId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
