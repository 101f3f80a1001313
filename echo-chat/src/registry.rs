//! Server-side bookkeeping for live client connections.

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};
use tracing::{debug, warn};

use crate::error::{ChatError, Result};

pub type ConnectionId = u64;

/// Messages a connection may have queued before it counts as lagging and
/// is dropped.
pub const OUTBOUND_CAPACITY: usize = 128;

/// Work queued for a connection's socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Message(String),
    Close,
}

/// The receiving end of a connection's outbound traffic, owned by its
/// socket task.
pub(crate) struct OutboundQueue {
    pub(crate) messages: mpsc::Receiver<Outbound>,
    /// Flips to `true` when the connection overflowed its queue.
    pub(crate) evicted: watch::Receiver<bool>,
}

/// One accepted client plus the state the server keeps about it.
///
/// Outbound traffic goes through a bounded FIFO queue drained by the
/// connection's own task, so `send` never blocks and a reply queued before
/// `close` is written before the socket shuts down. A connection whose queue
/// fills up is evicted instead of holding memory for a peer that stopped
/// reading.
pub struct ClientConnection {
    id: ConnectionId,
    peer: SocketAddr,
    login_id: OnceLock<String>,
    outbound: mpsc::Sender<Outbound>,
    evict: watch::Sender<bool>,
}

impl ClientConnection {
    pub(crate) fn new(id: ConnectionId, peer: SocketAddr) -> (Arc<Self>, OutboundQueue) {
        let (outbound, messages) = mpsc::channel(OUTBOUND_CAPACITY);
        let (evict, evicted) = watch::channel(false);
        let connection = Arc::new(Self {
            id,
            peer,
            login_id: OnceLock::new(),
            outbound,
            evict,
        });
        (connection, OutboundQueue { messages, evicted })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn login_id(&self) -> Option<&str> {
        self.login_id.get().map(String::as_str)
    }

    /// Records the login id. Write-once: a second call fails and leaves the
    /// first value in place.
    pub fn set_login_id(&self, login_id: impl Into<String>) -> Result<()> {
        self.login_id
            .set(login_id.into())
            .map_err(|_| ChatError::LoginAlreadySet)
    }

    /// Queues `message`. A full queue evicts the connection.
    pub fn send(&self, message: impl Into<String>) -> Result<()> {
        self.enqueue(Outbound::Message(message.into()))
    }

    /// Asks the connection task to flush pending messages and shut down.
    pub fn close(&self) {
        if let Err(err) = self.enqueue(Outbound::Close) {
            debug!(id = self.id, %err, "close requested on finished connection");
        }
    }

    pub fn is_evicted(&self) -> bool {
        *self.evict.borrow()
    }

    fn enqueue(&self, item: Outbound) -> Result<()> {
        match self.outbound.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                if !self.evict.send_replace(true) {
                    warn!(connection = %self, "outbound queue full; dropping connection");
                }
                Err(ChatError::Lagging)
            }
            Err(TrySendError::Closed(_)) => Err(ChatError::ConnectionClosed),
        }
    }
}

impl fmt::Display for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.peer, self.id)
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("login_id", &self.login_id())
            .finish()
    }
}

/// The set of connections the server currently knows about.
///
/// Cloning shares the same set. Broadcast works on a snapshot taken under
/// the lock, so connects and disconnects during a fan-out never disturb it.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<ConnectionId, Arc<ClientConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Arc<ClientConnection>) {
        self.lock().insert(connection.id(), connection);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.lock().values().cloned().collect()
    }

    /// Queues `message` on every registered connection and returns how many
    /// accepted it. Connections that finished mid-broadcast are skipped.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut delivered = 0;
        for connection in self.snapshot() {
            if connection.is_evicted() {
                continue;
            }
            match connection.send(message) {
                Ok(()) => delivered += 1,
                Err(err) => debug!(%connection, %err, "skipping connection during broadcast"),
            }
        }
        delivered
    }

    pub fn close_all(&self) {
        for connection in self.snapshot() {
            connection.close();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<ClientConnection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
