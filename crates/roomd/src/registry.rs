//! Shared registry of currently connected clients.
//!
//! The registry is the one piece of shared mutable state in the relay:
//! every connection handler mutates it on connect/disconnect and the
//! router reads it on every broadcast. All access is serialized by a
//! single internal lock; the raw map is never exposed, so it cannot be
//! mutated mid-iteration. Broadcast writes happen on a [`snapshot`]
//! outside the lock, which bounds lock hold time to map operations.
//!
//! [`snapshot`]: ClientRegistry::snapshot

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Shared handle to a client's buffered write half.
///
/// The mutex serializes broadcast writes to one peer; the handle is
/// cloned into registry snapshots so the router can write without
/// touching the registry lock.
pub type ClientWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// One connected chat client.
///
/// Identity is the remote address string, unique per live connection
/// and not persisted across reconnects. The owning connection handler
/// holds the read half; the registry and router share the write half.
#[derive(Clone)]
pub struct Client {
    addr: String,
    writer: ClientWriter,
}

impl Client {
    /// Creates a client record from its remote address and write half.
    pub fn new(addr: impl Into<String>, writer: OwnedWriteHalf) -> Self {
        Self {
            addr: addr.into(),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
        }
    }

    /// Remote address string identifying this client.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Shared handle to this client's writer.
    pub fn writer(&self) -> &ClientWriter {
        &self.writer
    }

    /// Flushes and closes the write half. Best-effort; used during
    /// relay shutdown.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(addr = %self.addr, error = %e, "error closing client writer");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("addr", &self.addr).finish()
    }
}

/// Cheap-to-clone registry of connected clients, keyed by remote
/// address.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<String, Client>>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client. A client is present iff its connection is open
    /// and its handler has not yet removed it.
    pub async fn register(&self, client: Client) {
        let mut clients = self.clients.write().await;
        clients.insert(client.addr.clone(), client);
    }

    /// Removes the client with the given address, returning it if it
    /// was registered.
    pub async fn unregister(&self, addr: &str) -> Option<Client> {
        let mut clients = self.clients.write().await;
        clients.remove(addr)
    }

    /// Returns a consistent copy of the current client set.
    ///
    /// The copy is defensive: concurrent registration or removal after
    /// this call does not affect it, so callers can iterate and write
    /// to sockets without holding any lock.
    pub async fn snapshot(&self) -> Vec<Client> {
        let clients = self.clients.read().await;
        clients.values().cloned().collect()
    }

    /// Number of currently registered clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Returns `true` if no clients are registered.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Removes and returns all clients. Used during shutdown.
    pub async fn drain(&self) -> Vec<Client> {
        let mut clients = self.clients.write().await;
        clients.drain().map(|(_, client)| client).collect()
    }
}
