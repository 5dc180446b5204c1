//! The message routing loop.
//!
//! The router is the single consumer of the intake queue. Connection
//! handlers push decoded frames onto the queue; the router fans each
//! one out to every registered client except the sender. It is the only
//! place fan-out happens, so delivery of one message is never
//! interleaved with another.

use std::io;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use room_protocol::Frame;

use crate::registry::{ClientRegistry, ClientWriter};

/// Bound on a single broadcast write, so one unresponsive peer cannot
/// stall delivery to everyone else.
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// One inbound message queued for fan-out.
///
/// `from_addr` identifies the originating connection; exclusion from
/// the broadcast is by this address, never by payload contents.
#[derive(Debug)]
pub struct RoomMessage {
    /// Remote address of the connection this message came from.
    pub from_addr: String,

    /// The decoded wire frame to re-transmit.
    pub frame: Frame,
}

/// Single-consumer fan-out loop over the intake queue.
pub struct Router {
    registry: ClientRegistry,
    intake: mpsc::Receiver<RoomMessage>,
}

impl Router {
    /// Creates a router reading from `intake` and broadcasting to the
    /// clients in `registry`.
    pub fn new(registry: ClientRegistry, intake: mpsc::Receiver<RoomMessage>) -> Self {
        Self { registry, intake }
    }

    /// Runs the routing loop.
    ///
    /// Processes messages strictly one at a time in queue arrival
    /// order. Returns only when the intake channel closes, which
    /// happens during relay shutdown once the server and all handlers
    /// have dropped their senders.
    pub async fn run(mut self) {
        info!("Router started");

        while let Some(msg) = self.intake.recv().await {
            self.broadcast(msg).await;
        }

        info!("Router stopped: intake queue closed");
    }

    /// Delivers one message to every registered client except its
    /// sender.
    ///
    /// Writes use a snapshot of the registry taken outside the
    /// registry lock. A failed write to one peer is logged and skipped;
    /// tearing that peer down is its own handler's job (its next read
    /// will fail), never the router's.
    async fn broadcast(&self, msg: RoomMessage) {
        let encoded = msg.frame.encode();
        let peers = self.registry.snapshot().await;

        debug!(
            from = %msg.from_addr,
            sender = %msg.frame.sender,
            peers = peers.len(),
            "Broadcasting frame"
        );

        for peer in &peers {
            if peer.addr() == msg.from_addr {
                continue;
            }

            if let Err(e) = write_all(peer.writer(), encoded.as_bytes()).await {
                debug!(
                    peer = %peer.addr(),
                    error = %e,
                    "Failed to deliver frame to peer"
                );
            }
        }
    }
}

/// Writes and flushes one encoded frame to a client, bounded by
/// [`WRITE_TIMEOUT`].
pub(crate) async fn write_all(writer: &ClientWriter, bytes: &[u8]) -> io::Result<()> {
    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(bytes).await?;
        writer.flush().await
    })
    .await
    {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
    }
}
