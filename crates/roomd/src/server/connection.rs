//! Per-connection handler.
//!
//! Each accepted socket gets its own `ConnectionHandler` task that owns
//! the connection end to end: it registers the client, reads and
//! reframes inbound bytes into complete wire lines, forwards decoded
//! frames to the router, and on any exit path unregisters the client
//! and announces its departure to the remaining peers.
//!
//! TCP gives no message boundaries, so the handler reads through a
//! bounded line reader: a frame split across two segments is
//! reassembled, and two frames arriving in one segment are delivered as
//! two frames. Malformed or oversized lines are dropped without
//! terminating the connection, and an oversized line is discarded as it
//! streams past rather than buffered, so a peer sending an endless
//! unterminated line cannot grow the relay's memory.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use room_protocol::Frame;

use crate::registry::{Client, ClientRegistry};

use super::router::RoomMessage;

/// Handler owning one accepted client connection.
pub struct ConnectionHandler {
    reader: BoundedLineReader<OwnedReadHalf>,
    client: Client,
    registry: ClientRegistry,
    intake: mpsc::Sender<RoomMessage>,
    max_frame_bytes: usize,
    cancel_token: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a handler for an accepted stream.
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        registry: ClientRegistry,
        intake: mpsc::Sender<RoomMessage>,
        max_frame_bytes: usize,
        cancel_token: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BoundedLineReader::new(read_half, max_frame_bytes),
            client: Client::new(peer_addr.to_string(), write_half),
            registry,
            intake,
            max_frame_bytes,
            cancel_token,
        }
    }

    /// Runs the handler to completion.
    ///
    /// Registers the client, processes frames until the connection
    /// closes (or shutdown is requested), then tears down. Read
    /// failures are expected connection-lost events and never propagate
    /// past this task.
    pub async fn run(mut self) {
        self.registry.register(self.client.clone()).await;
        info!(addr = %self.client.addr(), "Client connected");

        let result = self.read_loop().await;
        if let Err(e) = result {
            debug!(addr = %self.client.addr(), error = %e, "Connection lost");
        }

        self.teardown().await;
    }

    /// Reads complete wire lines and forwards decoded frames to the
    /// router until EOF, a read error, or cancellation.
    async fn read_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let read = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!(addr = %self.client.addr(), "Shutdown requested, closing connection");
                    return Ok(());
                }
                read = self.reader.next_line() => {
                    read.map_err(|e| ConnectionError::Io(e.to_string()))?
                }
            };

            let line = match read {
                LineRead::Eof => {
                    debug!(addr = %self.client.addr(), "Client sent EOF");
                    return Ok(());
                }
                LineRead::TooLong => {
                    // Frame-local failure: the line was discarded as it
                    // streamed past; the connection keeps going.
                    warn!(
                        addr = %self.client.addr(),
                        max = self.max_frame_bytes,
                        "Dropping oversized frame"
                    );
                    continue;
                }
                LineRead::Line(line) => line,
            };

            let frame = match Frame::decode_with_limit(&line, self.max_frame_bytes) {
                Ok(frame) => frame,
                Err(e) => {
                    // Frame-local failure: drop the line, keep the
                    // connection.
                    warn!(addr = %self.client.addr(), error = %e, "Dropping malformed frame");
                    continue;
                }
            };

            let msg = RoomMessage {
                from_addr: self.client.addr().to_string(),
                frame,
            };

            if self.intake.send(msg).await.is_err() {
                // Router gone: the relay is shutting down.
                debug!(addr = %self.client.addr(), "Intake queue closed");
                return Ok(());
            }
        }
    }

    /// Removes the client from the registry and announces its
    /// departure.
    ///
    /// The notice carries the departed client's own address as the
    /// exclusion key, so the router skips the dead socket and delivery
    /// failures to any one remaining peer stay best-effort.
    async fn teardown(self) {
        self.registry.unregister(self.client.addr()).await;
        info!(addr = %self.client.addr(), "Client disconnected");

        let notice = RoomMessage {
            from_addr: self.client.addr().to_string(),
            frame: Frame::room(format!("{} has disconnected.", self.client.addr())),
        };

        // Ignored during shutdown, when the router may already be gone.
        let _ = self.intake.send(notice).await;
    }
}

/// One read from a [`BoundedLineReader`].
#[derive(Debug)]
enum LineRead {
    /// One complete line, terminating newline included.
    Line(String),

    /// A line over the cap was consumed through its newline and
    /// discarded.
    TooLong,

    /// The stream ended. A partial line with no terminator is dropped.
    Eof,
}

/// Reframes a byte stream into newline-terminated lines while never
/// buffering more than the configured cap.
///
/// Once an accumulating line exceeds the cap, the buffered prefix is
/// released and the rest of the line is discarded chunk by chunk up to
/// and including its newline, keeping memory bounded regardless of how
/// many bytes the peer streams without a terminator.
struct BoundedLineReader<R> {
    reader: BufReader<R>,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> BoundedLineReader<R> {
    fn new(inner: R, max_line_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            max_line_bytes,
        }
    }

    /// Reads the next line from the stream.
    async fn next_line(&mut self) -> io::Result<LineRead> {
        let mut line: Vec<u8> = Vec::new();
        let mut discarding = false;

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(LineRead::Eof);
            }

            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let take = pos + 1;
                    let over = discarding || line.len() + take > self.max_line_bytes;
                    if !over {
                        line.extend_from_slice(&buf[..take]);
                    }
                    self.reader.consume(take);

                    if over {
                        return Ok(LineRead::TooLong);
                    }
                    return Ok(LineRead::Line(String::from_utf8_lossy(&line).into_owned()));
                }
                None => {
                    let take = buf.len();
                    if !discarding && line.len() + take > self.max_line_bytes {
                        discarding = true;
                        line = Vec::new();
                    }
                    if !discarding {
                        line.extend_from_slice(buf);
                    }
                    self.reader.consume(take);
                }
            }
        }
    }
}

/// Errors terminating a single connection. Never propagated beyond the
/// owning handler.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),
}
