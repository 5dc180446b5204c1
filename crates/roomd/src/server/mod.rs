//! TCP relay server: acceptor, connection handlers and the router.
//!
//! ```text
//! ┌──────────────┐
//! │ RelayServer  │
//! │ (TcpListener)│
//! └──────┬───────┘
//!        │ accept()
//!        ▼
//! ┌───────────────────┐  RoomMessage   ┌──────────┐
//! │ ConnectionHandler │───────────────▶│  Router  │
//! │   (per client)    │    (mpsc)      └────┬─────┘
//! └───────────────────┘                     │ fan-out
//!                                           ▼
//!                                    all other clients
//! ```
//!
//! Lifecycle: `bind` → `run` (accepting) → cancellation →
//! bounded-deadline shutdown. Binding failure and a shutdown overrun
//! are the only process-fatal errors; everything per-connection or
//! per-message is contained where it happens.

mod connection;
mod router;

pub use connection::{ConnectionError, ConnectionHandler};
pub use router::{RoomMessage, Router};

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::registry::ClientRegistry;

/// Capacity of the router intake queue.
const INTAKE_BUFFER: usize = 256;

/// The chat relay server.
///
/// Owns the listener, the client registry and the cancellation token;
/// `run` drives the accept loop and the router until shutdown.
pub struct RelayServer {
    listener: TcpListener,
    registry: ClientRegistry,
    cancel_token: CancellationToken,
    max_frame_bytes: usize,
    shutdown_deadline: Duration,
}

impl RelayServer {
    /// Binds the listen address from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::StartFailure`] if the address is invalid
    /// or already bound. This is fatal: the relay never starts.
    pub async fn bind(
        config: &Config,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_addr).await.map_err(|e| {
            ServerError::StartFailure {
                addr: config.listen_addr.clone(),
                error: e.to_string(),
            }
        })?;

        Ok(Self {
            listener,
            registry: ClientRegistry::new(),
            cancel_token,
            max_frame_bytes: config.max_frame_bytes,
            shutdown_deadline: config.shutdown_deadline,
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The server's client registry handle.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Runs the relay until the cancellation token fires, then shuts
    /// down within the configured deadline.
    ///
    /// Cancelling an already-cancelled token is a no-op, so shutdown is
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ShutdownTimeout`] if teardown overruns
    /// the deadline.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            listener,
            registry,
            cancel_token,
            max_frame_bytes,
            shutdown_deadline,
        } = self;

        match listener.local_addr() {
            Ok(addr) => info!(%addr, "Relay listening"),
            Err(_) => info!("Relay listening"),
        }

        let (intake_tx, intake_rx) = mpsc::channel(INTAKE_BUFFER);
        let router = Router::new(registry.clone(), intake_rx);
        let router_task = tokio::spawn(router.run());

        // Accept until cancelled. Accept errors are transient: log and
        // keep listening.
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Relay shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let handler = ConnectionHandler::new(
                                stream,
                                peer_addr,
                                registry.clone(),
                                intake_tx.clone(),
                                max_frame_bytes,
                                cancel_token.clone(),
                            );
                            tokio::spawn(handler.run());
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        // Closing the listener is the shutdown trigger for the
        // acceptor; dropping it here closes it.
        drop(listener);
        drop(intake_tx);

        let cleanup = async {
            // Handlers have seen the cancellation and are tearing
            // themselves down; closing the writers hurries along any
            // peer still connected.
            for client in registry.drain().await {
                client.close().await;
            }

            // The router ends once every handler has dropped its
            // intake sender.
            if let Err(e) = router_task.await {
                error!(error = %e, "Router task failed");
            }
        };

        match timeout(shutdown_deadline, cleanup).await {
            Ok(()) => {
                info!("Relay stopped");
                Ok(())
            }
            Err(_) => Err(ServerError::ShutdownTimeout {
                deadline: shutdown_deadline,
            }),
        }
    }
}

/// Process-fatal relay errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound; the relay never started.
    #[error("failed to bind {addr}: {error}")]
    StartFailure { addr: String, error: String },

    /// Graceful shutdown overran its deadline.
    #[error("shutdown did not complete within {deadline:?}")]
    ShutdownTimeout { deadline: Duration },
}
