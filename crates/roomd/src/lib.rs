//! roomd - TCP chat relay daemon
//!
//! This crate provides the core of the chat relay:
//! - `registry` - shared set of currently connected clients
//! - `server` - acceptor, per-connection handlers and the router loop
//! - `config` - runtime configuration (listen address, limits)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ accept  ┌───────────────────┐
//! │ RelayServer  │────────▶│ ConnectionHandler │ (one per client)
//! │ (TcpListener)│         └─────────┬─────────┘
//! └──────┬───────┘                   │ decoded frames (mpsc)
//!        │ spawns                    ▼
//!        │                 ┌───────────────────┐
//!        └────────────────▶│      Router       │
//!                          └─────────┬─────────┘
//!                                    │ snapshot + fan-out
//!                                    ▼
//!                          ┌───────────────────┐
//!                          │  ClientRegistry   │
//!                          └───────────────────┘
//! ```
//!
//! Every connection handler mutates the registry on connect/disconnect;
//! the router only ever reads snapshots of it. All production code in
//! this crate avoids `unwrap()`/`expect()`; per-connection and
//! per-message failures never escape their origin.

pub mod config;
pub mod registry;
pub mod server;
