//! Runtime configuration for the relay daemon.

use std::env;
use std::time::Duration;

use room_protocol::MAX_FRAME_BYTES;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Environment variable overriding the listen address.
pub const LISTEN_ADDR_ENV: &str = "ROOMD_ADDR";

/// Default bound on graceful shutdown.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(2);

/// Relay daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `host:port` pair the listener binds to.
    pub listen_addr: String,

    /// Maximum size of one wire frame, in bytes. Longer lines are
    /// dropped without terminating the connection.
    pub max_frame_bytes: usize,

    /// Deadline for graceful shutdown; overrunning it is a fatal
    /// `ShutdownTimeout`.
    pub shutdown_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_frame_bytes: MAX_FRAME_BYTES,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }
}

impl Config {
    /// Builds a configuration from the environment.
    ///
    /// `ROOMD_ADDR` overrides the default listen address.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = env::var(LISTEN_ADDR_ENV) {
            config.listen_addr = addr;
        }
        config
    }

    /// Replaces the listen address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Replaces the maximum frame size.
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Replaces the shutdown deadline.
    pub fn with_shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }
}
