//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. The listen port can additionally
//! be overridden by the first positional argument.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the WebSocket listener.
    /// Env: `LISTEN_ADDR`
    /// Default: `0.0.0.0:8080`
    pub listen_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DB_PATH`
    /// Default: `./calshare.db`
    pub db_path: PathBuf,

    /// How often the reminder scheduler scans for due reminders.
    /// Env: `REMINDER_INTERVAL_SECS`
    /// Default: `60`
    pub reminder_interval: Duration,

    /// How often expired auth tokens are swept from memory.
    /// Env: `TOKEN_SWEEP_SECS`
    /// Default: `300`
    pub token_sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: PathBuf::from("./calshare.db"),
            reminder_interval: Duration::from_secs(60),
            token_sweep_interval: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.listen_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid LISTEN_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("REMINDER_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.reminder_interval = Duration::from_secs(secs.max(1));
            }
        }

        if let Ok(val) = std::env::var("TOKEN_SWEEP_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.token_sweep_interval = Duration::from_secs(secs.max(1));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Override only the listen port, keeping the configured interface.
    pub fn set_port(&mut self, port: u16) {
        self.listen_addr.set_port(port);
    }
}
