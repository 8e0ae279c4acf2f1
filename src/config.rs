//! Runtime configuration (§10.3): bind addresses, timeouts, and the choice of persistence
//! backend, overlaid from `MGMT_*` environment variables via [`dotenvy`].

use std::time::Duration;

/// Which [`crate::persistence::ConfigurationPersister`] backend to construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersisterKind {
    InMemory,
    #[cfg(feature = "sqlite")]
    Sqlite { database_url: String },
}

impl Default for PersisterKind {
    fn default() -> Self {
        PersisterKind::InMemory
    }
}

/// Process-wide configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Address the binary wire protocol's TCP listener binds to.
    pub bind_addr: String,
    /// Address the HTTP/JSON gateway binds to.
    pub http_addr: String,
    /// Timeout applied to an outbound connection to a remote host controller.
    pub connect_timeout: Duration,
    /// Upper bound on concurrently in-flight handler invocations.
    pub handler_concurrency: usize,
    /// Which persistence backend to construct.
    pub persister: PersisterKind,
    /// Bounded channel capacity for streamed wire-protocol result fragments.
    pub event_buffer_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9990".to_string(),
            http_addr: "127.0.0.1:9991".to_string(),
            connect_timeout: Duration::from_secs(5),
            handler_concurrency: 64,
            persister: PersisterKind::default(),
            event_buffer_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Load defaults overlaid with `MGMT_*` environment variables; `.env` is read once via
    /// [`dotenvy::dotenv`] if present.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("MGMT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(addr) = std::env::var("MGMT_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Ok(secs) = std::env::var("MGMT_CONNECT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.connect_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(n) = std::env::var("MGMT_HANDLER_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                config.handler_concurrency = n;
            }
        }
        if let Ok(n) = std::env::var("MGMT_EVENT_BUFFER_CAPACITY") {
            if let Ok(n) = n.parse::<usize>() {
                config.event_buffer_capacity = n;
            }
        }
        #[cfg(feature = "sqlite")]
        if let Ok(url) = std::env::var("MGMT_SQLITE_URL") {
            config.persister = PersisterKind::Sqlite { database_url: url };
        }

        config
    }
}
