//! # Pool Configuration
//!
//! Purpose: Carry pool sizing, target database, and I/O deadlines as one
//! explicit value passed at construction time.
//!
//! ## Sizing Rules
//! - `min_conns` connections are dialed eagerly by `Pool::new`.
//! - At most `idle_conns` connections wait in the idle queue.
//! - At most `max_conns` connections are open at once (idle + checked out).
//! - `min_conns <= idle_conns <= max_conns` and `max_conns >= 1`.
//!
//! Timeouts serialize as integer milliseconds so the struct can be embedded
//! in an application's own config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_MIN_CONNS: usize = 2;
pub const DEFAULT_IDLE_CONNS: usize = 3;
pub const DEFAULT_MAX_CONNS: usize = 4;

/// Configuration for a connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Logical database every handed-out connection is switched to.
    pub database: u32,
    /// Connections established when the pool is created.
    pub min_conns: usize,
    /// Capacity of the idle queue.
    pub idle_conns: usize,
    /// Maximum open connections (idle + checked out).
    pub max_conns: usize,
    /// Optional TCP connect timeout.
    #[serde(with = "opt_millis", rename = "connect_timeout_ms")]
    pub connect_timeout: Option<Duration>,
    /// Optional read/write deadline applied to every socket operation.
    #[serde(with = "opt_millis", rename = "io_timeout_ms")]
    pub io_timeout: Option<Duration>,
    /// Optional bound on how long `acquire` may block.
    #[serde(with = "opt_millis", rename = "acquire_timeout_ms")]
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            addr: "127.0.0.1:6379".to_string(),
            database: 0,
            min_conns: DEFAULT_MIN_CONNS,
            idle_conns: DEFAULT_IDLE_CONNS,
            max_conns: DEFAULT_MAX_CONNS,
            connect_timeout: None,
            io_timeout: None,
            acquire_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Default sizing against `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        PoolConfig {
            addr: format!("{}:{}", host, port),
            ..PoolConfig::default()
        }
    }

    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    /// Sets all three sizing knobs at once.
    pub fn sizes(mut self, min_conns: usize, idle_conns: usize, max_conns: usize) -> Self {
        self.min_conns = min_conns;
        self.idle_conns = idle_conns;
        self.max_conns = max_conns;
        self
    }

    /// Sets `min_conns`, raising idle and max so the ordering still holds.
    pub fn min_conns(mut self, min_conns: usize) -> Self {
        self.min_conns = min_conns;
        self.idle_conns = self.idle_conns.max(min_conns);
        self.max_conns = self.max_conns.max(self.idle_conns);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Checks the sizing invariants.
    pub fn validate(&self) -> ClientResult<()> {
        if self.max_conns == 0 {
            return Err(ClientError::InvalidConfig("max_conns must be at least 1".into()));
        }
        if self.min_conns > self.idle_conns || self.idle_conns > self.max_conns {
            return Err(ClientError::InvalidConfig(format!(
                "expected min_conns <= idle_conns <= max_conns, got {} / {} / {}",
                self.min_conns, self.idle_conns, self.max_conns
            )));
        }
        if self.addr.is_empty() {
            return Err(ClientError::InvalidAddress(self.addr.clone()));
        }
        Ok(())
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
