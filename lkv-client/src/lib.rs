//! # LineKV Client
//!
//! Purpose: Provide a synchronous client for RESP-speaking key-value stores,
//! built around a bounded pool of persistent TCP connections.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections; block when the pool is
//!    at capacity instead of opening more.
//! 2. **Explicit Configuration**: Pool sizing and deadlines travel in one
//!    `PoolConfig` value; there are no process-wide tunables.
//! 3. **Protocol Clarity**: Requests are encoded as RESP2 arrays and replies
//!    parsed by a small, explicit state machine.
//! 4. **Fail Loudly, Close Early**: A connection that hits an I/O or protocol
//!    error is closed, and the error goes straight back to the caller.
//!
//! ## Example
//!
//! ```no_run
//! use lkv_client::Pool;
//!
//! let pool = Pool::connect("127.0.0.1", 6379, 0, 2)?;
//! pool.execute("SET key3 34323523")?;
//! assert_eq!(pool.execute("GET key3")?, vec!["34323523"]);
//! # Ok::<(), lkv_client::ClientError>(())
//! ```

mod client;
mod command;
mod config;
mod conn;
mod error;
mod pool;
mod resp;

#[cfg(test)]
mod testutil;

pub use client::{ClientTtl, KVClient, ListEnd, SetCondition, SetOptions};
pub use command::{Command, ToArg};
pub use config::{PoolConfig, DEFAULT_IDLE_CONNS, DEFAULT_MAX_CONNS, DEFAULT_MIN_CONNS};
pub use conn::{ConnState, Connection, Timeouts};
pub use error::{ClientError, ClientResult, ProtocolViolation};
pub use pool::{CancelToken, Pool, PoolStatus, PooledConnection};
pub use resp::{read_reply, write_array_header, write_bulk, Reply, MAX_BULK_LEN, MAX_LINE_LEN};
