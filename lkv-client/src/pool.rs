//! # Connection Pool
//!
//! Purpose: Share a bounded set of persistent TCP connections between many
//! threads, with blocking backpressure once every slot is in use.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse connections to avoid repeated handshakes.
//! 2. **Single Lock**: The idle queue and the outstanding-slot counter live
//!    under one mutex and always change together.
//! 3. **Backpressure**: With every slot taken and no idle connection,
//!    `acquire` waits on a condition variable instead of dialing.
//! 4. **Poison on Failure**: A connection that saw an I/O, protocol, or
//!    timeout error is closed, never returned to the idle queue.
//!
//! ## Connection Membership
//!
//! ```text
//! RESERVED ──dial ok──► IDLE ◄──release──┐
//!    │                   │               │
//!    │ dial failed       └──acquire──► CHECKED_OUT
//!    ▼                                   │ error / queue full / pool closed
//! (slot freed)        CLOSED ◄───────────┘ (slot freed)
//! ```
//!
//! Invariants: `idle <= idle_conns` and `outstanding <= max_conns`, where
//! `outstanding` counts idle plus checked-out connections.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::PoolConfig;
use crate::conn::{Connection, Timeouts};
use crate::error::{ClientError, ClientResult};
use crate::resp::Reply;

/// How often a cancellable waiter re-checks its token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Handle that lets a blocked `acquire` give up.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections waiting in the idle queue.
    pub idle: usize,
    /// Open connections, idle or checked out.
    pub outstanding: usize,
    /// Connections currently held by callers.
    pub checked_out: usize,
}

struct PoolState {
    idle: VecDeque<Connection>,
    outstanding: usize,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: self.config.connect_timeout,
            io: self.config.io_timeout,
        }
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    fn release(&self, mut conn: Connection) {
        if !conn.is_open() {
            return;
        }
        let mut state = self.state.lock();
        if !state.closed && state.idle.len() < self.config.idle_conns {
            state.idle.push_back(conn);
            drop(state);
            self.available.notify_one();
            return;
        }
        drop(state);

        if conn.close() {
            self.release_slot();
        }
    }

    fn close_conn(&self, mut conn: Connection) {
        if conn.close() {
            self.release_slot();
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        for conn in self.state.get_mut().idle.iter_mut() {
            conn.close();
        }
    }
}

/// Thread-safe connection pool handle. Clones share the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates a pool and dials `min_conns` connections up front.
    ///
    /// Fails if the configuration is inconsistent, or if `min_conns > 0`
    /// and not a single connection could be established.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        config.validate()?;

        let pool = Pool {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(config.idle_conns),
                    outstanding: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                config,
            }),
        };

        let config = &pool.inner.config;
        let mut last_err = None;
        for _ in 0..config.min_conns {
            match Connection::open(&config.addr, config.database, pool.inner.timeouts()) {
                Ok(conn) => {
                    let mut state = pool.inner.state.lock();
                    state.outstanding += 1;
                    state.idle.push_back(conn);
                }
                Err(err) => {
                    warn!(addr = %config.addr, error = %err, "warm-up connection failed");
                    last_err = Some(err);
                }
            }
        }

        let status = pool.status();
        if config.min_conns > 0 && status.idle == 0 {
            if let Some(err) = last_err {
                return Err(err);
            }
        }

        info!(
            addr = %config.addr,
            db = config.database,
            idle = status.idle,
            max = config.max_conns,
            "connection pool ready"
        );
        Ok(pool)
    }

    /// Creates a pool against `host:port` with default idle and max sizing,
    /// raised as needed to fit `min_conns`.
    pub fn connect(host: &str, port: u16, database: u32, min_conns: usize) -> ClientResult<Self> {
        Pool::new(PoolConfig::new(host, port).database(database).min_conns(min_conns))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Current occupancy.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            outstanding: state.outstanding,
            checked_out: state.outstanding - state.idle.len(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Checks out a connection, blocking while the pool is at capacity.
    ///
    /// Honors `acquire_timeout` from the configuration; expiry fails with
    /// `PoolExhausted`.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        self.acquire_inner(None)
    }

    /// Like [`Pool::acquire`], but gives up with `Cancelled` once `token`
    /// is cancelled.
    pub fn acquire_with(&self, token: &CancelToken) -> ClientResult<PooledConnection> {
        self.acquire_inner(Some(token))
    }

    fn acquire_inner(&self, token: Option<&CancelToken>) -> ClientResult<PooledConnection> {
        let config = &self.inner.config;
        let deadline = config.acquire_timeout.map(|timeout| Instant::now() + timeout);
        let mut logged_wait = false;

        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return Err(ClientError::PoolClosed);
            }
            if token.is_some_and(CancelToken::is_cancelled) {
                drop(state);
                // This waiter may have consumed a release notification.
                self.inner.available.notify_one();
                return Err(ClientError::Cancelled);
            }

            if let Some(conn) = state.idle.pop_front() {
                drop(state);
                return self.checkout(conn);
            }

            if state.outstanding < config.max_conns {
                state.outstanding += 1;
                drop(state);
                return self.dial_reserved();
            }

            let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|left| left.is_zero()) {
                drop(state);
                self.inner.available.notify_one();
                return Err(ClientError::PoolExhausted);
            }
            if !logged_wait {
                debug!(max = config.max_conns, "pool at capacity, waiting for a connection");
                logged_wait = true;
            }

            let slice = match (remaining, token.is_some()) {
                (Some(left), true) => Some(left.min(CANCEL_POLL_INTERVAL)),
                (None, true) => Some(CANCEL_POLL_INTERVAL),
                (left, false) => left,
            };
            match slice {
                Some(wait) => {
                    self.inner.available.wait_for(&mut state, wait);
                }
                None => self.inner.available.wait(&mut state),
            }
        }
    }

    /// Restores the target database on a reused connection.
    fn checkout(&self, mut conn: Connection) -> ClientResult<PooledConnection> {
        let target = self.inner.config.database;
        if conn.database() != target {
            if let Err(err) = conn.select(target) {
                warn!(addr = %conn.peer_addr(), db = target, error = %err, "reselect failed");
                self.inner.close_conn(conn);
                return Err(err);
            }
        }
        Ok(PooledConnection::new(self.inner.clone(), conn))
    }

    /// Dials a connection for a slot that is already reserved.
    fn dial_reserved(&self) -> ClientResult<PooledConnection> {
        let config = &self.inner.config;
        match Connection::open(&config.addr, config.database, self.inner.timeouts()) {
            Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Err(err) => {
                self.inner.release_slot();
                Err(err)
            }
        }
    }

    /// Returns a connection to the idle queue, or closes it when the queue
    /// is full.
    pub fn release(&self, conn: PooledConnection) {
        conn.release();
    }

    /// Closes a checked-out connection and frees its slot.
    pub fn close_conn(&self, conn: PooledConnection) {
        conn.close();
    }

    /// Runs one command and returns the flattened reply.
    pub fn execute(&self, cmd: impl Into<Command>) -> ClientResult<Vec<String>> {
        self.query(cmd).map(Reply::into_strings)
    }

    /// Like [`Pool::execute`], with a cancellable acquire.
    pub fn execute_with(&self, cmd: impl Into<Command>, token: &CancelToken) -> ClientResult<Vec<String>> {
        let cmd = cmd.into();
        if cmd.is_empty() {
            return Err(ClientError::EmptyCommand);
        }
        let conn = self.acquire_with(token)?;
        run(conn, &cmd).map(Reply::into_strings)
    }

    /// Runs one command and returns the structured reply.
    pub fn query(&self, cmd: impl Into<Command>) -> ClientResult<Reply> {
        let cmd = cmd.into();
        if cmd.is_empty() {
            return Err(ClientError::EmptyCommand);
        }
        let conn = self.acquire()?;
        run(conn, &cmd)
    }

    /// Shuts the pool down: closes idle connections, wakes every waiter
    /// with `PoolClosed`, and closes checked-out connections as they come
    /// back.
    pub fn close(&self) {
        let drained: Vec<Connection> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };

        let mut freed = 0;
        for mut conn in drained {
            if conn.close() {
                freed += 1;
            }
        }

        let mut state = self.inner.state.lock();
        state.outstanding = state.outstanding.saturating_sub(freed);
        let remaining = state.outstanding;
        drop(state);
        self.inner.available.notify_all();
        info!(addr = %self.inner.config.addr, checked_out = remaining, "connection pool closed");
    }
}

fn run(mut conn: PooledConnection, cmd: &Command) -> ClientResult<Reply> {
    match conn.exec(cmd) {
        Ok(reply) => {
            conn.release();
            Ok(reply)
        }
        Err(err) if err.poisons_connection() => {
            warn!(addr = %conn.peer_addr(), command = %cmd, error = %err, "closing connection after error");
            conn.close();
            Err(err)
        }
        Err(err) => {
            conn.release();
            Err(err)
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
///
/// A connection that failed with an I/O, protocol, or timeout error is
/// closed on drop instead.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Executes a command and returns the decoded reply.
    pub fn exec(&mut self, cmd: &Command) -> ClientResult<Reply> {
        let conn = self.conn.as_mut().expect("connection exists until drop");
        let response = conn.exec(cmd);
        if let Err(err) = &response {
            if err.poisons_connection() {
                self.valid = false;
            }
        }
        response
    }

    /// Returns the connection to the pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Closes the connection and frees its slot.
    pub fn close(mut self) {
        self.valid = false;
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection exists until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if self.valid {
            self.pool.release(conn);
        } else {
            self.pool.close_conn(conn);
        }
    }
}
