//! # Client Facade
//!
//! Purpose: Expose typed helpers for common string, list, and set commands,
//! layered on the pool's single-command entry point.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides pooling and protocol details.
//! 2. **No Panics**: Every helper returns `ClientResult`; transport and
//!    server failures reach the caller unchanged.
//! 3. **Lenient Variants**: `*_or_default` helpers swallow failures and
//!    return a zero value for callers that prefer that policy.

use std::time::Duration;

use crate::command::{Command, ToArg};
use crate::config::PoolConfig;
use crate::error::{ClientError, ClientResult};
use crate::pool::Pool;
use crate::resp::Reply;

/// TTL state returned by the server, mirroring Redis semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

/// Which end of a list a push or pop works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Left,
    Right,
}

/// Existence condition for `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Only set when the key does not exist.
    Nx,
    /// Only set when the key already exists.
    Xx,
}

/// Optional modifiers for `SET`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Expire after this many whole seconds (`EX`).
    pub ex: Option<Duration>,
    /// Expire after this many milliseconds (`PX`).
    pub px: Option<Duration>,
    pub condition: Option<SetCondition>,
}

impl SetOptions {
    fn apply(&self, mut cmd: Command) -> Command {
        if let Some(ex) = self.ex.filter(|d| d.as_secs() > 0) {
            cmd = cmd.arg("EX").arg(ex.as_secs());
        }
        if let Some(px) = self.px.filter(|d| d.as_millis() > 0) {
            cmd = cmd.arg("PX").arg(px.as_millis() as u64);
        }
        match self.condition {
            Some(SetCondition::Nx) => cmd.arg("NX"),
            Some(SetCondition::Xx) => cmd.arg("XX"),
            None => cmd,
        }
    }
}

/// Pooled key-value client.
#[derive(Clone)]
pub struct KVClient {
    pool: Pool,
}

impl KVClient {
    /// Connects with default pool sizing.
    pub fn new(addr: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(PoolConfig {
            addr: addr.into(),
            ..PoolConfig::default()
        })
    }

    /// Connects with a custom configuration.
    pub fn with_config(config: PoolConfig) -> ClientResult<Self> {
        Ok(KVClient {
            pool: Pool::new(config)?,
        })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        KVClient { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Runs a raw command and returns the flattened reply.
    pub fn execute(&self, cmd: impl Into<Command>) -> ClientResult<Vec<String>> {
        self.pool.execute(cmd)
    }

    /// Pings the server. Returns the reply payload.
    pub fn ping(&self, payload: Option<&str>) -> ClientResult<String> {
        let cmd = match payload {
            Some(data) => Command::new("PING").arg(data),
            None => Command::new("PING"),
        };
        let reply = self.pool.query(cmd)?;
        reply.as_bytes().map(lossy).ok_or(ClientError::UnexpectedResponse)
    }

    /// Fetches a value. Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &str) -> ClientResult<Option<String>> {
        optional_string(self.pool.query(Command::new("GET").arg(key))?)
    }

    /// Fetches a value and parses it as an integer.
    pub fn get_int(&self, key: &str) -> ClientResult<Option<i64>> {
        match self.get(key)? {
            Some(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ClientError::UnexpectedResponse),
            None => Ok(None),
        }
    }

    /// Fetches a value, returning an empty string on any failure.
    pub fn get_string_or_default(&self, key: &str) -> String {
        self.get(key).ok().flatten().unwrap_or_default()
    }

    /// Fetches an integer, returning 0 on any failure.
    pub fn get_int_or_default(&self, key: &str) -> i64 {
        self.get_int(key).ok().flatten().unwrap_or_default()
    }

    /// Sets a value without expiration.
    pub fn set<V: ToArg>(&self, key: &str, value: V) -> ClientResult<()> {
        self.set_with(key, value, SetOptions::default()).map(|_| ())
    }

    /// Sets a value with `EX`/`PX`/`NX`/`XX` modifiers.
    ///
    /// Returns false when an `NX`/`XX` condition prevented the write.
    pub fn set_with<V: ToArg>(&self, key: &str, value: V, options: SetOptions) -> ClientResult<bool> {
        let cmd = options.apply(Command::new("SET").arg(key).arg(value));
        match self.pool.query(cmd)? {
            Reply::Simple(_) => Ok(true),
            Reply::Nil => Ok(false),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Increments an integer value by `delta` and returns the new value.
    pub fn incr_by(&self, key: &str, delta: i64) -> ClientResult<i64> {
        integer(self.pool.query(Command::new("INCRBY").arg(key).arg(delta))?)
    }

    pub fn incr(&self, key: &str) -> ClientResult<i64> {
        self.incr_by(key, 1)
    }

    /// Deletes keys. Returns how many were removed.
    pub fn del<I>(&self, keys: I) -> ClientResult<usize>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        count(self.pool.query(Command::new("DEL").args(keys))?)
    }

    pub fn exists(&self, key: &str) -> ClientResult<bool> {
        Ok(integer(self.pool.query(Command::new("EXISTS").arg(key))?)? > 0)
    }

    /// Sets a time-to-live on a key. Returns true when the TTL was set.
    pub fn expire(&self, key: &str, ttl: Duration) -> ClientResult<bool> {
        let cmd = Command::new("EXPIRE").arg(key).arg(ttl.as_secs());
        Ok(integer(self.pool.query(cmd)?)? == 1)
    }

    /// Returns TTL status for a key.
    pub fn ttl(&self, key: &str) -> ClientResult<ClientTtl> {
        match integer(self.pool.query(Command::new("TTL").arg(key))?)? {
            -2 => Ok(ClientTtl::Missing),
            -1 => Ok(ClientTtl::NoExpiry),
            secs if secs >= 0 => Ok(ClientTtl::ExpiresIn(Duration::from_secs(secs as u64))),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Pushes values onto one end of a list. Returns the new length.
    pub fn push<I>(&self, end: ListEnd, key: &str, values: I) -> ClientResult<usize>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        let verb = match end {
            ListEnd::Left => "LPUSH",
            ListEnd::Right => "RPUSH",
        };
        count(self.pool.query(Command::new(verb).arg(key).args(values))?)
    }

    pub fn lpush<I>(&self, key: &str, values: I) -> ClientResult<usize>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.push(ListEnd::Left, key, values)
    }

    pub fn rpush<I>(&self, key: &str, values: I) -> ClientResult<usize>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.push(ListEnd::Right, key, values)
    }

    /// Pops one value from an end of a list.
    pub fn pop(&self, end: ListEnd, key: &str) -> ClientResult<Option<String>> {
        let verb = match end {
            ListEnd::Left => "LPOP",
            ListEnd::Right => "RPOP",
        };
        optional_string(self.pool.query(Command::new(verb).arg(key))?)
    }

    pub fn lpop(&self, key: &str) -> ClientResult<Option<String>> {
        self.pop(ListEnd::Left, key)
    }

    pub fn rpop(&self, key: &str) -> ClientResult<Option<String>> {
        self.pop(ListEnd::Right, key)
    }

    /// Returns list elements between `start` and `stop`, inclusive.
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> ClientResult<Vec<String>> {
        self.pool
            .execute(Command::new("LRANGE").arg(key).arg(start).arg(stop))
    }

    pub fn llen(&self, key: &str) -> ClientResult<usize> {
        count(self.pool.query(Command::new("LLEN").arg(key))?)
    }

    /// Adds members to a set. Returns how many were new.
    pub fn sadd<I>(&self, key: &str, members: I) -> ClientResult<usize>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        count(self.pool.query(Command::new("SADD").arg(key).args(members))?)
    }

    /// Removes members from a set. Returns how many were present.
    pub fn srem<I>(&self, key: &str, members: I) -> ClientResult<usize>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        count(self.pool.query(Command::new("SREM").arg(key).args(members))?)
    }

    pub fn smembers(&self, key: &str) -> ClientResult<Vec<String>> {
        match self.pool.query(Command::new("SMEMBERS").arg(key))? {
            reply @ Reply::Array(_) => Ok(reply.into_strings()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn sismember<V: ToArg>(&self, key: &str, member: V) -> ClientResult<bool> {
        Ok(integer(self.pool.query(Command::new("SISMEMBER").arg(key).arg(member))?)? == 1)
    }
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

fn optional_string(reply: Reply) -> ClientResult<Option<String>> {
    if reply == Reply::Nil {
        return Ok(None);
    }
    reply.as_bytes().map(|data| Some(lossy(data))).ok_or(ClientError::UnexpectedResponse)
}

fn integer(reply: Reply) -> ClientResult<i64> {
    match reply {
        Reply::Integer(value) => Ok(value),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn count(reply: Reply) -> ClientResult<usize> {
    usize::try_from(integer(reply)?).map_err(|_| ClientError::UnexpectedResponse)
}
