//! # Client Errors
//!
//! Purpose: One error type for every failure the pool, the connection, and
//! the reply decoder can surface.
//!
//! ## Error Classes
//! 1. **Connect**: dialing or selecting a database failed.
//! 2. **Transport**: writes, reads, and I/O deadlines.
//! 3. **Protocol**: the reply stream could not be decoded.
//! 4. **Server**: the store answered with an explicit `-` error reply.
//! 5. **Pool**: waiting for a connection timed out, was cancelled, or the
//!    pool was closed.

use std::io;

use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP dial failed.
    #[error("cannot connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// `SELECT` failed while opening or reusing a connection.
    #[error("cannot select database {db}: {source}")]
    SelectFailed {
        db: u32,
        #[source]
        source: Box<ClientError>,
    },
    /// Partial or failed socket write.
    #[error("cannot send command to server: {0}")]
    WriteFailed(#[source] io::Error),
    /// Reply framing could not be decoded.
    #[error("bad response: {0}")]
    Protocol(#[from] ProtocolViolation),
    /// The server returned an error reply.
    #[error("server error: {0}")]
    Server(String),
    /// Read failure other than a deadline.
    #[error("io error: {0}")]
    Io(#[source] io::Error),
    /// Read or write deadline expired.
    #[error("operation timed out")]
    Timeout,
    /// No connection became available within the acquire bound.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// The caller gave up while waiting for a connection.
    #[error("acquire cancelled")]
    Cancelled,
    /// The pool has been shut down.
    #[error("connection pool closed")]
    PoolClosed,
    /// Pool sizing is inconsistent.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
    /// Address could not be resolved.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Command has no verb.
    #[error("empty command")]
    EmptyCommand,
    /// Reply shape did not match what the command returns.
    #[error("unexpected response")]
    UnexpectedResponse,
}

impl ClientError {
    /// Returns true for dial and database-selection failures.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectFailed { .. } | ClientError::SelectFailed { .. }
        )
    }

    /// Returns true when the connection that produced this error can no
    /// longer be trusted and must be closed instead of pooled.
    pub fn poisons_connection(&self) -> bool {
        !matches!(
            self,
            ClientError::Server(_) | ClientError::UnexpectedResponse | ClientError::EmptyCommand
        )
    }

    /// Maps a read-side I/O error, turning deadline expiry into `Timeout`.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ClientError::Timeout,
            io::ErrorKind::UnexpectedEof => ClientError::Protocol(ProtocolViolation::UnexpectedEof),
            _ => ClientError::Io(err),
        }
    }

    /// Maps a write-side I/O error, turning deadline expiry into `Timeout`.
    pub(crate) fn from_write(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ClientError::Timeout,
            _ => ClientError::WriteFailed(err),
        }
    }
}

/// Specific reasons a reply could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("bad response line terminator")]
    BadTerminator,
    #[error("bad response title")]
    LineTooLong,
    #[error("bad numeric field")]
    BadNumber,
    #[error("unknown reply marker {0:#04x}")]
    UnknownMarker(u8),
    #[error("empty reply line")]
    EmptyLine,
    #[error("bulk string too large")]
    BulkTooLarge,
    #[error("array nesting too deep")]
    TooDeep,
    #[error("unexpected end of stream")]
    UnexpectedEof,
}
