//! # Single Connection
//!
//! Purpose: Own one TCP socket plus its buffered reader, send encoded
//! commands, and decode exactly one reply per command.
//!
//! ## Lifecycle
//!
//! ```text
//! open() ──► OPEN ──close()──► CLOSED
//!             │  ▲                 (terminal; close() again is a no-op)
//!             └──┘ exec()
//! ```
//!
//! A connection remembers the database it last selected so the pool can
//! restore its target database before handing the connection out again.

use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::command::Command;
use crate::error::{ClientError, ClientResult};
use crate::resp::{read_reply, Reply};

/// Open/closed state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Open,
    Closed,
}

/// Socket deadlines applied when dialing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub io: Option<Duration>,
}

/// Single TCP connection with reusable buffers.
pub struct Connection {
    state: ConnState,
    db: u32,
    peer: SocketAddr,
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    /// Dials `addr` and switches to `database` when it is not 0.
    pub fn open(addr: &str, database: u32, timeouts: Timeouts) -> ClientResult<Self> {
        let stream = connect_stream(addr, timeouts.connect)?;
        // A zero duration is rejected by std; treat it as "no deadline".
        let io_timeout = timeouts.io.filter(|t| !t.is_zero());
        stream
            .set_read_timeout(io_timeout)
            .and_then(|_| stream.set_write_timeout(io_timeout))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|source| ClientError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        let peer = stream.peer_addr().map_err(|source| ClientError::ConnectFailed {
            addr: addr.to_string(),
            source,
        })?;

        let mut conn = Connection {
            state: ConnState::Open,
            db: 0,
            peer,
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        };
        debug!(addr = %conn.peer, "connection opened");

        if database != 0 {
            if let Err(err) = conn.select(database) {
                conn.close();
                return Err(err);
            }
        }
        Ok(conn)
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnState::Open
    }

    /// Database this connection last selected.
    pub fn database(&self) -> u32 {
        self.db
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Writes one encoded command.
    pub fn send(&mut self, cmd: &Command) -> ClientResult<()> {
        if !self.is_open() {
            return Err(ClientError::WriteFailed(io::ErrorKind::NotConnected.into()));
        }
        self.write_buf.clear();
        cmd.encode(&mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf).map_err(ClientError::from_write)?;
        stream.flush().map_err(ClientError::from_write)
    }

    /// Decodes exactly one reply.
    pub fn read_reply(&mut self) -> ClientResult<Reply> {
        if !self.is_open() {
            return Err(ClientError::Io(io::ErrorKind::NotConnected.into()));
        }
        read_reply(&mut self.reader, &mut self.line_buf)
    }

    /// Sends a command and reads its reply.
    ///
    /// A successful `SELECT n` updates the tracked database.
    pub fn exec(&mut self, cmd: &Command) -> ClientResult<Reply> {
        self.send(cmd)?;
        let reply = self.read_reply()?;
        if let Some(db) = cmd.selected_db() {
            self.db = db;
        }
        Ok(reply)
    }

    /// Switches to `db`. Any failure is reported as `SelectFailed`.
    pub fn select(&mut self, db: u32) -> ClientResult<()> {
        debug!(addr = %self.peer, db, "selecting database");
        match self.exec(&Command::new("SELECT").arg(db)) {
            Ok(_) => Ok(()),
            Err(err) => Err(ClientError::SelectFailed {
                db,
                source: Box::new(err),
            }),
        }
    }

    /// Closes the socket once. Returns true only for the call that
    /// performed the OPEN to CLOSED transition.
    pub fn close(&mut self) -> bool {
        if self.state == ConnState::Closed {
            return false;
        }
        self.state = ConnState::Closed;
        // The peer may already be gone; the socket is released either way.
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
        debug!(addr = %self.peer, "connection closed");
        true
    }

    #[cfg(test)]
    pub(crate) fn shutdown_write(&self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Write);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("db", &self.db)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

fn connect_stream(addr: &str, timeout: Option<Duration>) -> ClientResult<TcpStream> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(addr.to_string()))?
        .collect();

    let mut last_err = io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing");
    for candidate in candidates {
        let attempt = match timeout.filter(|t| !t.is_zero()) {
            Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
            None => TcpStream::connect(candidate),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = err,
        }
    }
    Err(ClientError::ConnectFailed {
        addr: addr.to_string(),
        source: last_err,
    })
}
