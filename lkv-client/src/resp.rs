//! # RESP2 Reply Decoding
//!
//! Purpose: Classify and parse exactly one server reply from a buffered
//! reader, and encode replies for test doubles and tooling.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: One reply is parsed top-down per call; the only
//!    state is the caller's reusable line buffer.
//! 2. **Bounded Lines**: A line that does not terminate within
//!    `MAX_LINE_LEN` bytes is a protocol error, never an unbounded read.
//! 3. **Binary-Safe Bulk**: Bulk payloads are read by declared length, so
//!    they may contain CR or LF.
//! 4. **Flat View**: `Reply::into_strings` yields the ordered string
//!    sequence that `Pool::execute` returns.
//!
//! ## Reply Markers
//!
//! ```text
//! +OK\r\n                 simple string  -> ["OK"]
//! :42\r\n                 integer        -> ["42"]
//! $3\r\n123\r\n           bulk string    -> ["123"]
//! $-1\r\n                 nil            -> [""]
//! *-1\r\n                 nil array      -> []
//! *2\r\n$1\r\n5\r\n$1\r\n4\r\n  array    -> ["5", "4"]
//! -ERR oops\r\n           error          -> Err(Server("ERR oops"))
//! ```

use std::io::{BufRead, Read};

use crate::error::{ClientError, ClientResult, ProtocolViolation};

/// Longest reply line accepted before a terminator must appear.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Largest bulk payload accepted (same ceiling as Redis).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Arrays nested deeper than this are rejected.
const MAX_DEPTH: usize = 32;

/// Decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK` style status.
    Simple(Vec<u8>),
    /// `-ERR ...` nested inside an array. Top-level errors become
    /// `ClientError::Server` instead.
    Error(String),
    /// `:123`.
    Integer(i64),
    /// `$<len>` payload.
    Bulk(Vec<u8>),
    /// `$-1`. A nil array (`*-1`) decodes as an empty `Array`.
    Nil,
    /// `*<n>` elements.
    Array(Vec<Reply>),
}

impl Reply {
    /// Flattens the reply into an ordered sequence of strings.
    ///
    /// Scalars become a one-element sequence; nil becomes a single empty
    /// string. Array elements are flattened in order, recursing into nested
    /// arrays, with nil elements rendered as empty strings.
    pub fn into_strings(self) -> Vec<String> {
        match self {
            Reply::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    item.flatten_into(&mut out);
                }
                out
            }
            other => {
                let mut out = Vec::with_capacity(1);
                other.flatten_into(&mut out);
                out
            }
        }
    }

    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            Reply::Simple(data) | Reply::Bulk(data) => out.push(bytes_to_string(data)),
            Reply::Error(message) => out.push(message),
            Reply::Integer(value) => out.push(value.to_string()),
            Reply::Nil => out.push(String::new()),
            Reply::Array(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    /// Returns the payload of a simple or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Simple(data) | Reply::Bulk(data) => Some(data),
            _ => None,
        }
    }

    /// Writes the reply in RESP2 wire form.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Simple(data) => {
                out.push(b'+');
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Error(message) => {
                out.push(b'-');
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(value) => {
                out.push(b':');
                push_decimal(out, *value);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(data) => write_bulk(out, data),
            Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                write_array_header(out, items.len());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

fn bytes_to_string(data: Vec<u8>) -> String {
    String::from_utf8(data).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Writes `*<len>\r\n`.
pub fn write_array_header(out: &mut Vec<u8>, len: usize) {
    out.push(b'*');
    push_decimal(out, len as i64);
    out.extend_from_slice(b"\r\n");
}

/// Writes `$<len>\r\n<data>\r\n`.
pub fn write_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'$');
    push_decimal(out, data.len() as i64);
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Reads one reply. A top-level `-` reply is returned as
/// `ClientError::Server`.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Reply> {
    match read_value(reader, line_buf, 0)? {
        Reply::Error(message) => Err(ClientError::Server(message)),
        reply => Ok(reply),
    }
}

fn read_value<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> ClientResult<Reply> {
    read_line(reader, line_buf)?;
    let Some(&marker) = line_buf.first() else {
        return Err(ProtocolViolation::EmptyLine.into());
    };
    let rest = &line_buf[1..];

    match marker {
        b'+' => Ok(Reply::Simple(rest.to_vec())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(rest).into_owned())),
        b':' => Ok(Reply::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            read_array(reader, len, line_buf, depth)
        }
        other => Err(ProtocolViolation::UnknownMarker(other).into()),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<Reply> {
    if len < 0 {
        return Ok(Reply::Nil);
    }
    let len = len as usize;
    if len > MAX_BULK_LEN {
        return Err(ProtocolViolation::BulkTooLarge.into());
    }

    // Payload plus its trailing CRLF in one read.
    let mut data = vec![0u8; len + 2];
    reader.read_exact(&mut data).map_err(ClientError::from_read)?;
    if data[len..] != *b"\r\n" {
        return Err(ProtocolViolation::BadTerminator.into());
    }
    data.truncate(len);
    Ok(Reply::Bulk(data))
}

fn read_array<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
    depth: usize,
) -> ClientResult<Reply> {
    if len < 0 {
        return Ok(Reply::Array(Vec::new()));
    }
    if depth >= MAX_DEPTH {
        return Err(ProtocolViolation::TooDeep.into());
    }

    // Cap the preallocation; a hostile count should not reserve gigabytes.
    let mut items = Vec::with_capacity((len as usize).min(1024));
    for _ in 0..len {
        items.push(read_value(reader, line_buf, depth + 1)?);
    }
    Ok(Reply::Array(items))
}

/// Reads one CRLF-terminated line into `buf`, without the terminator.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', buf)
        .map_err(ClientError::from_read)?;
    if bytes == 0 {
        return Err(ProtocolViolation::UnexpectedEof.into());
    }
    if buf.last() != Some(&b'\n') {
        if bytes >= MAX_LINE_LEN {
            return Err(ProtocolViolation::LineTooLong.into());
        }
        return Err(ProtocolViolation::UnexpectedEof.into());
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ProtocolViolation::BadTerminator.into());
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', digits)) => (true, digits),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(ProtocolViolation::BadNumber.into());
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolViolation::BadNumber.into());
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i64))
            .ok_or(ProtocolViolation::BadNumber)?;
    }

    Ok(if negative { -value } else { value })
}

/// Appends the decimal form of `value` without a heap allocation.
pub(crate) fn push_decimal(out: &mut Vec<u8>, value: i64) {
    if value < 0 {
        out.push(b'-');
    }
    let mut magnitude = value.unsigned_abs();
    let mut buf = [0u8; 20];
    let mut len = 0;
    loop {
        buf[len] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        len += 1;
        if magnitude == 0 {
            break;
        }
    }
    out.extend(buf[..len].iter().rev());
}
