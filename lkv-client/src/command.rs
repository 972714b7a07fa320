//! # Command Encoding
//!
//! Purpose: Build a command from a verb and positional arguments and encode
//! it as a RESP2 array, so arguments may carry whitespace or raw bytes.

use std::fmt;

use crate::resp::{push_decimal, write_array_header, write_bulk};

/// A value that can be used as a command argument.
///
/// Integers are rendered in decimal; strings and byte slices verbatim.
pub trait ToArg {
    fn write_arg(&self, out: &mut Vec<u8>);
}

impl ToArg for [u8] {
    fn write_arg(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl ToArg for Vec<u8> {
    fn write_arg(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn write_arg(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl ToArg for str {
    fn write_arg(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl ToArg for String {
    fn write_arg(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn write_arg(&self, out: &mut Vec<u8>) {
        (**self).write_arg(out);
    }
}

macro_rules! int_arg {
    ($($ty:ty),*) => {
        $(
            impl ToArg for $ty {
                fn write_arg(&self, out: &mut Vec<u8>) {
                    push_decimal(out, *self as i64);
                }
            }
        )*
    };
}

int_arg!(i8, i16, i32, i64, u8, u16, u32);

// Wide unsigned values may not fit in i64.
impl ToArg for u64 {
    fn write_arg(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.to_string().as_bytes());
    }
}

impl ToArg for usize {
    fn write_arg(&self, out: &mut Vec<u8>) {
        (*self as u64).write_arg(out);
    }
}

impl ToArg for f64 {
    fn write_arg(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.to_string().as_bytes());
    }
}

/// An immutable command: verb first, then positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    /// Starts a command with the given verb.
    pub fn new<V: ToArg + ?Sized>(verb: &V) -> Self {
        let mut first = Vec::new();
        verb.write_arg(&mut first);
        Command { args: vec![first] }
    }

    /// Appends one argument.
    pub fn arg<T: ToArg>(mut self, value: T) -> Self {
        let mut buf = Vec::new();
        value.write_arg(&mut buf);
        self.args.push(buf);
        self
    }

    /// Appends every value of an iterator.
    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    /// Splits an inline command line on ASCII whitespace.
    ///
    /// Values cannot contain spaces this way; use the builder for those.
    pub fn parse_inline(line: &str) -> Self {
        Command {
            args: line
                .split_ascii_whitespace()
                .map(|part| part.as_bytes().to_vec())
                .collect(),
        }
    }

    /// The command verb, or an empty slice for an empty command.
    pub fn verb(&self) -> &[u8] {
        self.args.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// All arguments including the verb.
    pub fn parts(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Appends the RESP2 array encoding of this command to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_array_header(out, self.args.len());
        for arg in &self.args {
            write_bulk(out, arg);
        }
    }

    /// Returns the database index when this is a well-formed `SELECT`.
    pub(crate) fn selected_db(&self) -> Option<u32> {
        match self.args.as_slice() {
            [verb, db] if verb.eq_ignore_ascii_case(b"SELECT") => {
                std::str::from_utf8(db).ok()?.parse().ok()
            }
            _ => None,
        }
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Command::parse_inline(line)
    }
}

impl From<String> for Command {
    fn from(line: String) -> Self {
        Command::parse_inline(&line)
    }
}

impl From<&String> for Command {
    fn from(line: &String) -> Self {
        Command::parse_inline(line)
    }
}

impl From<&Command> for Command {
    fn from(cmd: &Command) -> Self {
        cmd.clone()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(cmd: &Command) -> Vec<u8> {
        let mut buf = Vec::new();
        cmd.encode(&mut buf);
        buf
    }

    #[test]
    fn encodes_verb_key_and_values() {
        let cmd = Command::new("SET").arg("key3").arg(34323523);
        assert_eq!(
            encoded(&cmd),
            b"*3\r\n$3\r\nSET\r\n$4\r\nkey3\r\n$8\r\n34323523\r\n"
        );
    }

    #[test]
    fn values_with_whitespace_stay_one_argument() {
        let cmd = Command::new("SET").arg("greeting").arg("hello world");
        assert_eq!(cmd.parts().len(), 3);
        assert_eq!(cmd.parts()[2], b"hello world");
    }

    #[test]
    fn inline_line_splits_on_whitespace() {
        let cmd = Command::from("LPUSH  list5 4\t5");
        assert_eq!(cmd, Command::new("LPUSH").arg("list5").args([4, 5]));
        assert_eq!(cmd.verb(), b"LPUSH");
        assert_eq!(cmd.to_string(), "LPUSH list5 4 5");
    }

    #[test]
    fn formats_numbers_naturally() {
        let cmd = Command::new("X").arg(-7i64).arg(u64::MAX).arg(1.5f64).arg(b"raw".as_slice());
        assert_eq!(cmd.to_string(), format!("X -7 {} 1.5 raw", u64::MAX));
    }

    #[test]
    fn recognizes_select() {
        assert_eq!(Command::from("select 3").selected_db(), Some(3));
        assert_eq!(Command::from("SELECT x").selected_db(), None);
        assert_eq!(Command::from("GET 3").selected_db(), None);
    }

    #[test]
    fn empty_line_is_empty_command() {
        let cmd = Command::from("   ");
        assert!(cmd.is_empty());
        assert_eq!(cmd.verb(), b"");
        assert_eq!(encoded(&cmd), b"*0\r\n");
    }
}
