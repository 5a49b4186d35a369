// SPDX-License-Identifier: MIT OR Apache-2.0
//! A small, hand-rolled RESP (Redis Serialization Protocol) client.
//!
//! The dedup index only ever needs six commands (`GET`, `SETEX`, `EXISTS`,
//! `KEYS`, `TTL`, `DEL`, plus `AUTH`/`SELECT` at connect time) — narrow
//! enough that a full driver dependency buys nothing over a small
//! hand-rolled codec for this one protocol surface.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// A parsed RESP reply value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK\r\n`-style simple string.
    Simple(String),
    /// `-ERR ...\r\n`-style error reply.
    Error(String),
    /// `:123\r\n`-style integer.
    Integer(i64),
    /// `$N\r\n...\r\n`-style bulk string, or `None` for `$-1\r\n` (nil).
    Bulk(Option<Vec<u8>>),
    /// `*N\r\n...`-style array, or `None` for `*-1\r\n` (nil array).
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Interprets this reply as a bulk string, if it is one.
    pub fn as_bulk(&self) -> Option<&[u8]> {
        match self {
            RespValue::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }

    /// Interprets this reply as an array of bulk strings (as returned by
    /// `KEYS`), skipping anything that isn't itself a bulk string.
    pub fn as_bulk_array(&self) -> Vec<Vec<u8>> {
        match self {
            RespValue::Array(Some(items)) => items.iter().filter_map(|v| v.as_bulk().map(|b| b.to_vec())).collect(),
            _ => Vec::new(),
        }
    }
}

/// Errors from the RESP client.
#[derive(Debug, thiserror::Error)]
pub enum RespError {
    /// Underlying I/O failure (connect, read, or write).
    #[error("redis I/O error: {0}")]
    Io(#[from] io::Error),
    /// The server replied with a RESP error frame.
    #[error("redis error reply: {0}")]
    Server(String),
    /// The stream produced bytes that do not parse as a RESP frame.
    #[error("malformed RESP frame: {0}")]
    Protocol(String),
}

/// Encodes a command as a RESP array of bulk strings (the "multi bulk"
/// request form every Redis client, including real drivers, sends).
fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_line<R: tokio::io::AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<String, RespError> {
    use tokio::io::AsyncBufReadExt;
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(RespError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed")));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Reads and parses one RESP value from `reader`.
///
/// Boxed explicitly (rather than via an `async-recursion`-style macro) since
/// RESP arrays can nest: `KEYS` only ever returns a flat array in practice,
/// but the parser stays correct for arbitrarily nested replies.
fn read_value<'a, R: tokio::io::AsyncRead + Unpin + Send>(
    reader: &'a mut BufReader<R>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<RespValue, RespError>> + Send + 'a>> {
    Box::pin(async move {
        let line = read_line(reader).await?;
        let (tag, rest) = line.split_at(1);
        match tag {
            "+" => Ok(RespValue::Simple(rest.to_string())),
            "-" => Ok(RespValue::Error(rest.to_string())),
            ":" => rest
                .parse::<i64>()
                .map(RespValue::Integer)
                .map_err(|e| RespError::Protocol(format!("bad integer: {e}"))),
            "$" => {
                let len: i64 = rest.parse().map_err(|e| RespError::Protocol(format!("bad bulk length: {e}")))?;
                if len < 0 {
                    return Ok(RespValue::Bulk(None));
                }
                let mut buf = vec![0u8; len as usize + 2];
                reader.read_exact(&mut buf).await?;
                buf.truncate(len as usize);
                Ok(RespValue::Bulk(Some(buf)))
            }
            "*" => {
                let len: i64 = rest.parse().map_err(|e| RespError::Protocol(format!("bad array length: {e}")))?;
                if len < 0 {
                    return Ok(RespValue::Array(None));
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(read_value(reader).await?);
                }
                Ok(RespValue::Array(Some(items)))
            }
            other => Err(RespError::Protocol(format!("unknown RESP tag: {other}"))),
        }
    })
}

/// A single-connection RESP client.
///
/// Not pooled: `mm-fingerprint`'s call volume (one round trip per ingest
/// event) does not justify a connection pool, and a dropped connection is
/// simply reconnected on the next call by the owning [`super::RedisDedupIndex`].
pub struct RespConnection {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl RespConnection {
    /// Connects to `addr` (`host:port`), optionally authenticating and
    /// selecting a logical database.
    pub async fn connect(addr: &str, password: Option<&str>, db: u32) -> Result<Self, RespError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        let mut conn = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        if let Some(pass) = password {
            conn.call(&[b"AUTH", pass.as_bytes()]).await?;
        }
        if db != 0 {
            conn.call(&[b"SELECT", db.to_string().as_bytes()]).await?;
        }
        Ok(conn)
    }

    /// Sends a command and awaits its reply.
    pub async fn call(&mut self, args: &[&[u8]]) -> Result<RespValue, RespError> {
        let encoded = encode_command(args);
        self.writer.write_all(&encoded).await?;
        self.writer.flush().await?;
        let value = read_value(&mut self.reader).await?;
        if let RespValue::Error(msg) = value {
            return Err(RespError::Server(msg));
        }
        Ok(value)
    }
}

/// A reconnecting wrapper around [`RespConnection`], guarded by a mutex so
/// concurrent callers serialize on the single socket (matching the "single
/// connection, reconnect on failure" tradeoff documented on the type).
pub struct RespClient {
    addr: String,
    password: Option<String>,
    db: u32,
    conn: Mutex<Option<RespConnection>>,
}

impl RespClient {
    /// Builds a client that lazily connects to `addr` on first use.
    pub fn new(addr: impl Into<String>, password: Option<String>, db: u32) -> Self {
        Self {
            addr: addr.into(),
            password,
            db,
            conn: Mutex::new(None),
        }
    }

    /// Sends a command, transparently reconnecting once if the cached
    /// connection has gone stale.
    pub async fn call(&self, args: &[&[u8]]) -> Result<RespValue, RespError> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(RespConnection::connect(&self.addr, self.password.as_deref(), self.db).await?);
        }
        match guard.as_mut().unwrap().call(args).await {
            Ok(v) => Ok(v),
            Err(RespError::Io(_)) => {
                // Reconnect once and retry — matches the client libraries'
                // "transient connection drop" recovery path.
                let mut fresh = RespConnection::connect(&self.addr, self.password.as_deref(), self.db).await?;
                let result = fresh.call(args).await;
                *guard = Some(fresh);
                result
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_command_shapes_a_multi_bulk_request() {
        let encoded = encode_command(&[b"SETEX", b"k", b"60", b"v"]);
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            "*4\r\n$5\r\nSETEX\r\n$1\r\nk\r\n$2\r\n60\r\n$1\r\nv\r\n"
        );
    }

    #[tokio::test]
    async fn reads_simple_string() {
        let mut reader = BufReader::new(&b"+OK\r\n"[..]);
        let value = read_value(&mut reader).await.unwrap();
        assert_eq!(value, RespValue::Simple("OK".to_string()));
    }

    #[tokio::test]
    async fn reads_integer() {
        let mut reader = BufReader::new(&b":42\r\n"[..]);
        assert_eq!(read_value(&mut reader).await.unwrap(), RespValue::Integer(42));
    }

    #[tokio::test]
    async fn reads_bulk_string() {
        let mut reader = BufReader::new(&b"$5\r\nhello\r\n"[..]);
        assert_eq!(read_value(&mut reader).await.unwrap(), RespValue::Bulk(Some(b"hello".to_vec())));
    }

    #[tokio::test]
    async fn reads_nil_bulk_string() {
        let mut reader = BufReader::new(&b"$-1\r\n"[..]);
        assert_eq!(read_value(&mut reader).await.unwrap(), RespValue::Bulk(None));
    }

    #[tokio::test]
    async fn reads_array_of_bulk_strings() {
        let mut reader = BufReader::new(&b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"[..]);
        let value = read_value(&mut reader).await.unwrap();
        assert_eq!(value.as_bulk_array(), vec![b"foo".to_vec(), b"bar".to_vec()]);
    }

    #[tokio::test]
    async fn reads_error_reply() {
        let mut reader = BufReader::new(&b"-ERR bad command\r\n"[..]);
        assert_eq!(read_value(&mut reader).await.unwrap(), RespValue::Error("ERR bad command".to_string()));
    }
}
