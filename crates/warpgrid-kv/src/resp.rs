//! Minimal RESP2 codec for the Redis backend.
//!
//! Commands are always sent as arrays of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nGET\r\n...
//! ```
//!
//! Replies are decoded into [`Frame`]s. Only the frame kinds Redis uses for
//! `GET`, `SET`, `AUTH`, `SELECT` and `PING` need to be understood, but
//! arrays are decoded too so a stray multi-bulk reply does not desync the
//! connection.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{KvError, KvResult};

/// Largest bulk string we are willing to buffer (Redis' own limit).
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest simple-string, error or length line we accept.
const MAX_LINE_LEN: usize = 64 * 1024;

/// A decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$3\r\nfoo\r\n`, or `$-1\r\n` for nil.
    Bulk(Option<Vec<u8>>),
    /// `*2\r\n...`, or `*-1\r\n` for nil.
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// The arguments of a command frame, if this is an array of bulk strings.
    pub fn into_args(self) -> Option<Vec<String>> {
        match self {
            Frame::Array(Some(items)) => items
                .into_iter()
                .map(|item| match item {
                    Frame::Bulk(Some(bytes)) => String::from_utf8(bytes).ok(),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

/// Append the RESP encoding of a command to `buf`.
pub fn encode_command<S: AsRef<str>>(args: &[S], buf: &mut Vec<u8>) {
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref().as_bytes();
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Append the RESP encoding of a reply frame to `buf`.
pub fn encode_frame(frame: &Frame, buf: &mut Vec<u8>) {
    match frame {
        Frame::Simple(s) => buf.extend_from_slice(format!("+{s}\r\n").as_bytes()),
        Frame::Error(s) => buf.extend_from_slice(format!("-{s}\r\n").as_bytes()),
        Frame::Integer(n) => buf.extend_from_slice(format!(":{n}\r\n").as_bytes()),
        Frame::Bulk(None) => buf.extend_from_slice(b"$-1\r\n"),
        Frame::Bulk(Some(bytes)) => {
            buf.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
            buf.extend_from_slice(bytes);
            buf.extend_from_slice(b"\r\n");
        }
        Frame::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
        Frame::Array(Some(items)) => {
            buf.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_frame(item, buf);
            }
        }
    }
}

/// Read one frame from the stream.
pub fn read_frame<'a, R>(reader: &'a mut R) -> Pin<Box<dyn Future<Output = KvResult<Frame>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(reader).await?;
        let (tag, rest) = line
            .split_first()
            .ok_or_else(|| KvError::Protocol("empty frame header".to_string()))?;
        let rest = std::str::from_utf8(rest)
            .map_err(|_| KvError::Protocol("frame header is not utf-8".to_string()))?;

        match *tag {
            b'+' => Ok(Frame::Simple(rest.to_string())),
            b'-' => Ok(Frame::Error(rest.to_string())),
            b':' => rest
                .parse()
                .map(Frame::Integer)
                .map_err(|_| KvError::Protocol(format!("invalid integer: {rest}"))),
            b'$' => match parse_len(rest)? {
                None => Ok(Frame::Bulk(None)),
                Some(len) if len > MAX_BULK_LEN => {
                    Err(KvError::Protocol(format!("bulk string too large: {len}")))
                }
                Some(len) => {
                    let mut data = vec![0u8; len + 2];
                    reader.read_exact(&mut data).await?;
                    if !data.ends_with(b"\r\n") {
                        return Err(KvError::Protocol(
                            "bulk string missing terminator".to_string(),
                        ));
                    }
                    data.truncate(len);
                    Ok(Frame::Bulk(Some(data)))
                }
            },
            b'*' => match parse_len(rest)? {
                None => Ok(Frame::Array(None)),
                Some(len) => {
                    let mut items = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        items.push(read_frame(reader).await?);
                    }
                    Ok(Frame::Array(Some(items)))
                }
            },
            other => Err(KvError::Protocol(format!(
                "unexpected frame type byte 0x{other:02x}"
            ))),
        }
    })
}

/// Read a `\r\n`-terminated line, without the terminator.
async fn read_line<R>(reader: &mut R) -> KvResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            let message = if line.is_empty() {
                "connection closed by peer"
            } else {
                "connection closed mid-frame"
            };
            return Err(KvError::Io(message.to_string()));
        }
        let (consumed, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => {
                line.extend_from_slice(&available[..=i]);
                (i + 1, true)
            }
            None => {
                line.extend_from_slice(available);
                (available.len(), false)
            }
        };
        reader.consume(consumed);
        if line.len() > MAX_LINE_LEN + 2 {
            return Err(KvError::Protocol(format!(
                "frame header longer than {MAX_LINE_LEN} bytes"
            )));
        }
        if done {
            break;
        }
    }
    if !line.ends_with(b"\r\n") {
        return Err(KvError::Protocol("frame header missing terminator".to_string()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

/// Parse a length header; `-1` is nil.
fn parse_len(s: &str) -> KvResult<Option<usize>> {
    let len: i64 = s
        .parse()
        .map_err(|_| KvError::Protocol(format!("invalid length: {s}")))?;
    match len {
        -1 => Ok(None),
        n if n < 0 => Err(KvError::Protocol(format!("invalid length: {n}"))),
        n => Ok(Some(n as usize)),
    }
}
