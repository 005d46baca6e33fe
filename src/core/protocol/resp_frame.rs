// src/core/protocol/resp_frame.rs

//! RESP2 frames and the `tokio_util` codec that carries them over a client session.
//!
//! The client writes commands as arrays of bulk strings and reads back any
//! frame type; the codec handles both directions so the same type also serves
//! the in-process test store.

use crate::core::StoreError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

// Limits applied while decoding so a misbehaving peer cannot exhaust memory.
const MAX_ARRAY_LEN: usize = 1024 * 1024;
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
const MAX_DEPTH: usize = 64;

/// A single RESP2 frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Builds a command frame from its parts, each sent as a bulk string.
    pub fn command<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        RespFrame::Array(parts.into_iter().map(RespFrame::BulkString).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespFrame::Null | RespFrame::NullArray)
    }

    /// Converts an error reply into `StoreError::Server`; other frames pass through.
    pub fn into_result(self) -> Result<RespFrame, StoreError> {
        match self {
            RespFrame::Error(msg) => Err(StoreError::Server(msg)),
            other => Ok(other),
        }
    }

    /// Accepts only a `+OK` reply.
    pub fn expect_ok(self, command: &str) -> Result<(), StoreError> {
        match self {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
            other => Err(StoreError::Protocol(format!(
                "unexpected reply to {command}: {other:?}"
            ))),
        }
    }

    /// Accepts only an integer reply.
    pub fn into_integer(self, command: &str) -> Result<i64, StoreError> {
        match self {
            RespFrame::Integer(n) => Ok(n),
            other => Err(StoreError::Protocol(format!(
                "unexpected reply to {command}: {other:?}"
            ))),
        }
    }

    /// Encodes the frame into a fresh byte vector.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        write_frame(self, &mut buf);
        buf.to_vec()
    }
}

/// Codec for reading and writing `RespFrame`s on a byte stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = StoreError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_frame(&item, dst);
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = StoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut pos = 0;
        match parse_frame(src, &mut pos, 0) {
            Ok(frame) => {
                src.advance(pos);
                Ok(Some(frame))
            }
            // Nothing is consumed until a whole frame is available.
            Err(StoreError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn write_frame(frame: &RespFrame, dst: &mut BytesMut) {
    match frame {
        RespFrame::SimpleString(s) => write_line(dst, b'+', s.as_bytes()),
        RespFrame::Error(s) => write_line(dst, b'-', s.as_bytes()),
        RespFrame::Integer(i) => {
            let mut num = itoa::Buffer::new();
            write_line(dst, b':', num.format(*i).as_bytes());
        }
        RespFrame::BulkString(b) => {
            let mut num = itoa::Buffer::new();
            write_line(dst, b'$', num.format(b.len()).as_bytes());
            dst.extend_from_slice(b);
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
        RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
        RespFrame::Array(items) => {
            let mut num = itoa::Buffer::new();
            write_line(dst, b'*', num.format(items.len()).as_bytes());
            for item in items {
                write_frame(item, dst);
            }
        }
    }
}

fn write_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.reserve(body.len() + 3);
    dst.extend_from_slice(&[prefix]);
    dst.extend_from_slice(body);
    dst.extend_from_slice(CRLF);
}

/// Parses one frame starting at `pos`, advancing `pos` past it on success.
fn parse_frame(buf: &[u8], pos: &mut usize, depth: usize) -> Result<RespFrame, StoreError> {
    if depth > MAX_DEPTH {
        return Err(StoreError::Protocol("frame nesting too deep".into()));
    }

    let Some(&prefix) = buf.get(*pos) else {
        return Err(StoreError::IncompleteData);
    };
    *pos += 1;
    let line = read_line(buf, pos)?;

    match prefix {
        b'+' => Ok(RespFrame::SimpleString(
            String::from_utf8_lossy(line).into_owned(),
        )),
        b'-' => Ok(RespFrame::Error(String::from_utf8_lossy(line).into_owned())),
        b':' => Ok(RespFrame::Integer(parse_int(line)?)),
        b'$' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(RespFrame::Null);
            }
            let len = checked_len(len, MAX_BULK_LEN, "bulk string")?;
            let end = *pos + len;
            if buf.len() < end + CRLF.len() {
                return Err(StoreError::IncompleteData);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(StoreError::Protocol(
                    "bulk string is not terminated by CRLF".into(),
                ));
            }
            let data = Bytes::copy_from_slice(&buf[*pos..end]);
            *pos = end + CRLF.len();
            Ok(RespFrame::BulkString(data))
        }
        b'*' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(RespFrame::NullArray);
            }
            let len = checked_len(len, MAX_ARRAY_LEN, "array")?;
            let mut items = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                items.push(parse_frame(buf, pos, depth + 1)?);
            }
            Ok(RespFrame::Array(items))
        }
        other => Err(StoreError::Protocol(format!(
            "unexpected frame prefix byte 0x{other:02x}"
        ))),
    }
}

fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], StoreError> {
    let rest = &buf[*pos..];
    let end = rest
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .ok_or(StoreError::IncompleteData)?;
    *pos += end + CRLF.len();
    Ok(&rest[..end])
}

fn parse_int(line: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            StoreError::Protocol(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(line)
            ))
        })
}

fn checked_len(len: i64, max: usize, what: &str) -> Result<usize, StoreError> {
    usize::try_from(len)
        .ok()
        .filter(|l| *l <= max)
        .ok_or_else(|| StoreError::Protocol(format!("invalid {what} length {len}")))
}
