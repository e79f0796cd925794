//! # RESP2 Encoding and Parsing
//!
//! Purpose: Frame client commands and read server replies over a blocking
//! stream.
//!
//! ## Design Principles
//! 1. **Top-Down Parsing**: Each reply is read recursively from its type byte.
//! 2. **Buffer Reuse**: The caller owns the line buffer and the output buffer.
//! 3. **Binary-Safe**: Bulk strings are raw bytes; keys and values are never
//!    assumed to be UTF-8.

use std::io::BufRead;

use crate::error::{ClientError, ClientResult};

/// One RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`, `+PONG`.
    Simple(Vec<u8>),
    /// `-ERR ...`, `-MOVED ...`.
    Error(Vec<u8>),
    /// `:123`.
    Integer(i64),
    /// `$n`, with `None` for `$-1`.
    Bulk(Option<Vec<u8>>),
    /// `*n`; a null array (`*-1`) reads as empty.
    Array(Vec<RespValue>),
}

/// Appends `args` to `out` as a RESP2 array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A], out: &mut Vec<u8>) {
    write_header(out, b'*', args.len());
    for arg in args {
        let arg = arg.as_ref();
        write_header(out, b'$', arg.len());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

fn write_header(out: &mut Vec<u8>, kind: u8, len: usize) {
    out.push(kind);
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Reads one reply from `reader`.
pub fn read_response<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_line(reader, line)?;
    let (&kind, rest) = line.split_first().ok_or(ClientError::Protocol)?;

    match kind {
        b'+' => Ok(RespValue::Simple(rest.to_vec())),
        b'-' => Ok(RespValue::Error(rest.to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            let mut items = Vec::with_capacity(len.max(0) as usize);
            for _ in 0..len.max(0) {
                items.push(read_response(reader, line)?);
            }
            Ok(RespValue::Array(items))
        }
        _ => Err(ClientError::Protocol),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }

    // Payload plus trailing CRLF in one read.
    let mut data = vec![0u8; len as usize + 2];
    reader.read_exact(&mut data)?;
    if !data.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    data.truncate(len as usize);
    Ok(RespValue::Bulk(Some(data)))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Err(ClientError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ClientError::Protocol)
}
