//! RESP2 command framing and reply parsing.
//!
//! One reply is read per call and arrays recurse up to a fixed depth. Bulk
//! payloads are raw bytes; any framing violation is `ClientError::Protocol`.
//!
//! ```text
//! LPUSH metrics {...}  ->  *3\r\n$5\r\nLPUSH\r\n$7\r\nmetrics\r\n$N\r\n{...}\r\n
//! reply                <-  :42\r\n
//! ```

use std::io::{BufRead, Write};

use crate::client::{ClientError, ClientResult};

/// Replies deeper than this are rejected rather than recursed into.
const MAX_NESTING: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(Vec<u8>),
    Error(Vec<u8>),
    Integer(i64),
    /// `None` is the null bulk string (`$-1`).
    Bulk(Option<Vec<u8>>),
    /// Null and empty arrays both decode to an empty vector.
    Array(Vec<RespValue>),
}

/// Encodes a RESP2 array command into `out`, appending to existing content.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    // Writing into a Vec cannot fail.
    let _ = write!(out, "*{}\r\n", args.len());
    for arg in args {
        let _ = write!(out, "${}\r\n", arg.len());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads exactly one reply; `line_buf` is scratch space reused across calls.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_value(reader, line_buf, 0)
}

fn read_value<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> ClientResult<RespValue> {
    if depth > MAX_NESTING {
        return Err(ClientError::Protocol);
    }

    read_line(reader, line_buf)?;
    let (&kind, rest) = line_buf.split_first().ok_or(ClientError::Protocol)?;
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
            if len <= 0 {
                return Ok(RespValue::Array(Vec::new()));
            }
            let mut items = Vec::with_capacity(len.min(64) as usize);
            for _ in 0..len {
                items.push(read_value(reader, line_buf, depth + 1)?);
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
        return Err(ClientError::Protocol);
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
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or(ClientError::Protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &[u8]) -> ClientResult<RespValue> {
        let mut reader = Cursor::new(raw.to_vec());
        let mut line = Vec::new();
        read_response(&mut reader, &mut line)
    }

    #[test]
    fn encodes_lpush() {
        let mut buf = Vec::new();
        encode_command(&[b"LPUSH", b"metrics", b"{}"], &mut buf);
        assert_eq!(&buf, b"*3\r\n$5\r\nLPUSH\r\n$7\r\nmetrics\r\n$2\r\n{}\r\n");
    }

    #[test]
    fn parses_simple_string() {
        assert_eq!(parse(b"+PONG\r\n").unwrap(), RespValue::Simple(b"PONG".to_vec()));
    }

    #[test]
    fn parses_integer_reply() {
        assert_eq!(parse(b":42\r\n").unwrap(), RespValue::Integer(42));
        assert_eq!(parse(b":-2\r\n").unwrap(), RespValue::Integer(-2));
    }

    #[test]
    fn parses_bulk_and_null_bulk() {
        assert_eq!(parse(b"$5\r\nhello\r\n").unwrap(), RespValue::Bulk(Some(b"hello".to_vec())));
        assert_eq!(parse(b"$-1\r\n").unwrap(), RespValue::Bulk(None));
    }

    #[test]
    fn parses_error_reply() {
        assert_eq!(
            parse(b"-WRONGTYPE not a list\r\n").unwrap(),
            RespValue::Error(b"WRONGTYPE not a list".to_vec())
        );
    }

    #[test]
    fn parses_nested_array() {
        let value = parse(b"*2\r\n:1\r\n*1\r\n+OK\r\n").unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Integer(1),
                RespValue::Array(vec![RespValue::Simple(b"OK".to_vec())]),
            ])
        );
    }

    #[test]
    fn rejects_bad_framing() {
        assert!(matches!(parse(b":12\n"), Err(ClientError::Protocol)));
        assert!(matches!(parse(b"?x\r\n"), Err(ClientError::Protocol)));
        assert!(matches!(parse(b":abc\r\n"), Err(ClientError::Protocol)));
        assert!(matches!(parse(b"$3\r\nabcXY"), Err(ClientError::Protocol)));
        assert!(matches!(parse(b""), Err(ClientError::Protocol)));
    }
}
