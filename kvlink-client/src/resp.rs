//! # RESP2 Encoding and Decoding
//!
//! Purpose: Frame commands for the backend and decode replies incrementally
//! from a socket buffer.
//!
//! ## Design Principles
//! 1. **Incremental Decoding**: `ReplyDecoder::decode` returns `Ok(None)` until a
//!    complete frame is buffered and skips re-parsing until the missing bytes arrive.
//! 2. **Buffer Reuse**: Callers own the `BytesMut`; decoded frames are split off.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing and excessive nesting return protocol errors
//!    immediately.

use bytes::{Buf, BufMut, BytesMut};

use kvlink_common::{CommandError, CommandResult};

/// Largest bulk string accepted from the backend (matches the server-side cap).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// RESP reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style replies.
    Simple(Vec<u8>),
    /// -ERR ... replies.
    Error(Vec<u8>),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays; a null array decodes as empty.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Error reply text, lossily decoded.
    pub fn error_message(&self) -> Option<String> {
        match self {
            RespValue::Error(message) => Some(String::from_utf8_lossy(message).into_owned()),
            _ => None,
        }
    }
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[&[u8]], out: &mut BytesMut) {
    out.put_u8(b'*');
    put_decimal(out, args.len());
    out.put_slice(b"\r\n");
    for arg in args {
        out.put_u8(b'$');
        put_decimal(out, arg.len());
        out.put_slice(b"\r\n");
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

/// Deepest array nesting accepted in a reply. `CLUSTER SLOTS` uses three levels.
const MAX_DEPTH: usize = 32;

/// Outcome of parsing from a buffer offset.
enum Parsed {
    /// A complete value and the offset just past it.
    Done(RespValue, usize),
    /// The buffer must grow to at least this length before parsing can progress.
    Partial(usize),
}

/// Incremental reply decoder for one connection.
///
/// Remembers how many bytes the pending frame needs, so a large bulk string
/// arriving over many reads is parsed once instead of after every read.
#[derive(Debug, Default)]
pub(crate) struct ReplyDecoder {
    need: usize,
}

impl ReplyDecoder {
    /// Decodes one reply from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; on success the frame is
    /// removed from the buffer.
    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> CommandResult<Option<RespValue>> {
        if buf.len() < self.need {
            return Ok(None);
        }
        match parse_value(&buf[..], 0, 0)? {
            Parsed::Done(value, consumed) => {
                buf.advance(consumed);
                self.need = 0;
                Ok(Some(value))
            }
            Parsed::Partial(need) => {
                self.need = need;
                Ok(None)
            }
        }
    }

    pub(crate) fn needed(&self) -> usize {
        self.need
    }
}

fn parse_value(data: &[u8], pos: usize, depth: usize) -> CommandResult<Parsed> {
    let (line, next) = match read_line(data, pos)? {
        Some(found) => found,
        None => return Ok(Parsed::Partial(data.len() + 1)),
    };
    if line.is_empty() {
        return Err(CommandError::Protocol("empty reply line"));
    }

    match line[0] {
        b'+' => Ok(Parsed::Done(RespValue::Simple(line[1..].to_vec()), next)),
        b'-' => Ok(Parsed::Done(RespValue::Error(line[1..].to_vec()), next)),
        b':' => Ok(Parsed::Done(RespValue::Integer(parse_i64(&line[1..])?), next)),
        b'$' => parse_bulk(data, parse_i64(&line[1..])?, next),
        b'*' => parse_array(data, parse_i64(&line[1..])?, next, depth),
        _ => Err(CommandError::Protocol("unknown reply type")),
    }
}

fn parse_bulk(data: &[u8], len: i64, start: usize) -> CommandResult<Parsed> {
    if len < 0 {
        return Ok(Parsed::Done(RespValue::Bulk(None), start));
    }
    if len > MAX_BULK_LEN {
        return Err(CommandError::Protocol("bulk string too large"));
    }
    let end = start + len as usize;
    if data.len() < end + 2 {
        return Ok(Parsed::Partial(end + 2));
    }
    if &data[end..end + 2] != b"\r\n" {
        return Err(CommandError::Protocol("bulk string missing CRLF"));
    }
    Ok(Parsed::Done(RespValue::Bulk(Some(data[start..end].to_vec())), end + 2))
}

fn parse_array(data: &[u8], len: i64, start: usize, depth: usize) -> CommandResult<Parsed> {
    if len <= 0 {
        return Ok(Parsed::Done(RespValue::Array(Vec::new()), start));
    }
    if depth >= MAX_DEPTH {
        return Err(CommandError::Protocol("reply nested too deeply"));
    }

    let mut items = Vec::with_capacity(len.min(1024) as usize);
    let mut cursor = start;
    for _ in 0..len {
        match parse_value(data, cursor, depth + 1)? {
            Parsed::Done(item, next) => {
                items.push(item);
                cursor = next;
            }
            Parsed::Partial(need) => return Ok(Parsed::Partial(need)),
        }
    }
    Ok(Parsed::Done(RespValue::Array(items), cursor))
}

fn read_line(data: &[u8], pos: usize) -> CommandResult<Option<(&[u8], usize)>> {
    let newline = match data[pos..].iter().position(|&b| b == b'\n') {
        Some(offset) => pos + offset,
        None => return Ok(None),
    };
    if newline == pos || data[newline - 1] != b'\r' {
        return Err(CommandError::Protocol("line not terminated by CRLF"));
    }
    Ok(Some((&data[pos..newline - 1], newline + 1)))
}

fn parse_i64(data: &[u8]) -> CommandResult<i64> {
    if data.is_empty() {
        return Err(CommandError::Protocol("missing integer"));
    }
    let (negative, digits) = match data[0] {
        b'-' => (true, &data[1..]),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(CommandError::Protocol("missing integer"));
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(CommandError::Protocol("invalid integer"));
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }

    Ok(if negative { -value } else { value })
}

fn put_decimal(out: &mut BytesMut, mut value: usize) {
    // Digits land in a stack buffer first to keep the encoder allocation-free.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.put_slice(&buf[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(buf: &mut BytesMut) -> CommandResult<Option<RespValue>> {
        ReplyDecoder::default().decode(buf)
    }

    fn decode_all(input: &[u8]) -> RespValue {
        let mut buf = BytesMut::from(input);
        let value = decode(&mut buf).unwrap().expect("complete frame");
        assert!(buf.is_empty(), "frame should be fully consumed");
        value
    }

    #[test]
    fn encodes_command() {
        let mut buf = BytesMut::new();
        encode_command(&[b"GET", b"key"], &mut buf);
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    }

    #[test]
    fn encodes_empty_argument() {
        let mut buf = BytesMut::new();
        encode_command(&[b"AUTH", b""], &mut buf);
        assert_eq!(&buf[..], b"*2\r\n$4\r\nAUTH\r\n$0\r\n\r\n");
    }

    #[test]
    fn parses_simple_string() {
        assert_eq!(decode_all(b"+OK\r\n"), RespValue::Simple(b"OK".to_vec()));
    }

    #[test]
    fn parses_bulk_string() {
        assert_eq!(decode_all(b"$5\r\nhello\r\n"), RespValue::Bulk(Some(b"hello".to_vec())));
    }

    #[test]
    fn parses_null_bulk_string() {
        assert_eq!(decode_all(b"$-1\r\n"), RespValue::Bulk(None));
    }

    #[test]
    fn parses_integer() {
        assert_eq!(decode_all(b":-42\r\n"), RespValue::Integer(-42));
    }

    #[test]
    fn parses_error() {
        let value = decode_all(b"-ERR bad\r\n");
        assert_eq!(value.error_message().as_deref(), Some("ERR bad"));
    }

    #[test]
    fn parses_nested_array() {
        let value = decode_all(b"*2\r\n:0\r\n*2\r\n$9\r\n127.0.0.1\r\n:7000\r\n");
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Integer(0),
                RespValue::Array(vec![
                    RespValue::Bulk(Some(b"127.0.0.1".to_vec())),
                    RespValue::Integer(7000),
                ]),
            ])
        );
    }

    #[test]
    fn waits_for_complete_frame() {
        let mut buf = BytesMut::from(&b"$5\r\nhel"[..]);
        assert_eq!(decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 7, "partial frame must stay buffered");

        buf.extend_from_slice(b"lo\r\n+OK\r\n");
        assert_eq!(
            decode(&mut buf).unwrap(),
            Some(RespValue::Bulk(Some(b"hello".to_vec())))
        );
        assert_eq!(decode(&mut buf).unwrap(), Some(RespValue::Simple(b"OK".to_vec())));
    }

    #[test]
    fn rejects_bad_framing() {
        let inputs: [&[u8]; 4] = [b"?x\r\n", b"+OK\n", b":12a\r\n", b"$3\r\nabcd\r\n"];
        for input in inputs {
            let mut buf = BytesMut::from(input);
            assert!(matches!(decode(&mut buf), Err(CommandError::Protocol(_))), "{:?}", input);
        }
    }

    #[test]
    fn rejects_deeply_nested_arrays() {
        let mut nested = b"*1\r\n".repeat(200_000);
        nested.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&nested[..]);
        assert!(matches!(
            decode(&mut buf),
            Err(CommandError::Protocol("reply nested too deeply"))
        ));

        let mut allowed = b"*1\r\n".repeat(MAX_DEPTH);
        allowed.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&allowed[..]);
        assert!(decode(&mut buf).unwrap().is_some());

        let mut too_deep = b"*1\r\n".repeat(MAX_DEPTH + 1);
        too_deep.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&too_deep[..]);
        assert!(decode(&mut buf).is_err());
    }

    #[test]
    fn decoder_waits_for_announced_bulk_length() {
        let mut decoder = ReplyDecoder::default();
        let mut buf = BytesMut::from(&b"$10\r\nabc"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(decoder.needed(), 17);

        buf.extend_from_slice(b"defg");
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(decoder.needed(), 17);

        buf.extend_from_slice(b"hij\r\n:1\r\n");
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(RespValue::Bulk(Some(b"abcdefghij".to_vec())))
        );
        assert_eq!(decoder.needed(), 0);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(RespValue::Integer(1)));
    }

    #[test]
    fn decoder_resumes_split_array() {
        let mut decoder = ReplyDecoder::default();
        let mut buf = BytesMut::from(&b"*2\r\n:1\r\n:"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"2\r\n");
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(RespValue::Array(vec![RespValue::Integer(1), RespValue::Integer(2)]))
        );
        assert!(buf.is_empty());
    }
}
