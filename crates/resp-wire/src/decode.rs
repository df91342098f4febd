use crate::{CRLF, ReplyError, Value};

/// Arrays nested deeper than this are rejected as malformed.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on the capacity reserved up front for an array, whatever count it declares.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

/// Outcome of decoding the front of a receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Not enough bytes for a full reply. Nothing was consumed.
    Incomplete,
    /// One reply, spanning the first `consumed` bytes of the buffer.
    Complete {
        reply: Result<Value, ReplyError>,
        consumed: usize,
    },
}

enum Step {
    Incomplete,
    Done {
        reply: Result<Value, ReplyError>,
        next: usize,
    },
    Malformed(String),
}

/// Decode a single reply from the start of `buf`.
///
/// Malformed input yields a [`ReplyError::Protocol`] that consumes the whole buffer.
/// A server error nested in an array becomes the reply of the whole array as soon as it
/// is decoded. The elements after it are consumed only as far as they have already arrived.
pub fn decode_one(buf: &[u8]) -> Decoded {
    match parse_value(buf, 0, 0) {
        Step::Incomplete => Decoded::Incomplete,
        Step::Done { reply, next } => Decoded::Complete {
            reply,
            consumed: next,
        },
        Step::Malformed(message) => Decoded::Complete {
            reply: Err(ReplyError::Protocol(message)),
            consumed: buf.len(),
        },
    }
}

/// Returns the line starting at `start` (without CRLF) and the index after the CRLF.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let end = buf[start..]
        .windows(CRLF.len())
        .position(|window| window == CRLF)?;
    Some((&buf[start..start + end], start + end + CRLF.len()))
}

fn parse_integer(line: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| format!("Invalid integer: {:?}", String::from_utf8_lossy(line)))
}

fn parse_value(buf: &[u8], start: usize, depth: usize) -> Step {
    if depth > MAX_NESTING_DEPTH {
        return Step::Malformed(format!(
            "Nesting deeper than {MAX_NESTING_DEPTH} levels"
        ));
    }
    let Some(&prefix) = buf.get(start) else {
        return Step::Incomplete;
    };
    if !matches!(prefix, b'+' | b'-' | b':' | b'$' | b'*') {
        return Step::Malformed(format!("Unknown RESP prefix: {}", prefix as char));
    }
    let Some((line, next)) = read_line(buf, start + 1) else {
        return Step::Incomplete;
    };

    match prefix {
        b'+' => Step::Done {
            reply: Ok(Value::Simple(String::from_utf8_lossy(line).into_owned())),
            next,
        },
        b'-' => Step::Done {
            reply: Err(ReplyError::Server(
                String::from_utf8_lossy(line).into_owned(),
            )),
            next,
        },
        b':' => match parse_integer(line) {
            Ok(value) => Step::Done {
                reply: Ok(Value::Integer(value)),
                next,
            },
            Err(message) => Step::Malformed(message),
        },
        b'$' => parse_bulk(buf, line, next),
        _ => parse_array(buf, line, next, depth),
    }
}

fn parse_bulk(buf: &[u8], header: &[u8], body_start: usize) -> Step {
    let length = match parse_integer(header) {
        Ok(-1) => {
            return Step::Done {
                reply: Ok(Value::Bulk(None)),
                next: body_start,
            };
        }
        Ok(length) if length >= 0 => length as usize,
        Ok(length) => return Step::Malformed(format!("Invalid bulk length: {length}")),
        Err(message) => return Step::Malformed(message),
    };

    let Some(frame_end) = body_start
        .checked_add(length)
        .and_then(|body_end| body_end.checked_add(CRLF.len()))
    else {
        return Step::Malformed(format!("Invalid bulk length: {length}"));
    };
    if buf.len() < frame_end {
        return Step::Incomplete;
    }
    let body_end = frame_end - CRLF.len();
    if &buf[body_end..frame_end] != CRLF {
        return Step::Malformed("Bulk string is not terminated by CRLF".to_string());
    }

    Step::Done {
        reply: Ok(Value::Bulk(Some(
            String::from_utf8_lossy(&buf[body_start..body_end]).into_owned(),
        ))),
        next: frame_end,
    }
}

fn parse_array(buf: &[u8], header: &[u8], items_start: usize, depth: usize) -> Step {
    let count = match parse_integer(header) {
        Ok(-1) => {
            return Step::Done {
                reply: Ok(Value::Array(None)),
                next: items_start,
            };
        }
        Ok(count) if count >= 0 => count as usize,
        Ok(count) => return Step::Malformed(format!("Invalid array length: {count}")),
        Err(message) => return Step::Malformed(message),
    };

    let mut values = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
    let mut cursor = items_start;
    for index in 0..count {
        match parse_value(buf, cursor, depth + 1) {
            Step::Done {
                reply: Ok(value),
                next,
            } => {
                values.push(value);
                cursor = next;
            }
            Step::Done {
                reply: Err(err),
                next,
            } => {
                return Step::Done {
                    reply: Err(err),
                    next: skip_complete_values(buf, next, count - index - 1, depth + 1),
                };
            }
            incomplete_or_malformed => return incomplete_or_malformed,
        }
    }

    Step::Done {
        reply: Ok(Value::Array(Some(values))),
        next: cursor,
    }
}

/// Step over up to `remaining` values starting at `cursor`, stopping at the first one
/// that is not complete yet. Returns the index after the last value stepped over.
fn skip_complete_values(buf: &[u8], mut cursor: usize, remaining: usize, depth: usize) -> usize {
    for _ in 0..remaining {
        match parse_value(buf, cursor, depth) {
            Step::Done { next, .. } => cursor = next,
            Step::Incomplete | Step::Malformed(_) => break,
        }
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_request;
    use rstest::rstest;

    fn complete(buf: &[u8]) -> (Result<Value, ReplyError>, usize) {
        match decode_one(buf) {
            Decoded::Complete { reply, consumed } => (reply, consumed),
            Decoded::Incomplete => panic!("expected a complete reply for {buf:?}"),
        }
    }

    /// Feed `stream` to the decoder `chunk_size` bytes at a time, the way the client does.
    fn decode_in_chunks(stream: &[u8], chunk_size: usize) -> Vec<Result<Value, ReplyError>> {
        let mut buffer = Vec::new();
        let mut replies = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            buffer.extend_from_slice(chunk);
            while let Decoded::Complete { reply, consumed } = decode_one(&buffer) {
                buffer.drain(..consumed);
                replies.push(reply);
            }
        }
        assert!(buffer.is_empty(), "leftover bytes: {buffer:?}");
        replies
    }

    #[test]
    fn test_simple_string() {
        let (reply, consumed) = complete(b"+OK\r\n");
        assert_eq!(reply, Ok(Value::Simple("OK".to_string())));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_consumed_excludes_following_reply() {
        let (reply, consumed) = complete(b":42\r\n+OK\r\n");
        assert_eq!(reply, Ok(Value::Integer(42)));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_error_frame() {
        let (reply, consumed) = complete(b"-ERR unknown command\r\n");
        assert_eq!(
            reply,
            Err(ReplyError::Server("ERR unknown command".to_string()))
        );
        assert_eq!(consumed, 22);
    }

    #[test]
    fn test_negative_integer() {
        let (reply, _) = complete(b":-7\r\n");
        assert_eq!(reply, Ok(Value::Integer(-7)));
    }

    #[test]
    fn test_bulk_strings() {
        let (reply, consumed) = complete(b"$5\r\nhello\r\n");
        assert_eq!(reply, Ok(Value::Bulk(Some("hello".to_string()))));
        assert_eq!(consumed, 11);

        let (reply, consumed) = complete(b"$0\r\n\r\n");
        assert_eq!(reply, Ok(Value::Bulk(Some(String::new()))));
        assert_eq!(consumed, 6);

        let (reply, consumed) = complete(b"$-1\r\n");
        assert_eq!(reply, Ok(Value::Bulk(None)));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_bulk_body_may_contain_crlf() {
        let (reply, _) = complete(b"$4\r\na\r\nb\r\n");
        assert_eq!(reply, Ok(Value::Bulk(Some("a\r\nb".to_string()))));
    }

    #[test]
    fn test_null_array() {
        let (reply, consumed) = complete(b"*-1\r\n");
        assert_eq!(reply, Ok(Value::Array(None)));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_nested_array() {
        let (reply, consumed) = complete(b"*2\r\n*1\r\n:1\r\n$1\r\nx\r\n");
        assert_eq!(
            reply,
            Ok(Value::Array(Some(vec![
                Value::Array(Some(vec![Value::Integer(1)])),
                Value::Bulk(Some("x".to_string())),
            ])))
        );
        assert_eq!(consumed, 19);
    }

    #[rstest]
    #[case(b"")]
    #[case(b"+")]
    #[case(b"+OK")]
    #[case(b"+OK\r")]
    #[case(b"$5\r\nhel")]
    #[case(b"$5\r\nhello")]
    #[case(b"$5\r\nhello\r")]
    #[case(b"*2\r\n")]
    #[case(b"*2\r\n:1\r\n")]
    #[case(b"*2\r\n:1\r\n$3\r\nab")]
    #[case(b"*1\r\n*2\r\n:1\r\n")]
    fn test_incomplete_consumes_nothing(#[case] buf: &[u8]) {
        assert_eq!(decode_one(buf), Decoded::Incomplete);
    }

    #[test]
    fn test_short_array_stays_incomplete_until_full() {
        let full = b"*3\r\n:1\r\n:2\r\n:3\r\n";
        for end in 0..full.len() {
            assert_eq!(decode_one(&full[..end]), Decoded::Incomplete, "prefix {end}");
        }
        let (reply, consumed) = complete(full);
        assert_eq!(
            reply,
            Ok(Value::Array(Some(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
            ])))
        );
        assert_eq!(consumed, full.len());
    }

    #[test]
    fn test_error_inside_array_becomes_the_reply() {
        let (reply, consumed) = complete(b"*3\r\n:1\r\n-ERR boom\r\n:3\r\n+NEXT\r\n");
        assert_eq!(reply, Err(ReplyError::Server("ERR boom".to_string())));
        // The whole array is consumed, the next reply is left in place.
        assert_eq!(consumed, 23);
    }

    #[rstest]
    #[case(b"*2\r\n-ERR boom\r\n", 15)]
    #[case(b"*3\r\n-ERR boom\r\n:2\r\n", 19)]
    #[case(b"*3\r\n-ERR boom\r\n:2\r\n$5\r\nhel", 19)]
    #[case(b"*2\r\n*2\r\n-ERR boom\r\n", 19)]
    #[case(b"*2\r\n-ERR boom\r\n?bad", 15)]
    fn test_error_inside_array_is_not_held_back(#[case] buf: &[u8], #[case] expected_consumed: usize) {
        let (reply, consumed) = complete(buf);
        assert_eq!(reply, Err(ReplyError::Server("ERR boom".to_string())));
        assert_eq!(consumed, expected_consumed);
    }

    #[rstest]
    #[case(b"?what\r\n+OK\r\n", "Unknown RESP prefix: ?")]
    #[case(b":abc\r\n", "Invalid integer: \"abc\"")]
    #[case(b"$-2\r\n", "Invalid bulk length: -2")]
    #[case(b"*-5\r\n", "Invalid array length: -5")]
    #[case(b"$2\r\nabcd\r\n", "Bulk string is not terminated by CRLF")]
    #[case(b"*1\r\n!x\r\n", "Unknown RESP prefix: !")]
    fn test_malformed_consumes_whole_buffer(#[case] buf: &[u8], #[case] message: &str) {
        let (reply, consumed) = complete(buf);
        assert_eq!(reply, Err(ReplyError::Protocol(message.to_string())));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let mut buf = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            buf.extend_from_slice(b"*1\r\n");
        }
        buf.extend_from_slice(b":1\r\n");
        let (reply, consumed) = complete(&buf);
        assert!(matches!(reply, Err(ReplyError::Protocol(_))));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_nesting_at_the_limit_is_accepted() {
        let mut buf = Vec::new();
        for _ in 0..MAX_NESTING_DEPTH {
            buf.extend_from_slice(b"*1\r\n");
        }
        buf.extend_from_slice(b":1\r\n");
        let (reply, _) = complete(&buf);
        assert!(reply.is_ok());
    }

    #[rstest]
    #[case(&["PING"])]
    #[case(&["AUTH", "default", "s3cr3t"])]
    #[case(&["GRAPH.QUERY", "process_graph", "CREATE (:Snapshot { id: '1' });"])]
    #[case(&["", "with\r\nnewline", "unicode ✓ ünïcödé"])]
    fn test_encoded_request_echoes_back(#[case] args: &[&str]) {
        let (reply, consumed) = complete(&encode_request(args));
        let expected = args
            .iter()
            .map(|arg| Value::Bulk(Some(arg.to_string())))
            .collect();
        assert_eq!(reply, Ok(Value::Array(Some(expected))));
        assert_eq!(consumed, encode_request(args).len());
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_replies() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"+OK\r\n");
        stream.extend_from_slice(b":1000\r\n");
        stream.extend_from_slice(b"$-1\r\n");
        stream.extend_from_slice(b"-ERR nope\r\n");
        stream.extend_from_slice(b"*3\r\n$6\r\nheader\r\n*2\r\n:1\r\n:2\r\n*-1\r\n");
        stream.extend_from_slice(&encode_request(&["GRAPH.QUERY", "g", "MATCH (n) RETURN n"]));
        stream.extend_from_slice("$3\r\n✓\r\n".as_bytes());

        let whole = decode_in_chunks(&stream, stream.len());
        assert_eq!(whole.len(), 7);
        for chunk_size in 1..stream.len() {
            assert_eq!(
                decode_in_chunks(&stream, chunk_size),
                whole,
                "chunk size {chunk_size}"
            );
        }
    }
}
