// cc-resp: RESP wire framing for the CoolCache server and client tools.
//
// A frame is one of five typed shapes, each introduced by a single prefix
// byte: `+simple`, `-error`, `:integer`, `$bulk`, `*array`.  Interactive
// clients may also send inline commands (a bare line of whitespace-separated
// tokens), which decode to an array of bulk strings.

use thiserror::Error;

/// One decoded RESP frame.
///
/// `NullBulk` (`$-1\r\n`) and `NullArray` (`*-1\r\n`) are distinct variants
/// rather than options because they encode differently and both appear as
/// command replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    NullBulk,
    Array(Vec<Frame>),
    NullArray,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid integer in frame header")]
    BadInteger,
    #[error("bulk payload not terminated by CRLF")]
    BadTerminator,
    #[error("simple frame contains invalid UTF-8")]
    BadUtf8,
    #[error("inline command line too long")]
    InlineTooLong,
}

/// Hard cap on a single inline command line.  Array/bulk framing has no such
/// cap; inline input comes from humans and a runaway line indicates a client
/// speaking some other protocol at us.
const MAX_INLINE_LINE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one complete frame from the front of `buf`.
///
/// Returns `Ok(Some((frame, consumed)))` when a full frame is available,
/// `Ok(None)` when more bytes are needed (nothing is consumed), and `Err`
/// when the prefix or header bytes are malformed.  The caller drains
/// `consumed` bytes from its input buffer on success.
pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(&prefix) = buf.first() else {
        return Ok(None);
    };
    match prefix {
        b'+' => Ok(decode_line(buf, 1)?.map(|(line, used)| (Frame::Simple(line), used))),
        b'-' => Ok(decode_line(buf, 1)?.map(|(line, used)| (Frame::Error(line), used))),
        b':' => {
            let Some((line, used)) = decode_line(buf, 1)? else {
                return Ok(None);
            };
            let n = line.parse::<i64>().map_err(|_| FrameError::BadInteger)?;
            Ok(Some((Frame::Integer(n), used)))
        }
        b'$' => decode_bulk(buf),
        b'*' => decode_array(buf),
        _ => decode_inline(buf),
    }
}

fn decode_line(buf: &[u8], start: usize) -> Result<Option<(String, usize)>, FrameError> {
    let Some(end) = find_crlf(&buf[start..]) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[start..start + end])
        .map_err(|_| FrameError::BadUtf8)?
        .to_owned();
    Ok(Some((line, start + end + 2)))
}

fn decode_bulk(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some((header, body_start)) = decode_line(buf, 1)? else {
        return Ok(None);
    };
    let len = header.parse::<i64>().map_err(|_| FrameError::BadInteger)?;
    if len == -1 {
        return Ok(Some((Frame::NullBulk, body_start)));
    }
    if len < 0 {
        return Err(FrameError::BadInteger);
    }
    let len = len as usize;
    // Payload plus its trailing CRLF must be fully buffered.
    if buf.len() < body_start + len + 2 {
        return Ok(None);
    }
    if &buf[body_start + len..body_start + len + 2] != b"\r\n" {
        return Err(FrameError::BadTerminator);
    }
    let payload = buf[body_start..body_start + len].to_vec();
    Ok(Some((Frame::Bulk(payload), body_start + len + 2)))
}

fn decode_array(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some((header, mut pos)) = decode_line(buf, 1)? else {
        return Ok(None);
    };
    let count = header.parse::<i64>().map_err(|_| FrameError::BadInteger)?;
    if count == -1 {
        return Ok(Some((Frame::NullArray, pos)));
    }
    if count < 0 {
        return Err(FrameError::BadInteger);
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let Some((item, used)) = decode(&buf[pos..])? else {
            return Ok(None);
        };
        items.push(item);
        pos += used;
    }
    Ok(Some((Frame::Array(items), pos)))
}

/// Inline commands: one line of whitespace-separated tokens, accepted from
/// interactive clients.  Decodes to the same array-of-bulk shape as framed
/// commands so the dispatcher never sees the difference.
fn decode_inline(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(nl) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_INLINE_LINE {
            return Err(FrameError::InlineTooLong);
        }
        return Ok(None);
    };
    if nl > MAX_INLINE_LINE {
        return Err(FrameError::InlineTooLong);
    }
    let line = &buf[..nl];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = std::str::from_utf8(line).map_err(|_| FrameError::BadUtf8)?;
    let items: Vec<Frame> = line
        .split_whitespace()
        .map(|tok| Frame::Bulk(tok.as_bytes().to_vec()))
        .collect();
    Ok(Some((Frame::Array(items), nl + 1)))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

impl Frame {
    /// Append the wire encoding of this frame to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                out.push(b':');
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Bulk(payload) => {
                out.push(b'$');
                out.extend_from_slice(payload.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(payload);
                out.extend_from_slice(b"\r\n");
            }
            Frame::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode_into(out);
                }
            }
            Frame::NullArray => out.extend_from_slice(b"*-1\r\n"),
        }
    }

    /// The wire encoding of this frame as a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    // -----------------------------------------------------------------------
    // Construction helpers
    // -----------------------------------------------------------------------

    pub fn ok() -> Frame {
        Frame::Simple("OK".to_owned())
    }

    pub fn simple(s: impl Into<String>) -> Frame {
        Frame::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Frame {
        Frame::Error(s.into())
    }

    pub fn bulk(payload: impl Into<Vec<u8>>) -> Frame {
        Frame::Bulk(payload.into())
    }

    /// An array of bulk strings: the shape of every client command.
    pub fn command(args: &[&[u8]]) -> Frame {
        Frame::Array(args.iter().map(|a| Frame::Bulk(a.to_vec())).collect())
    }

    /// Extract command arguments from an array-of-bulk frame.
    ///
    /// Returns `None` when the frame is not an array or any element is not a
    /// bulk string (clients must send commands as arrays of bulk strings).
    pub fn as_command_args(&self) -> Option<Vec<Vec<u8>>> {
        let Frame::Array(items) = self else {
            return None;
        };
        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Frame::Bulk(b) => args.push(b.clone()),
                _ => return None,
            }
        }
        Some(args)
    }
}
