//! The client-side connection and reply pretty-printer.

use cc_resp::{Frame, FrameError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug)]
pub enum ShellError {
    Io(std::io::Error),
    Frame(FrameError),
    Closed,
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellError::Io(e) => write!(f, "IO error: {}", e),
            ShellError::Frame(e) => write!(f, "protocol error: {}", e),
            ShellError::Closed => write!(f, "server closed the connection"),
        }
    }
}

impl std::error::Error for ShellError {}

impl From<std::io::Error> for ShellError {
    fn from(e: std::io::Error) -> Self {
        ShellError::Io(e)
    }
}

impl From<FrameError> for ShellError {
    fn from(e: FrameError) -> Self {
        ShellError::Frame(e)
    }
}

/// One connection to a CoolCache server.
pub struct ShellClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl ShellClient {
    pub async fn connect(host: &str, port: u16) -> Result<ShellClient, ShellError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(ShellClient {
            stream,
            buf: Vec::new(),
        })
    }

    /// Send one command (already split into tokens) and read one reply.
    pub async fn request(&mut self, tokens: &[String]) -> Result<Frame, ShellError> {
        let frame = Frame::Array(
            tokens
                .iter()
                .map(|t| Frame::Bulk(t.as_bytes().to_vec()))
                .collect(),
        );
        self.stream.write_all(&frame.encode()).await?;
        self.read_frame().await
    }

    /// Read the next pushed frame (subscribed mode).
    pub async fn read_frame(&mut self) -> Result<Frame, ShellError> {
        loop {
            if let Some((frame, used)) = cc_resp::decode(&self.buf)? {
                self.buf.drain(..used);
                return Ok(frame);
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ShellError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

// ---------------------------------------------------------------------------
// Reply formatting
// ---------------------------------------------------------------------------

/// Render a reply the way interactive users expect: quoted bulks, `(nil)`,
/// `(integer n)`, numbered array items.
pub fn format_reply(frame: &Frame) -> String {
    format_indented(frame, 0)
}

fn format_indented(frame: &Frame, depth: usize) -> String {
    match frame {
        Frame::Simple(s) => s.clone(),
        Frame::Error(s) => format!("(error) {}", s),
        Frame::Integer(n) => format!("(integer) {}", n),
        Frame::Bulk(b) => format!("\"{}\"", escape_bytes(b)),
        Frame::NullBulk | Frame::NullArray => "(nil)".to_owned(),
        Frame::Array(items) if items.is_empty() => "(empty array)".to_owned(),
        Frame::Array(items) => {
            let pad = "   ".repeat(depth);
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let prefix = if i == 0 { "" } else { &pad };
                    format!("{}{}) {}", prefix, i + 1, format_indented(item, depth + 1))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}
