//! Minimal RESP client for tests.

use cc_resp::{Frame, FrameError};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};

/// How long a single `recv` may take before the test is considered hung.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    Frame(FrameError),
    Timeout,
    Closed,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "IO error: {}", e),
            ClientError::Frame(e) => write!(f, "frame error: {}", e),
            ClientError::Timeout => write!(f, "timed out waiting for a reply"),
            ClientError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        ClientError::Frame(e)
    }
}

/// A test-side RESP connection.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<TestClient, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(TestClient {
            stream,
            buf: Vec::new(),
        })
    }

    /// Send a command (array of bulk strings).
    pub async fn send(&mut self, args: &[&str]) -> Result<(), ClientError> {
        let frame = Frame::Array(
            args.iter()
                .map(|a| Frame::Bulk(a.as_bytes().to_vec()))
                .collect(),
        );
        self.stream.write_all(&frame.encode()).await?;
        Ok(())
    }

    /// Read the next complete frame.
    pub async fn recv(&mut self) -> Result<Frame, ClientError> {
        loop {
            if let Some((frame, used)) = cc_resp::decode(&self.buf)? {
                self.buf.drain(..used);
                return Ok(frame);
            }
            let mut chunk = [0u8; 4096];
            let n = timeout(RECV_TIMEOUT, self.stream.read(&mut chunk))
                .await
                .map_err(|_| ClientError::Timeout)??;
            if n == 0 {
                return Err(ClientError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Send one command and read one reply.
    pub async fn request(&mut self, args: &[&str]) -> Result<Frame, ClientError> {
        self.send(args).await?;
        self.recv().await
    }

    /// Convenience for asserting simple replies.
    pub async fn request_expect(&mut self, args: &[&str], expected: Frame) {
        let got = self.request(args).await.expect("request failed");
        assert_eq!(got, expected, "unexpected reply to {:?}", args);
    }
}
