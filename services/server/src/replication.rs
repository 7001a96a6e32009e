//! Leader→follower replication.
//!
//! # Leader side
//! Every successful write command's RESP frame is appended to the log:
//! the global offset advances by the frame's byte length, the bytes land in
//! a bounded backlog ring (for partial resync), and a copy is pushed to each
//! attached replica's outbox.  A replica that cannot keep up is killed; it
//! must come back through PSYNC.
//!
//! # Follower side
//! `run_follower` keeps one outbound link to the leader alive: handshake
//! (PING, REPLCONF listening-port, REPLCONF capa psync2, PSYNC ? -1), a full
//! RDB download, then a decode→apply loop that counts every received frame
//! into the follower's own offset and answers REPLCONF GETACK.  The link
//! reconnects with a flat backoff after any error.

use crate::state::Shared;
use cc_resp::{Frame, FrameError};
use cc_store::Store;
use cc_store::rdb::{self, RdbError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

/// Outbox capacity per replica, in frames.  A replica this far behind on a
/// busy leader is cheaper to resync than to queue for.
pub(crate) const REPLICA_OUTBOX: usize = 1024;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Leader state
// ---------------------------------------------------------------------------

struct ReplicaHandle {
    id: u64,
    outbox: mpsc::Sender<Vec<u8>>,
    kill: Arc<Notify>,
    ack_offset: u64,
}

/// What PSYNC decided to do for a connecting replica.
pub enum SyncPlan {
    /// Send `+FULLRESYNC <replid> <offset>` and a fresh snapshot.
    Full { replid: String, offset: u64 },
    /// Send `+CONTINUE` and the backlog suffix from the requested offset.
    Partial { backlog: Vec<u8> },
}

pub struct ReplState {
    replid: String,
    /// Leader: bytes ever appended to the log.  Follower: bytes ingested.
    offset: u64,
    backlog: VecDeque<u8>,
    backlog_cap: usize,
    /// Offset of the first byte still held in `backlog`.
    backlog_start: u64,
    replicas: Vec<ReplicaHandle>,
    next_replica_id: u64,
}

impl ReplState {
    pub fn new(replid: String, backlog_cap: usize) -> ReplState {
        ReplState {
            replid,
            offset: 0,
            backlog: VecDeque::new(),
            backlog_cap,
            backlog_start: 0,
            replicas: Vec::new(),
            next_replica_id: 1,
        }
    }

    pub fn replid(&self) -> &str {
        &self.replid
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub fn add_offset(&mut self, n: u64) {
        self.offset += n;
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Append a command frame to the log and fan it out.
    ///
    /// Called with the store mutex held, so the log order is the commit
    /// order.
    pub fn append(&mut self, frame_bytes: &[u8]) {
        self.offset += frame_bytes.len() as u64;
        self.backlog.extend(frame_bytes);
        while self.backlog.len() > self.backlog_cap {
            self.backlog.pop_front();
            self.backlog_start += 1;
        }
        self.replicas.retain(|replica| {
            match replica.outbox.try_send(frame_bytes.to_vec()) {
                Ok(()) => true,
                Err(_) => {
                    warn!(replica = replica.id, "replica fell behind, disconnecting");
                    replica.kill.notify_one();
                    false
                }
            }
        });
    }

    pub fn register_replica(&mut self, outbox: mpsc::Sender<Vec<u8>>, kill: Arc<Notify>) -> u64 {
        let id = self.next_replica_id;
        self.next_replica_id += 1;
        self.replicas.push(ReplicaHandle {
            id,
            outbox,
            kill,
            ack_offset: 0,
        });
        id
    }

    pub fn remove_replica(&mut self, id: u64) {
        self.replicas.retain(|r| r.id != id);
    }

    pub fn record_ack(&mut self, id: u64, offset: u64) {
        if let Some(replica) = self.replicas.iter_mut().find(|r| r.id == id) {
            replica.ack_offset = replica.ack_offset.max(offset);
        }
    }

    /// Decide between partial and full resync for a PSYNC request.
    ///
    /// `requested_offset` is the first byte the replica still needs.
    pub fn plan_sync(&self, requested_replid: &str, requested_offset: Option<u64>) -> SyncPlan {
        if requested_replid == self.replid
            && let Some(from) = requested_offset
            && let Some(backlog) = self.backlog_from(from)
        {
            return SyncPlan::Partial { backlog };
        }
        SyncPlan::Full {
            replid: self.replid.clone(),
            offset: self.offset,
        }
    }

    /// The log suffix starting at absolute offset `from`, if still buffered.
    fn backlog_from(&self, from: u64) -> Option<Vec<u8>> {
        if from < self.backlog_start || from > self.offset {
            return None;
        }
        let skip = (from - self.backlog_start) as usize;
        Some(self.backlog.iter().skip(skip).copied().collect())
    }
}

// ---------------------------------------------------------------------------
// Frame reader for replication links
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("snapshot: {0}")]
    Rdb(#[from] RdbError),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("link closed")]
    Closed,
}

/// Incremental RESP reader over one half of a replication socket.
pub struct FrameReader<R> {
    rd: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(rd: R) -> FrameReader<R> {
        FrameReader {
            rd,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Next complete frame plus its encoded byte length.
    pub async fn next_frame(&mut self) -> Result<(Frame, usize), LinkError> {
        loop {
            match cc_resp::decode(&self.buf[self.pos..])? {
                Some((frame, used)) => {
                    self.pos += used;
                    self.compact();
                    return Ok((frame, used));
                }
                None => self.fill().await?,
            }
        }
    }

    /// The `$<len>\r\n<bytes>` snapshot framing that follows +FULLRESYNC.
    /// Unlike a bulk string there is no trailing CRLF.
    pub async fn read_snapshot(&mut self) -> Result<Vec<u8>, LinkError> {
        let header_end = loop {
            if let Some(i) = self.buf[self.pos..].windows(2).position(|w| w == b"\r\n") {
                break i;
            }
            self.fill().await?;
        };
        let header = &self.buf[self.pos..self.pos + header_end];
        if header.first() != Some(&b'$') {
            return Err(LinkError::Protocol("expected $<len> snapshot header".to_owned()));
        }
        let len = std::str::from_utf8(&header[1..])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| LinkError::Protocol("bad snapshot length".to_owned()))?;
        self.pos += header_end + 2;
        while self.buf.len() - self.pos < len {
            self.fill().await?;
        }
        let payload = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        self.compact();
        Ok(payload)
    }

    async fn fill(&mut self) -> Result<(), LinkError> {
        let mut chunk = [0u8; 4096];
        let n = self.rd.read(&mut chunk).await?;
        if n == 0 {
            return Err(LinkError::Closed);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    fn compact(&mut self) {
        if self.pos > 16 * 1024 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Follower link
// ---------------------------------------------------------------------------

/// Keep the replication link to the leader alive for the process lifetime.
pub async fn run_follower(shared: Arc<Shared>, host: String, port: u16, listen_port: u16) {
    let mut shutdown = shared.subscribe_shutdown();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            result = follower_link(&shared, &host, port, listen_port) => {
                match result {
                    Ok(()) => return,
                    Err(e) => warn!(error = %e, "replication link lost, reconnecting"),
                }
                tokio::select! {
                    _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
}

async fn follower_link(
    shared: &Arc<Shared>,
    host: &str,
    port: u16,
    listen_port: u16,
) -> Result<(), LinkError> {
    let stream = TcpStream::connect((host, port)).await?;
    let (rd, mut wr) = stream.into_split();
    let mut reader = FrameReader::new(rd);

    // Handshake.
    wr.write_all(&Frame::command(&[b"PING"]).encode()).await?;
    expect_simple(&mut reader, "PONG").await?;
    let port_arg = listen_port.to_string();
    wr.write_all(
        &Frame::command(&[b"REPLCONF", b"listening-port", port_arg.as_bytes()]).encode(),
    )
    .await?;
    expect_simple(&mut reader, "OK").await?;
    wr.write_all(&Frame::command(&[b"REPLCONF", b"capa", b"psync2"]).encode())
        .await?;
    expect_simple(&mut reader, "OK").await?;
    wr.write_all(&Frame::command(&[b"PSYNC", b"?", b"-1"]).encode())
        .await?;

    // +FULLRESYNC <replid> <offset>, then the framed snapshot.
    let (reply, _) = reader.next_frame().await?;
    let Frame::Simple(line) = reply else {
        return Err(LinkError::Protocol(format!("unexpected PSYNC reply: {:?}", reply)));
    };
    let mut parts = line.split_whitespace();
    if parts.next() != Some("FULLRESYNC") {
        return Err(LinkError::Protocol(format!("unexpected PSYNC reply: {}", line)));
    }
    let _leader_replid = parts
        .next()
        .ok_or_else(|| LinkError::Protocol("FULLRESYNC missing replid".to_owned()))?;
    let start_offset = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| LinkError::Protocol("FULLRESYNC missing offset".to_owned()))?;

    let snapshot = reader.read_snapshot().await?;
    let contents = rdb::read(&snapshot)?;
    let fresh = Store::from_records(contents.records, cc_store::now_ms());
    {
        // Discard whatever state we had; the snapshot replaces it.
        let mut store = shared.store.lock().await;
        *store = fresh;
    }
    {
        let mut repl = shared.repl.lock().await;
        repl.set_offset(start_offset);
    }
    info!(offset = start_offset, "full resync from leader complete");

    // Apply the replicated command stream.  No replies are sent on this
    // connection except REPLCONF ACK.
    loop {
        let (frame, used) = reader.next_frame().await?;
        let offset = {
            let mut repl = shared.repl.lock().await;
            repl.add_offset(used as u64);
            repl.offset()
        };
        let Some(args) = frame.as_command_args() else {
            debug!(?frame, "ignoring non-command frame on replication link");
            continue;
        };
        if args.is_empty() {
            continue;
        }
        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        match name.as_str() {
            "PING" => {}
            "REPLCONF" if args.len() >= 2 && args[1].eq_ignore_ascii_case(b"GETACK") => {
                let ack = offset.to_string();
                wr.write_all(
                    &Frame::command(&[b"REPLCONF", b"ACK", ack.as_bytes()]).encode(),
                )
                .await?;
            }
            _ => crate::dispatch::apply_replicated(shared, &name, &args).await,
        }
    }
}

async fn expect_simple<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    want: &str,
) -> Result<(), LinkError> {
    match reader.next_frame().await?.0 {
        Frame::Simple(s) if s == want => Ok(()),
        other => Err(LinkError::Protocol(format!(
            "expected +{}, got {:?}",
            want, other
        ))),
    }
}

// ---------------------------------------------------------------------------
// Leader keepalive
// ---------------------------------------------------------------------------

/// Periodic PING down the replication stream.  Keeps idle links warm and
/// advances offsets so acks stay meaningful.
pub async fn run_leader_ping(shared: Arc<Shared>) {
    let mut shutdown = shared.subscribe_shutdown();
    let mut tick = tokio::time::interval(Duration::from_secs(10));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            _ = tick.tick() => {
                // Store lock first: pings must not reorder against writes.
                let _store = shared.store.lock().await;
                let mut repl = shared.repl.lock().await;
                if repl.replica_count() > 0 {
                    repl.append(&Frame::command(&[b"PING"]).encode());
                }
            }
        }
    }
}
