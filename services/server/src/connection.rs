//! Per-connection state machine and I/O driver.
//!
//! Each accepted socket gets its own task running `serve`: read bytes,
//! decode frames incrementally, dispatch, write replies.  The `select!`
//! also drains the connection's outbox (pushed pub/sub messages) and
//! watches the kill handle (slow-consumer eviction) and the server
//! shutdown channel.
//!
//! A successful PSYNC hands the socket over to `serve_replica`, which only
//! streams the replication log outward and reads ACKs back.

use crate::dispatch::{self, Action};
use crate::state::Shared;
use cc_resp::Frame;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

/// Pushed-message buffer per connection.  A subscriber this far behind is
/// evicted by the hub rather than buffered further.
const OUTBOX_CAPACITY: usize = 256;

/// Per-connection context the dispatcher needs.
pub struct ConnCtx {
    pub id: u64,
    pub addr: SocketAddr,
    /// Clones of this sender are handed to the pub/sub hub.
    pub outbox_tx: mpsc::Sender<Vec<u8>>,
    /// Signalled by the hub or replication when this connection must die.
    pub kill: Arc<Notify>,
    pub subscriptions: HashSet<Vec<u8>>,
}

impl ConnCtx {
    pub fn subscribed(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

/// Drive one client connection to completion.
pub async fn serve(
    shared: Arc<Shared>,
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let (outbox_tx, mut outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    let mut ctx = ConnCtx {
        id: conn_id,
        addr,
        outbox_tx,
        kill: Arc::new(Notify::new()),
        subscriptions: HashSet::new(),
    };
    let (mut rd, mut wr) = stream.into_split();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    debug!(conn_id, %addr, "client connected");

    'conn: loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break 'conn;
                }
            }
            _ = ctx.kill.notified() => {
                debug!(conn_id, "connection killed");
                break 'conn;
            }
            Some(push) = outbox_rx.recv() => {
                if wr.write_all(&push).await.is_err() {
                    break 'conn;
                }
            }
            read = rd.read(&mut chunk) => {
                let n = match read {
                    Ok(0) | Err(_) => break 'conn,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                loop {
                    let (frame, used) = match cc_resp::decode(&buf) {
                        Ok(Some(decoded)) => decoded,
                        Ok(None) => break,
                        Err(e) => {
                            // Best-effort error reply, then drop the link.
                            debug!(conn_id, error = %e, "protocol error");
                            let reply = Frame::error(format!("ERR Protocol error: {}", e));
                            let _ = wr.write_all(&reply.encode()).await;
                            break 'conn;
                        }
                    };
                    buf.drain(..used);
                    let Some(args) = frame.as_command_args() else {
                        let reply = Frame::error("ERR Protocol error: expected array of bulk strings");
                        let _ = wr.write_all(&reply.encode()).await;
                        break 'conn;
                    };
                    if args.is_empty() {
                        continue;
                    }
                    match dispatch::execute(&shared, &mut ctx, &args).await {
                        Action::Reply(reply) => {
                            if wr.write_all(&reply.encode()).await.is_err() {
                                break 'conn;
                            }
                        }
                        Action::Replies(replies) => {
                            let mut out = Vec::new();
                            for reply in replies {
                                reply.encode_into(&mut out);
                            }
                            if wr.write_all(&out).await.is_err() {
                                break 'conn;
                            }
                        }
                        Action::Quit(reply) => {
                            let _ = wr.write_all(&reply.encode()).await;
                            break 'conn;
                        }
                        Action::BecomeReplica { preamble, outbox, replica_id } => {
                            serve_replica(
                                &shared, rd, wr, preamble, outbox, replica_id, &ctx, shutdown,
                            )
                            .await;
                            cleanup(&shared, conn_id).await;
                            return;
                        }
                    }
                }
            }
        }
    }
    cleanup(&shared, conn_id).await;
    debug!(conn_id, "client disconnected");
}

async fn cleanup(shared: &Arc<Shared>, conn_id: u64) {
    shared.hub.lock().await.unsubscribe_all(conn_id);
}

// ---------------------------------------------------------------------------
// Replica link (leader side)
// ---------------------------------------------------------------------------

/// After PSYNC: push the preamble (FULLRESYNC + snapshot, or CONTINUE +
/// backlog), then forward the replication outbox and consume ACKs.
#[allow(clippy::too_many_arguments)]
async fn serve_replica(
    shared: &Arc<Shared>,
    rd: OwnedReadHalf,
    mut wr: OwnedWriteHalf,
    preamble: Vec<u8>,
    mut outbox: mpsc::Receiver<Vec<u8>>,
    replica_id: u64,
    ctx: &ConnCtx,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(replica_id, addr = %ctx.addr, "replica attached");
    if wr.write_all(&preamble).await.is_err() {
        shared.repl.lock().await.remove_replica(replica_id);
        return;
    }
    let mut reader = crate::replication::FrameReader::new(rd);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = ctx.kill.notified() => {
                warn!(replica_id, "replica evicted");
                break;
            }
            Some(frame_bytes) = outbox.recv() => {
                if wr.write_all(&frame_bytes).await.is_err() {
                    break;
                }
            }
            incoming = reader.next_frame() => {
                let Ok((frame, _)) = incoming else {
                    break;
                };
                record_ack(shared, replica_id, &frame).await;
            }
        }
    }
    shared.repl.lock().await.remove_replica(replica_id);
    info!(replica_id, "replica detached");
}

/// The only traffic a replica sends upstream is `REPLCONF ACK <offset>`.
async fn record_ack(shared: &Arc<Shared>, replica_id: u64, frame: &Frame) {
    let Some(args) = frame.as_command_args() else {
        return;
    };
    if args.len() == 3
        && args[0].eq_ignore_ascii_case(b"REPLCONF")
        && args[1].eq_ignore_ascii_case(b"ACK")
        && let Some(offset) = std::str::from_utf8(&args[2])
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
    {
        shared.repl.lock().await.record_ack(replica_id, offset);
    }
}

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------

/// Accept connections until shutdown; one task per client.
pub async fn run_acceptor(shared: Arc<Shared>, listener: tokio::net::TcpListener) {
    let mut shutdown = shared.subscribe_shutdown();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let conn_id = shared
                            .next_conn_id
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        let shared = shared.clone();
                        let shutdown = shared.subscribe_shutdown();
                        tokio::spawn(async move {
                            serve(shared, stream, addr, conn_id, shutdown).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}
