//! Command dispatch.
//!
//! One table maps the uppercased command name to its arity bounds, write
//! flag, and route.  Keyspace commands run under the store mutex; a
//! successful write bumps the change counter and, on a leader, appends the
//! command's canonical RESP encoding to the replication log *before* the
//! mutex is released; commit order and log order are the same order.

use crate::commands::{self, pubsub, server_info, streams, upper};
use crate::connection::ConnCtx;
use crate::replication::{REPLICA_OUTBOX, SyncPlan};
use crate::snapshot;
use crate::state::Shared;
use cc_resp::Frame;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// What the connection loop should do with the outcome.
pub enum Action {
    Reply(Frame),
    /// SUBSCRIBE/UNSUBSCRIBE confirm per channel.
    Replies(Vec<Frame>),
    /// Write the reply, then close.
    Quit(Frame),
    /// PSYNC accepted: write `preamble`, then stream `outbox` forever.
    BecomeReplica {
        preamble: Vec<u8>,
        outbox: mpsc::Receiver<Vec<u8>>,
        replica_id: u64,
    },
}

pub struct CmdSpec {
    pub min: usize,
    pub max: Option<usize>,
    pub is_write: bool,
}

enum Route {
    /// `commands::run_store` under the store mutex.
    Store,
    /// Everything else (pub/sub, server, replication, blocking reads).
    Server,
}

/// Arity is counted over the full argv, command name included.
fn lookup(name: &str) -> Option<(CmdSpec, Route)> {
    use Route::{Server, Store};
    let (min, max, is_write, route) = match name {
        "GET" => (2, Some(2), false, Store),
        "SET" => (3, Some(8), true, Store),
        "INCR" | "DECR" => (2, Some(2), true, Store),
        "APPEND" => (3, Some(3), true, Store),
        "STRLEN" => (2, Some(2), false, Store),

        "DEL" => (2, None, true, Store),
        "EXISTS" => (2, None, false, Store),
        "TYPE" => (2, Some(2), false, Store),
        "KEYS" => (2, Some(2), false, Store),
        "EXPIRE" | "PEXPIRE" => (3, Some(3), true, Store),
        "TTL" | "PTTL" => (2, Some(2), false, Store),
        "DBSIZE" => (1, Some(1), false, Store),
        "FLUSHALL" => (1, Some(2), true, Store),

        "LPUSH" | "RPUSH" => (3, None, true, Store),
        "LPOP" | "RPOP" => (2, Some(2), true, Store),
        "LRANGE" => (4, Some(4), false, Store),
        "LLEN" => (2, Some(2), false, Store),
        "LINDEX" => (3, Some(3), false, Store),
        "LSET" => (4, Some(4), true, Store),

        "SADD" | "SREM" => (3, None, true, Store),
        "SMEMBERS" | "SCARD" => (2, Some(2), false, Store),
        "SISMEMBER" => (3, Some(3), false, Store),

        "HSET" => (4, None, true, Store),
        "HDEL" => (3, None, true, Store),
        "HGET" | "HEXISTS" => (3, Some(3), false, Store),
        "HGETALL" | "HLEN" | "HKEYS" | "HVALS" => (2, Some(2), false, Store),

        "ZADD" => (4, None, true, Store),
        "ZREM" => (3, None, true, Store),
        "ZRANGE" | "ZRANGEBYSCORE" => (4, Some(5), false, Store),
        "ZRANK" | "ZSCORE" => (3, Some(3), false, Store),
        "ZCARD" => (2, Some(2), false, Store),

        "XADD" => (5, None, true, Store),
        "XRANGE" => (4, Some(4), false, Store),
        "XREAD" => (4, None, false, Server),

        "PING" => (1, Some(2), false, Server),
        "ECHO" => (2, Some(2), false, Server),
        "QUIT" => (1, Some(1), false, Server),
        "SELECT" => (2, Some(2), false, Server),
        "COMMAND" => (1, None, false, Server),
        "CLIENT" => (2, None, false, Server),
        "INFO" => (1, Some(2), false, Server),
        "CONFIG" => (2, None, false, Server),
        "DEBUG" => (2, None, false, Server),
        "SAVE" | "BGSAVE" | "LASTSAVE" => (1, Some(1), false, Server),

        "SUBSCRIBE" => (2, None, false, Server),
        "UNSUBSCRIBE" => (1, None, false, Server),
        "PUBLISH" => (3, Some(3), false, Server),

        "REPLCONF" => (2, None, false, Server),
        "PSYNC" => (3, Some(3), false, Server),
        "WAIT" => (3, Some(3), false, Server),

        _ => return None,
    };
    Some((CmdSpec { min, max, is_write }, route))
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

pub async fn execute(shared: &Arc<Shared>, ctx: &mut ConnCtx, args: &[Vec<u8>]) -> Action {
    let name = upper(&args[0]);
    let Some((spec, route)) = lookup(&name) else {
        return Action::Reply(Frame::error(format!(
            "ERR unknown command '{}'",
            String::from_utf8_lossy(&args[0])
        )));
    };
    if args.len() < spec.min || spec.max.is_some_and(|max| args.len() > max) {
        return Action::Reply(Frame::error(format!(
            "ERR wrong number of arguments for '{}' command",
            name.to_ascii_lowercase()
        )));
    }
    if ctx.subscribed()
        && !matches!(name.as_str(), "SUBSCRIBE" | "UNSUBSCRIBE" | "PING" | "QUIT")
    {
        return Action::Reply(Frame::error(format!(
            "ERR Can't execute '{}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context",
            name.to_ascii_lowercase()
        )));
    }
    match route {
        Route::Store => Action::Reply(store_command(shared, &name, args, spec.is_write).await),
        Route::Server => server_command(shared, ctx, &name, args).await,
    }
}

async fn store_command(shared: &Arc<Shared>, name: &str, args: &[Vec<u8>], is_write: bool) -> Frame {
    if is_write && !shared.role.is_leader() {
        return Frame::error("READONLY You can't write against a read only replica.");
    }
    let mut store = shared.store.lock().await;
    match commands::run_store(&mut store, name, args) {
        Ok(reply) => {
            if is_write {
                store.mark_write();
                if shared.role.is_leader() {
                    let frame =
                        Frame::Array(args.iter().map(|a| Frame::Bulk(a.clone())).collect());
                    shared.repl.lock().await.append(&frame.encode());
                }
                if name == "XADD" {
                    shared.waiters.lock().await.wake(&args[1]);
                }
            }
            reply
        }
        Err(e) => e.to_frame(),
    }
}

async fn server_command(
    shared: &Arc<Shared>,
    ctx: &mut ConnCtx,
    name: &str,
    args: &[Vec<u8>],
) -> Action {
    match name {
        "PING" => Action::Reply(server_info::ping(args)),
        "ECHO" => Action::Reply(server_info::echo(args)),
        "QUIT" => Action::Quit(Frame::ok()),
        "SELECT" => Action::Reply(server_info::select(args)),
        "COMMAND" => Action::Reply(server_info::command_stub()),
        "CLIENT" => Action::Reply(server_info::client(args)),
        "INFO" => Action::Reply(server_info::info(shared).await),
        "CONFIG" => Action::Reply(server_info::config(shared, args).await),
        "DEBUG" => Action::Reply(server_info::debug(shared, args).await),
        "SAVE" => Action::Reply(server_info::save(shared).await),
        "BGSAVE" => Action::Reply(server_info::bgsave(shared).await),
        "LASTSAVE" => Action::Reply(server_info::lastsave(shared).await),
        "WAIT" => Action::Reply(server_info::wait()),

        "XREAD" => Action::Reply(streams::xread(shared, args).await),

        "SUBSCRIBE" => Action::Replies(pubsub::subscribe(shared, ctx, args).await),
        "UNSUBSCRIBE" => Action::Replies(pubsub::unsubscribe(shared, ctx, args).await),
        "PUBLISH" => Action::Reply(pubsub::publish(shared, args).await),

        // Handshake REPLCONFs (listening-port, capa) just need agreement;
        // ACKs arrive on the replica link, not here.
        "REPLCONF" => Action::Reply(Frame::ok()),
        "PSYNC" => psync(shared, ctx, args).await,

        other => Action::Reply(Frame::error(format!("ERR unknown command '{}'", other))),
    }
}

// ---------------------------------------------------------------------------
// PSYNC
// ---------------------------------------------------------------------------

async fn psync(shared: &Arc<Shared>, ctx: &mut ConnCtx, args: &[Vec<u8>]) -> Action {
    let requested_replid = String::from_utf8_lossy(&args[1]).into_owned();
    let requested_offset = std::str::from_utf8(&args[2])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .map(|n| n as u64);

    // Hold the store mutex while planning: nothing may commit between the
    // snapshot (or backlog cut) and the replica's registration.
    let store = shared.store.lock().await;
    let mut repl = shared.repl.lock().await;
    let mut preamble = Vec::new();
    match repl.plan_sync(&requested_replid, requested_offset) {
        SyncPlan::Partial { backlog } => {
            preamble.extend_from_slice(b"+CONTINUE\r\n");
            preamble.extend_from_slice(&backlog);
        }
        SyncPlan::Full { replid, offset } => {
            let image = snapshot::snapshot_bytes(&store);
            preamble.extend_from_slice(format!("+FULLRESYNC {} {}\r\n", replid, offset).as_bytes());
            preamble.extend_from_slice(format!("${}\r\n", image.len()).as_bytes());
            preamble.extend_from_slice(&image);
        }
    }
    let (tx, outbox) = mpsc::channel(REPLICA_OUTBOX);
    let replica_id = repl.register_replica(tx, ctx.kill.clone());
    Action::BecomeReplica {
        preamble,
        outbox,
        replica_id,
    }
}

// ---------------------------------------------------------------------------
// Replication ingest (follower side)
// ---------------------------------------------------------------------------

/// Apply one command received over the replication link: same handlers, no
/// reply, no re-propagation.  Arity/type violations are logged and skipped;
/// a bad frame must not poison the link.
pub async fn apply_replicated(shared: &Arc<Shared>, name: &str, args: &[Vec<u8>]) {
    let Some((spec, Route::Store)) = lookup(name) else {
        warn!(command = name, "ignoring non-keyspace command on replication link");
        return;
    };
    if args.len() < spec.min || spec.max.is_some_and(|max| args.len() > max) {
        warn!(command = name, argc = args.len(), "bad arity on replication link");
        return;
    }
    let mut store = shared.store.lock().await;
    match commands::run_store(&mut store, name, args) {
        Ok(_) => {
            store.mark_write();
            if name == "XADD" {
                shared.waiters.lock().await.wake(&args[1]);
            }
        }
        Err(e) => {
            warn!(command = name, error = ?e, "failed to apply replicated command");
        }
    }
}
