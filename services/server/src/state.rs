//! Shared server state.
//!
//! One `Shared` per process, behind an `Arc`.  The keyspace sits behind a
//! single async mutex: every command runs to completion under it, which is
//! what makes writes serializable and lets the dispatcher append to the
//! replication log in commit order (the log mutex is only ever taken while
//! the store mutex is held, so the two orders cannot diverge).
//!
//! Lock order: `store` → `repl` / `waiters`.  Nothing takes `store` while
//! holding any other lock.

use crate::config::ServerConfig;
use crate::pubsub::PubSubHub;
use crate::replication::ReplState;
use crate::snapshot::SnapshotState;
use cc_store::Store;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use uuid::Uuid;

/// Values CONFIG SET may change at runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub dir: PathBuf,
    pub dbfilename: String,
    pub save_schedule: Vec<(u64, u64)>,
}

impl RuntimeConfig {
    pub fn rdb_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }
}

/// Replication role, fixed at startup.
#[derive(Debug, Clone)]
pub struct Role {
    /// `None` = leader; `Some((host, port))` = follower of that leader.
    pub leader: Option<(String, u16)>,
}

impl Role {
    pub fn is_leader(&self) -> bool {
        self.leader.is_none()
    }

    pub fn name(&self) -> &'static str {
        if self.is_leader() { "master" } else { "slave" }
    }
}

/// Process-wide shared state.
pub struct Shared {
    pub store: Mutex<Store>,
    pub hub: Mutex<PubSubHub>,
    pub repl: Mutex<ReplState>,
    pub snapshot: Mutex<SnapshotState>,
    pub waiters: Mutex<StreamWaiters>,
    pub config: RwLock<RuntimeConfig>,
    pub role: Role,
    pub next_conn_id: AtomicU64,
    /// Flipped to true exactly once; every task holds a receiver.
    pub shutdown: watch::Sender<bool>,
}

impl Shared {
    pub fn new(config: &ServerConfig, store: Store) -> Arc<Shared> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Shared {
            store: Mutex::new(store),
            hub: Mutex::new(PubSubHub::new()),
            repl: Mutex::new(ReplState::new(generate_replid(), config.backlog_bytes)),
            snapshot: Mutex::new(SnapshotState::new()),
            waiters: Mutex::new(StreamWaiters::new()),
            config: RwLock::new(RuntimeConfig {
                dir: config.dir.clone(),
                dbfilename: config.dbfilename.clone(),
                save_schedule: config.save_schedule.clone(),
            }),
            role: Role {
                leader: config.replicaof.clone(),
            },
            next_conn_id: AtomicU64::new(1),
            shutdown,
        })
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// 40 hex chars identifying this server's replication stream, fixed for the
/// process lifetime.
fn generate_replid() -> String {
    let digest = Sha256::digest(Uuid::new_v4().as_bytes());
    hex::encode(digest)[..40].to_owned()
}

// ---------------------------------------------------------------------------
// Stream waiters (blocking XREAD)
// ---------------------------------------------------------------------------

/// Per-stream parking lot for blocked XREAD calls.
///
/// A blocked reader registers a one-shot sender under every stream it
/// watches, then waits; XADD drains the list for its stream and pings every
/// waiter.  Woken readers re-check the store and re-register if their data
/// has not arrived (another reader's stream may have woken them).
#[derive(Default)]
pub struct StreamWaiters {
    parked: HashMap<Vec<u8>, Vec<mpsc::Sender<()>>>,
}

impl StreamWaiters {
    pub fn new() -> StreamWaiters {
        StreamWaiters::default()
    }

    pub fn register(&mut self, stream_key: &[u8], waker: mpsc::Sender<()>) {
        self.parked
            .entry(stream_key.to_vec())
            .or_default()
            .push(waker);
    }

    /// Wake everyone parked on `stream_key`.  Dead wakers (reader timed out
    /// and went away) are dropped silently.
    pub fn wake(&mut self, stream_key: &[u8]) {
        if let Some(wakers) = self.parked.remove(stream_key) {
            for waker in wakers {
                let _ = waker.try_send(());
            }
        }
    }
}
