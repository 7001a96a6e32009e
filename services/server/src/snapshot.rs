//! Snapshot persistence: SAVE, BGSAVE, and the auto-save schedule.
//!
//! All writes go through the same path: serialize a point-in-time record set,
//! write `<dir>/<dbfilename>.tmp`, fsync, rename over the real file.  The
//! previous snapshot survives any failure.
//!
//! SAVE holds the store mutex for the whole write, so nothing else runs.
//! BGSAVE clones the records under the mutex and writes from a blocking
//! worker; the dirty counter is settled by the amount captured at clone
//! time, so writes landing mid-save stay counted for the next schedule
//! check.

use crate::state::Shared;
use cc_store::rdb;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::MutexGuard;
use tracing::{debug, error, info};

/// Bookkeeping shared with LASTSAVE and the auto-save tick.
pub struct SnapshotState {
    /// Unix seconds of the last completed save; starts at process boot.
    pub last_save_unix: u64,
    pub bgsave_running: bool,
}

impl SnapshotState {
    pub fn new() -> SnapshotState {
        SnapshotState {
            last_save_unix: unix_secs(),
            bgsave_running: false,
        }
    }
}

impl Default for SnapshotState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Background save already in progress")]
    Busy,
}

pub fn unix_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// SAVE (synchronous)
// ---------------------------------------------------------------------------

/// Serialize and persist the keyspace, blocking every other command until the
/// rename lands.
pub async fn save(shared: &Arc<Shared>) -> Result<(), SaveError> {
    let mut store = shared.store.lock().await;
    let records = store.snapshot_records();
    let dirty = store.dirty();
    let path = shared.config.read().await.rdb_path();

    let bytes = rdb::write(&records);
    write_file_blocking(path.clone(), bytes).await?;

    store.settle_saved(dirty);
    mark_saved(shared).await;
    info!(path = %path.display(), keys = records.len(), "snapshot saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// BGSAVE
// ---------------------------------------------------------------------------

/// Clone a point-in-time view and persist it from a background worker.
/// Returns as soon as the view is captured.
pub async fn bgsave(shared: &Arc<Shared>) -> Result<(), SaveError> {
    {
        let mut snap = shared.snapshot.lock().await;
        if snap.bgsave_running {
            return Err(SaveError::Busy);
        }
        snap.bgsave_running = true;
    }

    let (records, dirty) = {
        let store = shared.store.lock().await;
        (store.snapshot_records(), store.dirty())
    };
    let path = shared.config.read().await.rdb_path();

    let shared = shared.clone();
    tokio::spawn(async move {
        let keys = records.len();
        let bytes = rdb::write(&records);
        let result = write_file_blocking(path.clone(), bytes).await;
        match result {
            Ok(()) => {
                shared.store.lock().await.settle_saved(dirty);
                mark_saved(&shared).await;
                info!(path = %path.display(), keys, "background save complete");
            }
            Err(e) => {
                // Leave the dirty counter alone: the next auto-save retries.
                error!(error = %e, "background save failed");
                shared.snapshot.lock().await.bgsave_running = false;
            }
        }
    });
    Ok(())
}

async fn mark_saved(shared: &Arc<Shared>) {
    let mut snap = shared.snapshot.lock().await;
    snap.last_save_unix = unix_secs();
    snap.bgsave_running = false;
}

// ---------------------------------------------------------------------------
// File writing
// ---------------------------------------------------------------------------

async fn write_file_blocking(path: std::path::PathBuf, bytes: Vec<u8>) -> Result<(), SaveError> {
    tokio::task::spawn_blocking(move || write_rdb_file(&path, &bytes))
        .await
        .map_err(|e| SaveError::Io(std::io::Error::other(e)))?
}

/// Atomic snapshot write: `<file>.tmp`, fsync, rename.
fn write_rdb_file(path: &Path, bytes: &[u8]) -> Result<(), SaveError> {
    use std::io::Write;
    let file_name = path
        .file_name()
        .ok_or_else(|| SaveError::Io(std::io::Error::other("snapshot path has no file name")))?;
    let tmp = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Auto-save schedule
// ---------------------------------------------------------------------------

/// 1-second tick that fires BGSAVE when any `(seconds, changes)` pair of the
/// schedule is satisfied since the last completed save.
pub async fn run_autosave(shared: Arc<Shared>) {
    let mut shutdown = shared.subscribe_shutdown();
    let mut tick = tokio::time::interval(Duration::from_secs(1));
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
                if let Some((secs, changes)) = due_rule(&shared).await {
                    info!(rule_secs = secs, rule_changes = changes, "auto-save triggered");
                    if let Err(e) = bgsave(&shared).await {
                        debug!(error = %e, "auto-save skipped");
                    }
                }
            }
        }
    }
}

/// The first schedule rule currently satisfied, if any.
async fn due_rule(shared: &Arc<Shared>) -> Option<(u64, u64)> {
    let dirty = shared.store.lock().await.dirty();
    if dirty == 0 {
        return None;
    }
    let (last_save, running) = {
        let snap = shared.snapshot.lock().await;
        (snap.last_save_unix, snap.bgsave_running)
    };
    if running {
        return None;
    }
    let elapsed = unix_secs().saturating_sub(last_save);
    let schedule = shared.config.read().await.save_schedule.clone();
    schedule
        .into_iter()
        .find(|(secs, changes)| elapsed >= *secs && dirty >= *changes)
}

/// Take the store guard's snapshot for a PSYNC full resync.  Kept here so the
/// replication path serializes exactly what SAVE would.
pub fn snapshot_bytes(store: &MutexGuard<'_, cc_store::Store>) -> Vec<u8> {
    rdb::write(&store.snapshot_records())
}
