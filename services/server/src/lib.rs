//! CoolCache server: an in-memory key-value store speaking a subset of the
//! Redis wire protocol, with expiry, pub/sub, streams, leader→follower
//! replication, and RDB snapshot persistence.

pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod pubsub;
pub mod replication;
pub mod snapshot;
pub mod state;

pub use config::ServerConfig;
pub use state::Shared;

use cc_store::Store;
use cc_store::rdb;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },
    #[error("failed to load snapshot '{path}': {reason}")]
    SnapshotLoad { path: String, reason: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// A started server: bound address plus a shutdown trigger.  Dropping the
/// handle does not stop the server; send the shutdown explicitly.
pub struct Handle {
    pub addr: SocketAddr,
    shared: Arc<Shared>,
}

impl Handle {
    pub fn shutdown(&self) {
        let _ = self.shared.shutdown.send(true);
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

/// Load the snapshot, bind, and spawn every subsystem task.  Returns once
/// the listener is accepting (tests bind port 0 and read `handle.addr`).
pub async fn start(config: ServerConfig) -> Result<Handle, StartError> {
    let store = load_snapshot(&config)?;
    let shared = Shared::new(&config, store);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|source| StartError::Bind {
            port: config.port,
            source,
        })?;
    let addr = listener.local_addr().map_err(|source| StartError::Bind {
        port: config.port,
        source,
    })?;

    tokio::spawn(connection::run_acceptor(shared.clone(), listener));
    tokio::spawn(snapshot::run_autosave(shared.clone()));
    match shared.role.leader.clone() {
        Some((host, port)) => {
            tokio::spawn(replication::run_follower(
                shared.clone(),
                host,
                port,
                addr.port(),
            ));
        }
        None => {
            tokio::spawn(replication::run_leader_ping(shared.clone()));
        }
    }

    info!(
        port = addr.port(),
        role = shared.role.name(),
        "coolcache listening"
    );
    Ok(Handle { addr, shared })
}

/// Run until ctrl-c, then broadcast shutdown.
pub async fn run(config: ServerConfig) -> Result<(), StartError> {
    let handle = start(config).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown();
    Ok(())
}

/// A missing snapshot file starts an empty keyspace; a corrupt one is fatal
/// (the caller exits non-zero rather than serving partial data).
fn load_snapshot(config: &ServerConfig) -> Result<Store, StartError> {
    let path = config.rdb_path();
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no snapshot file, starting empty");
            return Ok(Store::new());
        }
        Err(e) => {
            return Err(StartError::SnapshotLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }
    };
    let contents = rdb::read(&bytes).map_err(|e| StartError::SnapshotLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    info!(path = %path.display(), keys = contents.records.len(), "snapshot loaded");
    Ok(Store::from_records(contents.records, cc_store::now_ms()))
}
