//! Server configuration.
//!
//! CLI flags are the primary surface (`--port`, `--dir`, `--dbfilename`,
//! `--replicaof`); an optional TOML file supplies the snapshot schedule and
//! replication backlog size.  CLI values override file values.
//!
//! # TOML shape
//! ```toml
//! [snapshot]
//! save = [[900, 1], [300, 10], [60, 10000]]
//!
//! [replication]
//! backlog_bytes = 1048576
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default auto-save schedule: `(seconds, changes)` pairs.
pub const DEFAULT_SAVE_SCHEDULE: [(u64, u64); 3] = [(900, 1), (300, 10), (60, 10_000)];

/// Default replication backlog window.
pub const DEFAULT_BACKLOG_BYTES: usize = 1024 * 1024;

/// Fully resolved startup configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub dir: PathBuf,
    pub dbfilename: String,
    /// `Some((host, port))` starts the server as a follower of that leader.
    pub replicaof: Option<(String, u16)>,
    pub save_schedule: Vec<(u64, u64)>,
    pub backlog_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            port: 6379,
            dir: PathBuf::from("./"),
            dbfilename: "dump.rdb".to_owned(),
            replicaof: None,
            save_schedule: DEFAULT_SAVE_SCHEDULE.to_vec(),
            backlog_bytes: DEFAULT_BACKLOG_BYTES,
        }
    }
}

impl ServerConfig {
    /// Path of the snapshot file.
    pub fn rdb_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    snapshot: Option<RawSnapshotConfig>,
    replication: Option<RawReplicationConfig>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshotConfig {
    save: Option<Vec<(u64, u64)>>,
}

#[derive(Debug, Deserialize)]
struct RawReplicationConfig {
    backlog_bytes: Option<usize>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Merge an optional TOML file into `base` (file values fill fields the CLI
/// left at their defaults; the caller applies CLI overrides afterwards).
pub fn apply_config_file(base: &mut ServerConfig, path: &Path) -> Result<(), ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    apply_config_str(base, &toml_str)
}

pub fn apply_config_str(base: &mut ServerConfig, toml_str: &str) -> Result<(), ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    if let Some(snapshot) = raw.snapshot
        && let Some(save) = snapshot.save
    {
        validate_schedule(&save)?;
        base.save_schedule = save;
    }
    if let Some(replication) = raw.replication
        && let Some(backlog) = replication.backlog_bytes
    {
        if backlog == 0 {
            return Err(ConfigError::InvalidValue(
                "replication.backlog_bytes must be positive".to_owned(),
            ));
        }
        base.backlog_bytes = backlog;
    }
    Ok(())
}

/// Parse a CONFIG SET / `--save` style schedule string: alternating seconds
/// and changes (`"900 1 300 10"`).  An empty string disables auto-save.
pub fn parse_save_schedule(s: &str) -> Result<Vec<(u64, u64)>, ConfigError> {
    let numbers: Vec<u64> = s
        .split_whitespace()
        .map(|tok| {
            tok.parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue(format!("bad save parameter '{}'", tok)))
        })
        .collect::<Result<_, _>>()?;
    if numbers.len() % 2 != 0 {
        return Err(ConfigError::InvalidValue(
            "save parameters must come in (seconds, changes) pairs".to_owned(),
        ));
    }
    let schedule: Vec<(u64, u64)> = numbers.chunks(2).map(|c| (c[0], c[1])).collect();
    validate_schedule(&schedule)?;
    Ok(schedule)
}

/// Render a schedule back into the `"900 1 300 10"` form CONFIG GET reports.
pub fn format_save_schedule(schedule: &[(u64, u64)]) -> String {
    schedule
        .iter()
        .map(|(secs, changes)| format!("{} {}", secs, changes))
        .collect::<Vec<_>>()
        .join(" ")
}

fn validate_schedule(schedule: &[(u64, u64)]) -> Result<(), ConfigError> {
    for (secs, _) in schedule {
        if *secs == 0 {
            return Err(ConfigError::InvalidValue(
                "save schedule seconds must be positive".to_owned(),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
