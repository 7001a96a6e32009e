//! Server-level commands: PING/ECHO, INFO, CONFIG, SELECT, COMMAND, CLIENT,
//! DEBUG, WAIT, and the snapshot triggers.

use super::upper;
use crate::config::{format_save_schedule, parse_save_schedule};
use crate::snapshot;
use crate::state::Shared;
use cc_resp::Frame;
use std::sync::Arc;
use std::time::Duration;

pub fn ping(args: &[Vec<u8>]) -> Frame {
    match args.get(1) {
        Some(payload) => Frame::Bulk(payload.clone()),
        None => Frame::simple("PONG"),
    }
}

pub fn echo(args: &[Vec<u8>]) -> Frame {
    Frame::Bulk(args[1].clone())
}

pub async fn info(shared: &Arc<Shared>) -> Frame {
    let repl = shared.repl.lock().await;
    let body = format!(
        "# Replication\r\nrole:{}\r\nconnected_slaves:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\n",
        shared.role.name(),
        repl.replica_count(),
        repl.replid(),
        repl.offset(),
    );
    Frame::Bulk(body.into_bytes())
}

// ---------------------------------------------------------------------------
// CONFIG
// ---------------------------------------------------------------------------

pub async fn config(shared: &Arc<Shared>, args: &[Vec<u8>]) -> Frame {
    match upper(&args[1]).as_str() {
        "GET" if args.len() >= 3 => config_get(shared, &args[2..]).await,
        "SET" if args.len() >= 4 && args.len() % 2 == 0 => config_set(shared, &args[2..]).await,
        _ => Frame::error("ERR wrong number of arguments for 'config' command"),
    }
}

async fn config_get(shared: &Arc<Shared>, params: &[Vec<u8>]) -> Frame {
    let cfg = shared.config.read().await;
    let mut out = Vec::new();
    for param in params {
        let name = String::from_utf8_lossy(param).to_ascii_lowercase();
        let value = match name.as_str() {
            "dir" => Some(cfg.dir.to_string_lossy().into_owned()),
            "dbfilename" => Some(cfg.dbfilename.clone()),
            "save" => Some(format_save_schedule(&cfg.save_schedule)),
            _ => None,
        };
        if let Some(value) = value {
            out.push(Frame::Bulk(name.into_bytes()));
            out.push(Frame::Bulk(value.into_bytes()));
        }
    }
    Frame::Array(out)
}

async fn config_set(shared: &Arc<Shared>, pairs: &[Vec<u8>]) -> Frame {
    let mut cfg = shared.config.write().await;
    for pair in pairs.chunks(2) {
        let name = String::from_utf8_lossy(&pair[0]).to_ascii_lowercase();
        let value = String::from_utf8_lossy(&pair[1]).into_owned();
        match name.as_str() {
            "dir" => cfg.dir = value.into(),
            "dbfilename" => cfg.dbfilename = value,
            "save" => match parse_save_schedule(&value) {
                Ok(schedule) => cfg.save_schedule = schedule,
                Err(e) => return Frame::error(format!("ERR {}", e)),
            },
            other => {
                return Frame::error(format!(
                    "ERR Unknown option or number of arguments for CONFIG SET - '{}'",
                    other
                ));
            }
        }
    }
    Frame::ok()
}

// ---------------------------------------------------------------------------
// Snapshot triggers
// ---------------------------------------------------------------------------

pub async fn save(shared: &Arc<Shared>) -> Frame {
    match snapshot::save(shared).await {
        Ok(()) => Frame::ok(),
        Err(e) => Frame::error(format!("ERR {}", e)),
    }
}

pub async fn bgsave(shared: &Arc<Shared>) -> Frame {
    match snapshot::bgsave(shared).await {
        Ok(()) => Frame::simple("Background saving started"),
        Err(e) => Frame::error(format!("ERR {}", e)),
    }
}

pub async fn lastsave(shared: &Arc<Shared>) -> Frame {
    Frame::Integer(shared.snapshot.lock().await.last_save_unix as i64)
}

// ---------------------------------------------------------------------------
// Compatibility stubs
// ---------------------------------------------------------------------------

pub fn select(args: &[Vec<u8>]) -> Frame {
    if args[1].as_slice() == b"0" {
        Frame::ok()
    } else {
        Frame::error("ERR DB index is out of range")
    }
}

/// Introspection output is not modeled; clients only need a well-formed
/// reply to proceed.
pub fn command_stub() -> Frame {
    Frame::Array(Vec::new())
}

pub fn client(args: &[Vec<u8>]) -> Frame {
    match upper(&args[1]).as_str() {
        "GETNAME" => Frame::NullBulk,
        _ => Frame::ok(),
    }
}

pub fn wait() -> Frame {
    Frame::Integer(0)
}

pub async fn debug(shared: &Arc<Shared>, args: &[Vec<u8>]) -> Frame {
    match upper(&args[1]).as_str() {
        "SLEEP" if args.len() == 3 => {
            let secs = std::str::from_utf8(&args[2])
                .ok()
                .and_then(|s| s.parse::<f64>().ok());
            match secs {
                Some(secs) if secs >= 0.0 => {
                    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                    Frame::ok()
                }
                _ => Frame::error("ERR value is not a valid float"),
            }
        }
        "OBJECT" if args.len() == 3 => {
            let mut store = shared.store.lock().await;
            match store.type_name(&args[2]) {
                "none" => Frame::error("ERR no such key"),
                type_name => Frame::simple(format!("Value at:0 refcount:1 type:{}", type_name)),
            }
        }
        other => Frame::error(format!("ERR DEBUG subcommand '{}' not supported", other)),
    }
}
