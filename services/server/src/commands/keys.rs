//! Generic key commands: DEL, EXISTS, TYPE, KEYS, expiry, DBSIZE, FLUSHALL.

use super::{CmdResult, bulk_array, parse_int};
use cc_resp::Frame;
use cc_store::{Store, Ttl};

pub fn del(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let removed = args[1..].iter().filter(|k| store.del(k)).count();
    Ok(Frame::Integer(removed as i64))
}

pub fn exists(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let found = args[1..].iter().filter(|k| store.exists(k)).count();
    Ok(Frame::Integer(found as i64))
}

pub fn type_cmd(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::simple(store.type_name(&args[1])))
}

pub fn keys(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(bulk_array(store.keys(&args[1])))
}

/// EXPIRE (unit_ms = 1000) and PEXPIRE (unit_ms = 1).
pub fn expire(store: &mut Store, args: &[Vec<u8>], unit_ms: u64) -> CmdResult {
    let amount = parse_int(&args[2])?;
    if amount <= 0 {
        // A non-positive relative deadline deletes the key immediately.
        let existed = store.del(&args[1]);
        return Ok(Frame::Integer(existed as i64));
    }
    let at = cc_store::now_ms() + amount as u64 * unit_ms;
    Ok(Frame::Integer(store.expire_at(&args[1], at) as i64))
}

/// TTL (seconds) and PTTL (milliseconds).
pub fn ttl(store: &mut Store, args: &[Vec<u8>], in_seconds: bool) -> CmdResult {
    Ok(Frame::Integer(match store.ttl(&args[1]) {
        Ttl::Missing => -2,
        Ttl::NoExpiry => -1,
        Ttl::RemainingMs(ms) => {
            if in_seconds {
                ms.div_ceil(1000) as i64
            } else {
                ms as i64
            }
        }
    }))
}

pub fn dbsize(store: &mut Store, _args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.dbsize() as i64))
}

pub fn flushall(store: &mut Store, _args: &[Vec<u8>]) -> CmdResult {
    store.flushall();
    Ok(Frame::ok())
}
