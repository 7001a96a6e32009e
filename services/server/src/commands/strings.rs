//! String commands: GET, SET, INCR, DECR, APPEND, STRLEN.

use super::{CmdError, CmdResult, parse_int, upper};
use cc_resp::Frame;
use cc_store::{SetCondition, SetExpiry, SetOptions, Store};

pub fn get(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(match store.get(&args[1])? {
        Some(value) => Frame::Bulk(value),
        None => Frame::NullBulk,
    })
}

pub fn set(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let mut opts = SetOptions::default();
    let mut i = 3;
    while i < args.len() {
        match upper(&args[i]).as_str() {
            "EX" | "PX" => {
                let unit_ms = if upper(&args[i]) == "EX" { 1000 } else { 1 };
                let amount = args.get(i + 1).ok_or_else(CmdError::syntax)?;
                let amount = parse_int(amount)?;
                if amount <= 0 {
                    return Err(CmdError::Err(
                        "invalid expire time in 'set' command".to_owned(),
                    ));
                }
                opts.expiry = SetExpiry::At(cc_store::now_ms() + amount as u64 * unit_ms);
                i += 2;
            }
            "KEEPTTL" => {
                opts.expiry = SetExpiry::KeepTtl;
                i += 1;
            }
            "NX" => {
                opts.condition = SetCondition::IfAbsent;
                i += 1;
            }
            "XX" => {
                opts.condition = SetCondition::IfPresent;
                i += 1;
            }
            _ => return Err(CmdError::syntax()),
        }
    }
    Ok(if store.set(&args[1], args[2].clone(), opts) {
        Frame::ok()
    } else {
        Frame::NullBulk
    })
}

pub fn incr(store: &mut Store, args: &[Vec<u8>], sign: i64) -> CmdResult {
    Ok(Frame::Integer(store.incr_by(&args[1], sign)?))
}

pub fn append(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.append(&args[1], &args[2])? as i64))
}

pub fn strlen(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.strlen(&args[1])? as i64))
}
