//! List commands.

use super::{CmdError, CmdResult, bulk_array, parse_int};
use cc_resp::Frame;
use cc_store::{Store, StoreError};

pub fn push(store: &mut Store, args: &[Vec<u8>], front: bool) -> CmdResult {
    let values = args[2..].to_vec();
    let len = if front {
        store.lpush(&args[1], values)?
    } else {
        store.rpush(&args[1], values)?
    };
    Ok(Frame::Integer(len as i64))
}

pub fn pop(store: &mut Store, args: &[Vec<u8>], front: bool) -> CmdResult {
    let popped = if front {
        store.lpop(&args[1])?
    } else {
        store.rpop(&args[1])?
    };
    Ok(popped.map_or(Frame::NullBulk, Frame::Bulk))
}

pub fn lrange(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let start = parse_int(&args[2])?;
    let stop = parse_int(&args[3])?;
    Ok(bulk_array(store.lrange(&args[1], start, stop)?))
}

pub fn llen(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.llen(&args[1])? as i64))
}

pub fn lindex(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let index = parse_int(&args[2])?;
    Ok(store
        .lindex(&args[1], index)?
        .map_or(Frame::NullBulk, Frame::Bulk))
}

pub fn lset(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let index = parse_int(&args[2])?;
    match store.lset(&args[1], index, args[3].clone()) {
        Ok(()) => Ok(Frame::ok()),
        Err(StoreError::NoSuchKey) => Err(CmdError::Err("no such key".to_owned())),
        Err(e) => Err(e.into()),
    }
}
