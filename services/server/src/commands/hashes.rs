//! Hash commands.

use super::{CmdError, CmdResult, bulk_array};
use cc_resp::Frame;
use cc_store::Store;

pub fn hset(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    if args[2..].len() % 2 != 0 {
        return Err(CmdError::Err(
            "wrong number of arguments for 'hset' command".to_owned(),
        ));
    }
    let pairs = args[2..]
        .chunks(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect();
    Ok(Frame::Integer(store.hset(&args[1], pairs)? as i64))
}

pub fn hget(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(store
        .hget(&args[1], &args[2])?
        .map_or(Frame::NullBulk, Frame::Bulk))
}

pub fn hgetall(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let mut flat = Vec::new();
    for (field, value) in store.hgetall(&args[1])? {
        flat.push(field);
        flat.push(value);
    }
    Ok(bulk_array(flat))
}

pub fn hdel(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.hdel(&args[1], &args[2..])? as i64))
}

pub fn hlen(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.hlen(&args[1])? as i64))
}

pub fn hexists(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.hexists(&args[1], &args[2])? as i64))
}

pub fn hkeys(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(bulk_array(store.hkeys(&args[1])?))
}

pub fn hvals(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(bulk_array(store.hvals(&args[1])?))
}
