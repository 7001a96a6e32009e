//! Set commands.

use super::{CmdResult, bulk_array};
use cc_resp::Frame;
use cc_store::Store;

pub fn sadd(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let added = store.sadd(&args[1], args[2..].to_vec())?;
    Ok(Frame::Integer(added as i64))
}

pub fn srem(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let removed = store.srem(&args[1], &args[2..])?;
    Ok(Frame::Integer(removed as i64))
}

pub fn smembers(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(bulk_array(store.smembers(&args[1])?))
}

pub fn sismember(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.sismember(&args[1], &args[2])? as i64))
}

pub fn scard(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.scard(&args[1])? as i64))
}
