//! Sorted-set commands.

use super::{CmdError, CmdResult, format_score, parse_float, parse_int, upper};
use cc_resp::Frame;
use cc_store::Store;
use std::ops::Bound;

pub fn zadd(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    if args[2..].len() % 2 != 0 {
        return Err(CmdError::syntax());
    }
    let mut pairs = Vec::with_capacity(args[2..].len() / 2);
    for chunk in args[2..].chunks(2) {
        pairs.push((parse_float(&chunk[0])?, chunk[1].clone()));
    }
    Ok(Frame::Integer(store.zadd(&args[1], pairs)? as i64))
}

pub fn zrange(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let start = parse_int(&args[2])?;
    let stop = parse_int(&args[3])?;
    let withscores = parse_withscores(&args[4..])?;
    Ok(scored_reply(store.zrange(&args[1], start, stop)?, withscores))
}

pub fn zrangebyscore(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let min = parse_score_bound(&args[2])?;
    let max = parse_score_bound(&args[3])?;
    let withscores = parse_withscores(&args[4..])?;
    Ok(scored_reply(
        store.zrangebyscore(&args[1], min, max)?,
        withscores,
    ))
}

pub fn zrank(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(store
        .zrank(&args[1], &args[2])?
        .map_or(Frame::NullBulk, |rank| Frame::Integer(rank as i64)))
}

pub fn zscore(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(store
        .zscore(&args[1], &args[2])?
        .map_or(Frame::NullBulk, |score| Frame::Bulk(format_score(score))))
}

pub fn zrem(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.zrem(&args[1], &args[2..])? as i64))
}

pub fn zcard(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    Ok(Frame::Integer(store.zcard(&args[1])? as i64))
}

// ---------------------------------------------------------------------------
// Option parsing and reply shapes
// ---------------------------------------------------------------------------

fn parse_withscores(rest: &[Vec<u8>]) -> Result<bool, CmdError> {
    match rest {
        [] => Ok(false),
        [flag] if upper(flag) == "WITHSCORES" => Ok(true),
        _ => Err(CmdError::syntax()),
    }
}

/// `min`/`max` for ZRANGEBYSCORE: a float, `(float` for exclusive, or
/// `-inf`/`+inf`.
fn parse_score_bound(arg: &[u8]) -> Result<Bound<f64>, CmdError> {
    match arg {
        b"-inf" | b"+inf" | b"inf" => Ok(Bound::Unbounded),
        _ if arg.first() == Some(&b'(') => {
            let score = parse_float(&arg[1..])
                .map_err(|_| CmdError::Err("min or max is not a float".to_owned()))?;
            Ok(Bound::Excluded(score))
        }
        _ => {
            let score = parse_float(arg)
                .map_err(|_| CmdError::Err("min or max is not a float".to_owned()))?;
            Ok(Bound::Included(score))
        }
    }
}

fn scored_reply(items: Vec<(f64, Vec<u8>)>, withscores: bool) -> Frame {
    let mut out = Vec::with_capacity(if withscores { items.len() * 2 } else { items.len() });
    for (score, member) in items {
        out.push(Frame::Bulk(member));
        if withscores {
            out.push(Frame::Bulk(format_score(score)));
        }
    }
    Frame::Array(out)
}
