//! Stream commands: XADD, XRANGE, and (blocking) XREAD.

use super::{CmdError, CmdResult, parse_int, upper};
use crate::state::Shared;
use cc_resp::Frame;
use cc_store::{IdSpec, Store, StreamEntry, StreamId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn xadd(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let spec = parse_id_spec(&args[2])?;
    let rest = &args[3..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CmdError::Err(
            "wrong number of arguments for 'xadd' command".to_owned(),
        ));
    }
    let fields = rest.chunks(2).map(|c| (c[0].clone(), c[1].clone())).collect();
    let id = store.xadd(&args[1], spec, fields)?;
    Ok(Frame::Bulk(id.to_string().into_bytes()))
}

pub fn xrange(store: &mut Store, args: &[Vec<u8>]) -> CmdResult {
    let start = parse_range_bound(&args[2], false)?;
    let end = parse_range_bound(&args[3], true)?;
    let entries = store.xrange(&args[1], start, end)?;
    Ok(Frame::Array(entries.iter().map(entry_frame).collect()))
}

/// XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]
///
/// With BLOCK and no data available, the connection parks on every named
/// stream until an XADD wakes it or the timeout expires.  The reply is
/// always delivered as the reply to this call, never as an out-of-band push.
pub async fn xread(shared: &Arc<Shared>, args: &[Vec<u8>]) -> Frame {
    let parsed = match parse_xread(args) {
        Ok(parsed) => parsed,
        Err(e) => return e.to_frame(),
    };
    let deadline = parsed
        .block_ms
        .and_then(|ms| (ms > 0).then(|| tokio::time::Instant::now() + Duration::from_millis(ms)));
    let blocking = parsed.block_ms.is_some();

    // `$` means "entries appended after this call"; resolve it once, up
    // front, against the current last id.
    let mut resolved: Vec<(Vec<u8>, StreamId)> = Vec::with_capacity(parsed.streams.len());
    {
        let mut store = shared.store.lock().await;
        for (key, id) in parsed.streams {
            let after = match id {
                XreadId::After(id) => id,
                XreadId::Latest => match store.stream_last_id(&key) {
                    Ok(last) => last.unwrap_or(StreamId::MIN),
                    Err(e) => return CmdError::from(e).to_frame(),
                },
            };
            resolved.push((key, after));
        }
    }

    loop {
        // Check for data, registering wakers under the same store lock that
        // XADD publishes under, so no append can fall between check and park.
        let mut waker_rx = {
            let mut store = shared.store.lock().await;
            let mut per_stream = Vec::new();
            for (key, after) in &resolved {
                match store.xread_after(key, *after) {
                    Ok(entries) if !entries.is_empty() => {
                        per_stream.push((key.clone(), entries));
                    }
                    Ok(_) => {}
                    Err(e) => return CmdError::from(e).to_frame(),
                }
            }
            if !per_stream.is_empty() {
                return xread_reply(per_stream);
            }
            if !blocking {
                return Frame::NullArray;
            }
            let (tx, rx) = mpsc::channel(1);
            let mut waiters = shared.waiters.lock().await;
            for (key, _) in &resolved {
                waiters.register(key, tx.clone());
            }
            rx
        };

        let woken = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, waker_rx.recv())
                .await
                .is_ok(),
            None => {
                waker_rx.recv().await;
                true
            }
        };
        if !woken {
            return Frame::NullArray;
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum XreadId {
    After(StreamId),
    Latest,
}

struct XreadArgs {
    block_ms: Option<u64>,
    streams: Vec<(Vec<u8>, XreadId)>,
}

fn parse_xread(args: &[Vec<u8>]) -> Result<XreadArgs, CmdError> {
    let mut i = 1;
    let mut block_ms = None;
    if i < args.len() && upper(&args[i]) == "BLOCK" {
        let ms = args.get(i + 1).ok_or_else(CmdError::syntax)?;
        let ms = parse_int(ms)?;
        if ms < 0 {
            return Err(CmdError::Err("timeout is negative".to_owned()));
        }
        block_ms = Some(ms as u64);
        i += 2;
    }
    if i >= args.len() || upper(&args[i]) != "STREAMS" {
        return Err(CmdError::syntax());
    }
    i += 1;
    let rest = &args[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CmdError::Err(
            "Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified"
                .to_owned(),
        ));
    }
    let (keys, ids) = rest.split_at(rest.len() / 2);
    let mut streams = Vec::with_capacity(keys.len());
    for (key, id) in keys.iter().zip(ids) {
        let id = if id.as_slice() == b"$" {
            XreadId::Latest
        } else {
            let s = std::str::from_utf8(id).map_err(|_| bad_stream_id())?;
            XreadId::After(StreamId::parse(s, 0).map_err(|_| bad_stream_id())?)
        };
        streams.push((key.clone(), id));
    }
    Ok(XreadArgs { block_ms, streams })
}

/// XADD id argument: `*`, `ms-*`, or an explicit `ms-seq`.
fn parse_id_spec(arg: &[u8]) -> Result<IdSpec, CmdError> {
    if arg == b"*" {
        return Ok(IdSpec::Auto);
    }
    let s = std::str::from_utf8(arg).map_err(|_| bad_stream_id())?;
    if let Some(ms) = s.strip_suffix("-*") {
        let ms = ms.parse::<u64>().map_err(|_| bad_stream_id())?;
        return Ok(IdSpec::AutoSeq(ms));
    }
    Ok(IdSpec::Literal(
        StreamId::parse(s, 0).map_err(|_| bad_stream_id())?,
    ))
}

/// XRANGE bound: `-`/`+` sentinels, or `ms[-seq]` with the seq defaulting to
/// the low (start) or high (end) extreme.
fn parse_range_bound(arg: &[u8], is_end: bool) -> Result<StreamId, CmdError> {
    match arg {
        b"-" => Ok(StreamId::MIN),
        b"+" => Ok(StreamId::MAX),
        _ => {
            let s = std::str::from_utf8(arg).map_err(|_| bad_stream_id())?;
            let default_seq = if is_end { u64::MAX } else { 0 };
            StreamId::parse(s, default_seq).map_err(|_| bad_stream_id())
        }
    }
}

fn bad_stream_id() -> CmdError {
    CmdError::Err("Invalid stream ID specified as stream command argument".to_owned())
}

// ---------------------------------------------------------------------------
// Reply shapes
// ---------------------------------------------------------------------------

fn entry_frame(entry: &StreamEntry) -> Frame {
    let mut flat = Vec::with_capacity(entry.fields.len() * 2);
    for (field, value) in &entry.fields {
        flat.push(Frame::Bulk(field.clone()));
        flat.push(Frame::Bulk(value.clone()));
    }
    Frame::Array(vec![
        Frame::Bulk(entry.id.to_string().into_bytes()),
        Frame::Array(flat),
    ])
}

fn xread_reply(per_stream: Vec<(Vec<u8>, Vec<StreamEntry>)>) -> Frame {
    Frame::Array(
        per_stream
            .into_iter()
            .map(|(key, entries)| {
                Frame::Array(vec![
                    Frame::Bulk(key),
                    Frame::Array(entries.iter().map(entry_frame).collect()),
                ])
            })
            .collect(),
    )
}
