//! Command handlers.
//!
//! Handlers for keyspace commands are synchronous functions over `&mut
//! Store`; the dispatcher runs them under the store mutex and handles write
//! propagation.  Pub/sub and server-level commands live in their own modules
//! and take the shared state directly.

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod pubsub;
pub mod server_info;
pub mod sets;
pub mod streams;
pub mod strings;
pub mod zsets;

use cc_resp::Frame;
use cc_store::{Store, StoreError};

/// Handler-level failure, rendered into a `-WRONGTYPE`/`-ERR` reply.
#[derive(Debug, PartialEq)]
pub enum CmdError {
    WrongType,
    Err(String),
}

impl From<StoreError> for CmdError {
    fn from(e: StoreError) -> CmdError {
        match e {
            StoreError::WrongType => CmdError::WrongType,
            other => CmdError::Err(other.to_string()),
        }
    }
}

impl CmdError {
    pub fn syntax() -> CmdError {
        CmdError::Err("syntax error".to_owned())
    }

    pub fn to_frame(&self) -> Frame {
        match self {
            CmdError::WrongType => Frame::error(
                "WRONGTYPE Operation against a key holding the wrong kind of value",
            ),
            CmdError::Err(msg) => Frame::error(format!("ERR {}", msg)),
        }
    }
}

pub type CmdResult = Result<Frame, CmdError>;

/// Run one keyspace command.  Arity was already validated by the dispatcher;
/// handlers still validate option syntax.
pub fn run_store(store: &mut Store, name: &str, args: &[Vec<u8>]) -> CmdResult {
    match name {
        "GET" => strings::get(store, args),
        "SET" => strings::set(store, args),
        "INCR" => strings::incr(store, args, 1),
        "DECR" => strings::incr(store, args, -1),
        "APPEND" => strings::append(store, args),
        "STRLEN" => strings::strlen(store, args),

        "DEL" => keys::del(store, args),
        "EXISTS" => keys::exists(store, args),
        "TYPE" => keys::type_cmd(store, args),
        "KEYS" => keys::keys(store, args),
        "EXPIRE" => keys::expire(store, args, 1000),
        "PEXPIRE" => keys::expire(store, args, 1),
        "TTL" => keys::ttl(store, args, true),
        "PTTL" => keys::ttl(store, args, false),
        "DBSIZE" => keys::dbsize(store, args),
        "FLUSHALL" => keys::flushall(store, args),

        "LPUSH" => lists::push(store, args, true),
        "RPUSH" => lists::push(store, args, false),
        "LPOP" => lists::pop(store, args, true),
        "RPOP" => lists::pop(store, args, false),
        "LRANGE" => lists::lrange(store, args),
        "LLEN" => lists::llen(store, args),
        "LINDEX" => lists::lindex(store, args),
        "LSET" => lists::lset(store, args),

        "SADD" => sets::sadd(store, args),
        "SREM" => sets::srem(store, args),
        "SMEMBERS" => sets::smembers(store, args),
        "SISMEMBER" => sets::sismember(store, args),
        "SCARD" => sets::scard(store, args),

        "HSET" => hashes::hset(store, args),
        "HGET" => hashes::hget(store, args),
        "HGETALL" => hashes::hgetall(store, args),
        "HDEL" => hashes::hdel(store, args),
        "HLEN" => hashes::hlen(store, args),
        "HEXISTS" => hashes::hexists(store, args),
        "HKEYS" => hashes::hkeys(store, args),
        "HVALS" => hashes::hvals(store, args),

        "ZADD" => zsets::zadd(store, args),
        "ZRANGE" => zsets::zrange(store, args),
        "ZRANGEBYSCORE" => zsets::zrangebyscore(store, args),
        "ZRANK" => zsets::zrank(store, args),
        "ZSCORE" => zsets::zscore(store, args),
        "ZREM" => zsets::zrem(store, args),
        "ZCARD" => zsets::zcard(store, args),

        "XADD" => streams::xadd(store, args),
        "XRANGE" => streams::xrange(store, args),

        other => Err(CmdError::Err(format!("unknown command '{}'", other))),
    }
}

// ---------------------------------------------------------------------------
// Argument parsing helpers
// ---------------------------------------------------------------------------

pub fn parse_int(arg: &[u8]) -> Result<i64, CmdError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| CmdError::Err("value is not an integer or out of range".to_owned()))
}

pub fn parse_float(arg: &[u8]) -> Result<f64, CmdError> {
    let s = std::str::from_utf8(arg)
        .map_err(|_| CmdError::Err("value is not a valid float".to_owned()))?;
    match s {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => s
            .parse::<f64>()
            .ok()
            .filter(|v| !v.is_nan())
            .ok_or_else(|| CmdError::Err("value is not a valid float".to_owned())),
    }
}

pub fn upper(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).to_ascii_uppercase()
}

/// Score rendering for ZSCORE/WITHSCORES replies.
pub fn format_score(score: f64) -> Vec<u8> {
    if score == f64::INFINITY {
        b"inf".to_vec()
    } else if score == f64::NEG_INFINITY {
        b"-inf".to_vec()
    } else {
        format!("{}", score).into_bytes()
    }
}

pub fn bulk_array(items: Vec<Vec<u8>>) -> Frame {
    Frame::Array(items.into_iter().map(Frame::Bulk).collect())
}
