// cc-store: the CoolCache data engine.
//
// Everything in here is synchronous and self-contained: the typed keyspace
// with lazy expiry, the glob matcher backing KEYS, the stream append/range
// engine, and the RDB snapshot codec.  The server wraps a `Store` in a single
// async mutex; this crate never blocks and never does I/O (the RDB codec
// works on byte slices, file handling is the caller's job).

pub mod glob;
pub mod keyspace;
pub mod rdb;
pub mod stream;
pub mod value;

pub use keyspace::{SetCondition, SetExpiry, SetOptions, Store, StoreError, Ttl};
pub use stream::{IdSpec, Stream, StreamEntry, StreamError, StreamId};
pub use value::{SortedSet, Value};

/// Wall-clock milliseconds since the unix epoch.
///
/// Expiry deadlines are stored as absolute unix milliseconds so they
/// round-trip bit-exactly through the RDB `0xFC` encoding and stay valid
/// across restarts.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
