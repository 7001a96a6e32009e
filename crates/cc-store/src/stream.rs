//! Append-only stream engine.
//!
//! A stream is an ordered log of field-list entries keyed by a `(ms, seq)`
//! id.  Ids are strictly increasing; the stream remembers its `last_id` to
//! enforce monotonicity and to expand the `*` and `ms-*` auto-id forms.

use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// StreamId
// ---------------------------------------------------------------------------

/// A stream entry id: milliseconds part and sequence part, ordered
/// lexicographically on `(ms, seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> StreamId {
        StreamId { ms, seq }
    }

    /// The smallest id strictly greater than `self`.
    pub fn next(self) -> StreamId {
        match self.seq.checked_add(1) {
            Some(seq) => StreamId { ms: self.ms, seq },
            None => StreamId {
                ms: self.ms + 1,
                seq: 0,
            },
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// How XADD names the entry it is about to append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    /// Explicit `ms-seq`.
    Literal(StreamId),
    /// `ms-*`: smallest seq making the id greater than `last_id`.
    AutoSeq(u64),
    /// `*`: `max(now_ms, last_id.ms)` with the smallest valid seq.
    Auto,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    IdNotGreater,
    #[error("The ID specified in XADD must be greater than 0-0")]
    ZeroId,
    #[error("Invalid stream ID specified as stream command argument")]
    BadId,
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// One entry: id plus its field/value pairs in the order they were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Vec<u8>, Vec<u8>)>,
}

/// An append-only entry log with a monotone `last_id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    last_id: StreamId,
}

impl Stream {
    pub fn new() -> Stream {
        Stream::default()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `spec`, validate monotonicity, append, and return the new id.
    pub fn add(
        &mut self,
        spec: IdSpec,
        fields: Vec<(Vec<u8>, Vec<u8>)>,
        now_ms: u64,
    ) -> Result<StreamId, StreamError> {
        let id = match spec {
            IdSpec::Literal(id) => id,
            IdSpec::AutoSeq(ms) => self.smallest_free(ms)?,
            IdSpec::Auto => self.smallest_free(now_ms.max(self.last_id.ms))?,
        };
        if id == StreamId::MIN {
            return Err(StreamError::ZeroId);
        }
        // On a fresh stream last_id is 0-0, which no surviving id can be <=.
        if id <= self.last_id {
            return Err(StreamError::IdNotGreater);
        }
        self.last_id = id;
        self.entries.push(StreamEntry { id, fields });
        Ok(id)
    }

    /// Smallest id with the given ms part still greater than `last_id`.
    fn smallest_free(&self, ms: u64) -> Result<StreamId, StreamError> {
        if ms < self.last_id.ms {
            return Err(StreamError::IdNotGreater);
        }
        if ms > self.last_id.ms {
            // Seq 0 is fine except for ms 0, where 0-0 is unallocatable.
            return Ok(StreamId::new(ms, 0));
        }
        if self.entries.is_empty() && self.last_id == StreamId::MIN {
            return Ok(StreamId::new(ms, if ms == 0 { 1 } else { 0 }));
        }
        Ok(self.last_id.next())
    }

    /// Entries with `start <= id <= end`, ascending.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<StreamEntry> {
        let lo = self.entries.partition_point(|e| e.id < start);
        let hi = self.entries.partition_point(|e| e.id <= end);
        self.entries[lo..hi].to_vec()
    }

    /// Entries with `id > after`, ascending.  Used by XREAD.
    pub fn after(&self, after: StreamId) -> Vec<StreamEntry> {
        let lo = self.entries.partition_point(|e| e.id <= after);
        self.entries[lo..].to_vec()
    }
}

// ---------------------------------------------------------------------------
// Id parsing
// ---------------------------------------------------------------------------

impl StreamId {
    /// Parse an explicit `ms-seq` id; a bare `ms` gets `default_seq`.
    ///
    /// `-` and `+` sentinels are handled by the callers that accept them.
    pub fn parse(s: &str, default_seq: u64) -> Result<StreamId, StreamError> {
        match s.split_once('-') {
            Some((ms, seq)) => {
                let ms = ms.parse::<u64>().map_err(|_| StreamError::BadId)?;
                let seq = seq.parse::<u64>().map_err(|_| StreamError::BadId)?;
                Ok(StreamId::new(ms, seq))
            }
            None => {
                let ms = s.parse::<u64>().map_err(|_| StreamError::BadId)?;
                Ok(StreamId::new(ms, default_seq))
            }
        }
    }
}
