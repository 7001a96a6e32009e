//! The typed keyspace: key → entry map with optional expiry and the write
//! change counter consulted by the snapshot scheduler.
//!
//! # Expiry
//! Deadlines are absolute unix milliseconds.  Eviction is lazy: any operation
//! observing a key first drops it if its deadline has passed, so no command
//! ever sees an expired entry.  There is no active sweep; DBSIZE and KEYS
//! purge while they iterate.
//!
//! # Empty collections
//! Pops and removals that empty a list/set/hash/zset delete the key, so
//! EXISTS and TYPE never report a hollow container.

use crate::glob::glob_match;
use crate::rdb::RdbRecord;
use crate::stream::{IdSpec, Stream, StreamEntry, StreamError, StreamId};
use crate::value::{SortedSet, Value, clamp_range};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Bound;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("value is not an integer or out of range")]
    NotInteger,
    #[error("increment or decrement would overflow")]
    Overflow,
    #[error("value is not a valid float")]
    NotFloat,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("no such key")]
    NoSuchKey,
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// One keyspace record.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    /// Unix-ms deadline; `None` = no expiry.
    pub expires_at: Option<u64>,
}

impl Entry {
    fn new(value: Value) -> Entry {
        Entry {
            value,
            expires_at: None,
        }
    }
}

/// TTL as observed by TTL/PTTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Missing,
    NoExpiry,
    RemainingMs(u64),
}

// ---------------------------------------------------------------------------
// SET options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetCondition {
    #[default]
    Always,
    /// NX: only create.
    IfAbsent,
    /// XX: only overwrite.
    IfPresent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetExpiry {
    /// Plain SET clears any previous expiry.
    #[default]
    Discard,
    /// KEEPTTL: retain the previous deadline.
    KeepTtl,
    /// EX/PX: absolute unix-ms deadline.
    At(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: SetCondition,
    pub expiry: SetExpiry,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The keyspace.  `Clone` is the point-in-time snapshot primitive used by
/// BGSAVE and full resync.
#[derive(Debug, Clone, Default)]
pub struct Store {
    entries: HashMap<Vec<u8>, Entry>,
    dirty: u64,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    // -----------------------------------------------------------------------
    // Change counter
    // -----------------------------------------------------------------------

    /// Count one successful write command (the dispatcher calls this once
    /// per command, not once per touched key).
    pub fn mark_write(&mut self) {
        self.dirty += 1;
    }

    pub fn dirty(&self) -> u64 {
        self.dirty
    }

    /// Settle `n` writes as persisted after a completed save.  Writes that
    /// landed after the snapshot view was taken stay counted.
    pub fn settle_saved(&mut self, n: u64) {
        self.dirty = self.dirty.saturating_sub(n);
    }

    // -----------------------------------------------------------------------
    // Generic key operations
    // -----------------------------------------------------------------------

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    /// Returns false when an NX/XX condition declined the write.
    pub fn set(&mut self, key: &[u8], value: Vec<u8>, opts: SetOptions) -> bool {
        self.expire_if_due(key);
        let exists = self.entries.contains_key(key);
        match opts.condition {
            SetCondition::IfAbsent if exists => return false,
            SetCondition::IfPresent if !exists => return false,
            _ => {}
        }
        let expires_at = match opts.expiry {
            SetExpiry::Discard => None,
            SetExpiry::At(at) => Some(at),
            SetExpiry::KeepTtl => self.entries.get(key).and_then(|e| e.expires_at),
        };
        self.entries
            .insert(key.to_vec(), Entry { value: Value::Str(value), expires_at });
        true
    }

    pub fn del(&mut self, key: &[u8]) -> bool {
        self.expire_if_due(key);
        self.entries.remove(key).is_some()
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.expire_if_due(key);
        self.entries.contains_key(key)
    }

    pub fn type_name(&mut self, key: &[u8]) -> &'static str {
        self.expire_if_due(key);
        self.entries
            .get(key)
            .map_or("none", |e| e.value.type_name())
    }

    pub fn keys(&mut self, pattern: &[u8]) -> Vec<Vec<u8>> {
        self.purge_expired();
        self.entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect()
    }

    /// Set an absolute unix-ms deadline.  False when the key is absent.
    pub fn expire_at(&mut self, key: &[u8], at_ms: u64) -> bool {
        self.expire_if_due(key);
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(at_ms);
                true
            }
            None => false,
        }
    }

    pub fn ttl(&mut self, key: &[u8]) -> Ttl {
        self.expire_if_due(key);
        match self.entries.get(key) {
            None => Ttl::Missing,
            Some(Entry { expires_at: None, .. }) => Ttl::NoExpiry,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => Ttl::RemainingMs(at.saturating_sub(crate::now_ms())),
        }
    }

    pub fn dbsize(&mut self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    pub fn flushall(&mut self) {
        self.entries.clear();
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    pub fn incr_by(&mut self, key: &[u8], delta: i64) -> Result<i64, StoreError> {
        let current = match self.get(key)? {
            None => 0,
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(StoreError::NotInteger)?,
        };
        let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
        // INCR on a volatile key keeps its TTL.
        let entry = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::Str(Vec::new())));
        entry.value = Value::Str(next.to_string().into_bytes());
        Ok(next)
    }

    pub fn append(&mut self, key: &[u8], suffix: &[u8]) -> Result<usize, StoreError> {
        self.expire_if_due(key);
        let entry = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::Str(Vec::new())));
        match &mut entry.value {
            Value::Str(s) => {
                s.extend_from_slice(suffix);
                Ok(s.len())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn strlen(&mut self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.get(key)?.map_or(0, |s| s.len()))
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    pub fn lpush(&mut self, key: &[u8], values: Vec<Vec<u8>>) -> Result<usize, StoreError> {
        let list = self.list_entry(key)?;
        for v in values {
            list.push_front(v);
        }
        Ok(list.len())
    }

    pub fn rpush(&mut self, key: &[u8], values: Vec<Vec<u8>>) -> Result<usize, StoreError> {
        let list = self.list_entry(key)?;
        for v in values {
            list.push_back(v);
        }
        Ok(list.len())
    }

    pub fn lpop(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let popped = match self.list_read_mut(key)? {
            Some(list) => list.pop_front(),
            None => None,
        };
        self.drop_if_empty(key);
        Ok(popped)
    }

    pub fn rpop(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let popped = match self.list_read_mut(key)? {
            Some(list) => list.pop_back(),
            None => None,
        };
        self.drop_if_empty(key);
        Ok(popped)
    }

    pub fn llen(&mut self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.list_read(key)?.map_or(0, VecDeque::len))
    }

    pub fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>, StoreError> {
        let Some(list) = self.list_read(key)? else {
            return Ok(Vec::new());
        };
        match clamp_range(start, stop, list.len()) {
            (Some(a), Some(b)) => Ok(list.iter().skip(a).take(b - a + 1).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    pub fn lindex(&mut self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(list) = self.list_read(key)? else {
            return Ok(None);
        };
        Ok(resolve_index(index, list.len()).and_then(|i| list.get(i).cloned()))
    }

    pub fn lset(&mut self, key: &[u8], index: i64, value: Vec<u8>) -> Result<(), StoreError> {
        let Some(list) = self.list_read_mut(key)? else {
            return Err(StoreError::NoSuchKey);
        };
        let slot = resolve_index(index, list.len())
            .and_then(|i| list.get_mut(i))
            .ok_or(StoreError::IndexOutOfRange)?;
        *slot = value;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sets
    // -----------------------------------------------------------------------

    pub fn sadd(&mut self, key: &[u8], members: Vec<Vec<u8>>) -> Result<usize, StoreError> {
        let set = self.set_entry(key)?;
        Ok(members.into_iter().filter(|m| set.insert(m.clone())).count())
    }

    pub fn srem(&mut self, key: &[u8], members: &[Vec<u8>]) -> Result<usize, StoreError> {
        let removed = match self.set_read_mut(key)? {
            Some(set) => members.iter().filter(|m| set.remove(m.as_slice())).count(),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    pub fn smembers(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .set_read(key)?
            .map_or_else(Vec::new, |set| set.iter().cloned().collect()))
    }

    pub fn sismember(&mut self, key: &[u8], member: &[u8]) -> Result<bool, StoreError> {
        Ok(self.set_read(key)?.is_some_and(|set| set.contains(member)))
    }

    pub fn scard(&mut self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.set_read(key)?.map_or(0, HashSet::len))
    }

    // -----------------------------------------------------------------------
    // Hashes
    // -----------------------------------------------------------------------

    /// Returns the number of fields newly created (updates don't count).
    pub fn hset(
        &mut self,
        key: &[u8],
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<usize, StoreError> {
        let hash = self.hash_entry(key)?;
        Ok(pairs
            .into_iter()
            .filter(|(f, v)| hash.insert(f.clone(), v.clone()).is_none())
            .count())
    }

    pub fn hget(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .hash_read(key)?
            .and_then(|hash| hash.get(field).cloned()))
    }

    pub fn hgetall(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self.hash_read(key)?.map_or_else(Vec::new, |hash| {
            hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect()
        }))
    }

    pub fn hdel(&mut self, key: &[u8], fields: &[Vec<u8>]) -> Result<usize, StoreError> {
        let removed = match self.hash_read_mut(key)? {
            Some(hash) => fields
                .iter()
                .filter(|f| hash.shift_remove(f.as_slice()).is_some())
                .count(),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    pub fn hlen(&mut self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.hash_read(key)?.map_or(0, IndexMap::len))
    }

    pub fn hexists(&mut self, key: &[u8], field: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .hash_read(key)?
            .is_some_and(|hash| hash.contains_key(field)))
    }

    pub fn hkeys(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .hash_read(key)?
            .map_or_else(Vec::new, |hash| hash.keys().cloned().collect()))
    }

    pub fn hvals(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .hash_read(key)?
            .map_or_else(Vec::new, |hash| hash.values().cloned().collect()))
    }

    // -----------------------------------------------------------------------
    // Sorted sets
    // -----------------------------------------------------------------------

    /// Returns the number of members newly added (score updates don't count).
    pub fn zadd(&mut self, key: &[u8], pairs: Vec<(f64, Vec<u8>)>) -> Result<usize, StoreError> {
        let zset = self.zset_entry(key)?;
        Ok(pairs
            .into_iter()
            .filter(|(score, member)| zset.insert(*score, member.clone()))
            .count())
    }

    pub fn zrange(
        &mut self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<(f64, Vec<u8>)>, StoreError> {
        Ok(self
            .zset_read(key)?
            .map_or_else(Vec::new, |z| z.range_by_index(start, stop)))
    }

    pub fn zrangebyscore(
        &mut self,
        key: &[u8],
        min: Bound<f64>,
        max: Bound<f64>,
    ) -> Result<Vec<(f64, Vec<u8>)>, StoreError> {
        Ok(self
            .zset_read(key)?
            .map_or_else(Vec::new, |z| z.range_by_score(min, max)))
    }

    pub fn zrank(&mut self, key: &[u8], member: &[u8]) -> Result<Option<usize>, StoreError> {
        Ok(self.zset_read(key)?.and_then(|z| z.rank(member)))
    }

    pub fn zscore(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>, StoreError> {
        Ok(self.zset_read(key)?.and_then(|z| z.score(member)))
    }

    pub fn zrem(&mut self, key: &[u8], members: &[Vec<u8>]) -> Result<usize, StoreError> {
        let removed = match self.zset_read_mut(key)? {
            Some(zset) => members.iter().filter(|m| zset.remove(m)).count(),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    pub fn zcard(&mut self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.zset_read(key)?.map_or(0, SortedSet::len))
    }

    // -----------------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------------

    pub fn xadd(
        &mut self,
        key: &[u8],
        spec: IdSpec,
        fields: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<StreamId, StoreError> {
        let now = crate::now_ms();
        let stream = self.stream_entry(key)?;
        Ok(stream.add(spec, fields, now)?)
    }

    pub fn xrange(
        &mut self,
        key: &[u8],
        start: StreamId,
        end: StreamId,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        Ok(self
            .stream_read(key)?
            .map_or_else(Vec::new, |s| s.range(start, end)))
    }

    /// Entries strictly after `after`; empty when the key is absent.
    pub fn xread_after(
        &mut self,
        key: &[u8],
        after: StreamId,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        Ok(self
            .stream_read(key)?
            .map_or_else(Vec::new, |s| s.after(after)))
    }

    pub fn stream_last_id(&mut self, key: &[u8]) -> Result<Option<StreamId>, StoreError> {
        Ok(self.stream_read(key)?.map(Stream::last_id))
    }

    // -----------------------------------------------------------------------
    // Snapshot support
    // -----------------------------------------------------------------------

    /// Clone the live entries into RDB records (used by SAVE/BGSAVE and by
    /// full resync).  Expired entries are excluded.
    pub fn snapshot_records(&self) -> Vec<RdbRecord> {
        let now = crate::now_ms();
        self.entries
            .iter()
            .filter(|(_, e)| !e.expires_at.is_some_and(|at| at <= now))
            .map(|(k, e)| RdbRecord {
                key: k.clone(),
                value: e.value.clone(),
                expires_at_ms: e.expires_at,
            })
            .collect()
    }

    /// Rebuild a keyspace from loaded records, dropping already-expired keys.
    pub fn from_records(records: Vec<RdbRecord>, now_ms: u64) -> Store {
        let mut store = Store::new();
        for rec in records {
            if rec.expires_at_ms.is_some_and(|at| at <= now_ms) {
                continue;
            }
            store.entries.insert(
                rec.key,
                Entry {
                    value: rec.value,
                    expires_at: rec.expires_at_ms,
                },
            );
        }
        store
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn expire_if_due(&mut self, key: &[u8]) {
        let now = crate::now_ms();
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.expires_at.is_some_and(|at| at <= now))
        {
            self.entries.remove(key);
        }
    }

    fn purge_expired(&mut self) {
        let now = crate::now_ms();
        self.entries
            .retain(|_, e| !e.expires_at.is_some_and(|at| at <= now));
    }

    fn drop_if_empty(&mut self, key: &[u8]) {
        let empty = self.entries.get(key).is_some_and(|e| match &e.value {
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Zset(z) => z.is_empty(),
            Value::Str(_) | Value::Stream(_) => false,
        });
        if empty {
            self.entries.remove(key);
        }
    }

    fn list_entry(&mut self, key: &[u8]) -> Result<&mut VecDeque<Vec<u8>>, StoreError> {
        self.expire_if_due(key);
        let entry = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(l) => Ok(l),
            _ => Err(StoreError::WrongType),
        }
    }

    fn list_read(&mut self, key: &[u8]) -> Result<Option<&VecDeque<Vec<u8>>>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::List(l)) => Ok(Some(l)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn list_read_mut(&mut self, key: &[u8]) -> Result<Option<&mut VecDeque<Vec<u8>>>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            None => Ok(None),
            Some(Value::List(l)) => Ok(Some(l)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn set_entry(&mut self, key: &[u8]) -> Result<&mut HashSet<Vec<u8>>, StoreError> {
        self.expire_if_due(key);
        let entry = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        match &mut entry.value {
            Value::Set(s) => Ok(s),
            _ => Err(StoreError::WrongType),
        }
    }

    fn set_read(&mut self, key: &[u8]) -> Result<Option<&HashSet<Vec<u8>>>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Set(s)) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn set_read_mut(&mut self, key: &[u8]) -> Result<Option<&mut HashSet<Vec<u8>>>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            None => Ok(None),
            Some(Value::Set(s)) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn hash_entry(&mut self, key: &[u8]) -> Result<&mut IndexMap<Vec<u8>, Vec<u8>>, StoreError> {
        self.expire_if_due(key);
        let entry = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::Hash(IndexMap::new())));
        match &mut entry.value {
            Value::Hash(h) => Ok(h),
            _ => Err(StoreError::WrongType),
        }
    }

    fn hash_read(&mut self, key: &[u8]) -> Result<Option<&IndexMap<Vec<u8>, Vec<u8>>>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn hash_read_mut(
        &mut self,
        key: &[u8],
    ) -> Result<Option<&mut IndexMap<Vec<u8>, Vec<u8>>>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn zset_entry(&mut self, key: &[u8]) -> Result<&mut SortedSet, StoreError> {
        self.expire_if_due(key);
        let entry = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::Zset(SortedSet::new())));
        match &mut entry.value {
            Value::Zset(z) => Ok(z),
            _ => Err(StoreError::WrongType),
        }
    }

    fn zset_read(&mut self, key: &[u8]) -> Result<Option<&SortedSet>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Zset(z)) => Ok(Some(z)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn zset_read_mut(&mut self, key: &[u8]) -> Result<Option<&mut SortedSet>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            None => Ok(None),
            Some(Value::Zset(z)) => Ok(Some(z)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    fn stream_entry(&mut self, key: &[u8]) -> Result<&mut Stream, StoreError> {
        self.expire_if_due(key);
        let entry = self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::Stream(Stream::new())));
        match &mut entry.value {
            Value::Stream(s) => Ok(s),
            _ => Err(StoreError::WrongType),
        }
    }

    fn stream_read(&mut self, key: &[u8]) -> Result<Option<&Stream>, StoreError> {
        self.expire_if_due(key);
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Stream(s)) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType),
        }
    }
}

/// Resolve a possibly-negative index against a collection of `len` items.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}
