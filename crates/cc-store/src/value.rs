//! Value variants held by keyspace entries.
//!
//! A key holds exactly one variant; commands that expect a different variant
//! fail with a wrong-type error at the keyspace layer.

use crate::stream::Stream;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// The tagged union of every datatype a key can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(HashSet<Vec<u8>>),
    /// Field insertion order is preserved (HGETALL/HKEYS/HVALS report it).
    Hash(IndexMap<Vec<u8>, Vec<u8>>),
    Zset(SortedSet),
    Stream(Stream),
}

impl Value {
    /// The name reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::Zset(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }
}

// ---------------------------------------------------------------------------
// SortedSet
// ---------------------------------------------------------------------------

/// A sorted set: unique members ordered by ascending `(score, member)`.
///
/// Scores are IEEE-754 doubles compared with `total_cmp`; ties are broken by
/// lexicographic member order.  Lookup by member is O(1), ordered access is
/// a sorted vector kept in order on every insert/remove.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    by_member: std::collections::HashMap<Vec<u8>, f64>,
    ordered: Vec<(f64, Vec<u8>)>,
}

impl SortedSet {
    pub fn new() -> SortedSet {
        SortedSet::default()
    }

    /// Insert or update a member.  Returns true when the member is new.
    pub fn insert(&mut self, score: f64, member: Vec<u8>) -> bool {
        let added = match self.by_member.insert(member.clone(), score) {
            Some(old) => {
                let idx = self.position(old, &member);
                self.ordered.remove(idx);
                false
            }
            None => true,
        };
        let at = self
            .ordered
            .partition_point(|(s, m)| order(*s, m, score, &member) == std::cmp::Ordering::Less);
        self.ordered.insert(at, (score, member));
        added
    }

    /// Remove a member.  Returns true when it was present.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.by_member.remove(member) {
            Some(score) => {
                let idx = self.position(score, member);
                self.ordered.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.by_member.get(member).copied()
    }

    /// Zero-based position of a member in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        Some(self.position(score, member))
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Ascending `(score, member)` iteration.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &[u8])> {
        self.ordered.iter().map(|(s, m)| (*s, m.as_slice()))
    }

    /// Index range with negative-from-end semantics already resolved by the
    /// caller; `start..=stop` clamped to the set.
    pub fn range_by_index(&self, start: i64, stop: i64) -> Vec<(f64, Vec<u8>)> {
        let (start, stop) = clamp_range(start, stop, self.ordered.len());
        match (start, stop) {
            (Some(a), Some(b)) if a <= b => self.ordered[a..=b].to_vec(),
            _ => Vec::new(),
        }
    }

    /// Members with `min <= score <= max` under the given bound kinds.
    pub fn range_by_score(
        &self,
        min: std::ops::Bound<f64>,
        max: std::ops::Bound<f64>,
    ) -> Vec<(f64, Vec<u8>)> {
        use std::ops::Bound;
        self.ordered
            .iter()
            .filter(|(s, _)| match min {
                Bound::Included(lo) => *s >= lo,
                Bound::Excluded(lo) => *s > lo,
                Bound::Unbounded => true,
            })
            .take_while(|(s, _)| match max {
                Bound::Included(hi) => *s <= hi,
                Bound::Excluded(hi) => *s < hi,
                Bound::Unbounded => true,
            })
            .cloned()
            .collect()
    }

    fn position(&self, score: f64, member: &[u8]) -> usize {
        self.ordered
            .partition_point(|(s, m)| order(*s, m, score, member) == std::cmp::Ordering::Less)
    }
}

fn order(a_score: f64, a_member: &[u8], b_score: f64, b_member: &[u8]) -> std::cmp::Ordering {
    a_score
        .total_cmp(&b_score)
        .then_with(|| a_member.cmp(b_member))
}

/// Resolve LRANGE/ZRANGE style indices (negative = from the end) against a
/// collection of `len` items.  Returns `None` ends when the range is empty.
pub(crate) fn clamp_range(start: i64, stop: i64, len: usize) -> (Option<usize>, Option<usize>) {
    let len = len as i64;
    if len == 0 {
        return (None, None);
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start >= len || stop < 0 || start > stop {
        return (None, None);
    }
    (Some(start as usize), Some(stop as usize))
}
