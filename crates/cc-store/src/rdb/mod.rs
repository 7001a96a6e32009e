//! RDB snapshot codec.
//!
//! The reader accepts the subset of the Redis RDB format this server can
//! hold: value types 0 (string), 1 (list), 2 (set), 3 (zset, ASCII scores),
//! 4 (hash), 5 (zset, binary scores), 11 (ziplist-encoded hash) and
//! 14 (quicklist list), plus aux fields, db selectors, resizedb hints, both
//! expiry prefixes, LZF-compressed strings, and the CRC64 trailer.
//!
//! The writer emits only forms it can round-trip: plain strings, lists,
//! sets, hashes, and binary-score zsets, with millisecond expiries and a
//! valid CRC64.  Output is deterministic (records sorted by key, no
//! timestamp aux fields), so re-saving an unchanged keyspace reproduces the
//! file byte for byte.
//!
//! A bad byte anywhere fails the whole load; there is no partial keyspace.

pub mod crc64;
pub mod lzf;

use crate::value::{SortedSet, Value};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

pub use crc64::crc64;

const MAGIC: &[u8] = b"REDIS";
/// Version written in our headers; the reader accepts any 4-digit version.
const WRITE_VERSION: &[u8] = b"0011";

const OP_AUX: u8 = 0xFA;
const OP_RESIZEDB: u8 = 0xFB;
const OP_EXPIRE_MS: u8 = 0xFC;
const OP_EXPIRE_SEC: u8 = 0xFD;
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_SET: u8 = 2;
const TYPE_ZSET: u8 = 3;
const TYPE_HASH: u8 = 4;
const TYPE_ZSET_2: u8 = 5;
const TYPE_HASH_ZIPLIST: u8 = 11;
const TYPE_LIST_QUICKLIST: u8 = 14;

/// One key record as it appears on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RdbRecord {
    pub key: Vec<u8>,
    pub value: Value,
    pub expires_at_ms: Option<u64>,
}

/// Everything a load produces: auxiliary header fields plus key records.
#[derive(Debug, Default)]
pub struct RdbContents {
    pub aux: Vec<(Vec<u8>, Vec<u8>)>,
    pub records: Vec<RdbRecord>,
}

#[derive(Debug, Error, PartialEq)]
pub enum RdbError {
    #[error("not an RDB file (bad magic)")]
    BadMagic,
    #[error("unexpected end of RDB data")]
    Truncated,
    #[error("CRC mismatch (stored {stored:#018x}, computed {computed:#018x})")]
    CrcMismatch { stored: u64, computed: u64 },
    #[error("unknown value type byte {0:#04x}")]
    UnknownType(u8),
    #[error("invalid length encoding")]
    BadLength,
    #[error("invalid double encoding")]
    BadDouble,
    #[error("malformed ziplist payload")]
    BadZiplist,
    #[error("lzf: {0}")]
    Lzf(#[from] lzf::LzfError),
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parse a complete RDB image.
pub fn read(bytes: &[u8]) -> Result<RdbContents, RdbError> {
    let mut cur = Cursor { buf: bytes, pos: 0 };
    if cur.take(MAGIC.len())? != MAGIC {
        return Err(RdbError::BadMagic);
    }
    let version = cur.take(4)?;
    if !version.iter().all(u8::is_ascii_digit) {
        return Err(RdbError::BadMagic);
    }

    let mut contents = RdbContents::default();
    let mut pending_expiry: Option<u64> = None;
    loop {
        let op = cur.u8()?;
        match op {
            OP_AUX => {
                let k = read_string(&mut cur)?;
                let v = read_string(&mut cur)?;
                contents.aux.push((k, v));
            }
            OP_SELECTDB => {
                // Single logical keyspace: the index is validated but unused.
                let _db = read_len(&mut cur)?;
            }
            OP_RESIZEDB => {
                let _hash_size = read_len(&mut cur)?;
                let _expire_size = read_len(&mut cur)?;
            }
            OP_EXPIRE_SEC => {
                pending_expiry = Some(cur.u32_le()? as u64 * 1000);
            }
            OP_EXPIRE_MS => {
                pending_expiry = Some(cur.u64_le()?);
            }
            OP_EOF => {
                let crc_start = cur.pos;
                let stored = cur.u64_le()?;
                if stored != 0 {
                    let computed = crc64(0, &bytes[..crc_start]);
                    if stored != computed {
                        return Err(RdbError::CrcMismatch { stored, computed });
                    }
                }
                return Ok(contents);
            }
            type_byte => {
                let key = read_string(&mut cur)?;
                let value = read_value(&mut cur, type_byte)?;
                contents.records.push(RdbRecord {
                    key,
                    value,
                    expires_at_ms: pending_expiry.take(),
                });
            }
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], RdbError> {
        let end = self.pos.checked_add(n).ok_or(RdbError::Truncated)?;
        if end > self.buf.len() {
            return Err(RdbError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, RdbError> {
        Ok(self.take(1)?[0])
    }

    fn u32_le(&mut self) -> Result<u32, RdbError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64_le(&mut self) -> Result<u64, RdbError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u32_be(&mut self) -> Result<u32, RdbError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }
}

/// A length header: either a plain length or one of the special string
/// encodings (integers-as-strings, LZF).
enum Len {
    Plain(usize),
    Special(u8),
}

fn read_len_or_special(cur: &mut Cursor) -> Result<Len, RdbError> {
    let b0 = cur.u8()?;
    match b0 >> 6 {
        0 => Ok(Len::Plain((b0 & 0x3f) as usize)),
        1 => {
            let b1 = cur.u8()?;
            Ok(Len::Plain((((b0 & 0x3f) as usize) << 8) | b1 as usize))
        }
        2 => Ok(Len::Plain(cur.u32_be()? as usize)),
        _ => Ok(Len::Special(b0 & 0x3f)),
    }
}

fn read_len(cur: &mut Cursor) -> Result<usize, RdbError> {
    match read_len_or_special(cur)? {
        Len::Plain(n) => Ok(n),
        Len::Special(_) => Err(RdbError::BadLength),
    }
}

fn read_string(cur: &mut Cursor) -> Result<Vec<u8>, RdbError> {
    match read_len_or_special(cur)? {
        Len::Plain(n) => Ok(cur.take(n)?.to_vec()),
        Len::Special(0) => Ok((cur.u8()? as i8).to_string().into_bytes()),
        Len::Special(1) => {
            let v = i16::from_le_bytes(cur.take(2)?.try_into().unwrap());
            Ok(v.to_string().into_bytes())
        }
        Len::Special(2) => {
            let v = i32::from_le_bytes(cur.take(4)?.try_into().unwrap());
            Ok(v.to_string().into_bytes())
        }
        Len::Special(3) => {
            let compressed_len = read_len(cur)?;
            let raw_len = read_len(cur)?;
            let compressed = cur.take(compressed_len)?;
            Ok(lzf::decompress(compressed, raw_len)?)
        }
        Len::Special(_) => Err(RdbError::BadLength),
    }
}

/// Type-3 score: one length byte of ASCII digits, with 253/254/255 reserved
/// for NaN, +inf, and -inf.
fn read_double_ascii(cur: &mut Cursor) -> Result<f64, RdbError> {
    match cur.u8()? {
        255 => Ok(f64::NEG_INFINITY),
        254 => Ok(f64::INFINITY),
        253 => Ok(f64::NAN),
        len => {
            let raw = cur.take(len as usize)?;
            std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or(RdbError::BadDouble)
        }
    }
}

fn read_value(cur: &mut Cursor, type_byte: u8) -> Result<Value, RdbError> {
    match type_byte {
        TYPE_STRING => Ok(Value::Str(read_string(cur)?)),
        TYPE_LIST => {
            let n = read_len(cur)?;
            let mut list = VecDeque::with_capacity(n);
            for _ in 0..n {
                list.push_back(read_string(cur)?);
            }
            Ok(Value::List(list))
        }
        TYPE_SET => {
            let n = read_len(cur)?;
            let mut set = HashSet::with_capacity(n);
            for _ in 0..n {
                set.insert(read_string(cur)?);
            }
            Ok(Value::Set(set))
        }
        TYPE_ZSET | TYPE_ZSET_2 => {
            let n = read_len(cur)?;
            let mut zset = SortedSet::new();
            for _ in 0..n {
                let member = read_string(cur)?;
                let score = if type_byte == TYPE_ZSET_2 {
                    f64::from_bits(cur.u64_le()?)
                } else {
                    read_double_ascii(cur)?
                };
                zset.insert(score, member);
            }
            Ok(Value::Zset(zset))
        }
        TYPE_HASH => {
            let n = read_len(cur)?;
            let mut hash = IndexMap::with_capacity(n);
            for _ in 0..n {
                let field = read_string(cur)?;
                let value = read_string(cur)?;
                hash.insert(field, value);
            }
            Ok(Value::Hash(hash))
        }
        TYPE_HASH_ZIPLIST => {
            let blob = read_string(cur)?;
            let items = parse_ziplist(&blob)?;
            if items.len() % 2 != 0 {
                return Err(RdbError::BadZiplist);
            }
            let mut hash = IndexMap::with_capacity(items.len() / 2);
            let mut it = items.into_iter();
            while let (Some(field), Some(value)) = (it.next(), it.next()) {
                hash.insert(field, value);
            }
            Ok(Value::Hash(hash))
        }
        TYPE_LIST_QUICKLIST => {
            let nodes = read_len(cur)?;
            let mut list = VecDeque::new();
            for _ in 0..nodes {
                let blob = read_string(cur)?;
                list.extend(parse_ziplist(&blob)?);
            }
            Ok(Value::List(list))
        }
        other => Err(RdbError::UnknownType(other)),
    }
}

// ---------------------------------------------------------------------------
// Ziplist payloads
// ---------------------------------------------------------------------------

/// Decode a ziplist blob into its entries; integer entries are rendered as
/// ASCII decimal, matching how they entered the structure.
fn parse_ziplist(blob: &[u8]) -> Result<Vec<Vec<u8>>, RdbError> {
    // Header: zlbytes u32, zltail u32, zllen u16.
    if blob.len() < 11 {
        return Err(RdbError::BadZiplist);
    }
    let mut pos = 10;
    let mut items = Vec::new();
    loop {
        let first = *blob.get(pos).ok_or(RdbError::BadZiplist)?;
        if first == 0xFF {
            return Ok(items);
        }
        // prevlen: 1 byte, or 0xFE + 4 bytes.
        pos += if first == 0xFE { 5 } else { 1 };
        let enc = *blob.get(pos).ok_or(RdbError::BadZiplist)?;
        pos += 1;
        let item = match enc >> 6 {
            0 => {
                let len = (enc & 0x3f) as usize;
                take_zl(blob, &mut pos, len)?.to_vec()
            }
            1 => {
                let b1 = *blob.get(pos).ok_or(RdbError::BadZiplist)? as usize;
                pos += 1;
                let len = (((enc & 0x3f) as usize) << 8) | b1;
                take_zl(blob, &mut pos, len)?.to_vec()
            }
            2 => {
                if enc != 0x80 {
                    return Err(RdbError::BadZiplist);
                }
                let raw = take_zl(blob, &mut pos, 4)?;
                let len = u32::from_be_bytes(raw.try_into().unwrap()) as usize;
                take_zl(blob, &mut pos, len)?.to_vec()
            }
            _ => decode_zl_int(blob, &mut pos, enc)?,
        };
        items.push(item);
    }
}

fn take_zl<'a>(blob: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], RdbError> {
    let end = pos.checked_add(n).ok_or(RdbError::BadZiplist)?;
    if end > blob.len() {
        return Err(RdbError::BadZiplist);
    }
    let slice = &blob[*pos..end];
    *pos = end;
    Ok(slice)
}

fn decode_zl_int(blob: &[u8], pos: &mut usize, enc: u8) -> Result<Vec<u8>, RdbError> {
    let v: i64 = match enc {
        0xC0 => i16::from_le_bytes(take_zl(blob, pos, 2)?.try_into().unwrap()) as i64,
        0xD0 => i32::from_le_bytes(take_zl(blob, pos, 4)?.try_into().unwrap()) as i64,
        0xE0 => i64::from_le_bytes(take_zl(blob, pos, 8)?.try_into().unwrap()),
        0xF0 => {
            let raw = take_zl(blob, pos, 3)?;
            // 24-bit signed, little endian.
            let v = (raw[0] as i32) | ((raw[1] as i32) << 8) | ((raw[2] as i8 as i32) << 16);
            v as i64
        }
        0xFE => take_zl(blob, pos, 1)?[0] as i8 as i64,
        0xF1..=0xFD => (enc & 0x0f) as i64 - 1,
        _ => return Err(RdbError::BadZiplist),
    };
    Ok(v.to_string().into_bytes())
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serialize records into a complete RDB image.
///
/// Stream values are skipped: the on-disk format subset has no stream
/// encoding we can round-trip, so streams live only in memory.
pub fn write(records: &[RdbRecord]) -> Vec<u8> {
    let mut sorted: Vec<&RdbRecord> = records
        .iter()
        .filter(|r| !matches!(r.value, Value::Stream(_)))
        .collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(WRITE_VERSION);
    write_aux(&mut out, b"redis-bits", b"64");
    out.push(OP_SELECTDB);
    write_len(&mut out, 0);
    out.push(OP_RESIZEDB);
    write_len(&mut out, sorted.len());
    write_len(&mut out, sorted.iter().filter(|r| r.expires_at_ms.is_some()).count());

    for rec in sorted {
        if let Some(at) = rec.expires_at_ms {
            out.push(OP_EXPIRE_MS);
            out.extend_from_slice(&at.to_le_bytes());
        }
        write_record(&mut out, rec);
    }

    out.push(OP_EOF);
    let crc = crc64(0, &out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

fn write_record(out: &mut Vec<u8>, rec: &RdbRecord) {
    match &rec.value {
        Value::Str(s) => {
            out.push(TYPE_STRING);
            write_string(out, &rec.key);
            write_string(out, s);
        }
        Value::List(list) => {
            out.push(TYPE_LIST);
            write_string(out, &rec.key);
            write_len(out, list.len());
            for item in list {
                write_string(out, item);
            }
        }
        Value::Set(set) => {
            out.push(TYPE_SET);
            write_string(out, &rec.key);
            write_len(out, set.len());
            // Hash order is nondeterministic; sort for reproducible output.
            let mut members: Vec<&Vec<u8>> = set.iter().collect();
            members.sort();
            for member in members {
                write_string(out, member);
            }
        }
        Value::Hash(hash) => {
            out.push(TYPE_HASH);
            write_string(out, &rec.key);
            write_len(out, hash.len());
            for (field, value) in hash {
                write_string(out, field);
                write_string(out, value);
            }
        }
        Value::Zset(zset) => {
            out.push(TYPE_ZSET_2);
            write_string(out, &rec.key);
            write_len(out, zset.len());
            for (score, member) in zset.iter() {
                write_string(out, member);
                out.extend_from_slice(&score.to_bits().to_le_bytes());
            }
        }
        Value::Stream(_) => unreachable!("streams are filtered before writing"),
    }
}

fn write_aux(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.push(OP_AUX);
    write_string(out, key);
    write_string(out, value);
}

fn write_len(out: &mut Vec<u8>, n: usize) {
    if n < 64 {
        out.push(n as u8);
    } else if n < 16384 {
        out.push(0x40 | (n >> 8) as u8);
        out.push(n as u8);
    } else {
        out.push(0x80);
        out.extend_from_slice(&(n as u32).to_be_bytes());
    }
}

fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    write_len(out, s.len());
    out.extend_from_slice(s);
}
