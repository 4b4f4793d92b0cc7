//! Deterministic, zero-dependency binary encoding for the temporal keyspace.
//!
//! This module owns the byte-stable wire format of the temporal index.
//! Because TempusDB owns this format, the on-disk representation **never**
//! changes due to a dependency upgrade.
//!
//! # Key layout
//!
//! All rows of one keyspace live in a single sorted byte-map, partitioned by
//! a leading region byte:
//!
//! ```text
//! entry row    : [0x01] esc(user_key) [0x00] be64(ts)   →  [tag] payload
//! timeline row : [0x02] be64(ts) esc(user_key) [0x00]   →  [tag]
//! metadata row : b"\0META"                              →  keyspace metadata
//! ```
//!
//! - `esc` escapes `0x00` as `0x00 0xFF` and is order-preserving, so the
//!   `0x00` terminator cannot appear inside an escaped user key.
//! - Timestamps are non-negative and big-endian, so lexicographic order on
//!   encoded rows equals `(user_key, ts)` order on entry rows and
//!   `(ts, user_key)` order on timeline rows. A non-negative big-endian
//!   `i64` never starts with `0xFF`, which keeps the terminator parse
//!   unambiguous.
//! - The metadata row sorts before every entry and timeline row.
//!
//! # Value layout
//!
//! Stored values are `[tag] payload` with [`TAG_VALUE`] (`0x01`) or
//! [`TAG_TOMBSTONE`] (`0x00`). A tombstone carries an empty payload — an
//! empty byte-string *value* is the single byte `[0x01]` and stays
//! distinguishable. The tag space is reserved to these two values;
//! extensions must take new tags.
//!
//! # Zero-panic guarantee
//!
//! Decoders never panic on malformed input; every failure is reported
//! through [`EncodingError`].

#[cfg(test)]
mod tests;

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Region byte for entry rows (`(user_key, ts) → payload`).
pub const ENTRY_PREFIX: u8 = 0x01;

/// Region byte for timeline rows (`(ts, user_key) → tag`), the
/// timestamp-indexed secondary.
pub const TIMELINE_PREFIX: u8 = 0x02;

/// First byte past the timeline region; exclusive upper bound for timeline
/// range removals.
pub const TIMELINE_REGION_END: u8 = 0x03;

/// Reserved byte-map key holding the keyspace metadata record.
pub const META_KEY: &[u8] = b"\0META";

/// Value tag marking a live payload.
pub const TAG_VALUE: u8 = 0x01;

/// Value tag marking a deletion. Tombstones carry an empty payload.
pub const TAG_TOMBSTONE: u8 = 0x00;

/// Terminator byte after an escaped user key.
const KEY_TERMINATOR: u8 = 0x00;

/// Escape pair replacing a raw `0x00` inside a user key.
const KEY_ESCAPE: [u8; 2] = [0x00, 0xFF];

/// Byte appended to an entry-row prefix to step past every timestamp of one
/// user key. Valid because a non-negative big-endian `i64` starts with a
/// byte `≤ 0x7F`, while the escaped form of any longer user key continues
/// with `0xFF` after a `0x00`.
const PREFIX_SUCCESSOR: u8 = 0x80;

/// Upper bound on the byte length of a user key or keyspace name (64 KiB).
/// Enforced during decoding to prevent allocation bombs from corrupted rows.
pub const MAX_NAME_LEN: u32 = 64 * 1024;

const TS_SIZE: usize = 8;
const U32_SIZE: usize = 4;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced while encoding or decoding temporal rows.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A region or value tag was not recognised.
    #[error("invalid tag 0x{tag:02X} for {type_name}")]
    InvalidTag {
        /// The tag value that was read.
        tag: u8,
        /// What was being decoded.
        type_name: &'static str,
    },

    /// A decoded user key or keyspace name was not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A metadata record failed magic/version validation.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A row violated the wire format in some other way.
    #[error("malformed row: {0}")]
    Malformed(String),
}

// ------------------------------------------------------------------------------------------------
// User-key escaping
// ------------------------------------------------------------------------------------------------

/// Appends the order-preserving escaped form of `user_key` plus the
/// terminator byte.
fn push_escaped(buf: &mut Vec<u8>, user_key: &str) {
    for &byte in user_key.as_bytes() {
        if byte == 0x00 {
            buf.extend_from_slice(&KEY_ESCAPE);
        } else {
            buf.push(byte);
        }
    }
    buf.push(KEY_TERMINATOR);
}

/// Decodes an escaped user key (including its terminator) from the front of
/// `raw`. Returns the key and the number of bytes consumed.
fn read_escaped(raw: &[u8]) -> Result<(String, usize), EncodingError> {
    let mut bytes = Vec::new();
    let mut offset = 0;

    loop {
        if bytes.len() > MAX_NAME_LEN as usize {
            return Err(EncodingError::Malformed(format!(
                "user key exceeds {MAX_NAME_LEN} bytes"
            )));
        }

        let Some(&byte) = raw.get(offset) else {
            return Err(EncodingError::UnexpectedEof {
                needed: offset + 1,
                available: raw.len(),
            });
        };

        if byte != 0x00 {
            bytes.push(byte);
            offset += 1;
            continue;
        }

        match raw.get(offset + 1) {
            // Escape pair: a literal 0x00 inside the key.
            Some(0xFF) => {
                bytes.push(0x00);
                offset += 2;
            }
            // Anything else after a 0x00 means it was the terminator.
            _ => {
                offset += 1;
                break;
            }
        }
    }

    if bytes.is_empty() {
        return Err(EncodingError::Malformed("empty user key".into()));
    }

    Ok((String::from_utf8(bytes)?, offset))
}

// ------------------------------------------------------------------------------------------------
// Entry rows
// ------------------------------------------------------------------------------------------------

/// Encodes the entry-row key for `(user_key, ts)`.
///
/// `ts` must be non-negative; entry rows of one user key sort by numeric
/// timestamp order.
pub fn entry_key(user_key: &str, ts: i64) -> Vec<u8> {
    debug_assert!(ts >= 0, "entry timestamps are non-negative");
    let mut buf = Vec::with_capacity(1 + user_key.len() + 1 + TS_SIZE);
    buf.push(ENTRY_PREFIX);
    push_escaped(&mut buf, user_key);
    buf.extend_from_slice(&(ts as u64).to_be_bytes());
    buf
}

/// Encodes the common prefix of every entry row of `user_key`
/// (region byte, escaped key, terminator — no timestamp).
pub fn entry_key_prefix(user_key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + user_key.len() + 1);
    buf.push(ENTRY_PREFIX);
    push_escaped(&mut buf, user_key);
    buf
}

/// Returns the least byte-map key strictly greater than every entry row of
/// `user_key` yet strictly less than any other user key's entry rows.
/// Seeking to it lands on the next distinct user key.
pub fn entry_prefix_successor(user_key: &str) -> Vec<u8> {
    let mut buf = entry_key_prefix(user_key);
    buf.push(PREFIX_SUCCESSOR);
    buf
}

/// Decodes an entry-row key back into `(user_key, ts)`.
pub fn decode_entry_key(raw: &[u8]) -> Result<(String, i64), EncodingError> {
    let Some(&region) = raw.first() else {
        return Err(EncodingError::UnexpectedEof {
            needed: 1,
            available: 0,
        });
    };
    if region != ENTRY_PREFIX {
        return Err(EncodingError::InvalidTag {
            tag: region,
            type_name: "entry row region",
        });
    }

    let (user_key, consumed) = read_escaped(&raw[1..])?;
    let ts = read_ts(&raw[1 + consumed..])?;

    if raw.len() != 1 + consumed + TS_SIZE {
        return Err(EncodingError::Malformed(format!(
            "entry row has {} trailing bytes",
            raw.len() - (1 + consumed + TS_SIZE)
        )));
    }

    Ok((user_key, ts))
}

// ------------------------------------------------------------------------------------------------
// Timeline rows
// ------------------------------------------------------------------------------------------------

/// Encodes the timeline-row key for `(ts, user_key)`.
pub fn timeline_key(ts: i64, user_key: &str) -> Vec<u8> {
    debug_assert!(ts >= 0, "timeline timestamps are non-negative");
    let mut buf = Vec::with_capacity(1 + TS_SIZE + user_key.len() + 1);
    buf.push(TIMELINE_PREFIX);
    buf.extend_from_slice(&(ts as u64).to_be_bytes());
    push_escaped(&mut buf, user_key);
    buf
}

/// Encodes the least timeline-row key with timestamp `≥ ts`; used as a scan
/// start and as the inclusive lower bound of timeline truncation.
pub fn timeline_start(ts: i64) -> Vec<u8> {
    debug_assert!(ts >= 0, "timeline timestamps are non-negative");
    let mut buf = Vec::with_capacity(1 + TS_SIZE);
    buf.push(TIMELINE_PREFIX);
    buf.extend_from_slice(&(ts as u64).to_be_bytes());
    buf
}

/// Exclusive upper bound of the whole timeline region.
pub fn timeline_end() -> Vec<u8> {
    vec![TIMELINE_REGION_END]
}

/// Decodes a timeline-row key back into `(ts, user_key)`.
pub fn decode_timeline_key(raw: &[u8]) -> Result<(i64, String), EncodingError> {
    let Some(&region) = raw.first() else {
        return Err(EncodingError::UnexpectedEof {
            needed: 1,
            available: 0,
        });
    };
    if region != TIMELINE_PREFIX {
        return Err(EncodingError::InvalidTag {
            tag: region,
            type_name: "timeline row region",
        });
    }

    let ts = read_ts(&raw[1..])?;
    let (user_key, consumed) = read_escaped(&raw[1 + TS_SIZE..])?;

    if raw.len() != 1 + TS_SIZE + consumed {
        return Err(EncodingError::Malformed(format!(
            "timeline row has {} trailing bytes",
            raw.len() - (1 + TS_SIZE + consumed)
        )));
    }

    Ok((ts, user_key))
}

// ------------------------------------------------------------------------------------------------
// Payload tagging
// ------------------------------------------------------------------------------------------------

/// Encodes a stored value: `Some(bytes)` becomes `[TAG_VALUE] bytes`,
/// `None` (a tombstone) becomes the single byte `[TAG_TOMBSTONE]`.
pub fn encode_payload(payload: Option<&[u8]>) -> Vec<u8> {
    match payload {
        Some(bytes) => {
            let mut buf = Vec::with_capacity(1 + bytes.len());
            buf.push(TAG_VALUE);
            buf.extend_from_slice(bytes);
            buf
        }
        None => vec![TAG_TOMBSTONE],
    }
}

/// Returns the tag byte for a payload without encoding it.
pub fn payload_tag(payload: Option<&[u8]>) -> u8 {
    match payload {
        Some(_) => TAG_VALUE,
        None => TAG_TOMBSTONE,
    }
}

/// Decodes a stored value. `Ok(None)` is a tombstone; `Ok(Some(bytes))` is a
/// live payload (possibly empty).
pub fn decode_payload(raw: &[u8]) -> Result<Option<Vec<u8>>, EncodingError> {
    match raw.split_first() {
        Some((&TAG_VALUE, rest)) => Ok(Some(rest.to_vec())),
        Some((&TAG_TOMBSTONE, rest)) => {
            if rest.is_empty() {
                Ok(None)
            } else {
                Err(EncodingError::Malformed(format!(
                    "tombstone carries {} payload bytes",
                    rest.len()
                )))
            }
        }
        Some((&tag, _)) => Err(EncodingError::InvalidTag {
            tag,
            type_name: "payload",
        }),
        None => Err(EncodingError::UnexpectedEof {
            needed: 1,
            available: 0,
        }),
    }
}

// ------------------------------------------------------------------------------------------------
// Keyspace metadata record
// ------------------------------------------------------------------------------------------------

/// Metadata stored under [`META_KEY`]: the keyspace identity, written once
/// at matrix birth and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceMeta {
    /// Keyspace name (non-empty).
    pub name: String,

    /// Creation timestamp; no entry may carry a smaller timestamp.
    pub creation_timestamp: i64,
}

impl KeyspaceMeta {
    /// Magic constant identifying a metadata record.
    pub const MAGIC: [u8; 4] = *b"TKSM";

    /// Current metadata record version.
    pub const VERSION: u8 = 1;

    /// Serializes the record: `magic(4) version(1) name_len(u32 LE) name
    /// creation_ts(u64 LE)`.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.name.as_bytes();
        let mut buf = Vec::with_capacity(4 + 1 + U32_SIZE + name.len() + TS_SIZE);
        buf.extend_from_slice(&Self::MAGIC);
        buf.push(Self::VERSION);
        buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buf.extend_from_slice(name);
        buf.extend_from_slice(&(self.creation_timestamp as u64).to_le_bytes());
        buf
    }

    /// Deserializes and validates a metadata record.
    pub fn decode(raw: &[u8]) -> Result<Self, EncodingError> {
        let mut offset = 0;

        let magic = take(raw, &mut offset, 4)?;
        if magic != Self::MAGIC {
            return Err(EncodingError::InvalidHeader(format!(
                "bad metadata magic {magic:02X?}"
            )));
        }

        let version = take(raw, &mut offset, 1)?[0];
        if version != Self::VERSION {
            return Err(EncodingError::InvalidHeader(format!(
                "unsupported metadata version {version}"
            )));
        }

        let name_len = u32::from_le_bytes(take(raw, &mut offset, U32_SIZE)?.try_into().unwrap());
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(EncodingError::InvalidHeader(format!(
                "keyspace name length {name_len} out of range"
            )));
        }
        let name = String::from_utf8(take(raw, &mut offset, name_len as usize)?.to_vec())?;

        let creation = u64::from_le_bytes(take(raw, &mut offset, TS_SIZE)?.try_into().unwrap());
        if creation > i64::MAX as u64 {
            return Err(EncodingError::InvalidHeader(format!(
                "creation timestamp {creation} out of range"
            )));
        }

        if offset != raw.len() {
            return Err(EncodingError::Malformed(format!(
                "metadata record has {} trailing bytes",
                raw.len() - offset
            )));
        }

        Ok(Self {
            name,
            creation_timestamp: creation as i64,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Decode helpers
// ------------------------------------------------------------------------------------------------

/// Reads a big-endian, non-negative timestamp.
fn read_ts(raw: &[u8]) -> Result<i64, EncodingError> {
    if raw.len() < TS_SIZE {
        return Err(EncodingError::UnexpectedEof {
            needed: TS_SIZE,
            available: raw.len(),
        });
    }
    let ts = u64::from_be_bytes(raw[..TS_SIZE].try_into().unwrap());
    if ts > i64::MAX as u64 {
        return Err(EncodingError::Malformed(format!(
            "timestamp {ts} out of range"
        )));
    }
    Ok(ts as i64)
}

/// Takes `count` bytes from `raw` at `*offset`, advancing the offset.
fn take<'a>(raw: &'a [u8], offset: &mut usize, count: usize) -> Result<&'a [u8], EncodingError> {
    let end = offset
        .checked_add(count)
        .ok_or(EncodingError::UnexpectedEof {
            needed: count,
            available: raw.len().saturating_sub(*offset),
        })?;
    if end > raw.len() {
        return Err(EncodingError::UnexpectedEof {
            needed: count,
            available: raw.len() - *offset,
        });
    }
    let slice = &raw[*offset..end];
    *offset = end;
    Ok(slice)
}
