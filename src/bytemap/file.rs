//! Persistent byte-map adapter.
//!
//! [`FileByteMap`] stores the map as an append-only log of committed
//! batches and keeps the materialized image in a [`MemoryByteMap`]. Every
//! `apply` appends one CRC-protected record and fsyncs before the batch
//! becomes visible, so a crash never exposes a half-applied commit.
//!
//! # On-disk layout
//!
//! ```text
//! [MAGIC(4)][VERSION_LE(4)][HEADER_CRC32_LE(4)]
//! [REC_LEN_LE][REC_BYTES][REC_CRC32_LE]
//! [REC_LEN_LE][REC_BYTES][REC_CRC32_LE]
//! ...
//! ```
//!
//! Each record is one serialized [`Batch`]; its CRC32 is computed over
//! `len || record_bytes`.
//!
//! # Recovery
//!
//! On open the file is memory-mapped and replayed record by record. A
//! truncated or checksum-failing **tail** is a torn write: replay stops
//! there, the tail is cut off, and opening succeeds with a warning. A
//! record that passes its checksum but does not decode is real corruption
//! and fails the open.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use tracing::{debug, info, warn};

use crate::encoding::EncodingError;

use super::{Batch, BatchOp, ByteMapError, MemoryByteMap, SortedByteMap, apply_op};

const U32_SIZE: usize = 4;
const HEADER_DISK_SIZE: usize = 4 + U32_SIZE + U32_SIZE;

const OP_PUT: u8 = 0x00;
const OP_REMOVE: u8 = 0x01;
const OP_REMOVE_RANGE: u8 = 0x02;

/// A [`SortedByteMap`] backed by an append-only batch log.
#[derive(Debug)]
pub struct FileByteMap {
    /// Log file handle; appends are serialized through this lock.
    file: Mutex<File>,

    /// Path of the log file.
    path: PathBuf,

    /// Materialized image serving all reads.
    image: MemoryByteMap,
}

impl FileByteMap {
    /// Magic constant identifying a byte-map log file.
    pub const MAGIC: [u8; 4] = *b"TBML";

    /// Current log format version.
    pub const VERSION: u32 = 1;

    /// Maximum size of a single batch record (64 MiB).
    pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

    /// Opens (or creates) a byte-map log at `path` and replays it into
    /// memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ByteMapError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        let image = if len == 0 {
            Self::write_header(&mut file)?;
            info!(path = %path.display(), "created byte-map log");
            BTreeMap::new()
        } else {
            Self::replay(&mut file, &path)?
        };

        Ok(Self {
            file: Mutex::new(file),
            path,
            image: MemoryByteMap::from_image(image),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(file: &mut File) -> Result<(), ByteMapError> {
        let mut header = Vec::with_capacity(HEADER_DISK_SIZE);
        header.extend_from_slice(&Self::MAGIC);
        header.extend_from_slice(&Self::VERSION.to_le_bytes());

        let mut hasher = Crc32::new();
        hasher.update(&header);
        header.extend_from_slice(&hasher.finalize().to_le_bytes());

        file.write_all(&header)?;
        file.sync_all()?;
        Ok(())
    }

    /// Replays the whole log, truncating any torn tail.
    fn replay(file: &mut File, path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, ByteMapError> {
        let mmap = unsafe { Mmap::map(&*file)? };
        let data: &[u8] = &mmap;

        if data.len() < HEADER_DISK_SIZE {
            return Err(ByteMapError::InvalidHeader("truncated header".into()));
        }
        if data[..4] != Self::MAGIC {
            return Err(ByteMapError::InvalidHeader(format!(
                "bad magic {:02X?}",
                &data[..4]
            )));
        }
        let version = u32::from_le_bytes(data[4..8].try_into().unwrap());
        if version != Self::VERSION {
            return Err(ByteMapError::InvalidHeader(format!(
                "unsupported version {version}"
            )));
        }
        let mut hasher = Crc32::new();
        hasher.update(&data[..8]);
        let stored = u32::from_le_bytes(data[8..HEADER_DISK_SIZE].try_into().unwrap());
        if hasher.finalize() != stored {
            return Err(ByteMapError::InvalidHeader("header checksum mismatch".into()));
        }

        let mut image = BTreeMap::new();
        let mut offset = HEADER_DISK_SIZE;
        let mut valid_end = offset;
        let mut batches = 0usize;

        while offset < data.len() {
            let remaining = data.len() - offset;
            if remaining < U32_SIZE {
                warn!(offset, "torn record length at log tail");
                break;
            }
            let rec_len =
                u32::from_le_bytes(data[offset..offset + U32_SIZE].try_into().unwrap()) as usize;
            if rec_len > Self::MAX_RECORD_SIZE {
                warn!(offset, rec_len, "implausible record length at log tail");
                break;
            }
            let total = U32_SIZE + rec_len + U32_SIZE;
            if remaining < total {
                warn!(offset, "torn record body at log tail");
                break;
            }

            let mut hasher = Crc32::new();
            hasher.update(&data[offset..offset + U32_SIZE + rec_len]);
            let stored = u32::from_le_bytes(
                data[offset + U32_SIZE + rec_len..offset + total]
                    .try_into()
                    .unwrap(),
            );
            if hasher.finalize() != stored {
                warn!(offset, "record checksum mismatch at log tail");
                break;
            }

            // Checksum-valid but undecodable bytes are corruption, not a
            // torn write; fail the open.
            let batch = decode_batch(&data[offset + U32_SIZE..offset + U32_SIZE + rec_len])?;
            for op in batch.ops() {
                apply_op(&mut image, op);
            }

            batches += 1;
            offset += total;
            valid_end = offset;
        }

        if valid_end < data.len() {
            let dropped = data.len() - valid_end;
            warn!(dropped, "truncating torn log tail");
            drop(mmap);
            file.set_len(valid_end as u64)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), batches, rows = image.len(), "byte-map log replayed");
        Ok(image)
    }
}

impl SortedByteMap for FileByteMap {
    type Snapshot = <MemoryByteMap as SortedByteMap>::Snapshot;

    fn snapshot(&self) -> Self::Snapshot {
        self.image.snapshot()
    }

    fn apply(&self, batch: Batch) -> Result<(), ByteMapError> {
        let record = encode_batch(&batch);
        if record.len() > Self::MAX_RECORD_SIZE {
            return Err(ByteMapError::RecordTooLarge(record.len()));
        }

        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| ByteMapError::Internal("file lock poisoned".into()))?;

            let len_le = (record.len() as u32).to_le_bytes();
            let mut hasher = Crc32::new();
            hasher.update(&len_le);
            hasher.update(&record);
            let crc = hasher.finalize().to_le_bytes();

            // Log first; the batch becomes visible only after it is durable.
            file.seek(SeekFrom::End(0))?;
            file.write_all(&len_le)?;
            file.write_all(&record)?;
            file.write_all(&crc)?;
            file.sync_all()?;
        }

        self.image.apply(batch)
    }
}

// ------------------------------------------------------------------------------------------------
// Batch record codec
// ------------------------------------------------------------------------------------------------

fn encode_batch(batch: &Batch) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(batch.len() as u32).to_le_bytes());
    for op in batch.ops() {
        match op {
            BatchOp::Put { key, value } => {
                buf.push(OP_PUT);
                push_bytes(&mut buf, key);
                push_bytes(&mut buf, value);
            }
            BatchOp::Remove { key } => {
                buf.push(OP_REMOVE);
                push_bytes(&mut buf, key);
            }
            BatchOp::RemoveRange { from, to } => {
                buf.push(OP_REMOVE_RANGE);
                push_bytes(&mut buf, from);
                push_bytes(&mut buf, to);
            }
        }
    }
    buf
}

fn decode_batch(raw: &[u8]) -> Result<Batch, EncodingError> {
    let mut offset = 0;
    let count = read_u32(raw, &mut offset)? as usize;

    // Every op costs at least a tag byte plus one length prefix.
    if count > raw.len() {
        return Err(EncodingError::Malformed(format!(
            "batch op count {count} exceeds record size"
        )));
    }

    let mut batch = Batch::new();
    for _ in 0..count {
        let tag = read_u8(raw, &mut offset)?;
        match tag {
            OP_PUT => {
                let key = read_bytes(raw, &mut offset)?;
                let value = read_bytes(raw, &mut offset)?;
                batch.put(key, value);
            }
            OP_REMOVE => {
                let key = read_bytes(raw, &mut offset)?;
                batch.remove(key);
            }
            OP_REMOVE_RANGE => {
                let from = read_bytes(raw, &mut offset)?;
                let to = read_bytes(raw, &mut offset)?;
                batch.remove_range(from, to);
            }
            tag => {
                return Err(EncodingError::InvalidTag {
                    tag,
                    type_name: "batch op",
                });
            }
        }
    }

    if offset != raw.len() {
        return Err(EncodingError::Malformed(format!(
            "batch record has {} trailing bytes",
            raw.len() - offset
        )));
    }

    Ok(batch)
}

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_u8(raw: &[u8], offset: &mut usize) -> Result<u8, EncodingError> {
    let Some(&byte) = raw.get(*offset) else {
        return Err(EncodingError::UnexpectedEof {
            needed: 1,
            available: 0,
        });
    };
    *offset += 1;
    Ok(byte)
}

fn read_u32(raw: &[u8], offset: &mut usize) -> Result<u32, EncodingError> {
    let end = *offset + U32_SIZE;
    if end > raw.len() {
        return Err(EncodingError::UnexpectedEof {
            needed: U32_SIZE,
            available: raw.len() - *offset,
        });
    }
    let value = u32::from_le_bytes(raw[*offset..end].try_into().unwrap());
    *offset = end;
    Ok(value)
}

fn read_bytes(raw: &[u8], offset: &mut usize) -> Result<Vec<u8>, EncodingError> {
    let len = read_u32(raw, offset)? as usize;
    let end = offset.checked_add(len).ok_or(EncodingError::UnexpectedEof {
        needed: len,
        available: raw.len().saturating_sub(*offset),
    })?;
    if end > raw.len() {
        return Err(EncodingError::UnexpectedEof {
            needed: len,
            available: raw.len() - *offset,
        });
    }
    let bytes = raw[*offset..end].to_vec();
    *offset = end;
    Ok(bytes)
}
