//! File-backed transaction log
//!
//! Records are appended to a single file as checksummed frames:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────┬──────────────────────────────┐
//! │ len: u32 LE  │ crc32: u32 LE│ header crc: u32  │ payload (MessagePack, named) │
//! └──────────────┴──────────────┴──────────────────┴──────────────────────────────┘
//! ```
//!
//! The header crc covers the first eight bytes, so a damaged length is
//! caught before it is trusted.
//!
//! A status update appends a superseding frame for the same id; when the
//! file is opened the last frame per id wins.
//!
//! On open, a torn trailing frame (crash mid-append) is dropped and the file
//! truncated back to the last complete frame. A header or checksum mismatch
//! anywhere before the tail is corruption and fails the open.

use crate::log::{check_update, sort_records, TransactionLog, APPEND_FAILED};
use crate::record::{TransactionRecord, TransactionStatus};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tripod_core::{Error, Result, TransactionId};

/// Frame header: length, payload checksum, header checksum
pub const FRAME_HEADER_SIZE: usize = 12;

/// Encode one record as a frame
pub fn encode_frame(record: &TransactionRecord) -> Result<Vec<u8>> {
    let payload =
        rmp_serde::to_vec_named(record).map_err(|e| Error::Serialization(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        Error::Serialization(format!(
            "transaction record of {} bytes exceeds the frame limit",
            payload.len()
        ))
    })?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.write_u32::<LittleEndian>(len)?;
    frame.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    let header_crc = crc32fast::hash(&frame);
    frame.write_u32::<LittleEndian>(header_crc)?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Outcome of scanning a log file
#[derive(Debug)]
pub struct ScanResult {
    /// Decoded records in file order
    pub records: Vec<TransactionRecord>,
    /// Byte offset where the last complete frame ends
    pub valid_end: usize,
    /// True if bytes after `valid_end` were discarded
    pub torn_tail: bool,
}

/// Decode every frame in `bytes`
pub fn scan_frames(bytes: &[u8]) -> Result<ScanResult> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let remaining = &bytes[offset..];
        if remaining.len() < FRAME_HEADER_SIZE {
            break;
        }
        let stored_header_crc = LittleEndian::read_u32(&remaining[8..12]);
        let computed_header_crc = crc32fast::hash(&remaining[0..8]);
        if stored_header_crc != computed_header_crc {
            // A torn append leaves a prefix of the frame, never a wrong header
            return Err(Error::storage(format!(
                "transaction log header mismatch at offset {}: expected {:08x}, computed {:08x}",
                offset, stored_header_crc, computed_header_crc
            )));
        }

        let len = LittleEndian::read_u32(&remaining[0..4]) as usize;
        let stored_crc = LittleEndian::read_u32(&remaining[4..8]);
        let frame_end = FRAME_HEADER_SIZE + len;
        if remaining.len() < frame_end {
            break;
        }

        let payload = &remaining[FRAME_HEADER_SIZE..frame_end];
        let computed_crc = crc32fast::hash(payload);
        if computed_crc != stored_crc {
            if offset + frame_end == bytes.len() {
                // Last frame: treat as a torn write
                break;
            }
            return Err(Error::storage(format!(
                "transaction log checksum mismatch at offset {}: expected {:08x}, computed {:08x}",
                offset, stored_crc, computed_crc
            )));
        }

        let record: TransactionRecord =
            rmp_serde::from_slice(payload).map_err(|e| Error::Serialization(e.to_string()))?;
        records.push(record);
        offset += frame_end;
    }

    Ok(ScanResult {
        records,
        valid_end: offset,
        torn_tail: offset < bytes.len(),
    })
}

struct Inner {
    file: File,
    records: HashMap<TransactionId, TransactionRecord>,
}

/// Transaction log persisted to an append-only file
pub struct FileTransactionLog {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl FileTransactionLog {
    /// Open (or create) the log at `path`, rebuilding the index from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let scan = scan_frames(&bytes)?;
        if scan.torn_tail {
            warn!(
                target: "tripod::log",
                path = %path.display(),
                valid_end = scan.valid_end,
                discarded = bytes.len() - scan.valid_end,
                "Truncating torn transaction log tail"
            );
            file.set_len(scan.valid_end as u64)?;
        }

        let mut records = HashMap::new();
        for record in scan.records {
            records.insert(record.id, record);
        }
        debug!(target: "tripod::log", path = %path.display(), records = records.len(), "Transaction log opened");

        Ok(FileTransactionLog {
            path,
            inner: RwLock::new(Inner { file, records }),
        })
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct transactions
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    fn write_frame(inner: &mut Inner, record: &TransactionRecord) -> Result<()> {
        let frame = encode_frame(record)?;
        inner.file.write_all(&frame)?;
        inner.file.flush()?;
        inner.file.sync_data()?;
        Ok(())
    }
}

impl TransactionLog for FileTransactionLog {
    fn append(&self, record: &TransactionRecord) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.id) {
            return Err(Error::storage(format!(
                "{}: duplicate id {}",
                APPEND_FAILED, record.id
            )));
        }
        Self::write_frame(&mut inner, record)
            .map_err(|e| Error::storage(format!("{}: {}", APPEND_FAILED, e)))?;
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    fn update(&self, record: &TransactionRecord) -> Result<()> {
        let mut inner = self.inner.write();
        check_update(inner.records.get(&record.id), record)?;
        Self::write_frame(&mut inner, record)?;
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    fn get(&self, id: &TransactionId) -> Result<Option<TransactionRecord>> {
        Ok(self.inner.read().records.get(id).cloned())
    }

    fn list(&self, status: Option<TransactionStatus>) -> Result<Vec<TransactionRecord>> {
        let mut records: Vec<TransactionRecord> = self
            .inner
            .read()
            .records
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        sort_records(&mut records);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripod_core::{Changeset, ErrorKind, Timestamp};

    fn pending() -> TransactionRecord {
        TransactionRecord::pending(
            TransactionId::new(),
            "http://ctx",
            Some("frame test".to_string()),
            Changeset::default(),
            Vec::new(),
            Timestamp::from_secs(1),
        )
    }

    #[test]
    fn test_scan_roundtrips_frames() {
        let a = pending();
        let b = pending();
        let mut bytes = encode_frame(&a).unwrap();
        bytes.extend(encode_frame(&b).unwrap());

        let scan = scan_frames(&bytes).unwrap();
        assert_eq!(scan.records, vec![a, b]);
        assert!(!scan.torn_tail);
        assert_eq!(scan.valid_end, bytes.len());
    }

    #[test]
    fn test_scan_drops_partial_tail() {
        let a = pending();
        let mut bytes = encode_frame(&a).unwrap();
        let good = bytes.len();
        let b = encode_frame(&pending()).unwrap();
        bytes.extend_from_slice(&b[..b.len() / 2]);

        let scan = scan_frames(&bytes).unwrap();
        assert_eq!(scan.records.len(), 1);
        assert!(scan.torn_tail);
        assert_eq!(scan.valid_end, good);
    }

    #[test]
    fn test_scan_rejects_mid_file_corruption() {
        let mut bytes = encode_frame(&pending()).unwrap();
        bytes.extend(encode_frame(&pending()).unwrap());
        bytes[FRAME_HEADER_SIZE + 2] ^= 0xff;

        let err = scan_frames(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_scan_rejects_damaged_length() {
        let mut bytes = encode_frame(&pending()).unwrap();
        bytes.extend(encode_frame(&pending()).unwrap());
        bytes[3] = 0x7f;

        let err = scan_frames(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("header mismatch"));
    }

    #[test]
    fn test_scan_drops_partial_header() {
        let mut bytes = encode_frame(&pending()).unwrap();
        let good = bytes.len();
        let b = encode_frame(&pending()).unwrap();
        bytes.extend_from_slice(&b[..FRAME_HEADER_SIZE - 1]);

        let scan = scan_frames(&bytes).unwrap();
        assert_eq!(scan.records.len(), 1);
        assert!(scan.torn_tail);
        assert_eq!(scan.valid_end, good);
    }

    #[test]
    fn test_open_rebuilds_last_record_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txn.log");

        let mut record = pending();
        {
            let log = FileTransactionLog::open(&path).unwrap();
            log.append(&record).unwrap();
            record.complete(Vec::new(), Timestamp::from_secs(2));
            log.update(&record).unwrap();
        }

        let log = FileTransactionLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        let stored = log.get(&record.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert_eq!(stored.end_time, Some(Timestamp::from_secs(2)));
    }
}
