//! Corruption detection tests for the file-backed transaction log
//!
//! These tests verify that:
//! - CRC32 detects bit flips in the middle of the file
//! - A damaged frame length fails the open without truncating anything
//! - A torn trailing frame is dropped and the file truncated
//! - Appends after a truncated tail land on a clean frame boundary

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::TempDir;
use tripod_core::{Changeset, ErrorKind, Timestamp, TransactionId};
use tripod_durability::{FileTransactionLog, TransactionLog, TransactionRecord, FRAME_HEADER_SIZE};

fn pending(start: u64) -> TransactionRecord {
    TransactionRecord::pending(
        TransactionId::new(),
        "http://ctx",
        Some("corruption".to_string()),
        Changeset::default(),
        Vec::new(),
        Timestamp::from_secs(start),
    )
}

fn flip_byte(path: &std::path::Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    let mut buf = [0u8; 1];
    file.read_exact(&mut buf).unwrap();
    buf[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&buf).unwrap();
}

#[test]
fn test_crc_detects_bit_flip_before_tail() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("txn.log");

    {
        let log = FileTransactionLog::open(&path).unwrap();
        log.append(&pending(1)).unwrap();
        log.append(&pending(2)).unwrap();
    }

    flip_byte(&path, (FRAME_HEADER_SIZE + 4) as u64);

    let err = FileTransactionLog::open(&path).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[test]
fn test_damaged_length_fails_without_truncating() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("txn.log");

    {
        let log = FileTransactionLog::open(&path).unwrap();
        for start in 1..=3 {
            log.append(&pending(start)).unwrap();
        }
    }
    let len_before = std::fs::metadata(&path).unwrap().len();

    // High byte of the first frame's length
    {
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(3)).unwrap();
        file.write_all(&[0x7f]).unwrap();
    }

    let err = FileTransactionLog::open(&path).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
}

#[test]
fn test_damaged_length_in_last_frame_is_not_a_torn_tail() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("txn.log");

    let first_len = {
        let log = FileTransactionLog::open(&path).unwrap();
        log.append(&pending(1)).unwrap();
        let first_len = std::fs::metadata(&path).unwrap().len();
        log.append(&pending(2)).unwrap();
        first_len
    };
    let len_before = std::fs::metadata(&path).unwrap().len();

    flip_byte(&path, first_len + 1);

    let err = FileTransactionLog::open(&path).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
}

#[test]
fn test_torn_tail_is_truncated() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("txn.log");

    let first = pending(1);
    let good_len = {
        let log = FileTransactionLog::open(&path).unwrap();
        log.append(&first).unwrap();
        std::fs::metadata(&path).unwrap().len()
    };

    // Half-written second frame
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
    }

    let log = FileTransactionLog::open(&path).unwrap();
    assert_eq!(log.len(), 1);
    assert!(log.get(&first.id).unwrap().is_some());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);

    let second = pending(2);
    log.append(&second).unwrap();
    drop(log);

    let reopened = FileTransactionLog::open(&path).unwrap();
    assert_eq!(reopened.len(), 2);
    assert!(reopened.get(&second.id).unwrap().is_some());
}

#[test]
fn test_empty_file_opens_clean() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("txn.log");

    let log = FileTransactionLog::open(&path).unwrap();
    assert!(log.is_empty());
    assert!(path.exists());
}
