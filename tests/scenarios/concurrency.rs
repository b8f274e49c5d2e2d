//! Write Contention Tests
//!
//! - Overlapping saves: exactly one wins, no lock survives
//! - Disjoint saves proceed in parallel
//! - Inert locks are listed and cleared with an audit record

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tripod::{AuditStatus, DocumentStore, ErrorKind, LockRecord, Timestamp, TransactionId};

const SHARED: &str = "http://talisaspire.com/resources/shared";

#[test]
fn test_overlapping_saves_one_winner() {
    for _ in 0..20 {
        let t = Arc::new(TestTripod::new());
        let barrier = Arc::new(Barrier::new(2));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|title| {
                let t = Arc::clone(&t);
                let barrier = Arc::clone(&barrier);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    let new = resource(SHARED, &["acorn:Resource"], &[title]);
                    barrier.wait();
                    match t.save(&Graph::new(), &new) {
                        Ok(_) => {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => assert!(
                            matches!(e.kind(), ErrorKind::LockConflict | ErrorKind::WriteConflict),
                            "unexpected error: {}",
                            e
                        ),
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(t.version(SHARED), Some(0));
        assert!(t.tripod.locked(None, None).unwrap().is_empty());
    }
}

#[test]
fn test_disjoint_saves_all_succeed() {
    let t = Arc::new(TestTripod::new());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let t = Arc::clone(&t);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let uri = format!("http://talisaspire.com/resources/t{}", i);
                barrier.wait();
                let mut current = Graph::new();
                for n in 0..5 {
                    let next = resource(&uri, &["acorn:Resource"], &[&format!("title {}", n)]);
                    t.save(&current, &next).unwrap();
                    current = next;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..4 {
        assert_eq!(
            t.version(&format!("http://talisaspire.com/resources/t{}", i)),
            Some(4)
        );
    }
    assert_eq!(t.tripod.metrics().total_committed, 20);
}

#[test]
fn test_inert_lock_blocks_until_cleared() {
    let t = TestTripod::new();
    let dead = TransactionId::new();
    t.tripod
        .store()
        .insert_lock_if_absent(LockRecord {
            id: SubjectId::new(SHARED, CTX),
            locked_for_transaction: dead,
            locked_at: Timestamp::now(),
        })
        .unwrap();

    let new = resource(SHARED, &["acorn:Resource"], &["blocked"]);
    let err = t.save(&Graph::new(), &new).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockConflict);

    let locked = t.tripod.locked(None, None).unwrap();
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].locked_for_transaction, dead);

    assert!(t.tripod.remove_inert_locks(dead, "writer crashed").unwrap());
    assert!(!t.tripod.remove_inert_locks(dead, "again").unwrap());

    let audit = t.tripod.audit_records().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, AuditStatus::Completed);
    assert_eq!(audit[0].reason, "writer crashed");

    t.save(&Graph::new(), &new).unwrap();
    assert_eq!(t.version(SHARED), Some(0));
}
