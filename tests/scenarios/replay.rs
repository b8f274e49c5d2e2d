//! Replay Tests
//!
//! Replaying the transaction log into an empty store rebuilds the latest
//! completed state per subject, including deletions.

use crate::common::*;
use tripod::{MemoryDocumentStore, TransactionLog, TransactionLogConfig, TransactionStatus};

const R1: &str = "http://talisaspire.com/resources/r1";
const R2: &str = "http://talisaspire.com/resources/r2";

fn completed_end_times(t: &TestTripod) -> Vec<tripod::Timestamp> {
    let mut records = t
        .tripod
        .transaction_log()
        .list(Some(TransactionStatus::Completed))
        .unwrap();
    records.sort_by_key(|r| r.end_time);
    records.iter().filter_map(|r| r.end_time).collect()
}

#[test]
fn test_replay_rebuilds_latest_version() {
    let t = TestTripod::new();
    let v0 = resource(R1, &["acorn:Resource"], &["wibble"]);
    let v1 = resource(R1, &["acorn:Resource"], &["wibble", "another title"]);
    t.save(&Graph::new(), &v0).unwrap();
    t.save(&v0, &v1).unwrap();

    let fresh = MemoryDocumentStore::new();
    let stats = t.tripod.replay_into(&fresh, None, None).unwrap();
    assert_eq!(stats.transactions, 2);
    assert_eq!(stats.written, 1);
    assert_eq!(stats.skipped, 1);

    let bdd = fresh.all_bdds().pop().unwrap();
    assert_eq!(bdd.version, 1);
    assert_eq!(bdd.to_graph(), v1);
}

#[test]
fn test_replay_leaves_deleted_subject_absent() {
    let t = TestTripod::new();
    let v0 = resource(R1, &["acorn:Resource"], &["wibble"]);
    let v1 = resource(R1, &["acorn:Resource"], &["wibble", "another title"]);
    t.save(&Graph::new(), &v0).unwrap();
    t.save(&v0, &v1).unwrap();
    t.save(&v1, &Graph::new()).unwrap();

    let fresh = MemoryDocumentStore::new();
    let stats = t.tripod.replay_into(&fresh, None, None).unwrap();
    assert_eq!(stats.deleted, 1);
    assert_eq!(fresh.bdd_count(), 0);
}

#[test]
fn test_replay_window_excludes_later_delete() {
    let t = TestTripod::new();
    let v0 = resource(R1, &["acorn:Resource"], &["wibble"]);
    let v1 = resource(R1, &["acorn:Resource"], &["wibble", "another title"]);
    t.save(&Graph::new(), &v0).unwrap();
    t.save(&v0, &v1).unwrap();
    let cutoff = *completed_end_times(&t).last().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    t.save(&v1, &Graph::new()).unwrap();

    let fresh = MemoryDocumentStore::new();
    t.tripod.replay_into(&fresh, None, Some(cutoff)).unwrap();
    let bdd = fresh.all_bdds().pop().unwrap();
    assert_eq!(bdd.version, 1);
}

#[test]
fn test_replay_ignores_failed_transactions() {
    let t = TestTripod::new();
    let v0 = resource(R1, &["acorn:Resource"], &["wibble"]);
    t.save(&Graph::new(), &v0).unwrap();
    assert!(t
        .save(&Graph::new(), &resource(R1, &["acorn:Resource"], &["stale"]))
        .is_err());
    t.save(&Graph::new(), &resource(R2, &["acorn:Resource"], &["second"]))
        .unwrap();

    let fresh = MemoryDocumentStore::new();
    let stats = t.tripod.replay_into(&fresh, None, None).unwrap();
    assert_eq!(stats.transactions, 2);
    assert_eq!(fresh.bdd_count(), 2);
}

#[test]
fn test_file_log_replays_after_restart() {
    let dir = temp_dir();
    let mut cfg = config();
    cfg.transaction_log = TransactionLogConfig::File {
        path: "transactions.log".into(),
    };
    let v0 = resource(R1, &["acorn:Resource"], &["wibble"]);
    {
        let tripod = Tripod::open_with_config(dir.path(), cfg).unwrap();
        tripod
            .save_changes(&Graph::new(), &v0, Some(CTX), Some("first"))
            .unwrap();
        tripod.shutdown();
    }

    let tripod = Tripod::open(dir.path()).unwrap();
    assert!(tripod.describe_resource(R1, Some(CTX)).unwrap().is_empty());
    tripod.replay(None, None).unwrap();
    assert_eq!(tripod.describe_resource(R1, Some(CTX)).unwrap(), v0);
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;
    use tripod::DocumentStore;

    /// `None` deletes the resource, `Some(title)` writes it with that title
    fn step() -> impl Strategy<Value = (usize, Option<String>)> {
        (0..3usize, prop::option::weighted(0.8, "[a-z]{1,5}"))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_full_replay_matches_store(steps in prop::collection::vec(step(), 1..12)) {
            let t = TestTripod::new();
            let uris: Vec<String> = (0..3)
                .map(|i| format!("http://talisaspire.com/resources/p{}", i))
                .collect();
            let mut current = vec![Graph::new(), Graph::new(), Graph::new()];

            for (index, title) in steps {
                let next = match title {
                    Some(title) => resource(&uris[index], &["acorn:Resource"], &[title.as_str()]),
                    None => Graph::new(),
                };
                t.save(&current[index], &next).unwrap();
                current[index] = next;
            }

            let fresh = MemoryDocumentStore::new();
            t.tripod.replay_into(&fresh, None, None).unwrap();
            for uri in &uris {
                let id = SubjectId::new(uri.as_str(), CTX);
                prop_assert_eq!(
                    fresh.get_bdd(&id).unwrap(),
                    t.tripod.store().get_bdd(&id).unwrap()
                );
            }
        }
    }
}
