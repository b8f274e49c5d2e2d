//! Save Pipeline Tests
//!
//! - Version sequence of one subject
//! - Multi-valued predicates survive updates
//! - Empty diffs are no-ops
//! - Cardinality and stale-snapshot rejection

use crate::common::*;
use proptest::prelude::*;
use tripod::{ErrorKind, TransactionLog, TransactionStatus};

const R1: &str = "http://talisaspire.com/resources/r1";

// ============================================================================
// Version sequence
// ============================================================================

#[test]
fn test_create_update_delete_sequence() {
    let t = TestTripod::new();

    let v0 = resource(R1, &["acorn:Resource"], &["wibble"]);
    let outcome = t.save(&Graph::new(), &v0).unwrap();
    assert_eq!(t.version(R1), Some(0));
    assert_eq!(
        outcome.versions.get(&SubjectId::new(R1, CTX)),
        Some(&Some(0))
    );

    let v1 = resource(R1, &["acorn:Resource"], &["wibble", "another title"]);
    t.save(&v0, &v1).unwrap();
    assert_eq!(t.version(R1), Some(1));
    assert_eq!(t.describe(R1), v1);

    let outcome = t.save(&v1, &Graph::new()).unwrap();
    assert_eq!(t.version(R1), None);
    assert!(t.describe(R1).is_empty());
    assert!(outcome
        .changed_subjects
        .is_deleted(&SubjectId::new(R1, CTX)));
}

#[test]
fn test_identical_graphs_save_nothing() {
    let t = TestTripod::new();
    let g = resource(R1, &["acorn:Resource"], &["wibble"]);
    t.save(&Graph::new(), &g).unwrap();

    let before = t.tripod.transaction_log().list(None).unwrap().len();
    let outcome = t.save(&g, &g).unwrap();
    assert!(outcome.is_noop());
    assert_eq!(t.tripod.transaction_log().list(None).unwrap().len(), before);
}

#[test]
fn test_subject_without_type_is_stored() {
    let t = TestTripod::new();
    t.save(&Graph::new(), &resource(R1, &[], &["untyped"])).unwrap();
    assert_eq!(t.version(R1), Some(0));
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_stale_old_graph_is_a_write_conflict() {
    let t = TestTripod::new();
    let v0 = resource(R1, &["acorn:Resource"], &["wibble"]);
    t.save(&Graph::new(), &v0).unwrap();

    let err = t
        .save(&Graph::new(), &resource(R1, &["acorn:Resource"], &["other"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteConflict);
    assert!(err.is_retryable());
    assert_eq!(t.version(R1), Some(0));
    assert!(t.tripod.locked(None, None).unwrap().is_empty());

    let failed = t
        .tripod
        .transaction_log()
        .list(Some(TransactionStatus::Failed))
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_ref().unwrap().reason.contains(R1));
}

#[test]
fn test_cardinality_violation_rejected() {
    let mut cfg = config();
    cfg.cardinality.insert("dct:title".into(), 1);
    let tripod = Tripod::in_memory(cfg).unwrap();

    let err = tripod
        .save_changes(
            &Graph::new(),
            &resource(R1, &["acorn:Resource"], &["one", "two"]),
            Some(CTX),
            None,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CardinalityViolation);
    assert!(!err.is_retryable());
    assert!(tripod.describe_resource(R1, Some(CTX)).unwrap().is_empty());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_version_counts_mutations(titles in prop::collection::vec("[a-z]{1,6}", 1..8)) {
        let t = TestTripod::new();
        let mut current = Graph::new();
        let mut mutations = 0u64;
        let mut last_version = None;

        for title in &titles {
            let next = resource(R1, &["acorn:Resource"], &[title.as_str()]);
            let outcome = t.save(&current, &next).unwrap();
            if !outcome.is_noop() {
                mutations += 1;
            }
            current = next;

            let version = t.version(R1);
            prop_assert_eq!(version, Some(mutations - 1));
            if let (Some(prev), Some(now)) = (last_version, version) {
                prop_assert!(now >= prev);
            }
            last_version = version;
        }
    }
}
