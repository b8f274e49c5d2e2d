//! Composite Regeneration Tests
//!
//! - Views follow joins and rebuild when a joined resource changes
//! - Irrelevant changes regenerate nothing
//! - Root types match whether written as a qname or a full URI
//! - Tables and search documents arrive through the queue

use crate::common::*;
use std::sync::Arc;
use tripod::{DocumentStore, MaterializedKey, RegenerationJob};

const ROOT: &str = "http://talisaspire.com/resources/r1";
const WORK: &str = "http://talisaspire.com/works/w1";

fn root_with_work() -> Graph {
    let mut g = resource(ROOT, &["acorn:Resource"], &["wibble"]);
    g.add_uri(ROOT, "dct:isVersionOf", WORK);
    g
}

fn work(types: &[&str]) -> Graph {
    resource(WORK, types, &["The Work"])
}

fn merged(a: Graph, b: Graph) -> Graph {
    let mut g = a;
    g.merge(b);
    g
}

fn view_key() -> MaterializedKey {
    MaterializedKey::new(&SubjectId::new(ROOT, CTX), "v_resource_full")
}

// ============================================================================
// Views
// ============================================================================

#[test]
fn test_joined_type_change_regenerates_root_view() {
    let t = TestTripod::new();
    let initial = merged(root_with_work(), work(&["acorn:Work"]));
    t.save(&Graph::new(), &initial).unwrap();

    let before = t
        .tripod
        .store()
        .get_materialized(Operation::Views, &view_key())
        .unwrap()
        .unwrap();
    let work_id = SubjectId::new(WORK, CTX);
    assert!(before.impact_index().unwrap().contains(&work_id));

    let changed = merged(root_with_work(), work(&["acorn:Work", "bibo:Book"]));
    let outcome = t.save(&initial, &changed).unwrap();
    assert!(outcome.regeneration_errors.is_empty());

    let after = t
        .tripod
        .store()
        .get_materialized(Operation::Views, &view_key())
        .unwrap()
        .unwrap();
    assert!(after.impact_index().unwrap().contains(&work_id));

    let work_node = after
        .value
        .nodes()
        .unwrap()
        .iter()
        .find(|n| n.id == work_id)
        .unwrap();
    assert_eq!(
        work_node.predicates[RDF_TYPE],
        vec![Object::uri("acorn:Work"), Object::uri("bibo:Book")]
    );
    // Only rdf:type is included at the join level
    assert!(!work_node.predicates.contains_key("dct:title"));
}

#[test]
fn test_root_delete_removes_view() {
    let t = TestTripod::new();
    let initial = merged(root_with_work(), work(&["acorn:Work"]));
    t.save(&Graph::new(), &initial).unwrap();

    t.save(&root_with_work(), &Graph::new()).unwrap();
    assert!(t
        .tripod
        .store()
        .get_materialized(Operation::Views, &view_key())
        .unwrap()
        .is_none());
}

#[test]
fn test_irrelevant_change_impacts_nothing() {
    let jobs = Arc::new(MemoryJobQueue::new());
    let t = TestTripod::with_queue(jobs.clone());
    let initial = resource(ROOT, &["acorn:Resource"], &["wibble"]);
    t.save(&Graph::new(), &initial).unwrap();
    jobs.drain();

    let mut changed = initial.clone();
    changed.add_literal(ROOT, "foaf:nick", "unused");
    t.save(&initial, &changed).unwrap();

    let queued: Vec<RegenerationJob> = jobs.drain().into_iter().map(|(_, job)| job).collect();
    assert_eq!(queued.len(), 1);
    let impacted = t
        .tripod
        .analyzer()
        .impacted_subjects(&queued[0].changed_subjects, &Operation::ALL)
        .unwrap();
    assert!(impacted.is_empty());
}

#[test]
fn test_full_uri_type_matches_qname_specification() {
    let t = TestTripod::new();
    let expanded = "http://talisaspire.com/resources/expanded";
    t.save(
        &Graph::new(),
        &resource(expanded, &["http://talisaspire.com/schema#Resource"], &["wibble"]),
    )
    .unwrap();

    let key = MaterializedKey::new(&SubjectId::new(expanded, CTX), "v_resource_full");
    assert!(t
        .tripod
        .store()
        .get_materialized(Operation::Views, &key)
        .unwrap()
        .is_some());

    t.tripod.drain_jobs();
    assert_eq!(
        t.tripod
            .store()
            .find_by_root(Operation::Tables, &SubjectId::new(expanded, CTX))
            .unwrap()
            .len(),
        1
    );

    t.save(
        &Graph::new(),
        &resource(ROOT, &["acorn:Resource"], &["wobble"]),
    )
    .unwrap();
    assert_eq!(
        t.tripod.regenerate_all("v_resource_full", Some(CTX)).unwrap(),
        2
    );
}

// ============================================================================
// Tables and search
// ============================================================================

#[test]
fn test_tables_and_search_through_workers() {
    let t = TestTripod::new();
    t.save(
        &Graph::new(),
        &resource(ROOT, &["acorn:Resource"], &["Wibble Title"]),
    )
    .unwrap();
    t.tripod.drain_jobs();

    let row = t
        .tripod
        .store()
        .get_materialized(
            Operation::Tables,
            &MaterializedKey::new(&SubjectId::new(ROOT, CTX), "t_resource"),
        )
        .unwrap()
        .unwrap();
    assert_eq!(
        row.value.fields().unwrap()["title"],
        serde_json::json!("Wibble Title")
    );

    let doc = t
        .tripod
        .get_search_document("s_resource", ROOT, Some(CTX))
        .unwrap()
        .unwrap();
    assert_eq!(
        doc.value.fields().unwrap()[tripod::SEARCH_TERMS_FIELD],
        serde_json::json!(["wibble title"])
    );
}

#[test]
fn test_queued_jobs_run_later() {
    let jobs = Arc::new(MemoryJobQueue::new());
    let t = TestTripod::with_queue(jobs.clone());
    t.save(
        &Graph::new(),
        &resource(ROOT, &["acorn:Resource"], &["wibble"]),
    )
    .unwrap();

    assert_eq!(t.tripod.store().find_by_root(Operation::Tables, &SubjectId::new(ROOT, CTX)).unwrap().len(), 0);
    for (_, job) in jobs.drain() {
        assert!(t.tripod.run_job(&job).unwrap().is_empty());
        // Idempotent
        assert!(t.tripod.run_job(&job).unwrap().is_empty());
    }
    assert_eq!(t.tripod.store().find_by_root(Operation::Tables, &SubjectId::new(ROOT, CTX)).unwrap().len(), 1);
}

#[test]
fn test_batch_read_regenerates_only_missing() {
    let jobs = Arc::new(MemoryJobQueue::new());
    let t = TestTripod::with_queue(jobs.clone());
    let other = "http://talisaspire.com/resources/r2";
    t.save(
        &Graph::new(),
        &merged(
            resource(ROOT, &["acorn:Resource"], &["one"]),
            resource(other, &["acorn:Resource"], &["two"]),
        ),
    )
    .unwrap();

    let first = t.tripod.get_table_row("t_resource", ROOT, Some(CTX)).unwrap().unwrap();
    let docs = t
        .tripod
        .get_composites("t_resource", &[ROOT, other], Some(CTX))
        .unwrap();
    assert_eq!(docs.len(), 2);
    let again = docs.iter().find(|d| d.key == first.key).unwrap();
    assert_eq!(again.updated_at, first.updated_at);
}
