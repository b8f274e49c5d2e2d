//! Bounded description documents
//!
//! One `Bdd` exists per (resource, context). It aggregates every triple
//! about the subject as a predicate → values map, and carries a version
//! that increases by exactly one on every committed mutation.

use crate::changeset::SubjectChanges;
use crate::graph::Graph;
use crate::timestamp::Timestamp;
use crate::types::{Object, SubjectId, RDF_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Stored description of one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bdd {
    /// Subject this document describes
    pub id: SubjectId,
    /// Predicate → values, values in insertion order without duplicates
    pub predicates: BTreeMap<String, Vec<Object>>,
    /// Starts at 0 on first write
    pub version: u64,
    /// Time of the first committed write
    pub created_at: Timestamp,
    /// Time of the latest committed write
    pub updated_at: Timestamp,
}

impl Bdd {
    /// Build the next revision of a subject's document.
    ///
    /// `previous` is the stored document, if any. The result has the
    /// changes merged in, `version` bumped (or 0 for a new document), and
    /// timestamps stamped with `now`. The result may have no predicates, in
    /// which case the caller deletes the document instead of storing it.
    pub fn next_revision(
        id: SubjectId,
        previous: Option<&Bdd>,
        changes: &SubjectChanges,
        now: Timestamp,
    ) -> Bdd {
        let mut bdd = match previous {
            Some(previous) => Bdd {
                version: previous.version + 1,
                updated_at: now,
                ..previous.clone()
            },
            None => Bdd {
                id,
                predicates: BTreeMap::new(),
                version: 0,
                created_at: now,
                updated_at: now,
            },
        };
        bdd.apply(changes);
        bdd
    }

    /// Merge removals then additions into the predicate map
    pub fn apply(&mut self, changes: &SubjectChanges) {
        for triple in &changes.removals {
            if let Some(values) = self.predicates.get_mut(&triple.predicate) {
                values.retain(|v| v != &triple.object);
                if values.is_empty() {
                    self.predicates.remove(&triple.predicate);
                }
            }
        }
        for triple in &changes.additions {
            let values = self.predicates.entry(triple.predicate.clone()).or_default();
            if !values.contains(&triple.object) {
                values.push(triple.object.clone());
            }
        }
    }

    /// True when the document holds no triples
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Values of a predicate, empty if absent
    pub fn values(&self, predicate: &str) -> &[Object] {
        self.predicates.get(predicate).map_or(&[], Vec::as_slice)
    }

    /// URI values of `rdf:type`
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.values(RDF_TYPE).iter().filter_map(Object::as_uri)
    }

    /// True if the subject has any of the given types
    pub fn has_any_type(&self, types: &[String]) -> bool {
        self.types().any(|t| types.iter().any(|wanted| wanted == t))
    }

    /// Predicates present on this document
    pub fn predicate_names(&self) -> BTreeSet<String> {
        self.predicates.keys().cloned().collect()
    }

    /// The document's triples as a graph
    pub fn to_graph(&self) -> Graph {
        let mut graph = Graph::new();
        graph.add_predicates(&self.id.resource, &self.predicates);
        graph
    }
}

/// Before- or after-image of a subject inside a transaction record.
///
/// `document` is `None` when the subject did not exist (pre-image) or was
/// deleted (post-image); only the id is kept in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Subject the snapshot belongs to
    pub id: SubjectId,
    /// Document contents, absent for "did not exist" / "deleted"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Bdd>,
}

impl Snapshot {
    /// Snapshot of an existing document
    pub fn of(bdd: Bdd) -> Self {
        Snapshot {
            id: bdd.id.clone(),
            document: Some(bdd),
        }
    }

    /// Minimal snapshot carrying only the id
    pub fn absent(id: SubjectId) -> Self {
        Snapshot { id, document: None }
    }

    /// Build from an optional stored document
    pub fn from_option(id: SubjectId, bdd: Option<Bdd>) -> Self {
        Snapshot { id, document: bdd }
    }

    /// Version of the captured document, if it existed
    pub fn version(&self) -> Option<u64> {
        self.document.as_ref().map(|d| d.version)
    }

    /// True when only the id is present
    pub fn is_absent(&self) -> bool {
        self.document.is_none()
    }
}
