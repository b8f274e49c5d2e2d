//! Minimal RDF graph model
//!
//! Full RDF parsing and serialization live outside the store. The core
//! only needs an ordered set of triples it can diff and group by subject.

use crate::types::Object;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single statement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Subject resource
    pub subject: String,
    /// Predicate qname
    pub predicate: String,
    /// Object value
    pub object: Object,
}

impl Triple {
    /// Create a triple
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Object) -> Self {
        Triple {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

/// Ordered set of triples.
///
/// Ordering is by subject, then predicate, then object, so all triples
/// about one subject are contiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a statement. Returns false if it was already present.
    pub fn add(&mut self, subject: impl Into<String>, predicate: impl Into<String>, object: Object) -> bool {
        self.triples.insert(Triple::new(subject, predicate, object))
    }

    /// Add a URI-valued statement
    pub fn add_uri(&mut self, subject: &str, predicate: &str, uri: &str) -> bool {
        self.add(subject, predicate, Object::uri(uri))
    }

    /// Add a literal-valued statement
    pub fn add_literal(&mut self, subject: &str, predicate: &str, literal: &str) -> bool {
        self.add(subject, predicate, Object::literal(literal))
    }

    /// Insert an existing triple
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    /// Remove a statement. Returns false if it was absent.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        self.triples.remove(triple)
    }

    /// Check membership
    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    /// Number of triples
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// True if the graph has no triples
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Iterate over all triples in order
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Distinct subjects, in order
    pub fn subjects(&self) -> BTreeSet<&str> {
        self.triples.iter().map(|t| t.subject.as_str()).collect()
    }

    /// Triples whose subject is `subject`
    pub fn triples_for<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a Triple> + 'a {
        self.triples.iter().filter(move |t| t.subject == subject)
    }

    /// Triples about `subject` as an owned set
    pub fn subject_triples(&self, subject: &str) -> BTreeSet<Triple> {
        self.triples_for(subject).cloned().collect()
    }

    /// Predicate → values map for one subject, values in graph order
    pub fn predicates_for(&self, subject: &str) -> BTreeMap<String, Vec<Object>> {
        let mut predicates: BTreeMap<String, Vec<Object>> = BTreeMap::new();
        for triple in self.triples_for(subject) {
            predicates
                .entry(triple.predicate.clone())
                .or_default()
                .push(triple.object.clone());
        }
        predicates
    }

    /// Add every value of a predicate map under `subject`
    pub fn add_predicates(&mut self, subject: &str, predicates: &BTreeMap<String, Vec<Object>>) {
        for (predicate, objects) in predicates {
            for object in objects {
                self.add(subject, predicate.as_str(), object.clone());
            }
        }
    }

    /// Union another graph into this one
    pub fn merge(&mut self, other: Graph) {
        self.triples.extend(other.triples);
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Graph {
            triples: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Graph {
    type Item = Triple;
    type IntoIter = std::collections::btree_set::IntoIter<Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.into_iter()
    }
}
