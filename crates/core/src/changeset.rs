//! Changesets between two graph states
//!
//! A `Changeset` is computed per save call and never stored directly; its
//! audit form is kept inside the transaction record. `ChangedSubjects` is the
//! reduced form handed to impact analysis: which predicates changed for
//! which subject, with an empty set meaning the subject was deleted.

use crate::graph::{Graph, Triple};
use crate::types::SubjectId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Added and removed triples for one subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectChanges {
    /// Triples present in the new graph only
    pub additions: BTreeSet<Triple>,
    /// Triples present in the old graph only
    pub removals: BTreeSet<Triple>,
}

impl SubjectChanges {
    /// True when nothing changed
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Predicates touched by either additions or removals
    pub fn predicates(&self) -> BTreeSet<String> {
        self.additions
            .iter()
            .chain(self.removals.iter())
            .map(|t| t.predicate.clone())
            .collect()
    }
}

/// Per-subject differences between an old and a new graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    subjects: BTreeMap<String, SubjectChanges>,
}

impl Changeset {
    /// Diff two graphs.
    ///
    /// Every subject appearing in either graph is considered; subjects whose
    /// triples are identical in both are left out.
    pub fn compute(old: &Graph, new: &Graph) -> Self {
        let mut subjects = BTreeMap::new();
        let all: BTreeSet<&str> = old.subjects().union(&new.subjects()).copied().collect();

        for subject in all {
            let before = old.subject_triples(subject);
            let after = new.subject_triples(subject);
            let changes = SubjectChanges {
                additions: after.difference(&before).cloned().collect(),
                removals: before.difference(&after).cloned().collect(),
            };
            if !changes.is_empty() {
                subjects.insert(subject.to_string(), changes);
            }
        }

        Changeset { subjects }
    }

    /// True when the two graphs were identical
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Number of affected subjects
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// Affected subject resources, in order
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects.keys().map(String::as_str)
    }

    /// Changes for one subject
    pub fn get(&self, subject: &str) -> Option<&SubjectChanges> {
        self.subjects.get(subject)
    }

    /// Iterate over `(subject, changes)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SubjectChanges)> {
        self.subjects.iter().map(|(s, c)| (s.as_str(), c))
    }
}

/// One entry of `ChangedSubjects` in its serialized form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedSubjectEntry {
    /// Changed subject
    pub id: SubjectId,
    /// Predicates that changed; empty when the subject was deleted
    pub predicates: BTreeSet<String>,
}

/// Changed subjects with their changed predicates.
///
/// An empty predicate set signals that the subject itself was removed from
/// the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ChangedSubjectEntry>", into = "Vec<ChangedSubjectEntry>")]
pub struct ChangedSubjects {
    entries: BTreeMap<SubjectId, BTreeSet<String>>,
}

impl ChangedSubjects {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `predicates` changed on `id`
    pub fn insert(&mut self, id: SubjectId, predicates: BTreeSet<String>) {
        self.entries.entry(id).or_default().extend(predicates);
    }

    /// Record that `id` was deleted outright
    pub fn insert_deleted(&mut self, id: SubjectId) {
        self.entries.insert(id, BTreeSet::new());
    }

    /// Changed predicates for `id`
    pub fn get(&self, id: &SubjectId) -> Option<&BTreeSet<String>> {
        self.entries.get(id)
    }

    /// True if `id` was deleted
    pub fn is_deleted(&self, id: &SubjectId) -> bool {
        self.entries.get(id).map_or(false, BTreeSet::is_empty)
    }

    /// Iterate in subject order
    pub fn iter(&self) -> impl Iterator<Item = (&SubjectId, &BTreeSet<String>)> {
        self.entries.iter()
    }

    /// Number of subjects
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing changed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<ChangedSubjectEntry>> for ChangedSubjects {
    fn from(entries: Vec<ChangedSubjectEntry>) -> Self {
        ChangedSubjects {
            entries: entries.into_iter().map(|e| (e.id, e.predicates)).collect(),
        }
    }
}

impl From<ChangedSubjects> for Vec<ChangedSubjectEntry> {
    fn from(changed: ChangedSubjects) -> Self {
        changed
            .entries
            .into_iter()
            .map(|(id, predicates)| ChangedSubjectEntry { id, predicates })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Object;

    #[test]
    fn test_identical_graphs_produce_empty_changeset() {
        let mut graph = Graph::new();
        graph.add_literal("s", "dct:title", "wibble");
        assert!(Changeset::compute(&graph, &graph.clone()).is_empty());
    }

    #[test]
    fn test_changeset_splits_additions_and_removals() {
        let mut old = Graph::new();
        old.add_literal("s", "dct:title", "old");
        old.add_uri("s", "rdf:type", "acorn:Resource");
        let mut new = Graph::new();
        new.add_literal("s", "dct:title", "new");
        new.add_uri("s", "rdf:type", "acorn:Resource");
        new.add_literal("t", "dct:title", "fresh");

        let changeset = Changeset::compute(&old, &new);
        assert_eq!(changeset.len(), 2);

        let s = changeset.get("s").unwrap();
        assert_eq!(s.additions.len(), 1);
        assert_eq!(s.removals.len(), 1);
        assert_eq!(s.predicates().into_iter().collect::<Vec<_>>(), vec!["dct:title"]);

        let t = changeset.get("t").unwrap();
        assert!(t.removals.is_empty());
        assert!(t
            .additions
            .contains(&Triple::new("t", "dct:title", Object::literal("fresh"))));
    }

    #[test]
    fn test_changed_subjects_json_round_trip_keeps_deletions() {
        let mut changed = ChangedSubjects::new();
        changed.insert(
            SubjectId::new("s", "c"),
            ["dct:title".to_string()].into_iter().collect(),
        );
        changed.insert_deleted(SubjectId::new("gone", "c"));

        let json = serde_json::to_string(&changed).unwrap();
        let restored: ChangedSubjects = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, changed);
        assert!(restored.is_deleted(&SubjectId::new("gone", "c")));
    }
}
