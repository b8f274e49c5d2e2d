//! Secondary indices for efficient query patterns
//!
//! These indices let the store answer lookups without scanning every
//! document:
//! - TypeIndex: (context, rdf:type) → subjects, for regenerating every
//!   root of a specification
//! - ImpactIndex: subject → materialized documents that visited it, for
//!   finding stale composites after a write
//! - RootIndex: root subject → materialized documents keyed on it, for
//!   deleting composites when their root disappears

use std::collections::{HashMap, HashSet};
use tripod_core::{MaterializedKey, Operation, SubjectId};

/// A materialized document address: collection plus key
pub type MaterializedEntry = (Operation, MaterializedKey);

/// Secondary index: (context, type) → subjects
#[derive(Debug, Default)]
pub struct TypeIndex {
    index: HashMap<(String, String), HashSet<SubjectId>>,
}

impl TypeIndex {
    /// Create a new empty TypeIndex
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
        }
    }

    /// Record that `subject` has type `rdf_type`
    pub fn insert(&mut self, rdf_type: &str, subject: SubjectId) {
        self.index
            .entry((subject.context.clone(), rdf_type.to_string()))
            .or_default()
            .insert(subject);
    }

    /// Forget that `subject` has type `rdf_type`.
    ///
    /// If the set becomes empty, removes the entry entirely
    /// to avoid accumulating empty sets.
    pub fn remove(&mut self, rdf_type: &str, subject: &SubjectId) {
        let key = (subject.context.clone(), rdf_type.to_string());
        if let Some(subjects) = self.index.get_mut(&key) {
            subjects.remove(subject);
            if subjects.is_empty() {
                self.index.remove(&key);
            }
        }
    }

    /// Subjects of a type within a context
    pub fn get(&self, rdf_type: &str, context: &str) -> Option<&HashSet<SubjectId>> {
        self.index.get(&(context.to_string(), rdf_type.to_string()))
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Secondary index: visited subject → materialized documents
///
/// Mirrors the `impactIndex` list stored inside each document so that
/// "which composites read this subject?" is a single lookup.
#[derive(Debug, Default)]
pub struct ImpactIndex {
    index: HashMap<SubjectId, HashSet<MaterializedEntry>>,
}

impl ImpactIndex {
    /// Create a new empty ImpactIndex
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
        }
    }

    /// Index every subject of a document's impact list
    pub fn insert_all(&mut self, subjects: &[SubjectId], entry: &MaterializedEntry) {
        for subject in subjects {
            self.index
                .entry(subject.clone())
                .or_default()
                .insert(entry.clone());
        }
    }

    /// Remove a document from the sets of every listed subject
    pub fn remove_all(&mut self, subjects: &[SubjectId], entry: &MaterializedEntry) {
        for subject in subjects {
            if let Some(entries) = self.index.get_mut(subject) {
                entries.remove(entry);
                if entries.is_empty() {
                    self.index.remove(subject);
                }
            }
        }
    }

    /// Documents of one collection that visited `subject`
    pub fn lookup(&self, operation: Operation, subject: &SubjectId) -> Vec<MaterializedKey> {
        let mut keys: Vec<MaterializedKey> = self
            .index
            .get(subject)
            .into_iter()
            .flatten()
            .filter(|(op, _)| *op == operation)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of indexed subjects
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Secondary index: root subject → materialized documents keyed on it
#[derive(Debug, Default)]
pub struct RootIndex {
    index: HashMap<(Operation, SubjectId), HashSet<MaterializedKey>>,
}

impl RootIndex {
    /// Create a new empty RootIndex
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
        }
    }

    /// Add a document under its root
    pub fn insert(&mut self, operation: Operation, key: MaterializedKey) {
        self.index
            .entry((operation, key.subject()))
            .or_default()
            .insert(key);
    }

    /// Remove a document from its root's set
    pub fn remove(&mut self, operation: Operation, key: &MaterializedKey) {
        let root = (operation, key.subject());
        if let Some(keys) = self.index.get_mut(&root) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&root);
            }
        }
    }

    /// Documents rooted at `subject`
    pub fn lookup(&self, operation: Operation, subject: &SubjectId) -> Vec<MaterializedKey> {
        let mut keys: Vec<MaterializedKey> = self
            .index
            .get(&(operation, subject.clone()))
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}
