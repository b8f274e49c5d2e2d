//! Impact analysis
//!
//! Turns the changed-subjects map produced by a write into the set of
//! materialized documents that are now stale. Two independent rules emit
//! work, and their emissions are merged per (subject, operation):
//!
//! - Direct: the changed subject is itself a root, either because its
//!   current type matches a specification or because a document is already
//!   keyed on it, and the changed predicates overlap the specification's
//!   defined predicates.
//! - Indirect: the changed subject appears in the impact index of a
//!   document rooted elsewhere. Work is emitted on that document's root.
//!
//! A subject with an empty predicate set was deleted. Its own documents are
//! deleted, and every document that had it in its impact index is
//! regenerated regardless of predicate overlap.

use crate::namespaces::Namespaces;
use crate::registry::SpecificationRegistry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use tripod_core::{ChangedSubjects, DocumentStore, ImpactedSubject, Operation, Result, SubjectId};

/// Finds stale materialized documents
pub struct ImpactAnalyzer {
    registry: Arc<SpecificationRegistry>,
    store: Arc<dyn DocumentStore>,
    namespaces: Arc<Namespaces>,
    store_id: String,
    pod_id: String,
}

impl ImpactAnalyzer {
    /// Analyzer for one store
    pub fn new(
        registry: Arc<SpecificationRegistry>,
        store: Arc<dyn DocumentStore>,
        namespaces: Arc<Namespaces>,
        store_id: impl Into<String>,
        pod_id: impl Into<String>,
    ) -> Self {
        ImpactAnalyzer {
            registry,
            store,
            namespaces,
            store_id: store_id.into(),
            pod_id: pod_id.into(),
        }
    }

    /// Stale documents of the given kinds, merged and sorted
    pub fn impacted_subjects(
        &self,
        changed: &ChangedSubjects,
        operations: &[Operation],
    ) -> Result<Vec<ImpactedSubject>> {
        let mut merged: BTreeMap<(SubjectId, Operation, bool), ImpactedSubject> = BTreeMap::new();
        for &operation in operations {
            for (subject, predicates) in changed.iter() {
                for emission in self.for_subject(operation, subject, predicates)? {
                    match merged.get_mut(&emission.merge_key()) {
                        Some(existing) => existing.spec_ids.extend(emission.spec_ids),
                        None => {
                            merged.insert(emission.merge_key(), emission);
                        }
                    }
                }
            }
        }

        let impacted: Vec<ImpactedSubject> = merged.into_values().collect();
        debug!(
            target: "tripod::impact",
            changed = changed.len(),
            impacted = impacted.len(),
            "Impact analysis complete"
        );
        Ok(impacted)
    }

    fn for_subject(
        &self,
        operation: Operation,
        subject: &SubjectId,
        predicates: &BTreeSet<String>,
    ) -> Result<Vec<ImpactedSubject>> {
        let deleted = predicates.is_empty();
        let mut out = Vec::new();

        if deleted {
            for key in self.store.find_by_root(operation, subject)? {
                if self.registry.get(&key.spec_id).is_none() {
                    continue;
                }
                out.push(self.emit(subject.clone(), operation, key.spec_id).deleting());
            }
        } else {
            let mut direct = BTreeSet::new();
            if let Some(bdd) = self.store.get_bdd(subject)? {
                let types: Vec<&str> = bdd.types().collect();
                direct.extend(
                    self.registry
                        .for_types(operation, &types, &self.namespaces)
                        .map(|spec| spec.id.clone()),
                );
            }
            // Existing documents whose root lost its type still need a pass
            // so the engine can remove them
            direct.extend(
                self.store
                    .find_by_root(operation, subject)?
                    .into_iter()
                    .map(|key| key.spec_id),
            );
            for spec_id in direct {
                if self.touches(&spec_id, predicates) {
                    out.push(self.emit(subject.clone(), operation, spec_id));
                }
            }
        }

        for key in self.store.find_by_impact(operation, subject)? {
            let root = key.subject();
            if root == *subject || self.registry.get(&key.spec_id).is_none() {
                continue;
            }
            if deleted || self.touches(&key.spec_id, predicates) {
                out.push(self.emit(root, operation, key.spec_id));
            }
        }
        Ok(out)
    }

    fn touches(&self, spec_id: &str, predicates: &BTreeSet<String>) -> bool {
        match self.registry.defined_predicates(spec_id) {
            Some(defined) => defined.matches(predicates),
            None => {
                debug!(
                    target: "tripod::impact",
                    spec_id,
                    "Document belongs to an unknown specification, skipped"
                );
                false
            }
        }
    }

    fn emit(&self, id: SubjectId, operation: Operation, spec_id: String) -> ImpactedSubject {
        ImpactedSubject::new(id, operation, &self.store_id, &self.pod_id, spec_id)
    }
}
