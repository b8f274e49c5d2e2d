//! Units of regeneration work

use crate::types::{Operation, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A subject whose materialized documents of one kind need recomputing.
///
/// Produced by impact analysis and consumed once, either inline or by a
/// queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactedSubject {
    /// Root subject of the materialized documents
    pub id: SubjectId,
    /// Kind of artifact to touch
    pub operation: Operation,
    /// Store the subject lives in
    pub store_id: String,
    /// Pod the store lives in
    pub pod_id: String,
    /// Specifications whose documents are stale
    pub spec_ids: BTreeSet<String>,
    /// The subject itself was removed, so its documents are deleted
    pub is_delete: bool,
}

impl ImpactedSubject {
    /// Regeneration for a single spec
    pub fn new(
        id: SubjectId,
        operation: Operation,
        store_id: impl Into<String>,
        pod_id: impl Into<String>,
        spec_id: impl Into<String>,
    ) -> Self {
        ImpactedSubject {
            id,
            operation,
            store_id: store_id.into(),
            pod_id: pod_id.into(),
            spec_ids: std::iter::once(spec_id.into()).collect(),
            is_delete: false,
        }
    }

    /// Mark as a deletion
    pub fn deleting(mut self) -> Self {
        self.is_delete = true;
        self
    }

    /// Key used to merge work for the same subject
    pub fn merge_key(&self) -> (SubjectId, Operation, bool) {
        (self.id.clone(), self.operation, self.is_delete)
    }
}
