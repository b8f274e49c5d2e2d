//! Materialized view, table and search documents
//!
//! A materialized document is derived from one root subject by one
//! specification. It is always rebuilt wholesale. Freshness is tracked in
//! exactly one of two ways: an impact index listing every subject visited
//! while building it, or an absolute expiry time for TTL specifications.

use crate::timestamp::Timestamp;
use crate::types::{Object, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of a materialized document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterializedKey {
    /// Root resource
    pub resource: String,
    /// Root context
    pub context: String,
    /// Specification that produced the document
    pub spec_id: String,
}

impl MaterializedKey {
    /// Key for `spec_id` rooted at `subject`
    pub fn new(subject: &SubjectId, spec_id: impl Into<String>) -> Self {
        MaterializedKey {
            resource: subject.resource.clone(),
            context: subject.context.clone(),
            spec_id: spec_id.into(),
        }
    }

    /// Root subject
    pub fn subject(&self) -> SubjectId {
        SubjectId::new(self.resource.clone(), self.context.clone())
    }
}

/// One described subject inside a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribedNode {
    /// Subject described
    pub id: SubjectId,
    /// Included predicates
    pub predicates: BTreeMap<String, Vec<Object>>,
}

/// Contents of a materialized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializedValue {
    /// Merged sub-graphs (views)
    Graph(Vec<DescribedNode>),
    /// Named scalar or array fields (tables, search)
    Fields(serde_json::Map<String, serde_json::Value>),
}

impl MaterializedValue {
    /// Field map for table and search documents
    pub fn fields(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            MaterializedValue::Fields(fields) => Some(fields),
            MaterializedValue::Graph(_) => None,
        }
    }

    /// Nodes for view documents
    pub fn nodes(&self) -> Option<&[DescribedNode]> {
        match self {
            MaterializedValue::Graph(nodes) => Some(nodes),
            MaterializedValue::Fields(_) => None,
        }
    }
}

/// How staleness of a materialized document is detected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Every subject visited while building the document
    ImpactIndex(Vec<SubjectId>),
    /// Absolute expiry time
    Expires(Timestamp),
}

/// A derived document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedDocument {
    /// Root subject and specification
    pub key: MaterializedKey,
    /// Derived contents
    pub value: MaterializedValue,
    /// Invalidation strategy
    pub freshness: Freshness,
    /// First generation time
    pub created_at: Timestamp,
    /// Latest generation time
    pub updated_at: Timestamp,
}

impl MaterializedDocument {
    /// Impact index, if the document is invalidated by change tracking
    pub fn impact_index(&self) -> Option<&[SubjectId]> {
        match &self.freshness {
            Freshness::ImpactIndex(index) => Some(index),
            Freshness::Expires(_) => None,
        }
    }

    /// Expiry, if the document belongs to a TTL specification
    pub fn expires(&self) -> Option<Timestamp> {
        match self.freshness {
            Freshness::Expires(at) => Some(at),
            Freshness::ImpactIndex(_) => None,
        }
    }

    /// True once a TTL document's expiry has passed
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires().map_or(false, |at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(freshness: Freshness) -> MaterializedDocument {
        MaterializedDocument {
            key: MaterializedKey::new(&SubjectId::new("s", "c"), "t_resource"),
            value: MaterializedValue::Fields(serde_json::Map::new()),
            freshness,
            created_at: Timestamp::EPOCH,
            updated_at: Timestamp::EPOCH,
        }
    }

    #[test]
    fn test_freshness_is_exclusive() {
        let indexed = doc(Freshness::ImpactIndex(vec![SubjectId::new("s", "c")]));
        assert!(indexed.impact_index().is_some());
        assert!(indexed.expires().is_none());
        assert!(!indexed.is_expired(Timestamp::MAX));

        let ttl = doc(Freshness::Expires(Timestamp::from_secs(100)));
        assert!(ttl.impact_index().is_none());
        assert!(!ttl.is_expired(Timestamp::from_secs(99)));
        assert!(ttl.is_expired(Timestamp::from_secs(100)));
    }
}
