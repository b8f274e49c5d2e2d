//! Composite regeneration engine
//!
//! Rebuilds one materialized document from a specification and a root
//! subject. Documents are never patched: every regeneration walks the
//! join tree from the root against the current store state and replaces
//! the stored document wholesale.
//!
//! # Walk
//!
//! 1. Load the root. A missing root, or one whose type no longer matches,
//!    has its document deleted.
//! 2. Apply the root filter. Table and search roots that fail it are
//!    deleted; view roots keep an empty view so the impact index still
//!    points back at them.
//! 3. Collect this level's output (included predicates, fields, indices,
//!    counts), then follow each join's URI values (or the ordinal members
//!    of a joined sequence) up to the join's target limit and recurse.
//!    Every subject touched is recorded, whether or not its filter passed.
//! 4. Evaluate computed fields (tables only) over the collected fields.
//! 5. Stamp freshness: an expiry for TTL specifications, otherwise the
//!    list of visited subjects.

use crate::namespaces::Namespaces;
use crate::registry::SpecificationRegistry;
use crate::spec::{Field, FieldSource, Join, Level, SpecKind, Specification};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use tripod_core::{
    Bdd, DescribedNode, DocumentStore, Freshness, ImpactedSubject, MaterializedDocument,
    MaterializedKey, MaterializedValue, Result, SubjectId, Timestamp, RDF_ORDINAL_PREFIX,
};

/// Default number of targets followed per join
pub const DEFAULT_MAX_JOINS: usize = 10;

/// Field holding lowercased index values on search documents
pub const SEARCH_TERMS_FIELD: &str = "search_terms";

/// Something that can bring materialized documents up to date
pub trait Regenerator: Send + Sync {
    /// Regenerate (or delete) every document listed by `subject`
    fn update(&self, subject: &ImpactedSubject) -> Result<()>;
}

/// Builds materialized documents
pub struct CompositeEngine {
    registry: Arc<SpecificationRegistry>,
    store: Arc<dyn DocumentStore>,
    namespaces: Arc<Namespaces>,
    max_joins: usize,
}

impl CompositeEngine {
    /// Create an engine over `store`
    pub fn new(
        registry: Arc<SpecificationRegistry>,
        store: Arc<dyn DocumentStore>,
        namespaces: Arc<Namespaces>,
    ) -> Self {
        CompositeEngine {
            registry,
            store,
            namespaces,
            max_joins: DEFAULT_MAX_JOINS,
        }
    }

    /// Change the default per-join target limit
    pub fn with_max_joins(mut self, max_joins: usize) -> Self {
        self.max_joins = max_joins.max(1);
        self
    }

    /// Specifications in use
    pub fn registry(&self) -> &Arc<SpecificationRegistry> {
        &self.registry
    }

    /// Rebuild the document for `spec_id` rooted at `subject`.
    ///
    /// Returns `None` when the document was deleted instead.
    pub fn regenerate(
        &self,
        spec_id: &str,
        subject: &SubjectId,
    ) -> Result<Option<MaterializedDocument>> {
        let spec = self.registry.require(spec_id)?;
        let operation = spec.operation();
        let key = MaterializedKey::new(subject, &spec.id);

        let root = match self.store.get_bdd(subject)? {
            Some(root) if self.has_root_type(&root, spec) => root,
            _ => {
                let deleted = self.store.delete_materialized(operation, &key)?;
                debug!(
                    target: "tripod::composite",
                    spec_id = %spec.id,
                    subject = %subject,
                    deleted,
                    "Root missing or no longer typed, document removed"
                );
                return Ok(None);
            }
        };

        let mut walk = Walk::new(self);
        walk.visit(subject.clone());

        if spec.root.filter.matches(Some(&root), &self.namespaces) {
            walk.level(spec, &spec.root, &root, 0)?;
        } else if spec.kind != SpecKind::View {
            self.store.delete_materialized(operation, &key)?;
            debug!(
                target: "tripod::composite",
                spec_id = %spec.id,
                subject = %subject,
                "Root filtered out, document removed"
            );
            return Ok(None);
        }

        let now = Timestamp::now();
        let (value, visited) = walk.finish(spec);
        let freshness = match spec.ttl {
            Some(ttl) => Freshness::Expires(now.plus_secs(ttl)),
            None => Freshness::ImpactIndex(visited),
        };

        let created_at = self
            .store
            .get_materialized(operation, &key)?
            .map_or(now, |existing| existing.created_at);
        let doc = MaterializedDocument {
            key,
            value,
            freshness,
            created_at,
            updated_at: now,
        };
        self.store.put_materialized(operation, doc.clone())?;
        debug!(
            target: "tripod::composite",
            spec_id = %spec.id,
            subject = %subject,
            "Regenerated document"
        );
        Ok(Some(doc))
    }

    /// Read a document, regenerating it first if it is missing or expired
    pub fn get_or_regenerate(
        &self,
        spec_id: &str,
        subject: &SubjectId,
    ) -> Result<Option<MaterializedDocument>> {
        let spec = self.registry.require(spec_id)?;
        let key = MaterializedKey::new(subject, &spec.id);
        match self.store.get_materialized(spec.operation(), &key)? {
            Some(doc) if !doc.is_expired(Timestamp::now()) => Ok(Some(doc)),
            _ => self.regenerate(spec_id, subject),
        }
    }

    /// Read several documents, regenerating only the missing or expired
    /// ones
    pub fn get_many(
        &self,
        spec_id: &str,
        subjects: &[SubjectId],
    ) -> Result<Vec<MaterializedDocument>> {
        let spec = self.registry.require(spec_id)?;
        let operation = spec.operation();
        let now = Timestamp::now();
        let mut docs = Vec::with_capacity(subjects.len());
        let mut regenerated = 0usize;
        for subject in subjects {
            let key = MaterializedKey::new(subject, &spec.id);
            match self.store.get_materialized(operation, &key)? {
                Some(doc) if !doc.is_expired(now) => docs.push(doc),
                _ => {
                    regenerated += 1;
                    if let Some(doc) = self.regenerate(spec_id, subject)? {
                        docs.push(doc);
                    }
                }
            }
        }
        debug!(
            target: "tripod::composite",
            spec_id = %spec.id,
            requested = subjects.len(),
            regenerated,
            "Batch read"
        );
        Ok(docs)
    }

    /// Rebuild the document of every root in `context`; returns how many
    /// documents now exist
    pub fn regenerate_all(&self, spec_id: &str, context: &str) -> Result<usize> {
        let spec = self.registry.require(spec_id)?;
        let mut roots = BTreeSet::new();
        for rdf_type in &spec.types {
            for spelling in self.namespaces.spellings(rdf_type) {
                roots.extend(self.store.subjects_of_type(&spelling, context)?);
            }
        }
        let mut written = 0;
        for root in &roots {
            if self.regenerate(spec_id, root)?.is_some() {
                written += 1;
            }
        }
        debug!(
            target: "tripod::composite",
            spec_id = %spec.id,
            context,
            roots = roots.len(),
            written,
            "Regenerated specification"
        );
        Ok(written)
    }

    fn has_root_type(&self, bdd: &Bdd, spec: &Specification) -> bool {
        bdd.types().any(|t| {
            spec.types
                .iter()
                .any(|wanted| self.namespaces.same_resource(t, wanted))
        })
    }
}

impl Regenerator for CompositeEngine {
    fn update(&self, subject: &ImpactedSubject) -> Result<()> {
        let mut first_error = None;
        for spec_id in &subject.spec_ids {
            let result = if subject.is_delete {
                self.registry.require(spec_id).and_then(|spec| {
                    let key = MaterializedKey::new(&subject.id, &spec.id);
                    self.store.delete_materialized(spec.operation(), &key)
                })
                .map(|_| ())
            } else {
                self.regenerate(spec_id, &subject.id).map(|_| ())
            };
            if let Err(e) = result {
                warn!(
                    target: "tripod::composite",
                    spec_id = %spec_id,
                    subject = %subject.id,
                    error = %e,
                    "Regeneration failed"
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CompositeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEngine")
            .field("registry", &self.registry)
            .field("max_joins", &self.max_joins)
            .finish()
    }
}

// ============================================================================
// Walk state
// ============================================================================

struct Walk<'a> {
    engine: &'a CompositeEngine,
    visited: Vec<SubjectId>,
    seen: BTreeSet<SubjectId>,
    nodes: Vec<DescribedNode>,
    described: BTreeSet<SubjectId>,
    fields: BTreeMap<String, Vec<String>>,
    counts: BTreeMap<String, u64>,
    terms: BTreeSet<String>,
}

impl<'a> Walk<'a> {
    fn new(engine: &'a CompositeEngine) -> Self {
        Walk {
            engine,
            visited: Vec::new(),
            seen: BTreeSet::new(),
            nodes: Vec::new(),
            described: BTreeSet::new(),
            fields: BTreeMap::new(),
            counts: BTreeMap::new(),
            terms: BTreeSet::new(),
        }
    }

    fn visit(&mut self, id: SubjectId) {
        if self.seen.insert(id.clone()) {
            self.visited.push(id);
        }
    }

    fn level(&mut self, spec: &Specification, level: &Level, bdd: &Bdd, depth: usize) -> Result<()> {
        if spec.kind == SpecKind::View {
            self.describe(level, bdd);
        }
        for field in &level.fields {
            let values = self.field_values(field, bdd);
            self.fields.entry(field.name.clone()).or_default().extend(values);
        }
        for index in &level.indices {
            let values = self.field_values(index, bdd);
            self.terms.extend(values.into_iter().map(|v| v.to_lowercase()));
        }
        for count in &level.counts {
            let referencing = self
                .engine
                .store
                .subjects_referencing(&count.property, &bdd.id)?;
            let mut n = 0u64;
            for id in referencing {
                if count.filter.is_empty() {
                    n += 1;
                    continue;
                }
                let doc = self.engine.store.get_bdd(&id)?;
                if count.filter.matches(doc.as_ref(), &self.engine.namespaces) {
                    n += 1;
                }
            }
            *self.counts.entry(count.name.clone()).or_default() += n;
        }
        for join in &level.joins {
            self.join(spec, join, bdd, depth)?;
        }
        Ok(())
    }

    fn join(&mut self, spec: &Specification, join: &Join, bdd: &Bdd, depth: usize) -> Result<()> {
        let limit = join.max_joins.unwrap_or(self.engine.max_joins);
        let targets: Vec<SubjectId> = bdd
            .values(&join.predicate)
            .iter()
            .filter_map(|o| o.as_uri())
            .take(limit)
            .map(|uri| SubjectId::new(uri, bdd.id.context.clone()))
            .collect();
        trace!(
            target: "tripod::composite",
            spec_id = %spec.id,
            predicate = %join.predicate,
            depth,
            targets = targets.len(),
            "Following join"
        );

        for target in targets {
            self.visit(target.clone());
            let Some(joined) = self.engine.store.get_bdd(&target)? else {
                continue;
            };
            if join.follow_sequence {
                for member in sequence_members(&joined).into_iter().take(limit) {
                    let member = SubjectId::new(member, bdd.id.context.clone());
                    self.visit(member.clone());
                    if let Some(member_bdd) = self.engine.store.get_bdd(&member)? {
                        self.enter(spec, &join.level, &member_bdd, depth + 1)?;
                    }
                }
            } else {
                self.enter(spec, &join.level, &joined, depth + 1)?;
            }
        }
        Ok(())
    }

    fn enter(&mut self, spec: &Specification, level: &Level, bdd: &Bdd, depth: usize) -> Result<()> {
        if level.filter.matches(Some(bdd), &self.engine.namespaces) {
            self.level(spec, level, bdd, depth)
        } else {
            Ok(())
        }
    }

    fn describe(&mut self, level: &Level, bdd: &Bdd) {
        if !self.described.insert(bdd.id.clone()) {
            return;
        }
        let predicates = if level.include.is_empty() {
            bdd.predicates.clone()
        } else {
            bdd.predicates
                .iter()
                .filter(|(p, _)| level.include.iter().any(|i| i == *p))
                .map(|(p, v)| (p.clone(), v.clone()))
                .collect()
        };
        self.nodes.push(DescribedNode {
            id: bdd.id.clone(),
            predicates,
        });
    }

    fn field_values(&self, field: &Field, bdd: &Bdd) -> Vec<String> {
        let mut values: Vec<String> = match &field.source {
            FieldSource::Link => vec![self.engine.namespaces.expand(&bdd.id.resource)],
            FieldSource::Values(exprs) => exprs
                .iter()
                .flat_map(|e| e.evaluate(bdd, &self.engine.namespaces))
                .collect(),
        };
        if let Some(limit) = field.limit {
            values.truncate(limit);
        }
        values
    }

    /// Output value plus every subject visited, in visit order
    fn finish(self, spec: &Specification) -> (MaterializedValue, Vec<SubjectId>) {
        if spec.kind == SpecKind::View {
            return (MaterializedValue::Graph(self.nodes), self.visited);
        }
        let mut fields = Map::new();
        for (name, values) in self.fields {
            fields.insert(name, field_value(values));
        }
        for (name, n) in self.counts {
            fields.insert(name, Value::Number(Number::from(n)));
        }
        if spec.kind == SpecKind::Search {
            fields.insert(
                SEARCH_TERMS_FIELD.to_string(),
                Value::Array(self.terms.into_iter().map(Value::String).collect()),
            );
        }
        for computed in &spec.computed_fields {
            let value = computed.expr.evaluate(&fields);
            fields.insert(computed.name.clone(), value);
        }
        (MaterializedValue::Fields(fields), self.visited)
    }
}

fn field_value(mut values: Vec<String>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => Value::String(values.remove(0)),
        _ => Value::Array(values.into_iter().map(Value::String).collect()),
    }
}

/// URI members of an RDF sequence, in ordinal order
fn sequence_members(container: &Bdd) -> Vec<String> {
    let mut members: Vec<(u64, &str)> = container
        .predicates
        .iter()
        .filter_map(|(p, values)| {
            let n = p.strip_prefix(RDF_ORDINAL_PREFIX)?.parse::<u64>().ok()?;
            Some(values.iter().filter_map(|v| v.as_uri()).map(move |uri| (n, uri)))
        })
        .flatten()
        .collect();
    members.sort_by_key(|(n, _)| *n);
    members.into_iter().map(|(_, uri)| uri.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripod_core::Object;

    #[test]
    fn test_sequence_members_follow_ordinal_order() {
        let mut predicates = BTreeMap::new();
        predicates.insert("rdf:_10".to_string(), vec![Object::uri("http://x/j")]);
        predicates.insert("rdf:_2".to_string(), vec![Object::uri("http://x/b")]);
        predicates.insert("rdf:_1".to_string(), vec![Object::uri("http://x/a")]);
        predicates.insert("rdf:type".to_string(), vec![Object::uri("rdf:Seq")]);
        let container = Bdd {
            id: SubjectId::new("http://x/list", "http://ctx"),
            predicates,
            version: 0,
            created_at: Timestamp::EPOCH,
            updated_at: Timestamp::EPOCH,
        };
        assert_eq!(
            sequence_members(&container),
            vec!["http://x/a", "http://x/b", "http://x/j"]
        );
    }

    #[test]
    fn test_field_value_shapes() {
        assert_eq!(field_value(vec![]), Value::Null);
        assert_eq!(field_value(vec!["a".into()]), Value::String("a".into()));
        assert_eq!(
            field_value(vec!["a".into(), "b".into()]),
            serde_json::json!(["a", "b"])
        );
    }
}
