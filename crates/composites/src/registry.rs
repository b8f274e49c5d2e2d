//! Specification registry
//!
//! Built once from validated specifications and shared immutably. Each
//! specification's defined predicates are computed at construction.

use crate::namespaces::Namespaces;
use crate::spec::{FieldSource, Level, SpecKind, Specification};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use tripod_core::{Error, Operation, Result, RDF_ORDINAL_PREFIX, RDF_TYPE};

/// Predicates a specification reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinedPredicates {
    predicates: BTreeSet<String>,
    any: bool,
    ordinals: bool,
}

impl DefinedPredicates {
    /// Walk a specification
    pub fn of(spec: &Specification) -> Self {
        let mut defined = DefinedPredicates::default();
        defined.predicates.insert(RDF_TYPE.to_string());
        defined.visit(spec.kind, &spec.root);
        defined
    }

    fn visit(&mut self, kind: SpecKind, level: &Level) {
        self.predicates
            .extend(level.filter.predicates().map(str::to_string));
        if kind == SpecKind::View && level.include.is_empty() {
            self.any = true;
        }
        self.predicates.extend(level.include.iter().cloned());
        for field in level.fields.iter().chain(level.indices.iter()) {
            if let FieldSource::Values(exprs) = &field.source {
                for expr in exprs {
                    expr.collect_predicates(&mut self.predicates);
                }
            }
        }
        for count in &level.counts {
            self.predicates.insert(count.property.clone());
            self.predicates
                .extend(count.filter.predicates().map(str::to_string));
        }
        for join in &level.joins {
            self.predicates.insert(join.predicate.clone());
            if join.follow_sequence {
                self.ordinals = true;
            }
            self.visit(kind, &join.level);
        }
    }

    /// True if a change to `changed` can alter the specification's output
    pub fn matches(&self, changed: &BTreeSet<String>) -> bool {
        if self.any {
            return !changed.is_empty();
        }
        changed.iter().any(|p| {
            self.predicates.contains(p) || (self.ordinals && p.starts_with(RDF_ORDINAL_PREFIX))
        })
    }

    /// True if the specification copies every predicate somewhere
    pub fn is_open(&self) -> bool {
        self.any
    }

    /// Named predicates
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().map(String::as_str)
    }

    /// True if `predicate` is read
    pub fn contains(&self, predicate: &str) -> bool {
        self.any
            || self.predicates.contains(predicate)
            || (self.ordinals && predicate.starts_with(RDF_ORDINAL_PREFIX))
    }
}

struct Entry {
    spec: Arc<Specification>,
    defined: DefinedPredicates,
}

/// Immutable set of specifications
#[derive(Default)]
pub struct SpecificationRegistry {
    specs: BTreeMap<String, Entry>,
}

impl SpecificationRegistry {
    /// Build from validated specifications, rejecting duplicate ids
    pub fn new(specs: Vec<Specification>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for spec in specs {
            if map.contains_key(&spec.id) {
                return Err(Error::configuration(format!(
                    "duplicate specification id {}",
                    spec.id
                )));
            }
            let defined = DefinedPredicates::of(&spec);
            debug!(
                target: "tripod::composite",
                spec_id = %spec.id,
                kind = ?spec.kind,
                predicates = defined.predicates.len(),
                "Registered specification"
            );
            map.insert(
                spec.id.clone(),
                Entry {
                    spec: Arc::new(spec),
                    defined,
                },
            );
        }
        Ok(SpecificationRegistry { specs: map })
    }

    /// Load and validate a JSON array of specifications
    pub fn from_json(values: Vec<Value>) -> Result<Self> {
        let specs = values
            .into_iter()
            .map(Specification::from_json)
            .collect::<Result<Vec<_>>>()?;
        Self::new(specs)
    }

    /// Load from JSON text holding an array of specifications
    pub fn from_json_str(text: &str) -> Result<Self> {
        let values: Vec<Value> = serde_json::from_str(text)
            .map_err(|e| Error::configuration(format!("invalid specification list: {}", e)))?;
        Self::from_json(values)
    }

    /// Look up by id
    pub fn get(&self, id: &str) -> Option<&Arc<Specification>> {
        self.specs.get(id).map(|e| &e.spec)
    }

    /// Look up by id, failing with `NotFound`
    pub fn require(&self, id: &str) -> Result<&Arc<Specification>> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("specification {}", id)))
    }

    /// Defined predicates of a specification
    pub fn defined_predicates(&self, id: &str) -> Option<&DefinedPredicates> {
        self.specs.get(id).map(|e| &e.defined)
    }

    /// Specifications producing documents for `operation`
    pub fn by_operation(&self, operation: Operation) -> impl Iterator<Item = &Arc<Specification>> {
        self.specs
            .values()
            .map(|e| &e.spec)
            .filter(move |s| s.operation() == operation)
    }

    /// Specifications for `operation` rooted at any of `types`, compared
    /// after namespace expansion
    pub fn for_types<'a>(
        &'a self,
        operation: Operation,
        types: &'a [&'a str],
        namespaces: &'a Namespaces,
    ) -> impl Iterator<Item = &'a Arc<Specification>> + 'a {
        self.by_operation(operation).filter(move |s| {
            s.types.iter().any(|wanted| {
                types
                    .iter()
                    .any(|t| namespaces.same_resource(t, wanted))
            })
        })
    }

    /// Every specification
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Specification>> {
        self.specs.values().map(|e| &e.spec)
    }

    /// Number of specifications
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// True if there are no specifications
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl std::fmt::Debug for SpecificationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecificationRegistry")
            .field("specs", &self.specs.keys().collect::<Vec<_>>())
            .finish()
    }
}
