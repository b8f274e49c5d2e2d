//! Specifications: the declarative description of a view, table or search
//! document
//!
//! Specifications are loaded from JSON (or any serde format) into raw
//! structs that reject unknown keys, then validated into the AST below. A
//! specification that fails validation never reaches the regeneration
//! engine.
//!
//! ```json
//! {
//!   "id": "t_books",
//!   "kind": "table",
//!   "types": ["bibo:Book"],
//!   "fields": [{"name": "title", "predicates": ["dct:title"]}],
//!   "joins": {"dct:creator": {"fields": [{"name": "author", "predicates": ["foaf:name"]}]}},
//!   "counts": [{"name": "citations", "property": "bibo:cites"}],
//!   "computed_fields": [{"name": "popular", "value": {"_conditional_": {"if": ["$citations", ">", 10], "then": true, "else": false}}}],
//!   "ttl": 300
//! }
//! ```

use crate::computed::{ComputedExpr, ComputedField};
use crate::filter::{Filter, RawFilterClause};
use crate::modifier::ValueExpr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tripod_core::{Error, Operation, Result};

/// Kind of materialized document a specification produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    /// Merged sub-graphs
    View,
    /// Named fields, one row per root
    Table,
    /// Named fields plus search terms
    Search,
}

impl SpecKind {
    /// Collection the documents live in
    pub fn operation(&self) -> Operation {
        match self {
            SpecKind::View => Operation::Views,
            SpecKind::Table => Operation::Tables,
            SpecKind::Search => Operation::Search,
        }
    }
}

/// Where a field's values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Value expressions evaluated against the document at this level
    Values(Vec<ValueExpr>),
    /// The fully-qualified URI of the resource at this level
    Link,
}

/// A named output field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Output name
    pub name: String,
    /// Value source
    pub source: FieldSource,
    /// Keep at most this many values per document visited
    pub limit: Option<usize>,
}

/// A reverse-reference count
///
/// Counts documents in the same context whose `property` points at the
/// subject being described, optionally restricted by a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Count {
    /// Output name
    pub name: String,
    /// Predicate on the counted documents
    pub property: String,
    /// Restriction on the counted documents
    pub filter: Filter,
}

/// One level of the join tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Level {
    /// Documents at this level must match
    pub filter: Filter,
    /// Predicates copied into a view; empty copies everything
    pub include: Vec<String>,
    /// Output fields
    pub fields: Vec<Field>,
    /// Fields feeding `search_terms`
    pub indices: Vec<Field>,
    /// Reverse-reference counts
    pub counts: Vec<Count>,
    /// Nested joins
    pub joins: Vec<Join>,
}

/// A followed predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Predicate whose URI values are followed
    pub predicate: String,
    /// What to collect from the joined documents
    pub level: Level,
    /// Targets followed, falling back to the engine's limit
    pub max_joins: Option<usize>,
    /// Follow `rdf:_N` members of the joined container instead
    pub follow_sequence: bool,
}

/// A validated specification
#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    /// Unique id
    pub id: String,
    /// Kind of document produced
    pub kind: SpecKind,
    /// Root `rdf:type` values; a root must have at least one
    pub types: Vec<String>,
    /// Base level
    pub root: Level,
    /// Computed fields, tables only
    pub computed_fields: Vec<ComputedField>,
    /// Lifetime in seconds; documents expire instead of being tracked
    pub ttl: Option<u64>,
}

// ============================================================================
// Raw (serialized) form
// ============================================================================

/// Serialized specification
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSpecification {
    id: String,
    kind: SpecKind,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    filter: Vec<RawFilterClause>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    indices: Vec<RawField>,
    #[serde(default)]
    counts: Vec<RawCount>,
    #[serde(default)]
    joins: BTreeMap<String, RawJoin>,
    #[serde(default)]
    computed_fields: Vec<RawComputedField>,
    #[serde(default)]
    ttl: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJoin {
    #[serde(default)]
    filter: Vec<RawFilterClause>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    indices: Vec<RawField>,
    #[serde(default)]
    counts: Vec<RawCount>,
    #[serde(default)]
    joins: BTreeMap<String, RawJoin>,
    #[serde(default)]
    max_joins: Option<usize>,
    #[serde(default)]
    follow_sequence: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    #[serde(default)]
    predicates: Vec<Value>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCount {
    name: String,
    property: String,
    #[serde(default)]
    filter: Vec<RawFilterClause>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawComputedField {
    name: String,
    value: Value,
}

struct RawLevel {
    filter: Vec<RawFilterClause>,
    include: Vec<String>,
    fields: Vec<RawField>,
    indices: Vec<RawField>,
    counts: Vec<RawCount>,
    joins: BTreeMap<String, RawJoin>,
}

// ============================================================================
// Validation
// ============================================================================

struct Validator<'a> {
    id: &'a str,
    kind: SpecKind,
}

impl Validator<'_> {
    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::configuration(format!("specification {}: {}", self.id, message))
    }

    fn wrap(&self, e: Error) -> Error {
        match e {
            Error::Configuration(message) => self.error(message),
            other => other,
        }
    }

    fn level(&self, raw: RawLevel, depth: usize) -> Result<Level> {
        match self.kind {
            SpecKind::View => {
                if !raw.fields.is_empty() || !raw.indices.is_empty() {
                    return Err(self.error("views take include lists, not fields or indices"));
                }
            }
            SpecKind::Table => {
                if !raw.include.is_empty() {
                    return Err(self.error("include is only valid on views"));
                }
                if !raw.indices.is_empty() {
                    return Err(self.error("indices are only valid on search specifications"));
                }
                if !raw.counts.is_empty() && depth > 1 {
                    return Err(self.error("counts may not be nested more than one join deep"));
                }
            }
            SpecKind::Search => {
                if !raw.include.is_empty() {
                    return Err(self.error("include is only valid on views"));
                }
            }
        }

        let filter = Filter::parse(raw.filter).map_err(|e| self.wrap(e))?;
        let fields = raw
            .fields
            .into_iter()
            .map(|f| self.field(f))
            .collect::<Result<Vec<_>>>()?;
        let indices = raw
            .indices
            .into_iter()
            .map(|f| self.field(f))
            .collect::<Result<Vec<_>>>()?;
        let counts = raw
            .counts
            .into_iter()
            .map(|c| -> Result<Count> {
                Ok(Count {
                    name: c.name,
                    property: c.property,
                    filter: Filter::parse(c.filter).map_err(|e| self.wrap(e))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let joins = raw
            .joins
            .into_iter()
            .map(|(predicate, join)| self.join(predicate, join, depth + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(Level {
            filter,
            include: raw.include,
            fields,
            indices,
            counts,
            joins,
        })
    }

    fn join(&self, predicate: String, raw: RawJoin, depth: usize) -> Result<Join> {
        if raw.max_joins == Some(0) {
            return Err(self.error(format!("join on {} has max_joins of zero", predicate)));
        }
        let level = self.level(
            RawLevel {
                filter: raw.filter,
                include: raw.include,
                fields: raw.fields,
                indices: raw.indices,
                counts: raw.counts,
                joins: raw.joins,
            },
            depth,
        )?;
        Ok(Join {
            predicate,
            level,
            max_joins: raw.max_joins,
            follow_sequence: raw.follow_sequence,
        })
    }

    fn field(&self, raw: RawField) -> Result<Field> {
        let source = match (raw.predicates.is_empty(), raw.value.as_deref()) {
            (true, None) => {
                return Err(self.error(format!("field {} has no predicates or value", raw.name)))
            }
            (false, Some(_)) => {
                return Err(self.error(format!(
                    "field {} has both predicates and a value",
                    raw.name
                )))
            }
            (true, Some("link")) => FieldSource::Link,
            (true, Some(other)) => {
                return Err(self.error(format!(
                    "field {} has unknown value '{}'",
                    raw.name, other
                )))
            }
            (false, None) => FieldSource::Values(
                raw.predicates
                    .iter()
                    .map(ValueExpr::parse)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| self.wrap(e))?,
            ),
        };
        Ok(Field {
            name: raw.name,
            source,
            limit: raw.limit,
        })
    }

    fn computed(
        &self,
        raw: Vec<RawComputedField>,
        defined: &mut BTreeSet<String>,
    ) -> Result<Vec<ComputedField>> {
        if !raw.is_empty() && self.kind != SpecKind::Table {
            return Err(self.error("computed fields are only valid on tables"));
        }
        let mut computed = Vec::with_capacity(raw.len());
        for field in raw {
            let expr = ComputedExpr::parse(&field.value).map_err(|e| self.wrap(e))?;
            let mut variables = BTreeSet::new();
            expr.collect_variables(&mut variables);
            if let Some(undefined) = variables.iter().find(|v| !defined.contains(*v)) {
                return Err(self.error(format!(
                    "computed field {} references undefined variable ${}",
                    field.name, undefined
                )));
            }
            defined.insert(field.name.clone());
            computed.push(ComputedField {
                name: field.name,
                expr,
            });
        }
        Ok(computed)
    }
}

impl Specification {
    /// Validate a serialized specification
    pub fn from_raw(raw: RawSpecification) -> Result<Self> {
        if raw.id.is_empty() {
            return Err(Error::configuration("specification id must not be empty"));
        }
        let validator = Validator {
            id: &raw.id,
            kind: raw.kind,
        };
        if raw.types.is_empty() {
            return Err(validator.error("at least one root type is required"));
        }

        let root = validator.level(
            RawLevel {
                filter: raw.filter,
                include: raw.include,
                fields: raw.fields,
                indices: raw.indices,
                counts: raw.counts,
                joins: raw.joins,
            },
            0,
        )?;

        if root.has_counts() && raw.ttl.is_none() {
            return Err(validator.error("specifications with counts must declare a ttl"));
        }

        let mut defined = BTreeSet::new();
        root.collect_names(&mut defined);
        let computed_fields = validator.computed(raw.computed_fields, &mut defined)?;

        Ok(Specification {
            id: raw.id,
            kind: raw.kind,
            types: raw.types,
            root,
            computed_fields,
            ttl: raw.ttl,
        })
    }

    /// Load one specification from a JSON value
    pub fn from_json(value: Value) -> Result<Self> {
        let raw: RawSpecification = serde_json::from_value(value)
            .map_err(|e| Error::configuration(format!("invalid specification: {}", e)))?;
        Self::from_raw(raw)
    }

    /// Load one specification from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawSpecification = serde_json::from_str(text)
            .map_err(|e| Error::configuration(format!("invalid specification: {}", e)))?;
        Self::from_raw(raw)
    }

    /// Collection the documents live in
    pub fn operation(&self) -> Operation {
        self.kind.operation()
    }
}

impl Level {
    /// True if this level or any nested join declares counts
    pub fn has_counts(&self) -> bool {
        !self.counts.is_empty() || self.joins.iter().any(|j| j.level.has_counts())
    }

    fn collect_names(&self, out: &mut BTreeSet<String>) {
        out.extend(self.fields.iter().map(|f| f.name.clone()));
        out.extend(self.indices.iter().map(|f| f.name.clone()));
        out.extend(self.counts.iter().map(|c| c.name.clone()));
        for join in &self.joins {
            join.level.collect_names(out);
        }
    }
}
