//! Filter clauses
//!
//! A filter is a conjunction of clauses. Each clause names a predicate and
//! exactly one condition: a URI value, a literal value, or (non-)existence.

use crate::namespaces::Namespaces;
use serde::Deserialize;
use tripod_core::{Bdd, Error, Object, Result};

/// Serialized clause, before validation
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFilterClause {
    /// Predicate tested
    pub predicate: String,
    /// Required URI value
    #[serde(default)]
    pub uri: Option<String>,
    /// Required literal value
    #[serde(default)]
    pub literal: Option<String>,
    /// Required presence (true) or absence (false)
    #[serde(default)]
    pub exists: Option<bool>,
}

/// What a clause requires of its predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Some value is this URI
    Uri(String),
    /// Some value is this literal
    Literal(String),
    /// The predicate is present (`true`) or absent (`false`)
    Exists(bool),
}

/// One validated clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    /// Predicate tested
    pub predicate: String,
    /// Requirement
    pub condition: Condition,
}

impl FilterClause {
    fn matches(&self, bdd: Option<&Bdd>, namespaces: &Namespaces) -> bool {
        let values: &[Object] = bdd.map_or(&[], |b| b.values(&self.predicate));
        match &self.condition {
            Condition::Exists(expected) => values.is_empty() != *expected,
            Condition::Uri(uri) => values.iter().any(|v| match v.as_uri() {
                Some(value) => namespaces.same_resource(value, uri),
                None => false,
            }),
            Condition::Literal(literal) => values
                .iter()
                .any(|v| matches!(v, Object::Literal(value) if value == literal)),
        }
    }
}

impl TryFrom<RawFilterClause> for FilterClause {
    type Error = Error;

    fn try_from(raw: RawFilterClause) -> Result<Self> {
        let condition = match (raw.uri, raw.literal, raw.exists) {
            (Some(uri), None, None) => Condition::Uri(uri),
            (None, Some(literal), None) => Condition::Literal(literal),
            (None, None, Some(exists)) => Condition::Exists(exists),
            _ => {
                return Err(Error::configuration(format!(
                    "filter on {} must have exactly one of uri, literal or exists",
                    raw.predicate
                )))
            }
        };
        Ok(FilterClause {
            predicate: raw.predicate,
            condition,
        })
    }
}

/// Conjunction of clauses; the empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<FilterClause>,
}

impl Filter {
    /// Validate raw clauses
    pub fn parse(raw: Vec<RawFilterClause>) -> Result<Self> {
        let clauses = raw
            .into_iter()
            .map(FilterClause::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Filter { clauses })
    }

    /// Clauses in declaration order
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// True when there are no clauses
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Test a document; a missing document has no values
    pub fn matches(&self, bdd: Option<&Bdd>, namespaces: &Namespaces) -> bool {
        self.clauses.iter().all(|c| c.matches(bdd, namespaces))
    }

    /// Predicates the filter reads
    pub fn predicates(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|c| c.predicate.as_str())
    }
}
