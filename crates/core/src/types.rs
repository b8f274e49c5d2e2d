//! Identifier and value types shared across the store
//!
//! - `SubjectId`: a resource within a named graph context
//! - `Object`: the object of a triple, either a URI or a literal
//! - `TransactionId`: unique identifier of a write attempt
//! - `Operation`: kind of materialized artifact (views, tables, search)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Predicate naming the type of a resource
pub const RDF_TYPE: &str = "rdf:type";

/// Prefix of RDF container membership predicates (`rdf:_1`, `rdf:_2`, ...)
pub const RDF_ORDINAL_PREFIX: &str = "rdf:_";

/// Identifies one bounded description: a resource within a context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId {
    /// Resource URI or qname
    pub resource: String,
    /// Named graph the description lives in
    pub context: String,
}

impl SubjectId {
    /// Create a subject id
    pub fn new(resource: impl Into<String>, context: impl Into<String>) -> Self {
        SubjectId {
            resource: resource.into(),
            context: context.into(),
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> in <{}>", self.resource, self.context)
    }
}

/// Object of a triple
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Object {
    /// Reference to another resource
    Uri(String),
    /// Plain literal value
    Literal(String),
}

impl Object {
    /// Create a URI object
    pub fn uri(value: impl Into<String>) -> Self {
        Object::Uri(value.into())
    }

    /// Create a literal object
    pub fn literal(value: impl Into<String>) -> Self {
        Object::Literal(value.into())
    }

    /// Lexical form regardless of kind
    pub fn as_str(&self) -> &str {
        match self {
            Object::Uri(value) | Object::Literal(value) => value,
        }
    }

    /// Returns the URI if this object is one
    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Object::Uri(value) => Some(value),
            Object::Literal(_) => None,
        }
    }

    /// True for URI objects
    pub fn is_uri(&self) -> bool {
        matches!(self, Object::Uri(_))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Uri(value) => write!(f, "<{}>", value),
            Object::Literal(value) => write!(f, "\"{}\"", value),
        }
    }
}

/// Unique identifier of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Fresh random id
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        TransactionId(uuid)
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TransactionId)
    }
}

/// Kind of materialized artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Merged sub-graphs
    Views,
    /// Named field rows
    Tables,
    /// Search documents
    Search,
}

impl Operation {
    /// Every operation kind, in dispatch order
    pub const ALL: [Operation; 3] = [Operation::Views, Operation::Tables, Operation::Search];

    /// Lowercase name used in configuration and job payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Views => "views",
            Operation::Tables => "tables",
            Operation::Search => "search",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
