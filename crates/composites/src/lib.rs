//! Materialized composites for Tripod
//!
//! This crate keeps derived documents in step with the descriptions they
//! are built from:
//! - Specification / SpecificationRegistry: validated view, table and
//!   search definitions and the predicates each one reads
//! - ImpactAnalyzer: maps changed subjects to stale documents
//! - CompositeEngine: rebuilds a document by walking a specification's
//!   join tree from its root
//!
//! Value modifiers, filters and computed fields are small closed
//! interpreters over a validated AST; nothing is dispatched by name at
//! evaluation time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod computed;
pub mod engine;
pub mod filter;
pub mod impact;
pub mod modifier;
pub mod namespaces;
pub mod registry;
pub mod spec;

pub use computed::{ComputedExpr, ComputedField};
pub use engine::{CompositeEngine, Regenerator, DEFAULT_MAX_JOINS, SEARCH_TERMS_FIELD};
pub use filter::{Condition, Filter, FilterClause};
pub use impact::ImpactAnalyzer;
pub use modifier::ValueExpr;
pub use namespaces::Namespaces;
pub use registry::{DefinedPredicates, SpecificationRegistry};
pub use spec::{Count, Field, FieldSource, Join, Level, SpecKind, Specification};
