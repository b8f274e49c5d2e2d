//! Storage layer for Tripod
//!
//! This crate implements the in-memory document store backend with:
//! - MemoryDocumentStore: DashMap-backed descriptions and locks, RwLock-guarded
//!   materialized collections
//! - Secondary indices (type_index, impact_index, root_index)
//! - Expiry index for TTL composites
//! - Expiry sweeper background task

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleaner;
pub mod index;
pub mod memory;
pub mod ttl;

pub use cleaner::ExpirySweeper;
pub use index::{ImpactIndex, MaterializedEntry, RootIndex, TypeIndex};
pub use memory::MemoryDocumentStore;
pub use ttl::ExpiryIndex;
