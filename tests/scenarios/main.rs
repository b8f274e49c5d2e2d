//! Tripod Scenario Tests
//!
//! End-to-end behaviour through the `Tripod` handle: versioning, replay,
//! composite regeneration, specification loading and write contention.

#[path = "../common/mod.rs"]
mod common;

mod composites;
mod concurrency;
mod replay;
mod saves;
mod specifications;
