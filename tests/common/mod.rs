//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use tripod::DocumentStore;
use tempfile::TempDir;
pub use tripod::{
    Graph, MemoryJobQueue, Object, Operation, SubjectId, Tripod, TripodConfig, RDF_TYPE,
};

/// Context used by every scenario
pub const CTX: &str = "http://talisaspire.com/";

/// Specifications shared by the suites
pub const SPECIFICATIONS: &str = r#"
[namespaces]
acorn = "http://talisaspire.com/schema#"
dct = "http://purl.org/dc/terms/"

[[specifications]]
id = "v_resource_full"
kind = "view"
types = ["acorn:Resource"]
include = ["rdf:type", "dct:title", "dct:isVersionOf"]

[specifications.joins."dct:isVersionOf"]
include = ["rdf:type"]

[[specifications]]
id = "t_resource"
kind = "table"
types = ["acorn:Resource"]
fields = [{ name = "title", predicates = ["dct:title"] }]

[[specifications]]
id = "s_resource"
kind = "search"
types = ["acorn:Resource"]
indices = [{ name = "title", predicates = ["dct:title"] }]
fields = [{ name = "title", predicates = ["dct:title"] }]
"#;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route tracing output through the test harness; `RUST_LOG` filters it
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// TestTripod - store plus the config it was opened with
// ============================================================================

/// In-memory Tripod with the shared specifications
pub struct TestTripod {
    pub tripod: Tripod,
}

impl TestTripod {
    /// Workers run async regeneration
    pub fn new() -> Self {
        init_tracing();
        let tripod = Tripod::in_memory(config()).expect("Failed to open test store");
        TestTripod { tripod }
    }

    /// Async regeneration collected in `jobs` instead of run
    pub fn with_queue(jobs: Arc<MemoryJobQueue>) -> Self {
        init_tracing();
        let tripod = Tripod::builder(config())
            .job_queue(jobs)
            .build()
            .expect("Failed to open test store");
        TestTripod { tripod }
    }

    /// Store `new` over `old` in the shared context
    pub fn save(&self, old: &Graph, new: &Graph) -> tripod::Result<tripod::SaveOutcome> {
        self.tripod.save_changes(old, new, Some(CTX), None)
    }

    /// Current graph of one resource
    pub fn describe(&self, resource: &str) -> Graph {
        self.tripod
            .describe_resource(resource, Some(CTX))
            .expect("describe failed")
    }

    /// Stored version of one resource
    pub fn version(&self, resource: &str) -> Option<u64> {
        self.tripod
            .store()
            .get_bdd(&SubjectId::new(resource, CTX))
            .expect("read failed")
            .map(|bdd| bdd.version)
    }
}

/// Shared specifications parsed into a config
pub fn config() -> TripodConfig {
    TripodConfig::from_toml_str(SPECIFICATIONS).expect("invalid test config")
}

/// Temp directory for file-backed stores
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Graph describing one resource
pub fn resource(uri: &str, types: &[&str], titles: &[&str]) -> Graph {
    let mut g = Graph::new();
    for t in types {
        g.add_uri(uri, RDF_TYPE, t);
    }
    for title in titles {
        g.add_literal(uri, "dct:title", title);
    }
    g
}
