//! Specification Loading Tests
//!
//! Malformed specifications are rejected when the configuration loads,
//! before any data is processed.

use crate::common::*;
use tripod::ErrorKind;

fn load(specs: &str) -> tripod::Result<TripodConfig> {
    TripodConfig::from_toml_str(specs)
}

#[test]
fn test_counts_without_ttl_rejected() {
    let err = load(
        r#"
[[specifications]]
id = "t_counted"
kind = "table"
types = ["acorn:Work"]
fields = [{ name = "title", predicates = ["dct:title"] }]
counts = [{ name = "versions", property = "dct:isVersionOf" }]
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("ttl"), "{}", err);
}

#[test]
fn test_counts_with_ttl_accepted() {
    let cfg = load(
        r#"
[[specifications]]
id = "t_counted"
kind = "table"
types = ["acorn:Work"]
ttl = 300
counts = [{ name = "versions", property = "dct:isVersionOf" }]
"#,
    )
    .unwrap();
    let registry = cfg.registry().unwrap();
    assert_eq!(registry.require("t_counted").unwrap().ttl, Some(300));
}

#[test]
fn test_open_rejects_bad_config_file() {
    let dir = temp_dir();
    std::fs::write(
        dir.path().join(tripod::CONFIG_FILE_NAME),
        r#"
[[specifications]]
id = "v_bad"
kind = "view"
types = ["acorn:Resource"]
fields = [{ name = "title", predicates = ["dct:title"] }]
"#,
    )
    .unwrap();
    let err = Tripod::open(dir.path()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_duplicate_ids_rejected() {
    let err = load(
        r#"
[[specifications]]
id = "dup"
kind = "view"
types = ["acorn:Resource"]

[[specifications]]
id = "dup"
kind = "view"
types = ["acorn:Work"]
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_unknown_modifier_rejected() {
    let err = load(
        r#"
[[specifications]]
id = "t_bad"
kind = "table"
types = ["acorn:Resource"]
fields = [{ name = "title", predicates = [{ uppercase = "dct:title" }] }]
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_computed_field_must_reference_earlier_field() {
    let err = load(
        r#"
[[specifications]]
id = "t_bad"
kind = "table"
types = ["acorn:Resource"]
fields = [{ name = "title", predicates = ["dct:title"] }]

[[specifications.computed_fields]]
name = "shout"
value = { _replace_ = { search = "a", replace = "b", subject = "$missing" } }
"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
