//! Cardinality bounds on predicates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tripod_core::{Bdd, Error, Result};

/// Maximum number of values per predicate.
///
/// Predicates without a rule are unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardinalityRules {
    limits: BTreeMap<String, usize>,
}

impl CardinalityRules {
    /// No bounds
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound `predicate` to at most `max` values
    pub fn with(mut self, predicate: impl Into<String>, max: usize) -> Self {
        self.limits.insert(predicate.into(), max);
        self
    }

    /// Bound for one predicate
    pub fn max_for(&self, predicate: &str) -> Option<usize> {
        self.limits.get(predicate).copied()
    }

    /// True when no predicate is bounded
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Check a merged document against every bound
    pub fn check(&self, bdd: &Bdd) -> Result<()> {
        for (predicate, max) in &self.limits {
            let actual = bdd.values(predicate).len();
            if actual > *max {
                return Err(Error::CardinalityViolation {
                    subject: bdd.id.clone(),
                    predicate: predicate.clone(),
                    max: *max,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl From<BTreeMap<String, usize>> for CardinalityRules {
    fn from(limits: BTreeMap<String, usize>) -> Self {
        CardinalityRules { limits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripod_core::{Object, SubjectId, Timestamp};

    fn bdd_with_titles(count: usize) -> Bdd {
        let mut predicates = BTreeMap::new();
        predicates.insert(
            "dct:title".to_string(),
            (0..count).map(|i| Object::literal(format!("t{}", i))).collect(),
        );
        Bdd {
            id: SubjectId::new("http://x/a", "http://ctx"),
            predicates,
            version: 0,
            created_at: Timestamp::EPOCH,
            updated_at: Timestamp::EPOCH,
        }
    }

    #[test]
    fn test_unbounded_predicates_pass() {
        assert!(CardinalityRules::new().check(&bdd_with_titles(5)).is_ok());
    }

    #[test]
    fn test_bound_exceeded() {
        let rules = CardinalityRules::new().with("dct:title", 1);
        assert!(rules.check(&bdd_with_titles(1)).is_ok());
        match rules.check(&bdd_with_titles(2)) {
            Err(Error::CardinalityViolation { max, actual, .. }) => {
                assert_eq!(max, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected cardinality violation, got {:?}", other),
        }
    }
}
