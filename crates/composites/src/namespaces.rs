//! Prefix → base URI mapping for qname expansion

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Known namespace prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
}

impl Namespaces {
    /// No prefixes
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `prefix` for `base`
    pub fn with(mut self, prefix: impl Into<String>, base: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), base.into());
        self
    }

    /// Expand `prefix:local` to a full URI.
    ///
    /// Values that are already absolute, or whose prefix is unknown, come
    /// back unchanged.
    pub fn expand(&self, value: &str) -> String {
        if value.contains("://") {
            return value.to_string();
        }
        match value.split_once(':') {
            Some((prefix, local)) => match self.prefixes.get(prefix) {
                Some(base) => format!("{}{}", base, local),
                None => value.to_string(),
            },
            None => value.to_string(),
        }
    }

    /// True when both values name the same resource
    pub fn same_resource(&self, a: &str, b: &str) -> bool {
        a == b || self.expand(a) == self.expand(b)
    }

    /// Every way `value` may be written: as given, expanded, and as a qname
    /// under each prefix whose base it starts with
    pub fn spellings(&self, value: &str) -> BTreeSet<String> {
        let expanded = self.expand(value);
        let mut out = BTreeSet::from([value.to_string()]);
        for (prefix, base) in &self.prefixes {
            if let Some(local) = expanded.strip_prefix(base.as_str()) {
                if !local.is_empty() {
                    out.insert(format!("{}:{}", prefix, local));
                }
            }
        }
        out.insert(expanded);
        out
    }
}

impl From<BTreeMap<String, String>> for Namespaces {
    fn from(prefixes: BTreeMap<String, String>) -> Self {
        Namespaces { prefixes }
    }
}
