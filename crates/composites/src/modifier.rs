//! Value expressions for table and search fields
//!
//! A field's `predicates` list holds value expressions. The set of
//! expression forms is closed:
//!
//! ```text
//! "dct:title"                                   values of a predicate
//! {"join": {"glue": ", ", "predicates": [..]}}  concatenate with separator
//! {"lowercase": <expr>}                         lowercase every value
//! {"date": <expr>}                              parse as a date, emit RFC 3339
//! {"link": <expr>}                              expand qnames to full URIs
//! ```
//!
//! Anything else is rejected when the specification is loaded.

use crate::namespaces::Namespaces;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use tripod_core::{Bdd, Error, Result};

/// A validated value expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpr {
    /// Lexical values of a predicate
    Predicate(String),
    /// All values of the parts joined into one string
    Join {
        /// Separator
        glue: String,
        /// Concatenated parts
        parts: Vec<ValueExpr>,
    },
    /// Lowercased values
    Lowercase(Box<ValueExpr>),
    /// Values parsed as dates
    Date(Box<ValueExpr>),
    /// Values expanded to full URIs
    Link(Box<ValueExpr>),
}

impl ValueExpr {
    /// Parse one expression
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(predicate) if !predicate.is_empty() => {
                Ok(ValueExpr::Predicate(predicate.clone()))
            }
            Value::Object(map) if map.len() == 1 => {
                let (key, inner) = map
                    .iter()
                    .next()
                    .ok_or_else(|| Error::configuration("empty value modifier"))?;
                match key.as_str() {
                    "join" => Self::parse_join(inner),
                    "lowercase" => Ok(ValueExpr::Lowercase(Box::new(Self::parse(inner)?))),
                    "date" => Ok(ValueExpr::Date(Box::new(Self::parse(inner)?))),
                    "link" => Ok(ValueExpr::Link(Box::new(Self::parse(inner)?))),
                    other => Err(Error::configuration(format!(
                        "unknown value modifier '{}'",
                        other
                    ))),
                }
            }
            other => Err(Error::configuration(format!(
                "invalid value expression: {}",
                other
            ))),
        }
    }

    fn parse_join(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::configuration("join modifier takes an object"))?;
        if let Some(unknown) = map.keys().find(|k| *k != "glue" && *k != "predicates") {
            return Err(Error::configuration(format!(
                "unknown join modifier key '{}'",
                unknown
            )));
        }
        let glue = match map.get("glue") {
            None => " ".to_string(),
            Some(Value::String(glue)) => glue.clone(),
            Some(_) => return Err(Error::configuration("join glue must be a string")),
        };
        let parts = map
            .get("predicates")
            .and_then(Value::as_array)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| Error::configuration("join modifier needs a predicates list"))?
            .iter()
            .map(Self::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(ValueExpr::Join { glue, parts })
    }

    /// Collect every predicate the expression reads
    pub fn collect_predicates(&self, out: &mut BTreeSet<String>) {
        match self {
            ValueExpr::Predicate(p) => {
                out.insert(p.clone());
            }
            ValueExpr::Join { parts, .. } => {
                for part in parts {
                    part.collect_predicates(out);
                }
            }
            ValueExpr::Lowercase(inner) | ValueExpr::Date(inner) | ValueExpr::Link(inner) => {
                inner.collect_predicates(out)
            }
        }
    }

    /// Evaluate against one document
    pub fn evaluate(&self, bdd: &Bdd, namespaces: &Namespaces) -> Vec<String> {
        match self {
            ValueExpr::Predicate(p) => bdd
                .values(p)
                .iter()
                .map(|o| o.as_str().to_string())
                .collect(),
            ValueExpr::Join { glue, parts } => {
                let values: Vec<String> = parts
                    .iter()
                    .flat_map(|part| part.evaluate(bdd, namespaces))
                    .collect();
                if values.is_empty() {
                    Vec::new()
                } else {
                    vec![values.join(glue)]
                }
            }
            ValueExpr::Lowercase(inner) => inner
                .evaluate(bdd, namespaces)
                .into_iter()
                .map(|v| v.to_lowercase())
                .collect(),
            ValueExpr::Date(inner) => inner
                .evaluate(bdd, namespaces)
                .iter()
                .filter_map(|v| parse_date(v))
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
                .collect(),
            ValueExpr::Link(inner) => inner
                .evaluate(bdd, namespaces)
                .iter()
                .map(|v| namespaces.expand(v))
                .collect(),
        }
    }
}

/// Parse the date formats seen in descriptions
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}
