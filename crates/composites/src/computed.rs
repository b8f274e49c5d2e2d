//! Computed fields for table specifications
//!
//! Computed fields run after every ordinary field and count of the base
//! level has been resolved. Their operands reference those values as
//! `$name` variables. Three functions exist:
//!
//! - `_conditional_`: `{"if": [test], "then": a, "else": b}` where the test
//!   is a single operand (truthiness) or `[left, operator, right]`
//! - `_replace_`: `{"search": s, "replace": r, "subject": x}`, scalar or
//!   pairwise arrays
//! - `_arithmetic_`: `[left, operator, right]`, operands may nest

use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use tripod_core::{Error, Result};

/// Comparison operators for conditional tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `contains`
    Contains,
    /// `not contains`
    NotContains,
}

impl CompareOp {
    fn parse(op: &str) -> Result<Self> {
        Ok(match op {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            "contains" => CompareOp::Contains,
            "not contains" => CompareOp::NotContains,
            other => {
                return Err(Error::configuration(format!(
                    "unknown comparison operator '{}'",
                    other
                )))
            }
        })
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    fn parse(op: &str) -> Result<Self> {
        Ok(match op {
            "+" => ArithOp::Add,
            "-" => ArithOp::Sub,
            "*" => ArithOp::Mul,
            "/" => ArithOp::Div,
            other => {
                return Err(Error::configuration(format!(
                    "unknown arithmetic operator '{}'",
                    other
                )))
            }
        })
    }
}

/// An input to a computed function
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `$name`, a previously resolved field
    Variable(String),
    /// A constant
    Literal(Value),
    /// A nested function
    Expr(Box<ComputedExpr>),
}

/// Test of a conditional
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    /// Truthiness of one operand
    Truthy(Operand),
    /// `[left, operator, right]`
    Compare {
        /// Left operand
        left: Operand,
        /// Operator
        op: CompareOp,
        /// Right operand
        right: Operand,
    },
}

/// A computed function
#[derive(Debug, Clone, PartialEq)]
pub enum ComputedExpr {
    /// `_conditional_`
    Conditional {
        /// Test
        test: Test,
        /// Value when the test holds
        then: Operand,
        /// Value otherwise
        otherwise: Operand,
    },
    /// `_replace_`
    Replace {
        /// Text (or texts) to find
        search: Operand,
        /// Replacement (or replacements, pairwise)
        replace: Operand,
        /// Value the replacement applies to
        subject: Operand,
    },
    /// `_arithmetic_`
    Arithmetic {
        /// Left operand
        left: Operand,
        /// Operator
        op: ArithOp,
        /// Right operand
        right: Operand,
    },
}

/// A named computed field
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedField {
    /// Output field name
    pub name: String,
    /// Function producing the value
    pub expr: ComputedExpr,
}

impl Operand {
    fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.starts_with('$') && s.len() > 1 => {
                Ok(Operand::Variable(s[1..].to_string()))
            }
            Value::Object(map) if is_function(map) => {
                Ok(Operand::Expr(Box::new(ComputedExpr::parse(value)?)))
            }
            other => Ok(Operand::Literal(other.clone())),
        }
    }

    fn parse_arithmetic(value: &Value) -> Result<Self> {
        match value {
            Value::Array(_) => Ok(Operand::Expr(Box::new(ComputedExpr::parse_arithmetic(value)?))),
            other => Operand::parse(other),
        }
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Operand::Variable(name) => {
                out.insert(name.clone());
            }
            Operand::Literal(_) => {}
            Operand::Expr(expr) => expr.collect_variables(out),
        }
    }

    fn evaluate(&self, fields: &Map<String, Value>) -> Value {
        match self {
            Operand::Variable(name) => fields.get(name).cloned().unwrap_or(Value::Null),
            Operand::Literal(value) => value.clone(),
            Operand::Expr(expr) => expr.evaluate(fields),
        }
    }
}

fn is_function(map: &Map<String, Value>) -> bool {
    map.len() == 1
        && map
            .keys()
            .all(|k| matches!(k.as_str(), "_conditional_" | "_replace_" | "_arithmetic_"))
}

impl ComputedExpr {
    /// Parse `{"_function_": args}`
    pub fn parse(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .filter(|m| m.len() == 1)
            .ok_or_else(|| Error::configuration(format!("invalid computed value: {}", value)))?;
        let (function, args) = map
            .iter()
            .next()
            .ok_or_else(|| Error::configuration("empty computed value"))?;
        match function.as_str() {
            "_conditional_" => Self::parse_conditional(args),
            "_replace_" => Self::parse_replace(args),
            "_arithmetic_" => Self::parse_arithmetic(args),
            other => Err(Error::configuration(format!(
                "unknown computed function '{}'",
                other
            ))),
        }
    }

    fn parse_conditional(args: &Value) -> Result<Self> {
        let map = args
            .as_object()
            .ok_or_else(|| Error::configuration("_conditional_ takes an object"))?;
        reject_unknown(map, &["if", "then", "else"], "_conditional_")?;
        let test = match map.get("if") {
            Some(Value::Array(parts)) if parts.len() == 1 => Test::Truthy(Operand::parse(&parts[0])?),
            Some(Value::Array(parts)) if parts.len() == 3 => {
                let op = parts[1]
                    .as_str()
                    .ok_or_else(|| Error::configuration("comparison operator must be a string"))?;
                Test::Compare {
                    left: Operand::parse(&parts[0])?,
                    op: CompareOp::parse(op)?,
                    right: Operand::parse(&parts[2])?,
                }
            }
            Some(Value::Array(_)) => {
                return Err(Error::configuration(
                    "_conditional_ test must have one or three parts",
                ))
            }
            Some(single) => Test::Truthy(Operand::parse(single)?),
            None => return Err(Error::configuration("_conditional_ needs an 'if'")),
        };
        let then = map
            .get("then")
            .ok_or_else(|| Error::configuration("_conditional_ needs a 'then'"))?;
        let otherwise = map.get("else").unwrap_or(&Value::Null);
        Ok(ComputedExpr::Conditional {
            test,
            then: Operand::parse(then)?,
            otherwise: Operand::parse(otherwise)?,
        })
    }

    fn parse_replace(args: &Value) -> Result<Self> {
        let map = args
            .as_object()
            .ok_or_else(|| Error::configuration("_replace_ takes an object"))?;
        reject_unknown(map, &["search", "replace", "subject"], "_replace_")?;
        let operand = |key: &str| -> Result<Operand> {
            map.get(key)
                .ok_or_else(|| Error::configuration(format!("_replace_ needs a '{}'", key)))
                .and_then(Operand::parse)
        };
        Ok(ComputedExpr::Replace {
            search: operand("search")?,
            replace: operand("replace")?,
            subject: operand("subject")?,
        })
    }

    fn parse_arithmetic(args: &Value) -> Result<Self> {
        let parts = match args {
            Value::Array(parts) if parts.len() == 3 => parts,
            _ => {
                return Err(Error::configuration(
                    "_arithmetic_ takes exactly three operands: left, operator, right",
                ))
            }
        };
        let op = parts[1]
            .as_str()
            .ok_or_else(|| Error::configuration("arithmetic operator must be a string"))?;
        Ok(ComputedExpr::Arithmetic {
            left: Operand::parse_arithmetic(&parts[0])?,
            op: ArithOp::parse(op)?,
            right: Operand::parse_arithmetic(&parts[2])?,
        })
    }

    /// Every `$variable` referenced, including nested functions
    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            ComputedExpr::Conditional {
                test,
                then,
                otherwise,
            } => {
                match test {
                    Test::Truthy(operand) => operand.collect_variables(out),
                    Test::Compare { left, right, .. } => {
                        left.collect_variables(out);
                        right.collect_variables(out);
                    }
                }
                then.collect_variables(out);
                otherwise.collect_variables(out);
            }
            ComputedExpr::Replace {
                search,
                replace,
                subject,
            } => {
                search.collect_variables(out);
                replace.collect_variables(out);
                subject.collect_variables(out);
            }
            ComputedExpr::Arithmetic { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
        }
    }

    /// Evaluate against the fields resolved so far
    pub fn evaluate(&self, fields: &Map<String, Value>) -> Value {
        match self {
            ComputedExpr::Conditional {
                test,
                then,
                otherwise,
            } => {
                let holds = match test {
                    Test::Truthy(operand) => truthy(&operand.evaluate(fields)),
                    Test::Compare { left, op, right } => {
                        compare(&left.evaluate(fields), *op, &right.evaluate(fields))
                    }
                };
                if holds {
                    then.evaluate(fields)
                } else {
                    otherwise.evaluate(fields)
                }
            }
            ComputedExpr::Replace {
                search,
                replace,
                subject,
            } => {
                let pairs = replacement_pairs(&search.evaluate(fields), &replace.evaluate(fields));
                match subject.evaluate(fields) {
                    Value::Array(items) => Value::Array(
                        items
                            .iter()
                            .map(|item| Value::String(apply_replacements(&text(item), &pairs)))
                            .collect(),
                    ),
                    Value::Null => Value::Null,
                    other => Value::String(apply_replacements(&text(&other), &pairs)),
                }
            }
            ComputedExpr::Arithmetic { left, op, right } => {
                match (number(&left.evaluate(fields)), number(&right.evaluate(fields))) {
                    (Some(l), Some(r)) => arithmetic(l, *op, r),
                    _ => Value::Null,
                }
            }
        }
    }
}

fn reject_unknown(map: &Map<String, Value>, allowed: &[&str], function: &str) -> Result<()> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(Error::configuration(format!(
            "unknown {} key '{}'",
            function, key
        ))),
        None => Ok(()),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) if items.len() == 1 => number(&items[0]),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Contains => contains(left, right),
        CompareOp::NotContains => !contains(left, right),
        _ => {
            let ordering = match (number(left), number(right)) {
                (Some(l), Some(r)) => l.partial_cmp(&r),
                _ => Some(text(left).cmp(&text(right))),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CompareOp::Eq => ordering.is_eq(),
                CompareOp::Ne => ordering.is_ne(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Contains | CompareOp::NotContains => false,
            }
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    let needle = text(needle);
    match haystack {
        Value::Array(items) => items.iter().any(|item| text(item) == needle),
        other => text(other).contains(&needle),
    }
}

fn replacement_pairs(search: &Value, replace: &Value) -> Vec<(String, String)> {
    match (search, replace) {
        (Value::Array(searches), Value::Array(replaces)) => searches
            .iter()
            .zip(replaces.iter())
            .map(|(s, r)| (text(s), text(r)))
            .collect(),
        (Value::Array(searches), replace) => {
            let replace = text(replace);
            searches.iter().map(|s| (text(s), replace.clone())).collect()
        }
        (search, replace) => vec![(text(search), text(replace))],
    }
}

fn apply_replacements(subject: &str, pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .filter(|(search, _)| !search.is_empty())
        .fold(subject.to_string(), |acc, (search, replace)| {
            acc.replace(search.as_str(), replace)
        })
}

fn arithmetic(left: f64, op: ArithOp, right: f64) -> Value {
    let result = match op {
        ArithOp::Add => left + right,
        ArithOp::Sub => left - right,
        ArithOp::Mul => left * right,
        ArithOp::Div if right == 0.0 => return Value::Null,
        ArithOp::Div => left / right,
    };
    if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
        Value::Number(Number::from(result as i64))
    } else {
        Number::from_f64(result).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Map<String, Value> {
        json!({
            "title": "Wibble Wobble",
            "pages": "120",
            "price": 3,
            "tags": ["a", "b"],
            "empty": ""
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn eval(expr: Value) -> Value {
        ComputedExpr::parse(&expr).unwrap().evaluate(&fields())
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval(json!({"_conditional_": {"if": ["$empty"], "then": "yes", "else": "no"}})), json!("no"));
        assert_eq!(eval(json!({"_conditional_": {"if": ["$pages", ">", 100], "then": "long"}})), json!("long"));
        assert_eq!(eval(json!({"_conditional_": {"if": ["$tags", "contains", "b"], "then": 1, "else": 0}})), json!(1));
        assert_eq!(eval(json!({"_conditional_": {"if": ["$title", "not contains", "Wib"], "then": 1, "else": 0}})), json!(0));
        assert_eq!(eval(json!({"_conditional_": {"if": ["$missing"], "then": 1}})), Value::Null);
    }

    #[test]
    fn test_replace() {
        assert_eq!(
            eval(json!({"_replace_": {"search": "Wobble", "replace": "Bar", "subject": "$title"}})),
            json!("Wibble Bar")
        );
        assert_eq!(
            eval(json!({"_replace_": {"search": ["a", "b"], "replace": ["x", "y"], "subject": "$tags"}})),
            json!(["x", "y"])
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval(json!({"_arithmetic_": ["$pages", "/", "$price"]})), json!(40));
        assert_eq!(eval(json!({"_arithmetic_": [["$price", "*", 2], "+", 0.5]})), json!(6.5));
        assert_eq!(eval(json!({"_arithmetic_": ["$price", "/", 0]})), Value::Null);
        assert_eq!(eval(json!({"_arithmetic_": ["$title", "+", 1]})), Value::Null);
    }

    #[test]
    fn test_arithmetic_needs_three_operands() {
        assert!(ComputedExpr::parse(&json!({"_arithmetic_": [1, "+"]})).is_err());
        assert!(ComputedExpr::parse(&json!({"_arithmetic_": [1, "+", 2, "+", 3]})).is_err());
        assert!(ComputedExpr::parse(&json!({"_arithmetic_": [1, "%", 2]})).is_err());
    }

    #[test]
    fn test_unknown_functions_and_keys_rejected() {
        assert!(ComputedExpr::parse(&json!({"_concat_": ["a", "b"]})).is_err());
        assert!(ComputedExpr::parse(&json!({"_conditional_": {"if": [1], "then": 1, "elif": 2}})).is_err());
        assert!(ComputedExpr::parse(&json!({"_conditional_": {"if": [1, "~", 2], "then": 1}})).is_err());
    }

    #[test]
    fn test_collect_variables() {
        let expr = ComputedExpr::parse(&json!({
            "_conditional_": {"if": ["$a", "==", "x"], "then": {"_arithmetic_": ["$b", "+", 1]}, "else": "$c"}
        }))
        .unwrap();
        let mut vars = BTreeSet::new();
        expr.collect_variables(&mut vars);
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
