//! Portable metadata filter expressions.
//!
//! Expressions are built with the free functions in this module and can either be
//! evaluated against a document's metadata (in-memory stores) or converted into a
//! vendor filter (see [`to_qdrant_filter`]).
//!
//! ```rust
//! use ai_client_rust::vectorstore::filter::{and, eq, gte};
//!
//! let expr = and(eq("genre", "drama"), gte("year", 2020));
//! assert_eq!(expr.to_string(), "genre == \"drama\" && year >= 2020");
//! ```

use crate::types::Metadata;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// Serializes externally tagged, e.g. `{"and": [left, right]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Compare {
        op: CompareOp,
        key: String,
        value: Value,
    },
    /// `key in values`, or `key not in values` when `negated`.
    In {
        key: String,
        values: Vec<Value>,
        negated: bool,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

fn compare(op: CompareOp, key: impl Into<String>, value: impl Into<Value>) -> Expression {
    Expression::Compare {
        op,
        key: key.into(),
        value: value.into(),
    }
}

pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Expression {
    compare(CompareOp::Eq, key, value)
}

pub fn ne(key: impl Into<String>, value: impl Into<Value>) -> Expression {
    compare(CompareOp::Ne, key, value)
}

pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> Expression {
    compare(CompareOp::Gt, key, value)
}

pub fn gte(key: impl Into<String>, value: impl Into<Value>) -> Expression {
    compare(CompareOp::Gte, key, value)
}

pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> Expression {
    compare(CompareOp::Lt, key, value)
}

pub fn lte(key: impl Into<String>, value: impl Into<Value>) -> Expression {
    compare(CompareOp::Lte, key, value)
}

pub fn in_<V: Into<Value>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expression {
    Expression::In {
        key: key.into(),
        values: values.into_iter().map(Into::into).collect(),
        negated: false,
    }
}

pub fn nin<V: Into<Value>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expression {
    Expression::In {
        key: key.into(),
        values: values.into_iter().map(Into::into).collect(),
        negated: true,
    }
}

pub fn and(left: Expression, right: Expression) -> Expression {
    Expression::And(Box::new(left), Box::new(right))
}

pub fn or(left: Expression, right: Expression) -> Expression {
    Expression::Or(Box::new(left), Box::new(right))
}

pub fn not(inner: Expression) -> Expression {
    Expression::Not(Box::new(inner))
}

/// Numbers compare numerically, strings lexicographically, anything else only by equality.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn same(a: &Value, b: &Value) -> bool {
    order(a, b) == Some(Ordering::Equal) || a == b
}

impl Expression {
    /// Evaluate against document metadata. A missing key never matches a comparison.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Expression::Compare { op, key, value } => {
                let Some(actual) = metadata.get(key) else {
                    return false;
                };
                match op {
                    CompareOp::Eq => same(actual, value),
                    CompareOp::Ne => !same(actual, value),
                    CompareOp::Gt => order(actual, value) == Some(Ordering::Greater),
                    CompareOp::Gte => matches!(
                        order(actual, value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CompareOp::Lt => order(actual, value) == Some(Ordering::Less),
                    CompareOp::Lte => {
                        matches!(order(actual, value), Some(Ordering::Less | Ordering::Equal))
                    }
                }
            }
            Expression::In {
                key,
                values,
                negated,
            } => {
                let found = metadata
                    .get(key)
                    .map(|actual| values.iter().any(|v| same(actual, v)))
                    .unwrap_or(false);
                found != *negated
            }
            Expression::And(l, r) => l.matches(metadata) && r.matches(metadata),
            Expression::Or(l, r) => l.matches(metadata) || r.matches(metadata),
            Expression::Not(inner) => !inner.matches(metadata),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Compare { op, key, value } => write!(f, "{} {} {}", key, op.symbol(), value),
            Expression::In {
                key,
                values,
                negated,
            } => {
                let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                let op = if *negated { "nin" } else { "in" };
                write!(f, "{} {} [{}]", key, op, list.join(", "))
            }
            Expression::And(l, r) => write!(f, "{} && {}", l, r),
            Expression::Or(l, r) => write!(f, "({} || {})", l, r),
            Expression::Not(inner) => write!(f, "not({})", inner),
        }
    }
}

fn unsupported(detail: String) -> Error {
    Error::validation_with_context(
        "Unsupported filter expression for Qdrant",
        ErrorContext::new()
            .with_details(detail)
            .with_source("qdrant_filter"),
    )
}

fn match_value(key: &str, value: &Value) -> Result<Value> {
    match value {
        Value::String(_) | Value::Bool(_) => Ok(json!({"key": key, "match": {"value": value}})),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            Ok(json!({"key": key, "match": {"value": value}}))
        }
        // Qdrant has no exact float match; use a closed range.
        Value::Number(_) => Ok(json!({"key": key, "range": {"gte": value, "lte": value}})),
        other => Err(unsupported(format!("cannot match '{}' against {}", key, other))),
    }
}

fn range(key: &str, bound: &str, value: &Value) -> Result<Value> {
    if !value.is_number() {
        return Err(unsupported(format!(
            "range on '{}' requires a number, got {}",
            key, value
        )));
    }
    Ok(json!({"key": key, "range": {bound: value}}))
}

/// Convert an expression into a Qdrant REST `filter` object.
pub fn to_qdrant_filter(expression: &Expression) -> Result<Value> {
    let condition = to_qdrant_condition(expression)?;
    // Bare field conditions must be wrapped; nested filters already are.
    if condition.get("key").is_some() {
        return Ok(json!({"must": [condition]}));
    }
    Ok(condition)
}

fn to_qdrant_condition(expression: &Expression) -> Result<Value> {
    match expression {
        Expression::Compare { op, key, value } => match op {
            CompareOp::Eq => match_value(key, value),
            CompareOp::Ne => Ok(json!({"must_not": [match_value(key, value)?]})),
            CompareOp::Gt => range(key, "gt", value),
            CompareOp::Gte => range(key, "gte", value),
            CompareOp::Lt => range(key, "lt", value),
            CompareOp::Lte => range(key, "lte", value),
        },
        Expression::In {
            key,
            values,
            negated,
        } => {
            let kind = if *negated { "except" } else { "any" };
            Ok(json!({"key": key, "match": {kind: values}}))
        }
        Expression::And(l, r) => Ok(json!({
            "must": [to_qdrant_condition(l)?, to_qdrant_condition(r)?]
        })),
        Expression::Or(l, r) => Ok(json!({
            "should": [to_qdrant_condition(l)?, to_qdrant_condition(r)?]
        })),
        Expression::Not(inner) => Ok(json!({"must_not": [to_qdrant_condition(inner)?]})),
    }
}
