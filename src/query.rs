//! Predicate evaluation over decrypted records
//!
//! The query surface is a small tagged expression tree: comparison leaves
//! over the uniform field set, combined with and/or/not. It is evaluated
//! directly, with no embedded expression evaluator, keeping the surface
//! auditable and free of injection risk.
//!
//! A field referenced by a predicate but absent from a record makes the
//! comparison false, never an error, so heterogeneous records stay
//! queryable without schema coordination.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::PlaintextRecord;

/// Comparison operator for a predicate leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A boolean filter expression over record fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    /// Compare a field against a literal value
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn compare(field: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluate this predicate against one record.
    ///
    /// Boolean combinators short-circuit; a missing field fails its
    /// comparison rather than raising an error.
    pub fn matches(&self, record: &PlaintextRecord) -> bool {
        match self {
            Predicate::Compare { field, op, value } => match record.field(field) {
                Some(actual) => compare_values(actual, *op, value),
                None => false,
            },
            Predicate::And(a, b) => a.matches(record) && b.matches(record),
            Predicate::Or(a, b) => a.matches(record) || b.matches(record),
            Predicate::Not(inner) => !inner.matches(record),
        }
    }
}

/// Evaluate a predicate against a batch of records.
///
/// A stable filter: output ordering matches input ordering, no implicit
/// sort. An empty input yields an empty result. Records carry only
/// metadata and payload fields, so ciphertext and key material can never
/// appear in the output.
pub fn evaluate(records: Vec<PlaintextRecord>, predicate: &Predicate) -> Vec<PlaintextRecord> {
    records
        .into_iter()
        .filter(|record| predicate.matches(record))
        .collect()
}

fn compare_values(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Lt => matches!(values_order(actual, expected), Some(Ordering::Less)),
        CompareOp::Le => matches!(
            values_order(actual, expected),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        CompareOp::Gt => matches!(values_order(actual, expected), Some(Ordering::Greater)),
        CompareOp::Ge => matches!(
            values_order(actual, expected),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
    }
}

/// Equality with numeric coercion: 512 and 512.0 are the same value.
/// Everything else falls back to structural equality.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering is defined for number pairs (numeric) and string pairs
/// (lexicographic). Cross-type comparisons have no ordering, so the
/// comparison fails.
fn values_order(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    None
}
