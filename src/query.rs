//! Query model and filter evaluation.
//!
//! A query is a conjunction of field filters plus skip/limit pagination.
//! Equality operators compare canonical value strings. Ordering operators
//! compare numerically when both operands are JSON numbers and fall back
//! to lexicographic comparison of the canonical strings otherwise; mixed
//! operand types therefore order by their string forms, which is a
//! documented sharp edge.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{canonical_string, Document};

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal (canonical string comparison)
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Membership in a JSON array operand
    In,
}

/// A single field constraint within a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Field to test; `_id` addresses the document id
    pub field: String,
    /// Comparison operator
    pub operator: FilterOp,
    /// Operand value
    pub value: Value,
}

/// A find request: all filters must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Conjunctive filters; empty matches every document
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    /// Maximum number of results; 0 means unlimited
    #[serde(default)]
    pub limit: usize,
    /// Number of results to drop before applying the limit
    #[serde(default)]
    pub skip: usize,
}

impl Query {
    /// A query matching every document.
    pub fn all() -> Self {
        Self::default()
    }
}

/// Tests a document against every filter in the query.
pub fn matches_all_filters(doc: &Document, filters: &[QueryFilter]) -> bool {
    filters.iter().all(|filter| matches_filter(doc, filter))
}

/// Tests a document against a single filter. A document lacking the
/// filtered field never matches.
pub fn matches_filter(doc: &Document, filter: &QueryFilter) -> bool {
    let Some(value) = doc.get_value(&filter.field) else {
        return false;
    };

    match filter.operator {
        FilterOp::Eq => canonical_string(&value) == canonical_string(&filter.value),
        FilterOp::Ne => canonical_string(&value) != canonical_string(&filter.value),
        FilterOp::Gt => compare_values(&value, &filter.value) == Ordering::Greater,
        FilterOp::Gte => compare_values(&value, &filter.value) != Ordering::Less,
        FilterOp::Lt => compare_values(&value, &filter.value) == Ordering::Less,
        FilterOp::Lte => compare_values(&value, &filter.value) != Ordering::Greater,
        FilterOp::In => match &filter.value {
            Value::Array(candidates) => {
                let key = canonical_string(&value);
                candidates.iter().any(|item| canonical_string(item) == key)
            }
            // Non-array operand matches nothing.
            _ => false,
        },
    }
}

/// Total order over JSON values: numeric when both operands are numbers,
/// lexicographic over canonical strings otherwise.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    canonical_string(a).cmp(&canonical_string(b))
}
