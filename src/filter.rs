//! Metadata predicates in the `where` syntax used by Chroma-style vector stores.
//!
//! ```
//! use audiosearch::MetadataFilter;
//! use serde_json::json;
//!
//! let filter = MetadataFilter::from_json(&json!({
//!     "$and": [
//!         {"extension": ".wav"},
//!         {"duration_seconds": {"$lte": 2.0}}
//!     ]
//! })).unwrap();
//! assert!(matches!(filter, MetadataFilter::And(_)));
//! ```

use crate::traits::{Metadata, MetadataValue};
use anyhow::{Result, anyhow, bail};
use serde_json::Value;

/// A single field comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(MetadataValue),
    Ne(MetadataValue),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    In(Vec<MetadataValue>),
    NotIn(Vec<MetadataValue>),
}

/// Predicate over a record's metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Field { key: String, op: Comparison },
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        MetadataFilter::Field {
            key: key.into(),
            op: Comparison::Eq(value.into()),
        }
    }

    pub fn is_in<V: Into<MetadataValue>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        MetadataFilter::Field {
            key: key.into(),
            op: Comparison::In(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Evaluates the predicate. A record missing the key never matches that field.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            MetadataFilter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
            MetadataFilter::Field { key, op } => match metadata.get(key) {
                Some(value) => op.matches(value),
                None => false,
            },
        }
    }

    /// Parses a filter from its JSON form.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| anyhow!("filter must be a JSON object, got {}", value))?;
        if object.is_empty() {
            bail!("filter object is empty");
        }

        let mut clauses = Vec::with_capacity(object.len());
        for (key, operand) in object {
            let clause = match key.as_str() {
                "$and" => MetadataFilter::And(parse_filter_list(key, operand)?),
                "$or" => MetadataFilter::Or(parse_filter_list(key, operand)?),
                op if op.starts_with('$') => bail!("unknown logical operator '{}'", op),
                field => MetadataFilter::Field {
                    key: field.to_string(),
                    op: parse_comparison(field, operand)?,
                },
            };
            clauses.push(clause);
        }

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(MetadataFilter::And(clauses))
        }
    }
}

impl Comparison {
    fn matches(&self, value: &MetadataValue) -> bool {
        match self {
            Comparison::Eq(expected) => value.loosely_equals(expected),
            Comparison::Ne(expected) => !value.loosely_equals(expected),
            Comparison::Gt(bound) => value.as_f64().is_some_and(|v| v > *bound),
            Comparison::Gte(bound) => value.as_f64().is_some_and(|v| v >= *bound),
            Comparison::Lt(bound) => value.as_f64().is_some_and(|v| v < *bound),
            Comparison::Lte(bound) => value.as_f64().is_some_and(|v| v <= *bound),
            Comparison::In(options) => options.iter().any(|o| value.loosely_equals(o)),
            Comparison::NotIn(options) => !options.iter().any(|o| value.loosely_equals(o)),
        }
    }
}

fn parse_filter_list(op: &str, operand: &Value) -> Result<Vec<MetadataFilter>> {
    let items = operand
        .as_array()
        .ok_or_else(|| anyhow!("'{}' expects an array of filters", op))?;
    if items.is_empty() {
        bail!("'{}' expects at least one filter", op);
    }
    items.iter().map(MetadataFilter::from_json).collect()
}

fn parse_comparison(field: &str, operand: &Value) -> Result<Comparison> {
    let Some(object) = operand.as_object() else {
        return Ok(Comparison::Eq(scalar(field, operand)?));
    };
    if object.len() != 1 {
        bail!("field '{}' expects exactly one operator", field);
    }
    let Some((op, arg)) = object.iter().next() else {
        bail!("field '{}' expects exactly one operator", field);
    };
    let comparison = match op.as_str() {
        "$eq" => Comparison::Eq(scalar(field, arg)?),
        "$ne" => Comparison::Ne(scalar(field, arg)?),
        "$gt" => Comparison::Gt(number(field, op, arg)?),
        "$gte" => Comparison::Gte(number(field, op, arg)?),
        "$lt" => Comparison::Lt(number(field, op, arg)?),
        "$lte" => Comparison::Lte(number(field, op, arg)?),
        "$in" => Comparison::In(scalar_list(field, op, arg)?),
        "$nin" => Comparison::NotIn(scalar_list(field, op, arg)?),
        other => bail!("unknown operator '{}' for field '{}'", other, field),
    };
    Ok(comparison)
}

fn scalar(field: &str, value: &Value) -> Result<MetadataValue> {
    match value {
        Value::Bool(b) => Ok(MetadataValue::Bool(*b)),
        Value::String(s) => Ok(MetadataValue::Str(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(MetadataValue::Int(i)),
            None => n
                .as_f64()
                .map(MetadataValue::Float)
                .ok_or_else(|| anyhow!("field '{}' has an unrepresentable number", field)),
        },
        other => bail!("field '{}' expects a scalar value, got {}", field, other),
    }
}

fn number(field: &str, op: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| anyhow!("'{}' on field '{}' expects a number", op, field))
}

fn scalar_list(field: &str, op: &str, value: &Value) -> Result<Vec<MetadataValue>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("'{}' on field '{}' expects an array", op, field))?;
    items.iter().map(|item| scalar(field, item)).collect()
}
