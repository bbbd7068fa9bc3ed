//! Where-Filter Algebra
//!
//! Boolean filters over document metadata: scalar equality, `$in`
//! membership, and `$and`/`$or` composition. Filters are built directly by
//! library code and parsed from the JSON shape used by the browse API:
//! `{"k": v}`, `{"k": {"$in": [...]}}`, `{"$and": [...]}`, `{"$or": [...]}`.

use serde_json::Value;

use crate::documents::Metadata;

/// Filter parsing error
#[derive(Debug, Clone, thiserror::Error)]
pub enum FilterError {
    #[error("Filter must be a JSON object")]
    NotAnObject,
    #[error("Operator {0} expects an array")]
    ExpectedArray(String),
    #[error("$in expects an array of scalars")]
    BadInClause,
}

/// A metadata filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `key == value`
    Eq(String, Value),
    /// `key IN values`
    In(String, Vec<Value>),
    /// All sub-filters match
    And(Vec<Filter>),
    /// Any sub-filter matches
    Or(Vec<Filter>),
}

impl Filter {
    /// `key == value`
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(key.into(), value.into())
    }

    /// `key IN values`
    pub fn is_in<V: Into<Value>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(key.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Evaluate against a metadata map.
    pub fn matches(&self, meta: &Metadata) -> bool {
        match self {
            Filter::Eq(key, value) => meta.get(key).map(|v| scalar_eq(v, value)).unwrap_or(false),
            Filter::In(key, values) => meta
                .get(key)
                .map(|v| values.iter().any(|candidate| scalar_eq(v, candidate)))
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(meta)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(meta)),
        }
    }

    /// Parse from the JSON filter shape. Multi-key objects are implicit
    /// `$and`s.
    pub fn from_value(value: &Value) -> std::result::Result<Self, FilterError> {
        let obj = value.as_object().ok_or(FilterError::NotAnObject)?;

        let mut parts = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            parts.push(Self::parse_entry(key, val)?);
        }

        match parts.len() {
            0 => Ok(Filter::And(vec![])),
            1 => Ok(parts.remove(0)),
            _ => Ok(Filter::And(parts)),
        }
    }

    fn parse_entry(key: &str, val: &Value) -> std::result::Result<Self, FilterError> {
        match key {
            "$and" | "$or" => {
                let arr = val
                    .as_array()
                    .ok_or_else(|| FilterError::ExpectedArray(key.to_string()))?;
                let parsed: std::result::Result<Vec<Filter>, FilterError> =
                    arr.iter().map(Self::from_value).collect();
                let parsed = parsed?;
                if key == "$and" {
                    Ok(Filter::And(parsed))
                } else {
                    Ok(Filter::Or(parsed))
                }
            }
            _ => {
                if let Some(inner) = val.as_object() {
                    let in_clause = inner.get("$in").ok_or(FilterError::BadInClause)?;
                    let values = in_clause.as_array().ok_or(FilterError::BadInClause)?;
                    Ok(Filter::In(key.to_string(), values.clone()))
                } else {
                    Ok(Filter::Eq(key.to_string(), val.clone()))
                }
            }
        }
    }

    /// Serialize back to the JSON filter shape.
    pub fn to_value(&self) -> Value {
        match self {
            Filter::Eq(key, value) => serde_json::json!({ key: value }),
            Filter::In(key, values) => serde_json::json!({ key: { "$in": values } }),
            Filter::And(filters) => {
                serde_json::json!({ "$and": filters.iter().map(Filter::to_value).collect::<Vec<_>>() })
            }
            Filter::Or(filters) => {
                serde_json::json!({ "$or": filters.iter().map(Filter::to_value).collect::<Vec<_>>() })
            }
        }
    }
}

/// Scalar equality with numeric cross-type comparison (1 == 1.0).
fn scalar_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::MetadataExt;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        let mut m = Metadata::new();
        for (k, v) in pairs {
            m.set_str(k, *v);
        }
        m
    }

    #[test]
    fn test_eq() {
        let m = meta(&[("type", "note")]);
        assert!(Filter::eq("type", "note").matches(&m));
        assert!(!Filter::eq("type", "code").matches(&m));
        assert!(!Filter::eq("missing", "x").matches(&m));
    }

    #[test]
    fn test_in() {
        let m = meta(&[("branch", "main")]);
        assert!(Filter::is_in("branch", ["main", "develop"]).matches(&m));
        assert!(!Filter::is_in("branch", ["feature-x"]).matches(&m));
    }

    #[test]
    fn test_and_or() {
        let m = meta(&[("type", "code"), ("repository", "demo")]);
        let filter = Filter::and(vec![
            Filter::eq("type", "code"),
            Filter::eq("repository", "demo"),
        ]);
        assert!(filter.matches(&m));

        let filter = Filter::or(vec![
            Filter::eq("type", "note"),
            Filter::eq("repository", "demo"),
        ]);
        assert!(filter.matches(&m));

        let filter = Filter::and(vec![
            Filter::eq("type", "note"),
            Filter::eq("repository", "demo"),
        ]);
        assert!(!filter.matches(&m));
    }

    #[test]
    fn test_numeric_cross_type_eq() {
        let mut m = Metadata::new();
        m.insert("chunk_index".into(), Value::from(3));
        assert!(Filter::eq("chunk_index", 3.0).matches(&m));
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::json!({
            "$and": [
                {"repository": "demo"},
                {"type": {"$in": ["code", "note"]}},
            ]
        });
        let filter = Filter::from_value(&json).unwrap();

        let m = meta(&[("repository", "demo"), ("type", "note")]);
        assert!(filter.matches(&m));

        let back = filter.to_value();
        assert_eq!(Filter::from_value(&back).unwrap(), filter);
    }

    #[test]
    fn test_multi_key_object_is_and() {
        let json = serde_json::json!({"type": "code", "repository": "demo"});
        let filter = Filter::from_value(&json).unwrap();
        assert!(matches!(filter, Filter::And(ref v) if v.len() == 2));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(Filter::from_value(&Value::String("nope".into())).is_err());
    }
}
