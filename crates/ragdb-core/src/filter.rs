//! Metadata filters
//!
//! A filter is a conjunction of `must` conditions and negated `must_not`
//! conditions over document metadata. Adapters either evaluate it in process
//! via [`Filter::matches`] or translate it into their backend's query language.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Metadata;

/// Single predicate over one metadata key.
///
/// An array-valued metadata entry matches `Equals` and `AnyOf` when any of
/// its elements does, and counts as absent for `Exists` when it is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// `metadata[key] == value`, or an element of it does
    Equals { key: String, value: Value },

    /// `metadata[key]` (or an element of it) equals one of `values`
    AnyOf { key: String, values: Vec<Value> },

    /// `metadata[key]` is present, not null, and not an empty array
    Exists { key: String },
}

impl Condition {
    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. } | Self::AnyOf { key, .. } | Self::Exists { key } => key,
        }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        let Some(stored) = metadata.get(self.key()) else {
            return false;
        };

        match self {
            Self::Equals { value, .. } => any_element(stored, |v| v == value),
            Self::AnyOf { values, .. } => any_element(stored, |v| values.contains(v)),
            Self::Exists { .. } => match stored {
                Value::Null => false,
                Value::Array(items) => !items.is_empty(),
                _ => true,
            },
        }
    }
}

/// Test the value itself, then each element when it is an array
fn any_element(stored: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    if pred(stored) {
        return true;
    }
    match stored {
        Value::Array(items) => items.iter().any(pred),
        _ => false,
    }
}

/// Metadata predicate for search, count, and list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub must: Vec<Condition>,

    #[serde(default)]
    pub must_not: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single equality filter
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().must_eq(key, value)
    }

    pub fn must_eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(Condition::Equals {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn must_any_of<V: Into<Value>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.must.push(Condition::AnyOf {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn must_exist(mut self, key: impl Into<String>) -> Self {
        self.must.push(Condition::Exists { key: key.into() });
        self
    }

    pub fn must_not(mut self, condition: Condition) -> Self {
        self.must_not.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    /// Evaluate against a document's metadata
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.must.iter().all(|c| c.matches(metadata))
            && !self.must_not.iter().any(|c| c.matches(metadata))
    }
}

/// `true` when `filter` is absent or matches
pub fn matches_optional(filter: Option<&Filter>, metadata: &Metadata) -> bool {
    filter.map_or(true, |f| f.matches(metadata))
}
