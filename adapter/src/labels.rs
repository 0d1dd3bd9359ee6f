//! Label sets with explicit omission of absent values.
//!
//! A candidate value only becomes a label when [`LabelValue::to_label`]
//! yields something: `None`, the empty string and numeric zero are dropped
//! rather than stored as `""`.

use crate::pipeline::OperationKind;
use std::collections::{BTreeMap, HashMap};

pub const OPERATION_NAME: &str = "operationName";
pub const OPERATION: &str = "operation";
pub const PARENT_TYPE: &str = "parentType";
pub const FIELD_NAME: &str = "fieldName";
pub const RETURN_TYPE: &str = "returnType";

/// Labels attached to every request-scoped instrument.
pub const REQUEST_LABELS: [&str; 2] = [OPERATION_NAME, OPERATION];

/// Labels attached to the per-field resolver histogram.
pub const RESOLVER_LABELS: [&str; 3] = [PARENT_TYPE, FIELD_NAME, RETURN_TYPE];

/// A value that may or may not produce a label.
///
/// Every accepted value is coerced to a string here, so instruments only
/// ever see string label values.
pub trait LabelValue {
    fn to_label(&self) -> Option<String>;
}

impl LabelValue for str {
    fn to_label(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.to_owned())
    }
}

impl LabelValue for &str {
    fn to_label(&self) -> Option<String> {
        (**self).to_label()
    }
}

impl LabelValue for String {
    fn to_label(&self) -> Option<String> {
        self.as_str().to_label()
    }
}

impl LabelValue for OperationKind {
    fn to_label(&self) -> Option<String> {
        Some(self.as_str().to_owned())
    }
}

impl LabelValue for i64 {
    fn to_label(&self) -> Option<String> {
        (*self != 0).then(|| self.to_string())
    }
}

impl LabelValue for u64 {
    fn to_label(&self) -> Option<String> {
        (*self != 0).then(|| self.to_string())
    }
}

impl<T: LabelValue> LabelValue for Option<T> {
    fn to_label(&self) -> Option<String> {
        self.as_ref().and_then(|v| v.to_label())
    }
}

/// Ordered label name → value mapping for one observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelSet {
    // ---
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` only if `value` is present.
    pub fn with(mut self, name: &str, value: impl LabelValue) -> Self {
        // ---
        if let Some(v) = value.to_label() {
            self.labels.insert(name.to_owned(), v);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy suitable for `prometheus` constant labels.
    pub fn to_hash_map(&self) -> HashMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }
}
