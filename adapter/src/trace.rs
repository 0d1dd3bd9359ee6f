//! Per-request timing data attached to a response under the `tracing`
//! extension key.
//!
//! The payload is versioned. Version 1 follows the Apollo tracing format;
//! any other version decodes to [`TracingPayload::Unsupported`] and is
//! ignored by consumers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Extension key the tracing producer writes under.
pub const TRACING_EXTENSION_KEY: &str = "tracing";

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Converts a nanosecond duration to seconds.
pub fn nanos_to_secs(nanos: f64) -> f64 {
    nanos / NANOS_PER_SEC
}

/// Reads a non-negative nanosecond count. Producers normally write
/// integers, but a float such as `1.5e9` is accepted as well.
fn nanos(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
}

/// Tracing extension, discriminated by its `version` field.
#[derive(Debug, Clone, PartialEq)]
pub enum TracingPayload {
    V1(TraceV1),
    Unsupported { version: f64 },
}

impl TracingPayload {
    // ---
    /// Reads the payload out of a response's extensions.
    ///
    /// Returns `None` when the key is missing or carries no numeric version.
    pub fn from_extensions(extensions: &Map<String, Value>) -> Option<Self> {
        // ---
        extensions.get(TRACING_EXTENSION_KEY).and_then(Self::from_value)
    }

    pub fn from_value(raw: &Value) -> Option<Self> {
        // ---
        let Some(version) = raw.get("version").and_then(Value::as_f64) else {
            debug!("tracing extension has no numeric version, ignoring");
            return None;
        };

        if version == 1.0 {
            Some(TracingPayload::V1(TraceV1::from_value(raw)))
        } else {
            Some(TracingPayload::Unsupported { version })
        }
    }
}

/// Version 1 tracing body.
///
/// Decoded field by field: a missing total or a bad resolver entry only
/// loses that piece, not the rest of the trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceV1 {
    // ---
    pub start_time: Option<String>,
    pub end_time: Option<String>,

    /// Whole request, nanoseconds.
    pub duration: Option<f64>,

    pub parsing: Option<PhaseTrace>,
    pub validation: Option<PhaseTrace>,

    /// Field resolutions in the order the producer reported them.
    pub resolvers: Vec<ResolverTrace>,
}

impl TraceV1 {
    // ---
    pub fn from_value(raw: &Value) -> Self {
        // ---
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_owned);
        let phase = |key: &str| raw.get(key).and_then(|v| PhaseTrace::deserialize(v).ok());

        let duration = nanos(raw.get("duration"));
        if duration.is_none() {
            warn!("version 1 tracing extension has no usable duration");
        }

        let entries = raw
            .get("execution")
            .and_then(|e| e.get("resolvers"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let resolvers = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match ResolverTrace::deserialize(entry) {
                Ok(resolver) if resolver.duration.is_finite() && resolver.duration >= 0.0 => {
                    Some(resolver)
                }
                Ok(_) => {
                    warn!("skipping resolver trace {}: negative duration", index);
                    None
                }
                Err(e) => {
                    warn!("skipping resolver trace {}: {}", index, e);
                    None
                }
            })
            .collect();

        Self {
            start_time: text("startTime"),
            end_time: text("endTime"),
            duration,
            parsing: phase("parsing"),
            validation: phase("validation"),
            resolvers,
        }
    }

    pub fn total_seconds(&self) -> Option<f64> {
        self.duration.map(nanos_to_secs)
    }

    pub fn resolvers(&self) -> &[ResolverTrace] {
        &self.resolvers
    }
}

/// Offset and duration of a single pipeline phase, nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTrace {
    pub start_offset: f64,
    pub duration: f64,
}

/// Timing of one resolved field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverTrace {
    // ---
    #[serde(default)]
    pub path: Vec<Value>,

    pub parent_type: String,
    pub field_name: String,
    pub return_type: String,

    #[serde(default)]
    pub start_offset: f64,

    /// Nanoseconds.
    pub duration: f64,
}

impl ResolverTrace {
    // ---
    pub fn seconds(&self) -> f64 {
        nanos_to_secs(self.duration)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn extensions(tracing: Value) -> Map<String, Value> {
        // ---
        let mut ext = Map::new();
        ext.insert(TRACING_EXTENSION_KEY.to_owned(), tracing);
        ext
    }

    #[test]
    fn decodes_apollo_v1_payload() {
        // ---
        let ext = extensions(json!({
            "version": 1,
            "startTime": "2024-01-01T00:00:00.000Z",
            "endTime": "2024-01-01T00:00:02.000Z",
            "duration": 2_000_000_000u64,
            "parsing": { "startOffset": 10, "duration": 20 },
            "validation": { "startOffset": 30, "duration": 40 },
            "execution": {
                "resolvers": [{
                    "path": ["user"],
                    "parentType": "Query",
                    "fieldName": "user",
                    "returnType": "User",
                    "startOffset": 100,
                    "duration": 500_000_000u64
                }]
            }
        }));

        let Some(TracingPayload::V1(trace)) = TracingPayload::from_extensions(&ext) else {
            panic!("expected a version 1 payload");
        };
        assert_eq!(trace.total_seconds(), Some(2.0));
        assert_eq!(trace.end_time.as_deref(), Some("2024-01-01T00:00:02.000Z"));
        assert_eq!(trace.resolvers().len(), 1);
        assert_eq!(trace.resolvers()[0].field_name, "user");
        assert_eq!(trace.resolvers()[0].seconds(), 0.5);
        assert_eq!(trace.parsing.map(|p| p.duration), Some(20.0));
    }

    #[test]
    fn other_versions_are_unsupported_not_errors() {
        // ---
        let ext = extensions(json!({ "version": 2, "duration": "whatever" }));
        let payload = TracingPayload::from_extensions(&ext);
        assert_eq!(payload, Some(TracingPayload::Unsupported { version: 2.0 }));
    }

    #[test]
    fn missing_key_or_version_yields_nothing() {
        // ---
        assert_eq!(TracingPayload::from_extensions(&Map::new()), None);
        assert_eq!(
            TracingPayload::from_extensions(&extensions(json!({ "duration": 5 }))),
            None
        );
    }

    #[test]
    fn unusable_total_keeps_resolvers() {
        // ---
        let ext = extensions(json!({
            "version": 1,
            "duration": -3,
            "execution": { "resolvers": [
                { "parentType": "Query", "fieldName": "a", "returnType": "A", "duration": 7 }
            ]}
        }));
        let Some(TracingPayload::V1(trace)) = TracingPayload::from_extensions(&ext) else {
            panic!("expected a version 1 payload");
        };
        assert_eq!(trace.total_seconds(), None);
        assert_eq!(trace.resolvers().len(), 1);
    }

    #[test]
    fn bad_resolver_entries_are_skipped_individually() {
        // ---
        let ext = extensions(json!({
            "version": 1,
            "duration": 1000,
            "execution": { "resolvers": [
                { "parentType": "Query", "fieldName": "a", "returnType": "A", "duration": 10 },
                { "parentType": "Query", "fieldName": "b", "returnType": null, "duration": 10 },
                { "parentType": "Query", "fieldName": "c", "returnType": "C" },
                { "parentType": "Query", "fieldName": "d", "returnType": "D", "duration": -1 },
                { "parentType": "Query", "fieldName": "e", "returnType": "E", "duration": 20 }
            ]}
        }));
        let Some(TracingPayload::V1(trace)) = TracingPayload::from_extensions(&ext) else {
            panic!("expected a version 1 payload");
        };

        let kept: Vec<&str> = trace.resolvers().iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(kept, vec!["a", "e"]);
        assert_eq!(trace.total_seconds(), Some(0.000_001));
    }

    #[test]
    fn float_encoded_numbers_are_accepted() {
        // ---
        let ext = extensions(json!({
            "version": 1.0,
            "duration": 1.5e9,
            "execution": { "resolvers": [
                { "parentType": "Query", "fieldName": "a", "returnType": "A", "duration": 2.5e8 }
            ]}
        }));
        let Some(TracingPayload::V1(trace)) = TracingPayload::from_extensions(&ext) else {
            panic!("expected a version 1 payload");
        };
        assert_eq!(trace.total_seconds(), Some(1.5));
        assert_eq!(trace.resolvers()[0].seconds(), 0.25);

        let ext = extensions(json!({ "version": 1.5, "duration": 1 }));
        assert_eq!(
            TracingPayload::from_extensions(&ext),
            Some(TracingPayload::Unsupported { version: 1.5 })
        );
    }

    #[test]
    fn v1_without_execution_has_no_resolvers() {
        // ---
        let ext = extensions(json!({ "version": 1, "duration": 1_000 }));
        let Some(TracingPayload::V1(trace)) = TracingPayload::from_extensions(&ext) else {
            panic!("expected a version 1 payload");
        };
        assert!(trace.resolvers().is_empty());
        assert_eq!(nanos_to_secs(1_000.0), 0.000_001);
    }
}
