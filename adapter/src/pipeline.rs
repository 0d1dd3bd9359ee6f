//! Host request pipeline interface.
//!
//! The host framework owns parsing, validation and execution. It creates one
//! listener per request through [`ServerPlugin::request_did_start`] and calls
//! the listener at each checkpoint, in order:
//! parse → validate → resolve → execute → (errors)? → respond.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of a parsed GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    // ---
    /// Label value as it appears in the GraphQL document.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(OperationKind::Query),
            "mutation" => Ok(OperationKind::Mutation),
            "subscription" => Ok(OperationKind::Subscription),
            other => Err(format!("unknown operation kind '{other}'")),
        }
    }
}

/// Incoming request as submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    // ---
    #[serde(default)]
    pub query: Option<String>,

    /// Declared operation name, if the client sent one.
    #[serde(default)]
    pub operation_name: Option<String>,

    #[serde(default)]
    pub variables: Option<Value>,
}

impl GraphQLRequest {
    // ---
    pub fn named(operation_name: impl Into<String>) -> Self {
        // ---
        Self {
            operation_name: Some(operation_name.into()),
            ..Self::default()
        }
    }
}

/// A single error surfaced by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    // ---
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Value>,
}

impl GraphQLError {
    // ---
    pub fn new(message: impl Into<String>) -> Self {
        // ---
        Self {
            message: message.into(),
            path: None,
        }
    }
}

/// Outgoing response, including the free-form `extensions` bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    // ---
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// Read-only view of one request handed to each checkpoint.
///
/// `operation` is only known once the host has resolved the operation;
/// `response` is only set at the respond checkpoint.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    // ---
    pub request: GraphQLRequest,
    pub operation: Option<OperationKind>,
    pub response: Option<GraphQLResponse>,
    pub errors: Vec<GraphQLError>,
}

impl RequestContext {
    // ---
    pub fn new(request: GraphQLRequest) -> Self {
        // ---
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.request.operation_name.as_deref()
    }
}

/// Per-request checkpoint callbacks. Every hook defaults to a no-op.
pub trait RequestListener: Send {
    fn parsing_did_start(&self, _ctx: &RequestContext) {}

    fn validation_did_start(&self, _ctx: &RequestContext) {}

    fn did_resolve_operation(&self, _ctx: &RequestContext) {}

    fn execution_did_start(&self, _ctx: &RequestContext) {}

    fn did_encounter_errors(&self, _ctx: &RequestContext) {}

    fn will_send_response(&self, _ctx: &RequestContext) {}
}

/// A plugin the host consults once per incoming request.
pub trait ServerPlugin: Send + Sync {
    fn request_did_start(&self, ctx: &RequestContext) -> Box<dyn RequestListener>;
}
