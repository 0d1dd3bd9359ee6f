//! Replays recorded GraphQL request lifecycles through a pipeline plugin.
//!
//! Each input line is one JSON [`RecordedRequest`]. The replayer plays the
//! part of the host pipeline: it builds the request context, hands it to the
//! plugin and fires the checkpoints in host order, stopping early when the
//! recording says the request failed in some phase.

use anyhow::{Context, Result};
use graphql_metrics::{
    GraphQLError, GraphQLRequest, GraphQLResponse, OperationKind, RequestContext, ServerPlugin,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::BufRead;
use tracing::{debug, info};

/// Pipeline phase a recorded request failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parse,
    Validate,
    Resolve,
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Parse => "parse",
            Phase::Validate => "validate",
            Phase::Resolve => "resolve",
            Phase::Execute => "execute",
        };
        f.write_str(s)
    }
}

/// One recorded request, as read from a JSON line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRequest {
    // ---
    #[serde(default)]
    pub operation_name: Option<String>,

    #[serde(default)]
    pub query: Option<String>,

    /// Operation kind the host resolved, if it got that far.
    #[serde(default)]
    pub operation: Option<OperationKind>,

    #[serde(default)]
    pub failed_at: Option<Phase>,

    /// Errors surfaced to the client. Non-empty without `failedAt` means
    /// execution produced field errors.
    #[serde(default)]
    pub errors: Vec<GraphQLError>,

    #[serde(default)]
    pub data: Option<Value>,

    /// Response extensions, e.g. the `tracing` payload.
    #[serde(default)]
    pub extensions: Map<String, Value>,
}

/// Counts gathered while replaying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    // ---
    pub requests: u64,
    pub errored: u64,
    pub traced: u64,
}

/// What happened to a single replayed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub errored: bool,
    pub traced: bool,
}

/// Drives one recorded request through every checkpoint it reached.
pub fn replay_request(plugin: &dyn ServerPlugin, recorded: &RecordedRequest) -> ReplayOutcome {
    // ---
    let mut ctx = RequestContext::new(GraphQLRequest {
        query: recorded.query.clone(),
        operation_name: recorded.operation_name.clone(),
        variables: None,
    });
    let listener = plugin.request_did_start(&ctx);
    let failed = |phase: Phase| recorded.failed_at == Some(phase);

    listener.parsing_did_start(&ctx);

    let reached_execution = if failed(Phase::Parse) {
        false
    } else {
        listener.validation_did_start(&ctx);
        if failed(Phase::Validate) || failed(Phase::Resolve) {
            false
        } else {
            ctx.operation = recorded.operation;
            listener.did_resolve_operation(&ctx);
            listener.execution_did_start(&ctx);
            true
        }
    };

    let errored = !reached_execution || failed(Phase::Execute) || !recorded.errors.is_empty();
    if errored {
        ctx.errors = if recorded.errors.is_empty() {
            let phase = recorded.failed_at.unwrap_or(Phase::Execute);
            vec![GraphQLError::new(format!("request failed during {phase}"))]
        } else {
            recorded.errors.clone()
        };
        listener.did_encounter_errors(&ctx);
    }

    let traced = recorded.extensions.contains_key(graphql_metrics::TRACING_EXTENSION_KEY);
    ctx.response = Some(GraphQLResponse {
        data: if reached_execution { recorded.data.clone() } else { None },
        errors: ctx.errors.clone(),
        extensions: recorded.extensions.clone(),
    });
    listener.will_send_response(&ctx);

    debug!(
        operation_name = recorded.operation_name.as_deref().unwrap_or(""),
        errored, traced, "replayed request"
    );
    ReplayOutcome { errored, traced }
}

/// Replays every JSON line from `reader`. Blank lines are skipped.
///
/// # Errors
///
/// Returns error on read failure or on a line that is not a valid
/// recorded request. Requests before the bad line have already been replayed.
pub fn replay_reader<R: BufRead>(plugin: &dyn ServerPlugin, reader: R) -> Result<ReplaySummary> {
    // ---
    let mut summary = ReplaySummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let recorded: RecordedRequest = serde_json::from_str(&line)
            .with_context(|| format!("line {line_no}: invalid recorded request"))?;
        let outcome = replay_request(plugin, &recorded);

        summary.requests += 1;
        summary.errored += u64::from(outcome.errored);
        summary.traced += u64::from(outcome.traced);
    }

    info!(
        "Replayed {} requests ({} errored, {} traced)",
        summary.requests, summary.errored, summary.traced
    );
    Ok(summary)
}
