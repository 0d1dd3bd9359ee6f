//! Metrics plugin: maps pipeline checkpoints to instrument updates.

use crate::labels::{LabelSet, OPERATION, OPERATION_NAME, REQUEST_LABELS, RESOLVER_LABELS};
use crate::pipeline::{RequestContext, RequestListener, ServerPlugin};
use crate::sparse::{SparseCounterVec, SparseHistogramVec, SparseOpts};
use crate::trace::{TraceV1, TracingPayload};
use prometheus::{HistogramOpts, HistogramVec, Registry, Result};
use std::sync::Arc;
use tracing::{debug, warn};

pub const QUERIES_PARSED: &str = "graphql_queries_parsed";
pub const QUERIES_VALIDATION_STARTED: &str = "graphql_queries_validation_started";
pub const QUERIES_RESOLVED: &str = "graphql_queries_resolved";
pub const QUERIES_EXECUTION_STARTED: &str = "graphql_queries_execution_started";
pub const QUERIES_ERRORED: &str = "graphql_queries_errored";
pub const QUERIES_RESPONDED: &str = "graphql_queries_responded";
pub const RESOLVER_TIME: &str = "graphql_resolver_time";
pub const TOTAL_REQUEST_TIME: &str = "graphql_total_request_time";

/// Plugin behavior knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsPluginConfig {
    // ---
    /// Emit the resolver timings of every traced response at `debug` level.
    pub log_resolvers: bool,
}

/// Instrument handles. The registry owns the registrations.
struct Instruments {
    parsed: SparseCounterVec,
    validation_started: SparseCounterVec,
    resolved: SparseCounterVec,
    execution_started: SparseCounterVec,
    errored: SparseCounterVec,
    responded: SparseCounterVec,
    resolver_time: HistogramVec,
    total_request_time: SparseHistogramVec,
}

impl Instruments {
    // ---
    fn register(registry: &Registry) -> Result<Self> {
        // ---
        let counter = |name: &str, help: &str| {
            SparseCounterVec::register(SparseOpts::new(name, help, &REQUEST_LABELS), registry)
        };

        let parsed = counter(
            QUERIES_PARSED,
            "The amount of GraphQL queries that have been parsed.",
        )?;
        let validation_started = counter(
            QUERIES_VALIDATION_STARTED,
            "The amount of GraphQL queries that have started validation.",
        )?;
        let resolved = counter(
            QUERIES_RESOLVED,
            "The amount of GraphQL queries that have had their operation resolved.",
        )?;
        let execution_started = counter(
            QUERIES_EXECUTION_STARTED,
            "The amount of GraphQL queries that have started executing.",
        )?;
        let errored = counter(
            QUERIES_ERRORED,
            "The amount of GraphQL queries that have encountered errors.",
        )?;
        let responded = counter(
            QUERIES_RESPONDED,
            "The amount of GraphQL queries that have been executed and been attempted \
             to send to the client. This includes requests with errors.",
        )?;

        let resolver_time = HistogramVec::new(
            HistogramOpts::new(RESOLVER_TIME, "The time to resolve a GraphQL field."),
            &RESOLVER_LABELS,
        )?;
        registry.register(Box::new(resolver_time.clone()))?;

        let total_request_time = SparseHistogramVec::register(
            SparseOpts::new(
                TOTAL_REQUEST_TIME,
                "The time to complete a GraphQL query.",
                &REQUEST_LABELS,
            ),
            registry,
        )?;

        Ok(Self {
            parsed,
            validation_started,
            resolved,
            execution_started,
            errored,
            responded,
            resolver_time,
            total_request_time,
        })
    }
}

/// Pipeline plugin recording request lifecycle metrics.
///
/// Holds no per-request state. Every listener it hands out shares the same
/// instrument handles, which are safe to update from concurrent requests.
#[derive(Clone)]
pub struct MetricsPlugin {
    // ---
    instruments: Arc<Instruments>,
    config: MetricsPluginConfig,
}

/// Registers the GraphQL instruments on `registry` and returns the plugin.
///
/// # Errors
///
/// Propagates any registry error unchanged, e.g. when the metric names are
/// already registered on `registry`.
pub fn create_metrics_plugin(registry: &Registry) -> Result<MetricsPlugin> {
    MetricsPlugin::with_config(registry, MetricsPluginConfig::default())
}

impl MetricsPlugin {
    // ---
    pub fn with_config(registry: &Registry, config: MetricsPluginConfig) -> Result<Self> {
        // ---
        let instruments = Instruments::register(registry)?;
        debug!("registered GraphQL metrics instruments");

        Ok(Self {
            instruments: Arc::new(instruments),
            config,
        })
    }

    pub fn config(&self) -> MetricsPluginConfig {
        self.config
    }

    /// Listener for one request. Same as [`ServerPlugin::request_did_start`]
    /// without the boxing.
    pub fn listener(&self) -> MetricsListener {
        // ---
        MetricsListener {
            instruments: Arc::clone(&self.instruments),
            config: self.config,
        }
    }
}

impl ServerPlugin for MetricsPlugin {
    fn request_did_start(&self, _ctx: &RequestContext) -> Box<dyn RequestListener> {
        Box::new(self.listener())
    }
}

/// Labels shared by every request-scoped instrument.
///
/// A missing operation name counts as empty and is therefore omitted, as is
/// an operation kind that has not been resolved yet.
pub fn request_labels(ctx: &RequestContext) -> LabelSet {
    // ---
    LabelSet::new()
        .with(OPERATION_NAME, ctx.operation_name().unwrap_or(""))
        .with(OPERATION, ctx.operation)
}

fn increment(family: &SparseCounterVec, labels: &LabelSet) {
    match family.with(labels) {
        Ok(counter) => counter.inc(),
        Err(e) => warn!("failed to update {}: {}", family.name(), e),
    }
}

/// Per-request checkpoint handler created by [`MetricsPlugin`].
pub struct MetricsListener {
    // ---
    instruments: Arc<Instruments>,
    config: MetricsPluginConfig,
}

impl MetricsListener {
    // ---
    fn record_trace(&self, labels: &LabelSet, trace: &TraceV1) {
        // ---
        if let Some(total) = trace.total_seconds() {
            match self.instruments.total_request_time.with(labels) {
                Ok(histogram) => histogram.observe(total),
                Err(e) => warn!("failed to update {}: {}", TOTAL_REQUEST_TIME, e),
            }
        }

        for resolver in trace.resolvers() {
            self.instruments
                .resolver_time
                .with_label_values(&[
                    resolver.parent_type.as_str(),
                    resolver.field_name.as_str(),
                    resolver.return_type.as_str(),
                ])
                .observe(resolver.seconds());
        }

        if self.config.log_resolvers {
            debug!(resolvers = ?trace.resolvers(), "traced response resolvers");
        }
    }
}

impl RequestListener for MetricsListener {
    fn parsing_did_start(&self, ctx: &RequestContext) {
        increment(&self.instruments.parsed, &request_labels(ctx));
    }

    fn validation_did_start(&self, ctx: &RequestContext) {
        increment(&self.instruments.validation_started, &request_labels(ctx));
    }

    fn did_resolve_operation(&self, ctx: &RequestContext) {
        increment(&self.instruments.resolved, &request_labels(ctx));
    }

    fn execution_did_start(&self, ctx: &RequestContext) {
        increment(&self.instruments.execution_started, &request_labels(ctx));
    }

    fn did_encounter_errors(&self, ctx: &RequestContext) {
        increment(&self.instruments.errored, &request_labels(ctx));
    }

    fn will_send_response(&self, ctx: &RequestContext) {
        // ---
        let labels = request_labels(ctx);
        increment(&self.instruments.responded, &labels);

        let Some(response) = ctx.response.as_ref() else {
            return;
        };

        match TracingPayload::from_extensions(&response.extensions) {
            Some(TracingPayload::V1(trace)) => self.record_trace(&labels, &trace),
            Some(TracingPayload::Unsupported { version }) => {
                debug!("skipping tracing extension with version {}", version);
            }
            None => {}
        }
    }
}
