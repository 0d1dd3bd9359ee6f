//! Prometheus instrumentation for a GraphQL request pipeline.
//!
//! [`create_metrics_plugin`] registers the request counters and timing
//! histograms on a caller-owned [`prometheus::Registry`] and returns a
//! [`ServerPlugin`] the host pipeline calls at each lifecycle checkpoint.
//! Scraping the registry is left to the caller.
//!
//! ```
//! use graphql_metrics::{
//!     create_metrics_plugin, GraphQLRequest, RequestContext, RequestListener, ServerPlugin,
//! };
//!
//! let registry = prometheus::Registry::new();
//! let plugin = create_metrics_plugin(&registry).unwrap();
//!
//! let ctx = RequestContext::new(GraphQLRequest::named("GetUser"));
//! let listener = plugin.request_did_start(&ctx);
//! listener.parsing_did_start(&ctx);
//! ```

pub mod labels;
pub mod pipeline;
pub mod plugin;
pub mod sparse;
pub mod trace;

pub use labels::{LabelSet, LabelValue};
pub use pipeline::{
    GraphQLError, GraphQLRequest, GraphQLResponse, OperationKind, RequestContext,
    RequestListener, ServerPlugin,
};
pub use plugin::{create_metrics_plugin, MetricsListener, MetricsPlugin, MetricsPluginConfig};
pub use trace::{ResolverTrace, TraceV1, TracingPayload, TRACING_EXTENSION_KEY};
