//! Observability utilities (scrape endpoint + tracing).

mod server;
mod tracing;

pub use self::server::{render_registry, spawn_metrics_server, MetricsServerConfig};
pub use self::tracing::init_tracing;
