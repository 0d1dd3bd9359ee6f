//! Shared utilities for the GraphQL metrics workspace.
//!
//! Holds the CLI color policy, tracing setup and the optional scrape
//! endpoint so the replay binary and tests behave the same.

pub mod cli;
pub mod observability;

pub use cli::{ColorWhen, TerminalEnv};
pub use observability::{init_tracing, render_registry, spawn_metrics_server, MetricsServerConfig};
