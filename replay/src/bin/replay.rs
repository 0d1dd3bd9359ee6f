//! GraphQL metrics replay - CLI binary.
//!
//! Feeds recorded request lifecycles (JSON lines) through the metrics plugin
//! and either prints the resulting exposition or keeps serving it.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::info;

use graphql_metrics::{MetricsPlugin, MetricsPluginConfig};
use graphql_metrics_common::{
    init_tracing, render_registry, spawn_metrics_server, ColorWhen, MetricsServerConfig,
};
use prometheus::Registry;
use replay::replay_reader;

/// GraphQL metrics replay - Drive recorded requests through the metrics plugin
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    // ---
    /// JSON-lines file of recorded requests (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Keep serving `GET /metrics` after the replay finishes
    #[arg(long)]
    serve: bool,

    /// Prometheus metrics bind address, used with `--serve`
    #[arg(long, default_value = "127.0.0.1:9464")]
    metrics_bind: String,

    /// Log resolver timings of every traced response
    #[arg(long)]
    log_resolvers: bool,

    /// Coloring: auto, always or never
    #[arg(long, default_value = "auto")]
    color: ColorWhen,
}

/// Capture version number from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let args = Args::parse();
    let default_level = if args.log_resolvers {
        "info,graphql_metrics=debug"
    } else {
        "info"
    };
    init_tracing(args.color, default_level)?;
    info!("Starting GraphQL metrics replay v{VERSION}");

    let registry = Registry::new();
    let config = MetricsPluginConfig {
        log_resolvers: args.log_resolvers,
    };
    let plugin =
        MetricsPlugin::with_config(&registry, config).context("failed to register GraphQL metrics")?;

    let summary = match &args.input {
        Some(path) => {
            info!("Reading recorded requests from {}", path.display());
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            replay_reader(&plugin, BufReader::new(file))?
        }
        None => {
            info!("Reading recorded requests from stdin");
            replay_reader(&plugin, io::stdin().lock())?
        }
    };

    if summary.requests == 0 {
        info!("No requests replayed");
    }

    if args.serve {
        let metrics_bind = args.metrics_bind.parse().context("invalid metrics bind")?;
        let server = spawn_metrics_server(registry, MetricsServerConfig::new(metrics_bind));
        server.await.context("metrics server task panicked")??;
    } else {
        print!("{}", render_registry(&registry)?);
    }

    Ok(())
}
