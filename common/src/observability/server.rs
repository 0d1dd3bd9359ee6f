//! Prometheus scrape endpoint for an externally owned registry.
//!
//! The registry is always supplied by the caller; nothing here creates or
//! registers instruments. Running the server is opt-in.

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Configuration for the built-in Prometheus scrape endpoint.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    // ---
    /// Address to bind, e.g. `127.0.0.1:9464`.
    pub bind: SocketAddr,
}

impl MetricsServerConfig {
    // ---
    pub fn new(bind: SocketAddr) -> Self {
        // ---
        Self { bind }
    }
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        // ---
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 9464)),
        }
    }
}

/// Renders every metric family in `registry` in Prometheus text format.
///
/// # Errors
///
/// Returns error if encoding fails or produces invalid UTF-8.
pub fn render_registry(registry: &Registry) -> Result<String> {
    // ---
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .context("failed to encode metrics")?;

    String::from_utf8(buffer).context("metrics encoding produced invalid UTF-8")
}

/// Spawns a minimal HTTP server that serves `GET /metrics` for `registry`.
pub fn spawn_metrics_server(registry: Registry, cfg: MetricsServerConfig) -> JoinHandle<Result<()>> {
    // ---
    let registry = Arc::new(registry);
    tokio::spawn(async move {
        // ---
        let make_svc = make_service_fn(move |_conn| {
            let registry = Arc::clone(&registry);
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let registry = Arc::clone(&registry);
                    async move { handle_metrics_request(req, registry).await }
                }))
            }
        });

        let server = Server::try_bind(&cfg.bind)
            .with_context(|| format!("failed to bind metrics endpoint on {}", cfg.bind))?
            .serve(make_svc);
        info!("Serving metrics on http://{}/metrics", cfg.bind);

        server.await.map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    })
}

async fn handle_metrics_request(
    req: Request<Body>,
    registry: Arc<Registry>,
) -> Result<Response<Body>, hyper::Error> {
    debug!("{} {}", req.method(), req.uri().path());

    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match render_registry(&registry) {
            Ok(body) => {
                let mut resp = Response::new(Body::from(body));
                resp.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                Ok(resp)
            }
            Err(e) => {
                let mut resp = Response::new(Body::from(format!("encode error: {e:#}")));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                Ok(resp)
            }
        },
        _ => {
            let mut resp = Response::new(Body::from("not found"));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Ok(resp)
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use prometheus::{IntCounter, Opts};

    #[test]
    fn render_includes_registered_counter() {
        // ---
        let registry = Registry::new();
        let counter = IntCounter::with_opts(Opts::new("render_probe_total", "probe"))
            .expect("counter should build");
        registry
            .register(Box::new(counter.clone()))
            .expect("counter should register");
        counter.inc();

        let text = render_registry(&registry).expect("render should succeed");
        assert!(text.contains("# TYPE render_probe_total counter"));
        assert!(text.contains("render_probe_total 1"));
    }

    #[test]
    fn render_empty_registry_is_empty() {
        // ---
        let registry = Registry::new();
        let text = render_registry(&registry).expect("render should succeed");
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        // ---
        let req = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .expect("request should build");
        let resp = handle_metrics_request(req, Arc::new(Registry::new()))
            .await
            .expect("handler should not fail");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_path_sets_text_content_type() {
        // ---
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request should build");
        let resp = handle_metrics_request(req, Arc::new(Registry::new()))
            .await
            .expect("handler should not fail");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(hyper::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
    }
}
