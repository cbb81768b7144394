//! Health/readiness and metrics HTTP servers
//!
//! Two independent plain-HTTP `axum` servers, bound to the addresses from
//! `--health-addr` / `--metrics-addr` (spec.md §6). Unlike the admission
//! webhook these are not TLS: they are cluster-internal probes, matching
//! the teacher's unauthenticated `/health` endpoint in spirit.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tracing::info;

use crate::error::{Error, Result};

use super::handlers::ping;

/// Parses the Go-style `":9440"` / `"0.0.0.0:9440"` address flags this
/// controller's CLI accepts into a `SocketAddr`.
fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    };
    addr.parse()
        .map_err(|e| Error::ConfigError(format!("invalid address {addr}: {e}")))
}

/// Serves `/healthz` and `/readyz`, both backed by the single "ping" check.
pub async fn run_health_server(addr: &str) -> Result<()> {
    let addr = parse_addr(addr)?;
    let app = Router::new()
        .route("/healthz", get(ping))
        .route("/readyz", get(ping));

    info!(%addr, "health/readiness server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("binding health server to {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::ConfigError(format!("health server error: {e}")))?;
    Ok(())
}

/// Serves `/metrics` in the Prometheus text exposition format. A no-op
/// when built without the `metrics` feature.
#[cfg(feature = "metrics")]
pub async fn run_metrics_server(
    addr: &str,
    metrics: std::sync::Arc<crate::controller::metrics::Metrics>,
) -> Result<()> {
    let addr = parse_addr(addr)?;
    let app = Router::new()
        .route("/metrics", get(super::handlers::metrics))
        .with_state(metrics);

    info!(%addr, "metrics server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("binding metrics server to {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::ConfigError(format!("metrics server error: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "metrics"))]
pub async fn run_metrics_server(_addr: &str) -> Result<()> {
    std::future::pending().await
}
