//! HTTP handlers backing the health/readiness and metrics servers
//!
//! spec.md §6: "Readiness/liveness endpoints expose a single 'ping'
//! check" — there is no deeper cluster connectivity probe here, matching
//! the teacher's `healthz.Ping` equivalent.

use axum::http::StatusCode;

pub async fn ping() -> StatusCode {
    StatusCode::OK
}

#[cfg(feature = "metrics")]
pub async fn metrics(
    axum::extract::State(metrics): axum::extract::State<std::sync::Arc<crate::controller::metrics::Metrics>>,
) -> String {
    metrics.encode().await
}
