//! Health, readiness, and metrics HTTP surfaces (spec.md §6's
//! `--health-addr` / `--metrics-addr`), plus optional Prometheus metrics
//! exposition behind the `metrics` feature.

mod handlers;
mod server;

pub use server::{run_health_server, run_metrics_server};
