//! metal3-remediation-controller entry point
//!
//! Parses CLI flags, waits for the metal3 CRDs to be served, acquires
//! leadership, and starts the health/metrics/webhook servers alongside the
//! reconcile loop (spec.md §6 startup contract).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::{Api, Client};
use metal3_remediation::config::Config;
use metal3_remediation::controller::accessor::KubeAccessor;
use metal3_remediation::controller::clock::SystemClock;
use metal3_remediation::controller::leader::{acquire_or_wait, LeaderElectionConfig};
use metal3_remediation::controller::{run_controller, ControllerState};
use metal3_remediation::crd::Metal3Remediation;
use metal3_remediation::Error;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        feature_gates = ?config.parsed_feature_gates(),
        "starting metal3-remediation-controller"
    );

    let client = Client::try_default().await.map_err(Error::KubeError)?;
    wait_for_apis(&client).await;

    if config.leader_elect {
        let identity = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let mut leader_cfg = LeaderElectionConfig::new(config.leader_elect_resource_namespace.clone(), identity);
        leader_cfg.lease_duration = Duration::from_secs(config.leader_elect_lease_duration_secs);
        leader_cfg.renew_deadline = Duration::from_secs(config.leader_elect_renew_deadline_secs);
        leader_cfg.retry_period = Duration::from_secs(config.leader_elect_retry_period_secs);
        acquire_or_wait(&client, &leader_cfg).await?;
    }

    #[cfg(feature = "metrics")]
    let metrics = Arc::new(metal3_remediation::controller::metrics::Metrics::new());

    #[cfg(feature = "rest-api")]
    {
        let health_addr = config.health_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = metal3_remediation::rest_api::run_health_server(&health_addr).await {
                error!(error = %e, "health server exited");
            }
        });

        let metrics_addr = config.metrics_addr.clone();
        #[cfg(feature = "metrics")]
        {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                if let Err(e) = metal3_remediation::rest_api::run_metrics_server(&metrics_addr, metrics).await {
                    error!(error = %e, "metrics server exited");
                }
            });
        }
        #[cfg(not(feature = "metrics"))]
        tokio::spawn(async move {
            if let Err(e) = metal3_remediation::rest_api::run_metrics_server(&metrics_addr).await {
                error!(error = %e, "metrics server exited");
            }
        });
    }

    #[cfg(feature = "admission-webhook")]
    if config.webhook_enabled {
        let addr = format!("0.0.0.0:{}", config.webhook_port)
            .parse()
            .expect("static webhook address is always valid");
        let cert_dir = config.webhook_cert_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = metal3_remediation::webhook::run_server(addr, &cert_dir).await {
                error!(error = %e, "admission webhook server exited");
            }
        });
    }

    let state = Arc::new(ControllerState {
        accessor: Arc::new(KubeAccessor::new(client.clone())),
        clock: Arc::new(SystemClock),
        #[cfg(feature = "metrics")]
        metrics: Some(metrics),
    });

    run_controller(client, state).await
}

/// spec.md §6: confirm the metal3 API group is served before entering the
/// reconcile loop; retry every 10s indefinitely, log-only, never exit.
async fn wait_for_apis(client: &Client) {
    let remediations: Api<Metal3Remediation> = Api::all(client.clone());
    loop {
        match remediations.list(&Default::default()).await {
            Ok(_) => {
                info!("Metal3Remediation CRD is served, proceeding");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Metal3Remediation CRD not yet available, retrying in 10s");
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        }
    }
}
