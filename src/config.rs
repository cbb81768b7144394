//! Process configuration
//!
//! One-for-one with spec.md §6's flag set. Parsed with `clap` the way the
//! teacher's binaries parse theirs; `--feature-gates key=value,...` is the
//! Rust analogue of `k8s.io/component-base/featuregate`.

use std::collections::BTreeMap;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(name = "metal3-remediation-controller", about = "Bare-metal power-cycle remediation controller")]
pub struct Config {
    /// Namespace to watch. Empty means all namespaces.
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Address the health/readiness server binds to.
    #[arg(long, env = "HEALTH_ADDR", default_value = ":9440")]
    pub health_addr: String,

    /// Address the Prometheus metrics server binds to.
    #[arg(long, env = "METRICS_ADDR", default_value = ":8081")]
    pub metrics_addr: String,

    /// Enable lease-based leader election.
    #[arg(long, env = "LEADER_ELECT", default_value_t = false)]
    pub leader_elect: bool,

    /// Namespace the leader-election Lease object is created in.
    #[arg(long, env = "LEADER_ELECT_RESOURCE_NAMESPACE", default_value = "metal3-remediation-system")]
    pub leader_elect_resource_namespace: String,

    /// Lease duration in seconds.
    #[arg(long, env = "LEADER_ELECT_LEASE_DURATION", default_value_t = 120)]
    pub leader_elect_lease_duration_secs: u64,

    /// Lease renew deadline in seconds.
    #[arg(long, env = "LEADER_ELECT_RENEW_DEADLINE", default_value_t = 110)]
    pub leader_elect_renew_deadline_secs: u64,

    /// Lease acquisition retry period in seconds.
    #[arg(long, env = "LEADER_ELECT_RETRY_PERIOD", default_value_t = 20)]
    pub leader_elect_retry_period_secs: u64,

    /// Enable the admission webhook server.
    #[arg(long, env = "WEBHOOK_ENABLED", default_value_t = true)]
    pub webhook_enabled: bool,

    /// Port the admission webhook TLS server listens on.
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8440)]
    pub webhook_port: u16,

    /// Directory containing tls.crt/tls.key for the webhook server.
    #[arg(long, env = "WEBHOOK_CERT_DIR", default_value = "/tmp/k8s-webhook-server/serving-certs")]
    pub webhook_cert_dir: String,

    /// Allowed TLS cipher suites, comma-separated. Empty means rustls defaults.
    #[arg(long, env = "TLS_CIPHER_SUITES", value_delimiter = ',')]
    pub tls_cipher_suites: Vec<String>,

    /// Minimum TLS version, e.g. "1.2" or "1.3".
    #[arg(long, env = "TLS_MIN_VERSION", default_value = "1.2")]
    pub tls_min_version: String,

    /// Feature gates as `key=value,...` (value is `true`/`false`).
    #[arg(long, env = "FEATURE_GATES", value_delimiter = ',')]
    pub feature_gates: Vec<String>,
}

impl Config {
    pub fn parsed_feature_gates(&self) -> BTreeMap<String, bool> {
        self.feature_gates
            .iter()
            .filter_map(|entry| {
                let (key, value) = entry.split_once('=')?;
                Some((key.trim().to_string(), value.trim().parse::<bool>().unwrap_or(false)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_gates_parse_key_value_pairs() {
        let cfg = Config {
            feature_gates: vec!["FooGate=true".to_string(), "BarGate=false".to_string()],
            ..Config::parse_from(["test"])
        };
        let gates = cfg.parsed_feature_gates();
        assert_eq!(gates.get("FooGate"), Some(&true));
        assert_eq!(gates.get("BarGate"), Some(&false));
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::parse_from(["test"]);
        assert_eq!(cfg.health_addr, ":9440");
        assert_eq!(cfg.metrics_addr, ":8081");
        assert_eq!(cfg.webhook_port, 8440);
        assert_eq!(cfg.leader_elect_lease_duration_secs, 120);
        assert_eq!(cfg.leader_elect_renew_deadline_secs, 110);
        assert_eq!(cfg.leader_elect_retry_period_secs, 20);
    }
}
