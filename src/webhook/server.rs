//! Admission Webhook Server
//!
//! TLS `axum` server serving `/validate-metal3remediation`,
//! `/validate-metal3remediationtemplate`, and
//! `/mutate-metal3remediationtemplate` (spec.md §6). Reuses the teacher's
//! `axum_server::tls_rustls` bootstrap from `src/rest_api/server.rs`, minus
//! the client-cert requirement: admission callers are the API server, not
//! mTLS peers.

use std::net::SocketAddr;
use std::path::Path;

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{routing::post, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use opentelemetry::{global, propagation::Extractor};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::crd::{Metal3Remediation, Metal3RemediationTemplate};
use crate::error::{Error, Result};

use super::mutation::default_remediation_template;
use super::types::ValidationErrors;
use super::validation::{validate_remediation, validate_remediation_template};

struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v: &HeaderValue| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Picks up the `traceparent` header the API server forwards on admission
/// calls and attaches it as the current span's parent.
async fn extract_trace_context(request: Request, next: Next) -> Response {
    let parent_cx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    tracing::Span::current().set_parent(parent_cx);
    next.run(request).await
}

/// Builds the admission webhook router. Exposed separately from
/// [`run_server`] so tests can drive it in-process without binding a port.
pub fn router() -> Router {
    Router::new()
        .route("/validate-metal3remediation", post(validate_remediation_handler))
        .route(
            "/validate-metal3remediationtemplate",
            post(validate_remediation_template_handler),
        )
        .route(
            "/mutate-metal3remediationtemplate",
            post(mutate_remediation_template_handler),
        )
        .layer(middleware::from_fn(extract_trace_context))
        .layer(TraceLayer::new_for_http())
}

#[instrument(skip(body))]
async fn validate_remediation_handler(
    Json(body): Json<AdmissionReview<Metal3Remediation>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let Ok(req): std::result::Result<AdmissionRequest<_>, _> = body.try_into() else {
        return Json(AdmissionResponse::invalid("malformed AdmissionReview").into_review());
    };
    let response = AdmissionResponse::from(&req);
    let Some(obj) = req.object.as_ref() else {
        return Json(response.into_review());
    };
    let errors = validate_remediation(&obj.spec);
    Json(deny_or_allow(response, errors).into_review())
}

#[instrument(skip(body))]
async fn validate_remediation_template_handler(
    Json(body): Json<AdmissionReview<Metal3RemediationTemplate>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let Ok(req): std::result::Result<AdmissionRequest<_>, _> = body.try_into() else {
        return Json(AdmissionResponse::invalid("malformed AdmissionReview").into_review());
    };
    let response = AdmissionResponse::from(&req);
    let Some(obj) = req.object.as_ref() else {
        return Json(response.into_review());
    };
    let errors = validate_remediation_template(&obj.spec.template.spec);
    Json(deny_or_allow(response, errors).into_review())
}

#[instrument(skip(body))]
async fn mutate_remediation_template_handler(
    Json(body): Json<AdmissionReview<Metal3RemediationTemplate>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let Ok(req): std::result::Result<AdmissionRequest<_>, _> = body.try_into() else {
        return Json(AdmissionResponse::invalid("malformed AdmissionReview").into_review());
    };
    let response = AdmissionResponse::from(&req);
    let Some(original) = req.object.as_ref() else {
        return Json(response.into_review());
    };

    let mut defaulted = original.clone();
    if !default_remediation_template(&mut defaulted.spec) {
        return Json(response.into_review());
    }

    let before = serde_json::to_value(original).unwrap_or_default();
    let after = serde_json::to_value(&defaulted).unwrap_or_default();
    let patch = json_patch::diff(&before, &after);

    match response.with_patch(patch) {
        Ok(patched) => Json(patched.into_review()),
        Err(e) => {
            warn!(error = %e, "failed to attach defaulting patch, admitting unmutated");
            Json(response.into_review())
        }
    }
}

fn deny_or_allow(response: AdmissionResponse, errors: ValidationErrors) -> AdmissionResponse {
    if errors.is_empty() {
        return response;
    }
    let message = errors
        .iter()
        .map(|e| e.message())
        .collect::<Vec<_>>()
        .join("; ");
    response.deny(message)
}

/// Starts the TLS admission webhook server on `addr`, loading `tls.crt` /
/// `tls.key` from `cert_dir` (spec.md §6's configurable webhook cert
/// directory).
pub async fn run_server(addr: SocketAddr, cert_dir: &str) -> Result<()> {
    let cert_path = Path::new(cert_dir).join("tls.crt");
    let key_path = Path::new(cert_dir).join("tls.key");

    let cert_pem = tokio::fs::read(&cert_path)
        .await
        .map_err(|e| Error::ConfigError(format!("reading {}: {e}", cert_path.display())))?;
    let key_pem = tokio::fs::read(&key_path)
        .await
        .map_err(|e| Error::ConfigError(format!("reading {}: {e}", key_path.display())))?;

    let certs = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::ConfigError(format!("parsing webhook certificate: {e}")))?;
    let key = PrivateKeyDer::from_pem_slice(&key_pem)
        .map_err(|e| Error::ConfigError(format!("parsing webhook private key: {e}")))?;

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::ConfigError(format!("building webhook TLS config: {e}")))?;

    let rustls_config = RustlsConfig::from_config(std::sync::Arc::new(server_config));

    info!(%addr, cert_dir, "admission webhook server listening");
    axum_server::bind_rustls(addr, rustls_config)
        .serve(router().into_make_service())
        .await
        .map_err(|e| Error::ConfigError(format!("webhook server error: {e}")))?;
    Ok(())
}
