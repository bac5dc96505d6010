//! Executes `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the single seam between request construction and I/O.
//! `BlockingTransport` owns one `reqwest::blocking::Client`, created once and
//! shared by every call; reqwest's pool governs parallelism, so the transport
//! holds no lock and no per-call state. Non-2xx statuses come back as data and
//! are interpreted by the client, never here.

use std::{sync::Arc, time::Duration};

use reqwest::blocking::multipart;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::trust::{CertificatePins, PinningVerifier, TrustPolicy};

/// Performs one HTTP round-trip.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).execute(request)
    }
}

/// Builds the rustls configuration with `PinningVerifier` installed.
pub fn tls_config(policy: TrustPolicy) -> Result<rustls::ClientConfig, ApiError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinningVerifier::new(policy, provider.clone())?;
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(config)
}

/// Blocking reqwest transport with the client's timeout and trust policy.
#[derive(Debug, Clone)]
pub struct BlockingTransport {
    client: reqwest::blocking::Client,
}

impl BlockingTransport {
    pub fn new(timeout: Duration, policy: TrustPolicy) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .use_preconfigured_tls(tls_config(policy)?)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let policy = TrustPolicy::new(config.ssl_verify, CertificatePins::from_map(&config.thumbprints));
        tracing::debug!(
            timeout_secs = config.timeout().as_secs(),
            ssl_verify = policy.ssl_verify,
            pinned = !policy.pins.is_empty(),
            "building reporting transport"
        );
        Self::new(config.timeout(), policy)
    }
}

impl Transport for BlockingTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        tracing::debug!(method = request.method.as_str(), url = %request.url, "sending request");

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(text) => builder.body(text),
            RequestBody::Multipart(file) => {
                let part = multipart::Part::bytes(file.data)
                    .file_name(file.file_name)
                    .mime_str(&file.content_type)?;
                builder.multipart(multipart::Form::new().part(file.field_name, part))
            }
        };

        let response = builder.send()?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_owned(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.bytes()?.to_vec();
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "received response");

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_owned),
            headers,
            body,
        })
    }
}
