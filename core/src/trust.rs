//! Server certificate trust policy.
//!
//! # Overview
//! A certificate is accepted when the first of these rules matches:
//! 1. standard chain validation succeeded,
//! 2. verification is disabled,
//! 3. a pin for the connecting host carries the certificate's thumbprint.
//!
//! Anything else is rejected. Pins only widen trust for hosts whose chain
//! fails (self-signed deployments); they never reject a certificate the
//! standard roots accept.
//!
//! # Design
//! `TrustPolicy::evaluate` is a pure function over plain values so each rule
//! can be tested without a handshake. `PinningVerifier` is the rustls hook
//! that feeds it: it runs the webpki verifier first and consults the policy
//! only with the outcome and the end-entity thumbprint.

use std::{collections::BTreeMap, sync::Arc};

use rustls::{
    client::{
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        WebPkiServerVerifier,
    },
    crypto::CryptoProvider,
    pki_types::{CertificateDer, ServerName, UnixTime},
    DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use sha1::{Digest, Sha1};

use crate::error::ApiError;

/// Outcome of a trust evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Standard chain validation passed.
    Trusted,
    /// Chain validation failed but verification is switched off.
    VerificationDisabled,
    /// Chain validation failed but a pin for the host matched.
    Pinned,
    Rejected,
}

impl TrustDecision {
    pub fn is_accepted(self) -> bool {
        !matches!(self, TrustDecision::Rejected)
    }
}

/// Expected certificate thumbprint for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePin {
    host: String,
    thumbprint: String,
}

impl CertificatePin {
    /// `host_uri` may be a full URI (`https://reports:40263/`) or a bare host.
    pub fn new(host_uri: &str, thumbprint: &str) -> Self {
        Self {
            host: normalize_host(&host_of_uri(host_uri)),
            thumbprint: normalize_thumbprint(thumbprint),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    fn matches(&self, host: &str, thumbprint: &str) -> bool {
        self.host == normalize_host(host) && self.thumbprint == normalize_thumbprint(thumbprint)
    }
}

/// Immutable set of pins, fixed when the client is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificatePins(Vec<CertificatePin>);

impl CertificatePins {
    pub fn new(pins: impl IntoIterator<Item = CertificatePin>) -> Self {
        Self(pins.into_iter().collect())
    }

    /// Builds pins from a host-URI to thumbprint map.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        Self::new(map.iter().map(|(uri, tp)| CertificatePin::new(uri, tp)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertificatePin> {
        self.0.iter()
    }

    /// True when any pin for `host` carries `thumbprint`. Both comparisons
    /// ignore case.
    pub fn matches(&self, host: &str, thumbprint: &str) -> bool {
        self.0.iter().any(|pin| pin.matches(host, thumbprint))
    }
}

/// The trust settings of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    pub ssl_verify: bool,
    pub pins: CertificatePins,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            ssl_verify: true,
            pins: CertificatePins::default(),
        }
    }
}

impl TrustPolicy {
    pub fn new(ssl_verify: bool, pins: CertificatePins) -> Self {
        Self { ssl_verify, pins }
    }

    /// Decides whether to accept the certificate presented by `host`.
    ///
    /// `chain_valid` is the result of standard validation; `thumbprint` is
    /// the hex SHA-1 of the end-entity certificate.
    pub fn evaluate(&self, chain_valid: bool, host: &str, thumbprint: &str) -> TrustDecision {
        tracing::debug!(%host, "evaluating server certificate");

        if chain_valid {
            tracing::debug!(%host, "no certificate policy errors");
            return TrustDecision::Trusted;
        }

        if !self.ssl_verify {
            tracing::info!(%host, "ssl verification disabled, accepting certificate");
            return TrustDecision::VerificationDisabled;
        }

        if self.pins.matches(host, thumbprint) {
            tracing::debug!(%host, %thumbprint, "certificate accepted by thumbprint pin");
            return TrustDecision::Pinned;
        }

        tracing::warn!(%host, %thumbprint, "server certificate rejected");
        TrustDecision::Rejected
    }
}

/// Uppercase hex SHA-1 of a DER-encoded certificate.
pub fn thumbprint(der: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(der))
}

fn host_of_uri(uri: &str) -> String {
    if let Some(host) = reqwest::Url::parse(uri).ok().and_then(|u| u.host_str().map(str::to_owned)) {
        return host;
    }
    // bare `host` or `host:port`
    let authority = uri.trim().split('/').next().unwrap_or_default();
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => host.to_owned(),
        _ => authority.to_owned(),
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase()
}

fn normalize_thumbprint(thumbprint: &str) -> String {
    thumbprint
        .chars()
        .filter(|c| !matches!(c, ':' | ' '))
        .collect::<String>()
        .to_ascii_lowercase()
}

fn server_host(name: &ServerName<'_>) -> String {
    match name {
        ServerName::DnsName(dns) => dns.as_ref().to_owned(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        _ => String::new(),
    }
}

/// rustls verifier applying `TrustPolicy` on top of webpki validation.
#[derive(Debug)]
pub struct PinningVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    policy: TrustPolicy,
}

impl PinningVerifier {
    /// Uses the Mozilla root set from `webpki-roots` as trust anchors.
    pub fn new(policy: TrustPolicy, provider: Arc<CryptoProvider>) -> Result<Self, ApiError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| ApiError::Tls(rustls::Error::General(e.to_string())))?;
        Ok(Self { webpki, policy })
    }
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let chain = self
            .webpki
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now);
        let chain_error = match chain {
            Ok(verified) => {
                tracing::debug!(host = %server_host(server_name), "certificate chain validated");
                return Ok(verified);
            }
            Err(e) => e,
        };

        let host = server_host(server_name);
        let tp = thumbprint(end_entity.as_ref());
        tracing::debug!(%host, error = %chain_error, "certificate chain validation failed");
        if self.policy.evaluate(false, &host, &tp).is_accepted() {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(chain_error)
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.webpki.supported_verify_schemes()
    }
}
