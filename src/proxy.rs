//! License request orchestration.
//!
//! A client request is relayed in one of two ways:
//!
//! - Bodies shorter than the certificate threshold are service certificate
//!   requests and are forwarded as is (one round trip).
//! - Anything else is a license request: it is first sent parse-only to
//!   learn its PSSH data, then the [`LicenseAuthority`] builds the full
//!   license message which is sent in a second round trip.
//!
//! Every outbound message is signed with the authority's key and wrapped in
//! an [`Envelope`](crate::signer::Envelope). Nothing is retried.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::authority::StaticAuthority;
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::message::{Message, PayloadMessage};
use crate::response::{LicenseResponse, PsshData};
use crate::signer;

/// Business rules behind the proxy: where to send requests, how to sign
/// them and what to put in a license.
///
/// Implementations are shared between threads.
pub trait LicenseAuthority: Send + Sync {
    /// Build the license message for a client request, given the PSSH data
    /// the service extracted from it.
    fn build_license_message(&self, body: &[u8], pssh_data: &PsshData) -> Result<Message>;

    fn license_server_url(&self) -> &str;

    fn signing_key(&self) -> &[u8];

    fn signing_iv(&self) -> &[u8];

    /// Provider name, sent as the envelope signer.
    fn provider(&self) -> &str;
}

/// Relay between playback clients and the license service.
#[derive(Clone)]
pub struct Proxy {
    authority: Arc<dyn LicenseAuthority>,
    client: Client,
    certificate_threshold: usize,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("license_server_url", &self.authority.license_server_url())
            .field("provider", &self.authority.provider())
            .field("certificate_threshold", &self.certificate_threshold)
            .finish()
    }
}

impl Proxy {
    /// Bodies shorter than this are treated as service certificate requests.
    ///
    /// This is a size heuristic, not part of the license protocol; a large
    /// certificate request would be routed as a license request.
    pub const CERTIFICATE_THRESHOLD: usize = 50;
    /// Connect (and TLS handshake) timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Overall timeout of one round trip.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a proxy with the default timeouts.
    pub fn new(authority: Arc<dyn LicenseAuthority>) -> Result<Self> {
        Self::with_timeouts(authority, Self::CONNECT_TIMEOUT, Self::REQUEST_TIMEOUT)
    }

    /// Create a proxy with explicit connect and request timeouts.
    pub fn with_timeouts(
        authority: Arc<dyn LicenseAuthority>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("widevine-proxy/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            authority,
            client,
            certificate_threshold: Self::CERTIFICATE_THRESHOLD,
        })
    }

    /// Create a proxy backed by a [`StaticAuthority`] built from `config`.
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let authority = StaticAuthority::from_config(config)?;
        Ok(Self::with_timeouts(
            Arc::new(authority),
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.request_secs),
        )?
        .with_certificate_threshold(config.certificate_threshold))
    }

    /// Override the certificate request size threshold.
    #[must_use]
    pub fn with_certificate_threshold(mut self, threshold: usize) -> Self {
        self.certificate_threshold = threshold;
        self
    }

    pub fn certificate_threshold(&self) -> usize {
        self.certificate_threshold
    }

    pub fn authority(&self) -> &dyn LicenseAuthority {
        self.authority.as_ref()
    }

    /// Whether `body` would be relayed as a service certificate request.
    pub fn is_certificate_request(&self, body: &[u8]) -> bool {
        body.len() < self.certificate_threshold
    }

    /// Relay a client request and return the service's response.
    ///
    /// Certificate requests return whatever the service answered. License
    /// requests only succeed when the final status is `OK`; any other
    /// status is returned as [`Error::AuthorityRejected`].
    pub fn get_license(&self, body: &[u8]) -> Result<LicenseResponse> {
        if self.is_certificate_request(body) {
            let response = self.send_request(&self.build_certificate_request(body)?)?;
            log_response("Certificate request success", &response);
            return Ok(response);
        }

        let parsed = self.parse_license(body)?;
        log_response("License parse success", &parsed);

        let request = self.build_license_request(body, &parsed.pssh_data)?;
        let response = self.send_request(&request)?;
        if response.is_ok() {
            log_response("License request success", &response);
            return Ok(response);
        }

        log_response("License request failure", &response);
        Err(Error::AuthorityRejected(response.status))
    }

    /// Send `body` parse-only and return the decoded response.
    pub fn parse_license(&self, body: &[u8]) -> Result<LicenseResponse> {
        self.send_request(&self.build_parse_request(body)?)
    }

    /// Signed envelope for a service certificate request.
    pub fn build_certificate_request(&self, body: &[u8]) -> Result<Vec<u8>> {
        self.pack(&PayloadMessage {
            payload: base64::engine::general_purpose::STANDARD.encode(body),
            parse_only: false,
        })
    }

    /// Signed envelope for a parse-only request.
    pub fn build_parse_request(&self, body: &[u8]) -> Result<Vec<u8>> {
        self.pack(&PayloadMessage {
            payload: base64::engine::general_purpose::STANDARD.encode(body),
            parse_only: true,
        })
    }

    /// Signed envelope for the license message the authority builds.
    pub fn build_license_request(&self, body: &[u8], pssh_data: &PsshData) -> Result<Vec<u8>> {
        let message = self.authority.build_license_message(body, pssh_data)?;
        self.pack(&message)
    }

    fn pack<T: Serialize>(&self, message: &T) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(message).map_err(Error::EncodeFailure)?;
        let authority = self.authority.as_ref();
        signer::pack(
            &payload,
            authority.signing_key(),
            authority.signing_iv(),
            authority.provider(),
        )?
        .to_json()
    }

    fn send_request(&self, envelope: &[u8]) -> Result<LicenseResponse> {
        let url = self.authority.license_server_url();
        debug!("POST {} ({} bytes)", url, envelope.len());

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(envelope.to_vec())
            .send()?;
        let http_status = response.status();
        let body = response.bytes()?;

        serde_json::from_slice(&body).map_err(|e| {
            error!(
                "License response JSON decode error (HTTP {}): {}",
                http_status, e
            );
            Error::DecodeFailure(e)
        })
    }
}

fn log_response(event: &str, response: &LicenseResponse) {
    let summary = format!(
        "status={:?} message_type={:?} model={:?} platform={:?} security_level={} content_id={:?} license_type={:?}",
        response.status,
        response.message_type,
        response.model,
        response.platform,
        response.security_level,
        response.license_metadata.content_id,
        response.license_metadata.license_type,
    );
    if response.is_ok() {
        info!("{}: {}", event, summary);
    } else {
        warn!("{}: {}", event, summary);
    }
}
