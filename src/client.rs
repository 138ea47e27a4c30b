// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Rate-limited client for the registry document API.
//!
//! Every outbound document call first takes a slot from the client's
//! [`SlidingWindowLimiter`]. Once the request has been handed to the
//! transport the slot is recorded, whether or not the call succeeds, since
//! the registry may already have seen it.

use crate::auth::{obtain_token, Credentials};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::limiter::SlidingWindowLimiter;
use crate::metrics::LimiterMetrics;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Document creation endpoint.
pub const CREATE_DOCUMENT_PATH: &str = "/api/v3/lk/documents/create";

/// Format of the embedded product document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentFormat {
    Manual,
    Xml,
    Csv,
}

/// Body of a document creation call.
#[derive(Debug, Clone, Serialize)]
pub struct CreateDocumentRequest {
    pub document_format: DocumentFormat,
    /// Base64 of the JSON-encoded product document
    pub product_document: String,
    pub product_group: String,
    /// Base64 of the detached signature
    pub signature: String,
    #[serde(rename = "type")]
    pub document_type: String,
}

impl CreateDocumentRequest {
    /// Wrap a JSON-serializable document for submission.
    pub fn manual<D: Serialize + ?Sized>(
        document: &D,
        signature: &str,
        product_group: &str,
        document_type: &str,
    ) -> Result<Self> {
        let json = serde_json::to_vec(document)?;
        Ok(Self {
            document_format: DocumentFormat::Manual,
            product_document: STANDARD.encode(json),
            product_group: product_group.to_string(),
            signature: STANDARD.encode(signature.as_bytes()),
            document_type: document_type.to_string(),
        })
    }
}

/// Registry client sharing one sliding window across all its calls.
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
    config: Config,
    token: String,
    limiter: SlidingWindowLimiter,
    cancel: CancellationToken,
}

impl RegistryClient {
    /// Resolve `credentials` into a token, then build the client.
    pub async fn connect(config: Config, credentials: &Credentials) -> Result<Self> {
        config.validate()?;
        let http = build_http(&config)?;
        let token = obtain_token(&http, &config.base_url()?, credentials).await?;
        Self::build(config, http, token, LimiterMetrics::new().map_err(metrics_error)?)
    }

    /// Build a client around an already issued token.
    pub fn new(config: Config, token: impl Into<String>) -> Result<Self> {
        let metrics = LimiterMetrics::new().map_err(metrics_error)?;
        Self::with_metrics(config, token, metrics)
    }

    /// Build a client whose limiter reports into `metrics`.
    pub fn with_metrics(
        config: Config,
        token: impl Into<String>,
        metrics: LimiterMetrics,
    ) -> Result<Self> {
        config.validate()?;
        let http = build_http(&config)?;
        Self::build(config, http, token.into(), metrics)
    }

    fn build(
        config: Config,
        http: reqwest::Client,
        token: String,
        metrics: LimiterMetrics,
    ) -> Result<Self> {
        let limiter = SlidingWindowLimiter::with_metrics(&config.limiter, metrics)?;
        info!(
            base_url = %config.base_url,
            max_requests = config.limiter.max_requests,
            window = ?config.limiter.window(),
            "Registry client ready"
        );
        Ok(Self {
            http,
            base_url: config.base_url()?,
            config,
            token,
            limiter,
            cancel: CancellationToken::new(),
        })
    }

    /// Submit a document, waiting for a free slot in the window.
    ///
    /// Returns the registry's identifier for the created document.
    pub async fn create_document<D: Serialize + ?Sized>(
        &self,
        document: &D,
        signature: &str,
    ) -> Result<String> {
        let body = CreateDocumentRequest::manual(
            document,
            signature,
            &self.config.product_group,
            &self.config.document_type,
        )?;
        let request = self
            .http
            .post(self.base_url.join(CREATE_DOCUMENT_PATH)?)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.token)
            .body(serde_json::to_vec(&body)?);

        let permit = self.limiter.acquire(&self.cancel).await?;
        debug!(in_window = self.limiter.in_window(), "Sending document");
        let sent = request.send();
        // Recorded before the send is polled, so dropping this future mid-flight
        // cannot hand the slot back.
        permit.complete();

        let response = sent.await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Registry rejected document");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: serde_json::Value = response.json().await?;
        let id = reply
            .get("value")
            .and_then(serde_json::Value::as_str)
            .ok_or(ApiError::MissingField("value"))?;
        info!(document_id = %id, "Document created");
        Ok(id.to_string())
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that aborts calls still waiting for a slot.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort waiting calls and stop the limiter's eviction worker.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        self.limiter.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url.as_str())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

fn build_http(config: &Config) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?)
}

fn metrics_error(e: prometheus::Error) -> ApiError {
    ApiError::Limiter(crate::limiter::LimiterError::Metrics(e.to_string()))
}
