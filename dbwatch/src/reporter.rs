//! Webhook reporting of probe results.
//!
//! One JSON document per cycle. The receiving side keys on `status` and
//! `firm_ids`; the remaining fields are informational.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbwatch_core::{BackendKind, ProbeResult, RowId, WebhookMethod};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Message sent with every successful probe.
pub const SUCCESS_MESSAGE: &str = "Database access successful";

/// Client-side ceiling for a single webhook request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body copied into logs and errors.
const MAX_LOGGED_BODY: usize = 512;

/// Errors raised while delivering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("Webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Webhook rejected the report with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Report abandoned after {0:?}")]
    TimedOut(Duration),
}

/// Whether the report comes from the service loop or a manual check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Production,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

/// Wire form of one probe result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    /// UTC, millisecond precision, `Z` suffix
    pub timestamp: String,
    pub status: ReportStatus,
    pub firm_ids: Vec<RowId>,
    pub database_type: String,
    pub message: String,
    #[serde(rename = "executionMode")]
    pub execution_mode: ExecutionMode,
}

impl ReportPayload {
    pub fn from_probe(result: &ProbeResult, backend: BackendKind, mode: ExecutionMode) -> Self {
        Self::from_result(result, backend.token(), mode)
    }

    /// Payload for a result whose backend token may not be a supported one.
    pub fn from_result(result: &ProbeResult, database_type: &str, mode: ExecutionMode) -> Self {
        let (status, message) = if result.is_success() {
            (ReportStatus::Success, SUCCESS_MESSAGE.to_string())
        } else {
            (
                ReportStatus::Error,
                result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Probe failed".to_string()),
            )
        };

        Self {
            timestamp: format_timestamp(result.timestamp),
            status,
            firm_ids: result.rows.clone(),
            database_type: database_type.to_string(),
            message,
            execution_mode: mode,
        }
    }
}

/// Formats a timestamp as `2024-05-01T12:00:00.000Z`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Destination for probe reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Delivers one report.
    ///
    /// # Errors
    /// Returns error if the report could not be delivered
    async fn send(&self, payload: &ReportPayload) -> Result<(), ReportError>;
}

/// Sends reports to an HTTP endpoint as JSON.
#[derive(Debug, Clone)]
pub struct WebhookReporter {
    client: reqwest::Client,
    url: reqwest::Url,
    method: WebhookMethod,
}

impl WebhookReporter {
    /// Creates a reporter for `url`.
    ///
    /// # Errors
    /// Returns error if the URL is not http(s) or the HTTP client cannot be built
    pub fn new(url: &str, method: WebhookMethod) -> Result<Self, ReportError> {
        let url = reqwest::Url::parse(url).map_err(|e| ReportError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ReportError::InvalidUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("dbwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url,
            method,
        })
    }

    pub const fn method(&self) -> WebhookMethod {
        self.method
    }

    fn http_method(&self) -> reqwest::Method {
        match self.method {
            WebhookMethod::Post => reqwest::Method::POST,
            WebhookMethod::Put => reqwest::Method::PUT,
        }
    }
}

#[async_trait]
impl ReportSink for WebhookReporter {
    async fn send(&self, payload: &ReportPayload) -> Result<(), ReportError> {
        tracing::debug!(
            method = %self.method,
            host = self.url.host_str().unwrap_or_default(),
            status = ?payload.status,
            "Sending webhook"
        );

        let response = self
            .client
            .request(self.http_method(), self.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let mut body = response.text().await.unwrap_or_default();
        truncate_body(&mut body);

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), body = %body, "Webhook rejected report");
            return Err(ReportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(status = status.as_u16(), response = %body, "Webhook delivered");
        Ok(())
    }
}

fn truncate_body(body: &mut String) {
    if body.len() > MAX_LOGGED_BODY {
        let cut = (0..=MAX_LOGGED_BODY)
            .rev()
            .find(|&index| body.is_char_boundary(index))
            .unwrap_or(0);
        body.truncate(cut);
        body.push_str("...");
    }
}
