//! reqwest-backed [`Transport`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use nim_core::config::NimConfig;
use nim_core::retry::{classify_http_error, with_retry_if, ErrorKind, RetryPolicy};
use nim_core::transport::{Credentials, Transport};

/// Failure of a single HTTP attempt.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        retry_after: Option<String>,
        body: String,
    },

    #[error("invalid JSON response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl HttpError {
    pub fn retry_kind(&self) -> ErrorKind {
        match self {
            HttpError::Network(_) => ErrorKind::NetworkError,
            HttpError::Status {
                status,
                retry_after,
                ..
            } => classify_http_error(*status, retry_after.as_deref()),
            HttpError::Decode(_) => ErrorKind::Fatal,
        }
    }
}

/// JSON-over-HTTP transport with per-request timeout and retry.
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, retry })
    }

    pub fn from_config(config: &NimConfig) -> Result<Self> {
        Self::new(
            Duration::from_millis(config.transport.timeout_ms),
            config.retry_policy(),
        )
    }

    async fn call(
        &self,
        credentials: &Credentials,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = credentials.url(path);
        debug!(%method, url = %url, "calling NIM API");

        with_retry_if(&self.retry, path, HttpError::retry_kind, || {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, credentials.bearer());
            if let Some(body) = body {
                request = request.json(body);
            }
            send(request)
        })
        .await
        .with_context(|| format!("{} {} failed", method, path))
    }
}

async fn send(request: RequestBuilder) -> std::result::Result<Value, HttpError> {
    let response = request.send().await.map_err(HttpError::Network)?;
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        return Err(HttpError::Status {
            status: status.as_u16(),
            retry_after,
            body,
        });
    }
    response.json::<Value>().await.map_err(HttpError::Decode)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, credentials: &Credentials, path: &str) -> Result<Value> {
        self.call(credentials, Method::GET, path, None).await
    }

    async fn post_json(&self, credentials: &Credentials, path: &str, body: &Value) -> Result<Value> {
        self.call(credentials, Method::POST, path, Some(body)).await
    }
}
