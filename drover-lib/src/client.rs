//! Reqwest-backed executor for HTTP JSON endpoints.
//!
//! This module defines [`RemoteClient`] and [`RemoteClientBuilder`].
//! `RemoteClient` POSTs each payload to a configured endpoint and maps the
//! response onto the dispatcher's outcome taxonomy; `RemoteClientBuilder`
//! exposes a finer level of granularity for building a `RemoteClient`.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use http::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;
use typed_builder::TypedBuilder;
use url::Url;

use crate::types::{ErrorKind, ExecutionOutcome, Result};

/// Default timeout in seconds before an attempt is deemed as failed, 15
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
/// Default user agent, `drover-<PKG_VERSION>`
pub const DEFAULT_USER_AGENT: &str = concat!("drover/", env!("CARGO_PKG_VERSION"));

/// An extension trait to help determine if a rejected attempt is worth
/// retrying later.
///
/// Modeled on `Retryable` in [reqwest-middleware]. The logic is vendored
/// and trimmed to the cases a batch dispatcher meets: the only question is
/// transient-vs-permanent, because transient rejections go back onto the
/// queue and permanent ones do not.
///
/// [reqwest-middleware]: https://github.com/TrueLayer/reqwest-middleware/blob/f854725791ccf4a02c401a26cab3d9db753f468c/reqwest-retry/src/retryable.rs
trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    #[allow(clippy::if_same_then_else)]
    fn should_retry(&self) -> bool {
        let status = *self;
        if status.is_server_error() {
            true
        } else if status.is_client_error()
            && status != StatusCode::REQUEST_TIMEOUT
            && status != StatusCode::TOO_MANY_REQUESTS
        {
            false
        } else if status.is_success() {
            false
        } else {
            status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS
        }
    }
}

impl RetryExt for reqwest::Error {
    fn should_retry(&self) -> bool {
        if self.is_timeout() {
            true
        } else if self.is_connect() || self.is_body() || self.is_decode() || self.is_builder() {
            false
        } else if let Some(status) = self.status() {
            status.should_retry()
        } else {
            false
        }
    }
}

/// Builder for [`RemoteClient`].
///
/// All fields default; validation happens when [`RemoteClientBuilder::client`]
/// assembles the client.
#[derive(TypedBuilder, Debug)]
#[builder(field_defaults(default, setter(into)))]
pub struct RemoteClientBuilder {
    /// Endpoint receiving each payload as an HTTP POST. Required.
    endpoint: Option<String>,

    /// Optional bearer token sent in the `Authorization` header.
    ///
    /// Wrapped in [`SecretString`] so it is never logged or debug-printed.
    api_token: Option<SecretString>,

    /// Per-attempt timeout. A timed-out attempt counts as rate-limited
    /// (transient) and is requeued.
    timeout: Option<Duration>,

    /// Extra headers sent with every request
    custom_headers: HeaderMap,

    /// The user agent of the dispatcher
    user_agent: Option<String>,
}

impl RemoteClientBuilder {
    /// Assemble the [`RemoteClient`]
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MissingEndpoint`] when no endpoint was set,
    /// [`ErrorKind::InvalidEndpoint`] when it does not parse as a URL, and
    /// [`ErrorKind::NetworkRequest`] when the underlying reqwest client
    /// cannot be constructed.
    pub fn client(&self) -> Result<RemoteClient> {
        let raw = self.endpoint.as_ref().ok_or(ErrorKind::MissingEndpoint)?;
        let endpoint =
            Url::parse(raw).map_err(|e| ErrorKind::InvalidEndpoint(raw.clone(), e))?;

        let mut headers = self.custom_headers.clone();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.api_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let inner = reqwest::Client::builder()
            .gzip(true)
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(self.timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
            .build()
            .map_err(ErrorKind::NetworkRequest)?;

        Ok(RemoteClient { endpoint, inner })
    }
}

/// Executor that POSTs each payload to a remote HTTP JSON endpoint.
///
/// The payload is sent verbatim as the request body. A successful
/// response is expected to carry the consumed unit count in its JSON body
/// (`usage.total_tokens`, `total_tokens`, or `tokens`); responses without
/// one count as zero units, which only affects metrics, not admission.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    endpoint: Url,
    inner: reqwest::Client,
}

impl RemoteClient {
    /// The endpoint this client posts to
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn classify(status: StatusCode, body: std::result::Result<serde_json::Value, reqwest::Error>, latency: Duration) -> ExecutionOutcome {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ExecutionOutcome::RateLimited;
        }
        if status.is_success() {
            return match body {
                Ok(value) => ExecutionOutcome::Success {
                    units: extract_units(&value).unwrap_or(0),
                    latency,
                },
                Err(_) => {
                    ExecutionOutcome::HardFailure("response body is not valid JSON".to_string())
                }
            };
        }
        if status.should_retry() {
            ExecutionOutcome::RateLimited
        } else {
            ExecutionOutcome::HardFailure(format!("rejected with status {status}"))
        }
    }
}

#[async_trait]
impl crate::Executor for RemoteClient {
    async fn execute(&self, payload: &str) -> ExecutionOutcome {
        let start = Instant::now();
        let response = self
            .inner
            .post(self.endpoint.clone())
            .body(payload.to_string())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let body = response.json::<serde_json::Value>().await;
                Self::classify(status, body, start.elapsed())
            }
            Err(e) if e.should_retry() => ExecutionOutcome::RateLimited,
            Err(e) => ExecutionOutcome::HardFailure(e.to_string()),
        }
    }
}

/// Pull the consumed unit count out of a response body.
///
/// Checks the common layouts: `usage.total_tokens` (chat-completion
/// style), then top-level `total_tokens` or `tokens`.
fn extract_units(value: &serde_json::Value) -> Option<u64> {
    value
        .pointer("/usage/total_tokens")
        .or_else(|| value.get("total_tokens"))
        .or_else(|| value.get("tokens"))
        .and_then(serde_json::Value::as_u64)
}
