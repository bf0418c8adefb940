//! HTTP/JSON transport binding for the fetchkit store engine.
//!
//! Posts `{operation, kind, variables, page?}` envelopes to a single
//! endpoint and maps `reqwest` failures onto the transport failure shapes
//! the store's error classifier discriminates on.

use std::time::Duration;

use fetchkit_core::{Operation, Page, Transport, TransportCall, TransportFailure, TransportFuture};
use reqwest::{header::RETRY_AFTER, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors building the transport itself.
#[derive(Debug, Error)]
pub enum HttpTransportError {
    #[error("failed to build http client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Endpoint every operation envelope is POSTed to.
    pub endpoint: Url,
    /// Client-side timeout; expiry surfaces as a network failure.
    pub timeout: Duration,
    /// Optional bearer token sent in the `Authorization` header.
    pub bearer_token: Option<String>,
}

impl HttpTransportConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            bearer_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// Transport binding speaking JSON-over-HTTP to one endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    bearer_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpTransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint,
            bearer_token: config.bearer_token,
        })
    }
}

impl<P> Transport<P> for HttpTransport
where
    P: Serialize + Send + Sync + 'static,
{
    fn execute(&self, call: TransportCall<P>) -> TransportFuture {
        let body = match build_body(&call.operation, &call.variables, call.page) {
            Ok(body) => body,
            Err(failure) => return Box::pin(async move { Err(failure) }),
        };

        debug!(
            operation = %call.operation.name(),
            page = ?call.page,
            "dispatching http request"
        );

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let cancel = call.cancel.clone();

        Box::pin(async move {
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportFailure::Cancelled),
                sent = request.send() => sent.map_err(map_send_error)?,
            };

            let status = response.status();
            if !status.is_success() {
                let retry_after_ms = parse_retry_after(response.headers().get(RETRY_AFTER));
                let message = match response.text().await {
                    Ok(text) if !text.trim().is_empty() => text,
                    _ => status_message(status),
                };
                return Err(TransportFailure::Server {
                    status: Some(status.as_u16()),
                    message,
                    retry_after_ms,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => Err(TransportFailure::Cancelled),
                decoded = response.json::<Value>() => {
                    decoded.map_err(|err| TransportFailure::Malformed(err.to_string()))
                }
            }
        })
    }
}

fn build_body<P: Serialize>(
    operation: &Operation,
    variables: &P,
    page: Option<Page>,
) -> Result<Value, TransportFailure> {
    let variables = serde_json::to_value(variables)
        .map_err(|err| TransportFailure::Other(format!("unserializable variables: {err}")))?;
    let mut body = json!({
        "operation": operation.name(),
        "kind": operation.kind(),
        "variables": variables,
    });
    if let Some(page) = page {
        body["page"] = json!({ "offset": page.offset, "limit": page.limit });
    }
    Ok(body)
}

fn map_send_error(err: reqwest::Error) -> TransportFailure {
    if err.is_decode() {
        TransportFailure::Malformed(err.to_string())
    } else {
        // Timeouts, connect failures, and dropped sockets all count as
        // connectivity problems.
        TransportFailure::Network(err.to_string())
    }
}

fn parse_retry_after(header: Option<&reqwest::header::HeaderValue>) -> Option<u64> {
    let seconds: u64 = header?.to_str().ok()?.trim().parse().ok()?;
    Some(seconds.saturating_mul(1_000))
}

fn status_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => format!("status {}", status.as_u16()),
    }
}
