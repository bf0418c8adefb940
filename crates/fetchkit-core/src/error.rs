use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportFailure;

/// Broad error category used for retry decisions and user-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connectivity or transport-level failure; retryable by default.
    Network,
    /// The server answered with an application-level error payload.
    Server,
    /// Malformed response shape, or a caller/configuration mistake.
    Validation,
    /// The invocation was cancelled; never retried, never surfaced as an error.
    Cancelled,
    /// Unattributable failure.
    Unknown,
}

/// Classified error committed to store state after a terminal failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    /// High-level error kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Stringified underlying cause, when one exists.
    pub detail: Option<String>,
    /// Optional server-provided retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl StoreError {
    /// Construct a new classified error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
            retry_after_ms: None,
        }
    }

    /// Attach the stringified cause.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a retry hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }
}

/// Map an HTTP status code to an error kind.
///
/// Used by transport bindings when the upstream speaks plain HTTP: request
/// timeout counts as a network problem, other 4xx are caller mistakes, 5xx
/// are server faults.
pub fn classify_http_status(status: u16) -> ErrorKind {
    match status {
        408 => ErrorKind::Network,
        400..=499 => ErrorKind::Validation,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

/// Classify a transport failure into the store error taxonomy.
///
/// Priority order: explicit cancellation, then connectivity, then server
/// payload, then malformed shape, then unknown.
pub fn classify(failure: &TransportFailure) -> StoreError {
    match failure {
        TransportFailure::Cancelled => {
            StoreError::new(ErrorKind::Cancelled, "the request was cancelled")
        }
        TransportFailure::Network(detail) => {
            StoreError::new(ErrorKind::Network, "could not reach the server")
                .with_detail(detail.clone())
        }
        TransportFailure::Server {
            status,
            message,
            retry_after_ms,
        } => {
            let kind = match status {
                Some(code) => classify_http_status(*code),
                None => ErrorKind::Server,
            };
            StoreError {
                kind,
                message: message.clone(),
                detail: status.map(|code| format!("status {code}")),
                retry_after_ms: *retry_after_ms,
            }
        }
        TransportFailure::Malformed(detail) => {
            StoreError::new(ErrorKind::Validation, "the server response had an unexpected shape")
                .with_detail(detail.clone())
        }
        TransportFailure::Other(detail) => {
            StoreError::new(ErrorKind::Unknown, "the request failed").with_detail(detail.clone())
        }
    }
}
