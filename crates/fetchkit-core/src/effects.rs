use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Error,
    Warning,
    Info,
}

/// User-visible notification emitted on terminal unrecovered failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub severity: NoticeSeverity,
}

impl Notice {
    pub fn error(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            severity: NoticeSeverity::Error,
        }
    }
}

/// Injected notification side effect (toast-style UI, typically).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Context attached to every telemetry report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    /// Name of the operation that failed.
    pub operation: String,
    /// Serialized variables of the failing invocation, when serializable.
    pub variables: Option<Value>,
}

/// Injected telemetry collector.
///
/// Receives every terminal failure, independent of whether the failure was
/// shown to the user.
pub trait Telemetry: Send + Sync {
    fn record_failure(&self, error: &StoreError, context: &FailureContext);
}
