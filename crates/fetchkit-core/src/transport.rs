use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Whether an operation reads or writes upstream state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
}

/// A named query or mutation, with the variant resolved at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    kind: OperationKind,
}

impl Operation {
    /// Define a read operation.
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Query,
        }
    }

    /// Define a write operation.
    pub fn mutation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Mutation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

/// Offset/limit window attached to paginated calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    /// Starting index into the server-side result set.
    pub offset: u64,
    /// Maximum number of items requested.
    pub limit: u64,
}

/// One invocation handed to the transport binding.
///
/// `page` is `None` for single-request stores; paginated stores fill it in.
/// The cancellation token is owned by the caller; the transport should stop
/// work and fail with [`TransportFailure::Cancelled`] once it trips.
#[derive(Debug, Clone)]
pub struct TransportCall<P> {
    pub operation: Operation,
    pub variables: P,
    pub page: Option<Page>,
    pub cancel: CancellationToken,
}

/// Failure shapes a transport binding may reject with.
///
/// The variants are deliberately coarse; [`crate::error::classify`] maps them
/// to the user-facing error taxonomy, so a binding only has to distinguish
/// "could not reach the server" from "the server answered with an error".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    /// The call's cancellation token tripped before a response arrived.
    #[error("request was cancelled")]
    Cancelled,
    /// Connectivity-level failure: DNS, connect, timeout, dropped socket.
    #[error("network failure: {0}")]
    Network(String),
    /// The server answered with an application-level error payload.
    #[error("server error: {message}")]
    Server {
        /// HTTP-style status code, when the binding has one.
        status: Option<u16>,
        message: String,
        /// Server-provided backoff hint, honored by the retry policy.
        retry_after_ms: Option<u64>,
    },
    /// The response arrived but could not be decoded into JSON.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Anything the binding could not attribute to the cases above.
    #[error("{0}")]
    Other(String),
}

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture =
    Pin<Box<dyn Future<Output = Result<Value, TransportFailure>> + Send + 'static>>;

/// Injected "execute query/mutation" capability.
///
/// Implementations own the wire encoding entirely; the store only sees the
/// decoded JSON value or a [`TransportFailure`].
pub trait Transport<P>: Send + Sync {
    fn execute(&self, call: TransportCall<P>) -> TransportFuture;
}
