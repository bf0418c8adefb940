//! Generic remote-data request/store engine.
//!
//! This crate turns a typed query/mutation definition into a stateful,
//! cacheable, retryable, paginatable client-side data source. It defines the
//! transport and side-effect boundaries, the error taxonomy and retry policy,
//! the response transform pipeline, and the single/paginated store types.

/// Side-effect collaborators: user notification and failure telemetry.
pub mod effects;
/// Error taxonomy, classification, and HTTP status helpers.
pub mod error;
/// Store configuration templates and constructor entry points.
pub mod factory;
/// Paginated request store with offset/limit append semantics.
pub mod paginated;
/// Retry decision policy with exponential backoff.
pub mod retry;
mod runner;
/// Single-request store with latest-wins concurrency.
pub mod single;
/// Request and pagination state snapshots.
pub mod state;
/// Response transform pipeline run after every successful request.
pub mod transform;
/// Transport boundary: operations, calls, and failure shapes.
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use effects::{FailureContext, Notice, NoticeSeverity, Notifier, Telemetry};
pub use error::{ErrorKind, StoreError, classify, classify_http_status};
pub use factory::{
    PaginatedConfig, RequestConfig, create_paginated_store, create_request_store,
};
pub use paginated::PaginatedRequestStore;
pub use retry::{RetryDecision, RetryPolicy};
pub use single::{FetchOptions, SingleRequestStore, SuccessHook};
pub use state::{PaginatedState, PaginationState, RequestState};
pub use transform::TransformPipeline;
pub use transport::{
    Operation, OperationKind, Page, Transport, TransportCall, TransportFailure, TransportFuture,
};
