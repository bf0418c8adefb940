//! Store configuration templates and the public constructor entry points.
//!
//! A config object is a read-only template: every store built from it gets
//! fresh state, so constructing two stores from one config yields fully
//! independent instances. Long-lived "singleton" stores are just a caller
//! holding one long-lived reference.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    effects::{Notifier, Telemetry},
    paginated::{PaginatedRequestStore, TotalExtractor},
    retry::RetryPolicy,
    runner::RequestRunner,
    single::{SingleRequestStore, SuccessHook},
    transform::TransformPipeline,
    transport::{Operation, Transport},
};

/// Configuration template for a [`SingleRequestStore`].
pub struct RequestConfig<P, T> {
    operation: Operation,
    transport: Arc<dyn Transport<P>>,
    transform: TransformPipeline<T>,
    retry: Option<RetryPolicy>,
    on_success: Option<SuccessHook<T>>,
    notifier: Option<Arc<dyn Notifier>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    initial: T,
    default_payload: Option<P>,
}

impl<P, T: DeserializeOwned> RequestConfig<P, T> {
    /// Config with the serde-deserializing transform and no retry policy.
    pub fn new(operation: Operation, transport: Arc<dyn Transport<P>>, initial: T) -> Self {
        Self {
            operation,
            transport,
            transform: TransformPipeline::deserializing(),
            retry: None,
            on_success: None,
            notifier: None,
            telemetry: None,
            initial,
            default_payload: None,
        }
    }
}

impl<P, T> RequestConfig<P, T> {
    /// Replace the response transform pipeline.
    pub fn with_transform(mut self, transform: TransformPipeline<T>) -> Self {
        self.transform = transform;
        self
    }

    /// Enable retries per the given policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Invoke the hook once per committed successful fetch.
    pub fn on_success(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Inject the user-visible notification side effect.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Inject the telemetry collector.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Payload used when `fetch`/`refetch` is called without one.
    pub fn with_default_payload(mut self, payload: P) -> Self {
        self.default_payload = Some(payload);
        self
    }
}

impl<P: Clone, T: Clone> Clone for RequestConfig<P, T> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            transport: Arc::clone(&self.transport),
            transform: self.transform.clone(),
            retry: self.retry.clone(),
            on_success: self.on_success.clone(),
            notifier: self.notifier.clone(),
            telemetry: self.telemetry.clone(),
            initial: self.initial.clone(),
            default_payload: self.default_payload.clone(),
        }
    }
}

/// Configuration template for a [`PaginatedRequestStore`].
pub struct PaginatedConfig<P, T> {
    operation: Operation,
    transport: Arc<dyn Transport<P>>,
    transform: TransformPipeline<Vec<T>>,
    extract_total: TotalExtractor,
    retry: Option<RetryPolicy>,
    on_success: Option<SuccessHook<Vec<T>>>,
    notifier: Option<Arc<dyn Notifier>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    limit: u64,
    default_payload: Option<P>,
}

impl<P, T: DeserializeOwned> PaginatedConfig<P, T> {
    /// Config decoding the `"items"` field and reading the `"total"` field,
    /// with no retry policy.
    pub fn new(operation: Operation, transport: Arc<dyn Transport<P>>, limit: u64) -> Self {
        Self {
            operation,
            transport,
            transform: TransformPipeline::deserializing_field("items"),
            extract_total: Arc::new(|raw: &Value| {
                raw.get("total").and_then(Value::as_u64).unwrap_or(0)
            }),
            retry: None,
            on_success: None,
            notifier: None,
            telemetry: None,
            limit,
            default_payload: None,
        }
    }
}

impl<P, T> PaginatedConfig<P, T> {
    /// Replace the per-page transform pipeline.
    ///
    /// Any sorting step must be stable and consistent across pages, so that
    /// appended pages stay monotonic.
    pub fn with_transform(mut self, transform: TransformPipeline<Vec<T>>) -> Self {
        self.transform = transform;
        self
    }

    /// Replace how the server-reported total is read from the raw response.
    pub fn with_total_extractor(
        mut self,
        extract_total: impl Fn(&Value) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.extract_total = Arc::new(extract_total);
        self
    }

    /// Enable retries per the given policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Invoke the hook with the full item list after every committed page.
    pub fn on_success(mut self, hook: impl Fn(&Vec<T>) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Inject the user-visible notification side effect.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Inject the telemetry collector.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Payload used when a call is made without one.
    pub fn with_default_payload(mut self, payload: P) -> Self {
        self.default_payload = Some(payload);
        self
    }
}

impl<P: Clone, T> Clone for PaginatedConfig<P, T> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            transport: Arc::clone(&self.transport),
            transform: self.transform.clone(),
            extract_total: Arc::clone(&self.extract_total),
            retry: self.retry.clone(),
            on_success: self.on_success.clone(),
            notifier: self.notifier.clone(),
            telemetry: self.telemetry.clone(),
            limit: self.limit,
            default_payload: self.default_payload.clone(),
        }
    }
}

/// Build an independent single-request store from the config template.
pub fn create_request_store<P, T>(config: &RequestConfig<P, T>) -> SingleRequestStore<P, T>
where
    P: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    SingleRequestStore::from_parts(
        RequestRunner {
            operation: config.operation.clone(),
            transport: Arc::clone(&config.transport),
            retry: config.retry.clone(),
            notifier: config.notifier.clone(),
            telemetry: config.telemetry.clone(),
        },
        config.transform.clone(),
        config.on_success.clone(),
        config.initial.clone(),
        config.default_payload.clone(),
    )
}

/// Build an independent paginated store from the config template.
pub fn create_paginated_store<P, T>(config: &PaginatedConfig<P, T>) -> PaginatedRequestStore<P, T>
where
    P: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    PaginatedRequestStore::from_parts(
        RequestRunner {
            operation: config.operation.clone(),
            transport: Arc::clone(&config.transport),
            retry: config.retry.clone(),
            notifier: config.notifier.clone(),
            telemetry: config.telemetry.clone(),
        },
        config.transform.clone(),
        Arc::clone(&config.extract_total),
        config.on_success.clone(),
        config.limit,
        config.default_payload.clone(),
    )
}
