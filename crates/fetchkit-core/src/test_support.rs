//! Mock transports and recording collaborators shared by store tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    effects::{FailureContext, Notice, Notifier, Telemetry},
    error::StoreError,
    runner::lock,
    transport::{Page, Transport, TransportCall, TransportFailure, TransportFuture},
};

/// Invoice-list style filter payload used across store tests.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct Filters {
    pub status: String,
}

impl Filters {
    pub fn paid() -> Self {
        Self {
            status: "paid".to_owned(),
        }
    }
}

/// Payload whose response and resolution delay are caller-controlled.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct DelayedPayload {
    pub tag: String,
    pub delay_ms: u64,
}

/// Transport echoing `{"tag": ...}` after the payload's delay.
pub(crate) struct EchoTransport;

impl Transport<DelayedPayload> for EchoTransport {
    fn execute(&self, call: TransportCall<DelayedPayload>) -> TransportFuture {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(call.variables.delay_ms)).await;
            Ok(json!({ "tag": call.variables.tag }))
        })
    }
}

/// Transport replaying a scripted sequence of results, then a fallback.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, TransportFailure>>>,
    fallback: Result<Value, TransportFailure>,
    delay_ms: u64,
    calls: AtomicU32,
}

impl ScriptedTransport {
    pub fn always(fallback: Result<Value, TransportFailure>) -> Self {
        Self::sequence(Vec::new(), fallback)
    }

    pub fn sequence(
        script: Vec<Result<Value, TransportFailure>>,
        fallback: Result<Value, TransportFailure>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay_ms: 0,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<P> Transport<P> for ScriptedTransport {
    fn execute(&self, _call: TransportCall<P>) -> TransportFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let delay_ms = self.delay_ms;
        Box::pin(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            result
        })
    }
}

/// Transport serving offset/limit slices of a generated item set.
pub(crate) struct PagedTransport {
    items: Vec<Value>,
    reported_total: Mutex<u64>,
    delay_ms: u64,
    fail_next: AtomicBool,
    calls: AtomicU32,
}

impl PagedTransport {
    pub fn new(item_count: usize) -> Self {
        let items = (0..item_count).map(|i| json!({ "id": i })).collect();
        Self {
            items,
            reported_total: Mutex::new(item_count as u64),
            delay_ms: 0,
            fail_next: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Override the total reported alongside the next responses.
    pub fn report_total(&self, total: u64) {
        *lock(&self.reported_total) = total;
    }

    /// Make the next call fail with a network error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<P> Transport<P> for PagedTransport {
    fn execute(&self, call: TransportCall<P>) -> TransportFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Box::pin(async { Err(TransportFailure::Network("simulated outage".into())) });
        }

        let page = call.page.unwrap_or(Page {
            offset: 0,
            limit: self.items.len() as u64,
        });
        let start = (page.offset as usize).min(self.items.len());
        let end = (start + page.limit as usize).min(self.items.len());
        let slice: Vec<Value> = self.items[start..end].to_vec();
        let total = *lock(&self.reported_total);
        let delay_ms = self.delay_ms;
        Box::pin(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Ok(json!({ "items": slice, "total": total }))
        })
    }
}

/// Notifier recording every notice it is handed.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        lock(&self.notices).push(notice);
    }
}

/// Telemetry collector recording every terminal failure.
#[derive(Default)]
pub(crate) struct RecordingTelemetry {
    failures: Mutex<Vec<(StoreError, FailureContext)>>,
}

impl RecordingTelemetry {
    pub fn failures(&self) -> Vec<(StoreError, FailureContext)> {
        lock(&self.failures).clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record_failure(&self, error: &StoreError, context: &FailureContext) {
        lock(&self.failures).push((error.clone(), context.clone()));
    }
}
