use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    effects::{FailureContext, Notice, Notifier, Telemetry},
    error::{classify, ErrorKind, StoreError},
    retry::{RetryDecision, RetryPolicy},
    transport::{Operation, Page, Transport, TransportCall},
};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Critical sections in the stores are plain field writes, so a poisoned
/// guard is still in a usable state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared request plumbing: transport dispatch, retry loop, failure reporting.
///
/// The runner never touches store state; it turns one logical invocation into
/// either a raw response or a terminal classified error.
pub(crate) struct RequestRunner<P> {
    pub operation: Operation,
    pub transport: Arc<dyn Transport<P>>,
    pub retry: Option<RetryPolicy>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub telemetry: Option<Arc<dyn Telemetry>>,
}

impl<P> RequestRunner<P>
where
    P: Clone + Serialize + Send + Sync + 'static,
{
    /// Run the transport call, retrying per policy, until a raw response or a
    /// terminal error. Backoff sleeps race against the cancellation token.
    pub(crate) async fn run(
        &self,
        variables: &P,
        page: Option<Page>,
        cancel: &CancellationToken,
    ) -> Result<Value, StoreError> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::new(
                    ErrorKind::Cancelled,
                    "the request was cancelled",
                ));
            }

            let call = TransportCall {
                operation: self.operation.clone(),
                variables: variables.clone(),
                page,
                cancel: cancel.clone(),
            };
            let failure = match self.transport.execute(call).await {
                Ok(raw) => return Ok(raw),
                Err(failure) => failure,
            };

            let error = classify(&failure);
            let decision = match &self.retry {
                Some(policy) => policy.decide(attempt, &error),
                None => RetryDecision::give_up(),
            };
            if !decision.retry {
                return Err(error);
            }

            attempt = attempt.saturating_add(1);
            debug!(
                operation = %self.operation.name(),
                attempt,
                delay_ms = decision.delay.as_millis() as u64,
                "retrying after transient failure"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(StoreError::new(
                        ErrorKind::Cancelled,
                        "the request was cancelled",
                    ));
                }
                _ = tokio::time::sleep(decision.delay) => {}
            }
        }
    }

    /// Report a terminal failure: tracing always, telemetry always, the
    /// user-visible notice only when not suppressed. Cancellation is treated
    /// as if the call never happened and reports nothing.
    pub(crate) fn report_terminal(&self, error: &StoreError, variables: &P, suppress_notice: bool) {
        if error.kind == ErrorKind::Cancelled {
            return;
        }

        warn!(
            operation = %self.operation.name(),
            kind = ?error.kind,
            "request failed: {}",
            error.message
        );

        if let Some(telemetry) = &self.telemetry {
            let context = FailureContext {
                operation: self.operation.name().to_owned(),
                variables: serde_json::to_value(variables).ok(),
            };
            telemetry.record_failure(error, &context);
        }

        if !suppress_notice {
            if let Some(notifier) = &self.notifier {
                notifier.notify(Notice::error(error.message.clone()));
            }
        }
    }
}
