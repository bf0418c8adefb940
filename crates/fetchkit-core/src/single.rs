use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{ErrorKind, StoreError},
    runner::{lock, RequestRunner},
    state::RequestState,
    transform::TransformPipeline,
};

/// Callback invoked with the committed data after a successful fetch.
pub type SuccessHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Suppress the default user-visible notification on terminal failure;
    /// the caller takes responsibility for its own error UI.
    pub self_handle_error: bool,
    /// External cancellation signal for this invocation.
    pub cancel: Option<CancellationToken>,
}

impl FetchOptions {
    pub fn self_handled() -> Self {
        Self {
            self_handle_error: true,
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

struct Tracked<T> {
    request: RequestState<T>,
    /// Sequence number of the invocation whose commit will be accepted.
    latest: u64,
}

/// Stateful data source bound to one query or mutation.
///
/// Holds the `{data, loading, error}` triple for the operation and enforces
/// "latest request wins": overlapping fetches resolve state in last-started
/// order, with superseded resolutions discarded without a state write.
pub struct SingleRequestStore<P, T> {
    runner: RequestRunner<P>,
    transform: TransformPipeline<T>,
    on_success: Option<SuccessHook<T>>,
    initial: T,
    default_payload: Option<P>,
    tracked: Mutex<Tracked<T>>,
    last_payload: Mutex<Option<P>>,
    sequence: AtomicU64,
}

impl<P, T> SingleRequestStore<P, T>
where
    P: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        runner: RequestRunner<P>,
        transform: TransformPipeline<T>,
        on_success: Option<SuccessHook<T>>,
        initial: T,
        default_payload: Option<P>,
    ) -> Self {
        Self {
            runner,
            transform,
            on_success,
            tracked: Mutex::new(Tracked {
                request: RequestState::idle(initial.clone()),
                latest: 0,
            }),
            initial,
            default_payload,
            last_payload: Mutex::new(None),
            sequence: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current `{data, loading, error}` state.
    pub fn state(&self) -> RequestState<T> {
        lock(&self.tracked).request.clone()
    }

    /// Run the operation with the given payload (or the configured default).
    ///
    /// The loading transition happens synchronously before the first
    /// suspension point, so observers see the pending state without delay.
    /// On success the transformed data is committed and returned; a terminal
    /// failure is committed to `error` and reported. If a newer call started
    /// meanwhile, this call's resolution is discarded.
    pub async fn fetch(&self, payload: Option<P>) -> Result<T, StoreError> {
        self.fetch_with(payload, FetchOptions::default()).await
    }

    pub async fn fetch_with(
        &self,
        payload: Option<P>,
        options: FetchOptions,
    ) -> Result<T, StoreError> {
        let payload = self.resolve_payload(payload)?;
        *lock(&self.last_payload) = Some(payload.clone());

        let seq = self.begin();
        debug!(operation = %self.runner.operation.name(), seq, "fetch started");

        let cancel = options.cancel.clone().unwrap_or_default();
        let outcome = match self.runner.run(&payload, None, &cancel).await {
            Ok(raw) => self.transform.run(raw),
            Err(error) => Err(error),
        };
        self.settle(seq, &payload, outcome, options.self_handle_error)
    }

    /// Re-run the operation, replaying the last payload when none is given.
    pub async fn refetch(&self, payload: Option<P>) -> Result<T, StoreError> {
        self.refetch_with(payload, FetchOptions::default()).await
    }

    pub async fn refetch_with(
        &self,
        payload: Option<P>,
        options: FetchOptions,
    ) -> Result<T, StoreError> {
        let payload = payload.or_else(|| lock(&self.last_payload).clone());
        self.fetch_with(payload, options).await
    }

    /// Reset to the initial state. Synchronous, never fails, no network side
    /// effect. Any in-flight resolution is invalidated and will not commit.
    pub fn clear(&self) {
        let seq = self.next_seq();
        let mut tracked = lock(&self.tracked);
        tracked.latest = seq;
        tracked.request = RequestState::idle(self.initial.clone());
    }

    fn resolve_payload(&self, payload: Option<P>) -> Result<P, StoreError> {
        payload
            .or_else(|| self.default_payload.clone())
            .ok_or_else(|| {
                StoreError::new(
                    ErrorKind::Validation,
                    "no payload was supplied and no default is configured",
                )
            })
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn begin(&self) -> u64 {
        let seq = self.next_seq();
        let mut tracked = lock(&self.tracked);
        tracked.latest = seq;
        tracked.request.loading = true;
        tracked.request.error = None;
        seq
    }

    fn settle(
        &self,
        seq: u64,
        payload: &P,
        outcome: Result<T, StoreError>,
        self_handle_error: bool,
    ) -> Result<T, StoreError> {
        match outcome {
            Ok(data) => {
                let committed = {
                    let mut tracked = lock(&self.tracked);
                    if tracked.latest == seq {
                        tracked.request.data = data.clone();
                        tracked.request.loading = false;
                        tracked.request.error = None;
                        true
                    } else {
                        false
                    }
                };
                if committed {
                    if let Some(hook) = &self.on_success {
                        hook(&data);
                    }
                }
                Ok(data)
            }
            Err(error) => {
                if error.kind == ErrorKind::Cancelled {
                    let mut tracked = lock(&self.tracked);
                    if tracked.latest == seq {
                        tracked.request.loading = false;
                    }
                    return Err(error);
                }

                let committed = {
                    let mut tracked = lock(&self.tracked);
                    if tracked.latest == seq {
                        tracked.request.loading = false;
                        tracked.request.error = Some(error.clone());
                        true
                    } else {
                        false
                    }
                };
                self.runner
                    .report_terminal(&error, payload, self_handle_error || !committed);
                Err(error)
            }
        }
    }
}
