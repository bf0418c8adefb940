use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{ErrorKind, StoreError},
    runner::{lock, RequestRunner},
    single::{FetchOptions, SuccessHook},
    state::{PaginatedState, PaginationState},
    transform::TransformPipeline,
    transport::Page,
};

/// Extracts the server-reported total from the raw (pre-transform) response.
pub type TotalExtractor = Arc<dyn Fn(&Value) -> u64 + Send + Sync>;

struct Tracked<T> {
    items: Vec<T>,
    pagination: PaginationState,
    loading: bool,
    error: Option<StoreError>,
    latest: u64,
}

/// Stateful paginated data source over an offset/limit collection.
///
/// `fetch` always resets to offset 0 and replaces the collection ("new
/// filter = new list"); `fetch_more` appends the next page. Items preserve
/// server order within a page and append order across pages; the store never
/// re-sorts. A failed `fetch_more` leaves items and the pagination cursor
/// exactly as they were.
pub struct PaginatedRequestStore<P, T> {
    runner: RequestRunner<P>,
    transform: TransformPipeline<Vec<T>>,
    extract_total: TotalExtractor,
    on_success: Option<SuccessHook<Vec<T>>>,
    limit: u64,
    default_payload: Option<P>,
    tracked: Mutex<Tracked<T>>,
    last_payload: Mutex<Option<P>>,
    sequence: AtomicU64,
}

impl<P, T> PaginatedRequestStore<P, T>
where
    P: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        runner: RequestRunner<P>,
        transform: TransformPipeline<Vec<T>>,
        extract_total: TotalExtractor,
        on_success: Option<SuccessHook<Vec<T>>>,
        limit: u64,
        default_payload: Option<P>,
    ) -> Self {
        let limit = limit.max(1);
        Self {
            runner,
            transform,
            extract_total,
            on_success,
            limit,
            default_payload,
            tracked: Mutex::new(Tracked {
                items: Vec::new(),
                pagination: PaginationState::new(limit),
                loading: false,
                error: None,
                latest: 0,
            }),
            last_payload: Mutex::new(None),
            sequence: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current items, pagination cursor, and error state.
    pub fn state(&self) -> PaginatedState<T> {
        let tracked = lock(&self.tracked);
        PaginatedState {
            items: tracked.items.clone(),
            pagination: tracked.pagination,
            loading: tracked.loading,
            error: tracked.error.clone(),
        }
    }

    /// Load the first page, replacing the collection entirely.
    pub async fn fetch(&self, payload: Option<P>) -> Result<Vec<T>, StoreError> {
        self.fetch_with(payload, FetchOptions::default()).await
    }

    pub async fn fetch_with(
        &self,
        payload: Option<P>,
        options: FetchOptions,
    ) -> Result<Vec<T>, StoreError> {
        let payload = self.resolve_payload(payload)?;
        *lock(&self.last_payload) = Some(payload.clone());

        let seq = self.next_seq();
        let was_enabled = {
            let mut tracked = lock(&self.tracked);
            tracked.latest = seq;
            tracked.loading = true;
            tracked.error = None;
            let was_enabled = tracked.pagination.enabled;
            // Block load-more while the offset-0 reset is in flight.
            tracked.pagination.enabled = false;
            was_enabled
        };
        debug!(operation = %self.runner.operation.name(), seq, "paginated fetch started");

        let page = Page {
            offset: 0,
            limit: self.limit,
        };
        let cancel = options.cancel.clone().unwrap_or_default();
        let outcome = match self.runner.run(&payload, Some(page), &cancel).await {
            Ok(raw) => {
                let total = (self.extract_total)(&raw);
                self.transform.run(raw).map(|items| (items, total))
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok((items, total)) => {
                let committed = {
                    let mut tracked = lock(&self.tracked);
                    if tracked.latest == seq {
                        let offset = items.len() as u64;
                        tracked.items = items.clone();
                        tracked.pagination = PaginationState {
                            offset,
                            limit: self.limit,
                            total: total.max(offset),
                            enabled: true,
                        };
                        tracked.loading = false;
                        tracked.error = None;
                        true
                    } else {
                        false
                    }
                };
                if committed {
                    if let Some(hook) = &self.on_success {
                        hook(&items);
                    }
                }
                Ok(items)
            }
            Err(error) => self.settle_failure(
                seq,
                &payload,
                error,
                options.self_handle_error,
                Some(was_enabled),
            ),
        }
    }

    /// Load the next page and append it to the collection.
    ///
    /// No-op (current items returned, no network call) when a request is
    /// already in flight or everything is loaded.
    pub async fn fetch_more(&self, payload: Option<P>) -> Result<Vec<T>, StoreError> {
        self.fetch_more_with(payload, FetchOptions::default()).await
    }

    pub async fn fetch_more_with(
        &self,
        payload: Option<P>,
        options: FetchOptions,
    ) -> Result<Vec<T>, StoreError> {
        let payload = payload
            .or_else(|| lock(&self.last_payload).clone())
            .or_else(|| self.default_payload.clone());
        let payload = match payload {
            Some(payload) => payload,
            None => {
                return Err(StoreError::new(
                    ErrorKind::Validation,
                    "no payload was supplied and no default is configured",
                ));
            }
        };

        let seq = self.next_seq();
        let page = {
            let mut tracked = lock(&self.tracked);
            if tracked.loading || !tracked.pagination.has_more() {
                return Ok(tracked.items.clone());
            }
            tracked.latest = seq;
            tracked.loading = true;
            tracked.error = None;
            Page {
                offset: tracked.pagination.offset,
                limit: self.limit,
            }
        };
        debug!(
            operation = %self.runner.operation.name(),
            seq,
            offset = page.offset,
            "fetch_more started"
        );

        let cancel = options.cancel.clone().unwrap_or_default();
        let outcome = match self.runner.run(&payload, Some(page), &cancel).await {
            Ok(raw) => {
                let total = (self.extract_total)(&raw);
                self.transform.run(raw).map(|items| (items, total))
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok((new_items, total)) => {
                let (committed, snapshot) = {
                    let mut tracked = lock(&self.tracked);
                    if tracked.latest == seq {
                        tracked.items.extend(new_items.iter().cloned());
                        tracked.pagination.offset += new_items.len() as u64;
                        tracked.pagination.total = total.max(tracked.pagination.offset);
                        tracked.loading = false;
                        tracked.error = None;
                        (true, tracked.items.clone())
                    } else {
                        (false, tracked.items.clone())
                    }
                };
                if committed {
                    if let Some(hook) = &self.on_success {
                        hook(&snapshot);
                    }
                }
                Ok(snapshot)
            }
            Err(error) => {
                self.settle_failure(seq, &payload, error, options.self_handle_error, None)
            }
        }
    }

    /// Re-run the offset-0 fetch, replaying the last payload when none given.
    pub async fn refetch(&self, payload: Option<P>) -> Result<Vec<T>, StoreError> {
        self.refetch_with(payload, FetchOptions::default()).await
    }

    pub async fn refetch_with(
        &self,
        payload: Option<P>,
        options: FetchOptions,
    ) -> Result<Vec<T>, StoreError> {
        let payload = payload.or_else(|| lock(&self.last_payload).clone());
        self.fetch_with(payload, options).await
    }

    /// Reset to an empty collection and a fresh pagination cursor.
    /// Synchronous, never fails, no network side effect.
    pub fn clear(&self) {
        let seq = self.next_seq();
        let mut tracked = lock(&self.tracked);
        tracked.latest = seq;
        tracked.items.clear();
        tracked.pagination = PaginationState::new(self.limit);
        tracked.loading = false;
        tracked.error = None;
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

    fn settle_failure(
        &self,
        seq: u64,
        payload: &P,
        error: StoreError,
        self_handle_error: bool,
        enabled_on_cancel: Option<bool>,
    ) -> Result<Vec<T>, StoreError> {
        if error.kind == ErrorKind::Cancelled {
            let mut tracked = lock(&self.tracked);
            if tracked.latest == seq {
                tracked.loading = false;
                if let Some(enabled) = enabled_on_cancel {
                    tracked.pagination.enabled = enabled;
                }
            }
            return Err(error);
        }

        let committed = {
            let mut tracked = lock(&self.tracked);
            if tracked.latest == seq {
                tracked.loading = false;
                tracked.error = Some(error.clone());
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

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        effects::{Notifier, Telemetry},
        factory::{create_paginated_store, PaginatedConfig},
        test_support::{Filters, PagedTransport, RecordingNotifier, RecordingTelemetry},
        transport::{Operation, Transport},
    };

    fn invoice_store(
        transport: Arc<PagedTransport>,
        limit: u64,
    ) -> PaginatedRequestStore<Filters, Value> {
        let config = PaginatedConfig::new(Operation::query("invoice_list"), transport, limit);
        create_paginated_store(&config)
    }

    #[tokio::test]
    async fn fetch_loads_the_first_page_and_total() {
        let transport = Arc::new(PagedTransport::new(45));
        let store = invoice_store(Arc::clone(&transport), 20);

        let items = store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        assert_eq!(items.len(), 20);

        let state = store.state();
        assert_eq!(state.items.len(), 20);
        assert_eq!(state.pagination.offset, 20);
        assert_eq!(state.pagination.total, 45);
        assert!(state.pagination.has_more());
        assert!(!state.loading);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn fetch_more_appends_in_order() {
        let transport = Arc::new(PagedTransport::new(45));
        let store = invoice_store(transport, 20);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        let items = store
            .fetch_more(None)
            .await
            .expect("fetch_more should succeed");

        assert_eq!(items.len(), 40);
        let state = store.state();
        assert_eq!(state.pagination.offset, 40);
        // Concatenation order: first twenty, then the next twenty.
        for (index, item) in state.items.iter().enumerate() {
            assert_eq!(item, &json!({ "id": index }));
        }
    }

    #[tokio::test]
    async fn item_count_grows_monotonically_until_exhausted() {
        let transport = Arc::new(PagedTransport::new(45));
        let store = invoice_store(Arc::clone(&transport), 20);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");

        let mut lengths = vec![store.state().items.len()];
        for _ in 0..4 {
            let items = store
                .fetch_more(None)
                .await
                .expect("fetch_more should succeed");
            lengths.push(items.len());
        }

        assert_eq!(lengths, vec![20, 40, 45, 45, 45]);
        // Exhausted fetch_more calls never hit the network.
        assert_eq!(transport.calls(), 3);
        assert!(!store.state().pagination.has_more());
    }

    #[tokio::test]
    async fn fetch_replaces_the_collection_after_fetch_more() {
        let transport = Arc::new(PagedTransport::new(45));
        let store = invoice_store(transport, 20);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        store
            .fetch_more(None)
            .await
            .expect("fetch_more should succeed");
        assert_eq!(store.state().items.len(), 40);

        let items = store
            .fetch(Some(Filters::paid()))
            .await
            .expect("second fetch should succeed");
        assert_eq!(items.len(), 20);
        assert_eq!(store.state().pagination.offset, 20);
    }

    #[tokio::test]
    async fn failed_fetch_more_leaves_items_and_cursor_untouched() {
        let transport = Arc::new(PagedTransport::new(45));
        let notifier = Arc::new(RecordingNotifier::default());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let config: PaginatedConfig<Filters, Value> =
            PaginatedConfig::new(Operation::query("invoice_list"), Arc::clone(&transport) as Arc<dyn Transport<Filters>>, 20)
                .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
                .with_telemetry(Arc::clone(&telemetry) as Arc<dyn Telemetry>);
        let store = create_paginated_store(&config);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        transport.fail_next();

        let err = store
            .fetch_more(None)
            .await
            .expect_err("fetch_more should fail");
        assert_eq!(err.kind, ErrorKind::Network);

        let state = store.state();
        assert_eq!(state.items.len(), 20);
        assert_eq!(state.pagination.offset, 20);
        assert_eq!(state.pagination.total, 45);
        assert!(!state.loading);
        assert_eq!(state.error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));
        assert_eq!(notifier.notices().len(), 1);
        assert_eq!(telemetry.failures().len(), 1);

        // The list can still be extended afterwards.
        let items = store
            .fetch_more(None)
            .await
            .expect("retry fetch_more should succeed");
        assert_eq!(items.len(), 40);
    }

    #[tokio::test]
    async fn cancelled_fetch_leaves_items_and_reenables_load_more() {
        let transport = Arc::new(PagedTransport::new(45));
        let notifier = Arc::new(RecordingNotifier::default());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let config: PaginatedConfig<Filters, Value> =
            PaginatedConfig::new(Operation::query("invoice_list"), Arc::clone(&transport) as Arc<dyn Transport<Filters>>, 20)
                .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>)
                .with_telemetry(Arc::clone(&telemetry) as Arc<dyn Telemetry>);
        let store = create_paginated_store(&config);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store
            .fetch_with(
                Some(Filters::paid()),
                FetchOptions::default().with_cancel(cancel),
            )
            .await
            .expect_err("cancelled fetch should fail");
        assert_eq!(err.kind, ErrorKind::Cancelled);

        // The cancelled reset commits nothing and reports nothing.
        let state = store.state();
        assert_eq!(state.items.len(), 20);
        assert_eq!(state.pagination.offset, 20);
        assert_eq!(state.pagination.total, 45);
        assert!(!state.loading);
        assert_eq!(state.error, None);
        assert!(notifier.notices().is_empty());
        assert!(telemetry.failures().is_empty());
        assert_eq!(transport.calls(), 1);

        // enabled is restored to its pre-call value, so the cursor still moves.
        assert!(state.pagination.enabled);
        let items = store
            .fetch_more(None)
            .await
            .expect("fetch_more should succeed");
        assert_eq!(items.len(), 40);
    }

    #[tokio::test]
    async fn failed_reset_disables_load_more_until_a_successful_fetch() {
        let transport = Arc::new(PagedTransport::new(45));
        let store = invoice_store(Arc::clone(&transport), 20);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        transport.fail_next();
        let err = store
            .refetch(None)
            .await
            .expect_err("refetch should fail");
        assert_eq!(err.kind, ErrorKind::Network);

        let state = store.state();
        assert_eq!(state.items.len(), 20);
        assert!(!state.pagination.enabled);
        assert!(!state.pagination.has_more());

        // Load-more stays suppressed: current items back, no network call.
        let items = store
            .fetch_more(None)
            .await
            .expect("fetch_more should no-op");
        assert_eq!(items.len(), 20);
        assert_eq!(transport.calls(), 2);

        // A successful reset re-opens pagination.
        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("second fetch should succeed");
        assert!(store.state().pagination.has_more());
        let items = store
            .fetch_more(None)
            .await
            .expect("fetch_more should succeed");
        assert_eq!(items.len(), 40);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn shrunken_server_total_never_underflows() {
        let transport = Arc::new(PagedTransport::new(45));
        let store = invoice_store(Arc::clone(&transport), 20);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        transport.report_total(10);

        store
            .fetch_more(None)
            .await
            .expect("fetch_more should succeed");

        let state = store.state();
        assert_eq!(state.items.len(), 40);
        // Total is clamped up to the loaded count so offset <= total holds.
        assert_eq!(state.pagination.total, 40);
        assert_eq!(state.pagination.remaining(), 0);
        assert!(!state.pagination.has_more());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_more_is_a_noop_while_a_request_is_in_flight() {
        let transport = Arc::new(PagedTransport::new(45).with_delay_ms(50));
        let store = invoice_store(Arc::clone(&transport), 20);

        // Prime the store so fetch_more has a cursor to work with.
        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        assert_eq!(transport.calls(), 1);

        let first_more = store.fetch_more(None);
        let second_more = store.fetch_more(None);
        let (first, second) = tokio::join!(first_more, second_more);

        // Only one of the two overlapping calls reached the network.
        assert_eq!(transport.calls(), 2);
        assert_eq!(first.expect("first fetch_more resolves").len(), 40);
        // The overlapping call observed the pre-append collection.
        assert_eq!(second.expect("second fetch_more resolves").len(), 20);
        assert_eq!(store.state().items.len(), 40);
    }

    #[tokio::test]
    async fn fetch_more_before_any_fetch_is_a_noop() {
        let transport = Arc::new(PagedTransport::new(45));
        let config: PaginatedConfig<Filters, Value> = PaginatedConfig::new(
            Operation::query("invoice_list"),
            Arc::clone(&transport) as Arc<dyn Transport<Filters>>,
            20,
        )
        .with_default_payload(Filters::paid());
        let store = create_paginated_store(&config);

        let items = store
            .fetch_more(None)
            .await
            .expect("fetch_more should no-op");
        assert!(items.is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn clear_resets_items_and_cursor_and_is_idempotent() {
        let transport = Arc::new(PagedTransport::new(45));
        let store = invoice_store(transport, 20);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        store.clear();

        let once = store.state();
        assert!(once.items.is_empty());
        assert_eq!(
            once.pagination,
            PaginationState {
                offset: 0,
                limit: 20,
                total: 0,
                enabled: true,
            }
        );
        assert!(!once.loading);
        assert_eq!(once.error, None);

        store.clear();
        assert_eq!(store.state(), once);
    }

    #[tokio::test]
    async fn refetch_replays_the_last_filters() {
        let transport = Arc::new(PagedTransport::new(5));
        let store = invoice_store(Arc::clone(&transport), 2);

        store
            .fetch(Some(Filters::paid()))
            .await
            .expect("fetch should succeed");
        let items = store.refetch(None).await.expect("refetch should succeed");

        assert_eq!(items.len(), 2);
        assert_eq!(store.state().pagination.offset, 2);
        assert_eq!(transport.calls(), 2);
    }
}
