use crate::error::StoreError;

/// Observable state of a single-request store.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    /// Last committed data, or the configured initial value.
    pub data: T,
    /// Whether a request is currently in flight.
    pub loading: bool,
    /// Terminal error of the last failed request, if any.
    pub error: Option<StoreError>,
}

impl<T> RequestState<T> {
    pub(crate) fn idle(data: T) -> Self {
        Self {
            data,
            loading: false,
            error: None,
        }
    }
}

/// Offset/limit pagination cursor owned by a paginated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    /// Number of items loaded so far; next page starts here.
    pub offset: u64,
    /// Configured page size.
    pub limit: u64,
    /// Server-reported total matching items.
    pub total: u64,
    /// False while an offset-0 reset is replacing the page; load-more is
    /// blocked until that reset commits.
    pub enabled: bool,
}

impl PaginationState {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
            total: 0,
            enabled: true,
        }
    }

    /// Whether another page can be requested.
    pub fn has_more(&self) -> bool {
        self.enabled && self.offset < self.total
    }

    /// Items not yet loaded. Saturates when the server-side total shrank
    /// below what is already loaded.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.offset)
    }
}

/// Observable state of a paginated store.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedState<T> {
    /// Loaded items, in server order, pages appended in request order.
    pub items: Vec<T>,
    pub pagination: PaginationState,
    pub loading: bool,
    pub error: Option<StoreError>,
}
