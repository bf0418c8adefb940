use std::{env, sync::Arc};

use fetchkit_core::{
    create_paginated_store, Notice, Notifier, Operation, PaginatedConfig, Transport, TransportCall,
    TransportFuture,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,fetchkit_core=debug";

#[derive(Debug, Clone, Serialize)]
struct InvoiceFilters {
    status: String,
}

/// In-process transport serving a canned invoice list page by page.
struct CannedInvoices {
    invoices: Vec<Value>,
}

impl CannedInvoices {
    fn new(count: usize) -> Self {
        let invoices = (0..count)
            .map(|i| json!({ "id": i, "amount_cents": 1_250 + 100 * i }))
            .collect();
        Self { invoices }
    }
}

impl Transport<InvoiceFilters> for CannedInvoices {
    fn execute(&self, call: TransportCall<InvoiceFilters>) -> TransportFuture {
        let total = self.invoices.len() as u64;
        let (start, end) = match call.page {
            Some(page) => {
                let start = (page.offset as usize).min(self.invoices.len());
                (start, (start + page.limit as usize).min(self.invoices.len()))
            }
            None => (0, self.invoices.len()),
        };
        let items: Vec<Value> = self.invoices[start..end].to_vec();
        Box::pin(async move { Ok(json!({ "items": items, "total": total })) })
    }
}

struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, notice: Notice) {
        println!("[notice] {:?}: {}", notice.severity, notice.title);
    }
}

fn init_logging() {
    let filter = env::var("FETCHKIT_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok());
    let filter = match filter {
        Some(filter) => filter,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(filter)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let config: PaginatedConfig<InvoiceFilters, Value> = PaginatedConfig::new(
        Operation::query("invoice_list"),
        Arc::new(CannedInvoices::new(45)),
        20,
    )
    .with_notifier(Arc::new(StdoutNotifier));
    let store = create_paginated_store(&config);

    let filters = InvoiceFilters {
        status: "paid".to_owned(),
    };
    match store.fetch(Some(filters)).await {
        Ok(items) => println!("fetched first page: {} invoices", items.len()),
        Err(err) => {
            eprintln!("initial fetch failed: {err}");
            std::process::exit(1);
        }
    }

    while store.state().pagination.has_more() {
        match store.fetch_more(None).await {
            Ok(items) => println!("loaded more: {} invoices so far", items.len()),
            Err(err) => {
                eprintln!("fetch_more failed: {err}");
                std::process::exit(1);
            }
        }
    }

    let state = store.state();
    println!(
        "done: {} of {} invoices loaded",
        state.items.len(),
        state.pagination.total
    );
}
