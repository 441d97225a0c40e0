//! Quote Store Adapters
//!
//! Implementations of [`QuoteStorePort`]:
//!
//! - [`MemoryQuoteStore`]: process-local history, selected with `memory://`
//! - [`PostgresQuoteStore`]: durable history in `PostgreSQL` via `sqlx`

mod memory;
mod postgres;

use std::sync::Arc;

pub use memory::MemoryQuoteStore;
pub use postgres::PostgresQuoteStore;

use crate::application::ports::{QuoteStorePort, StoreError};
use crate::domain::quote::TrackedSet;

/// Open the store named by `url`.
///
/// # Errors
///
/// Returns [`StoreError::Connection`] if the scheme is unsupported or the
/// database cannot be reached.
pub async fn connect_store(
    url: &str,
    max_connections: u32,
    tracked: TrackedSet,
) -> Result<Arc<dyn QuoteStorePort>, StoreError> {
    if url.starts_with("memory://") {
        tracing::info!("Using in-memory quote store");
        return Ok(Arc::new(MemoryQuoteStore::new()));
    }

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let store = PostgresQuoteStore::connect(url, max_connections, tracked).await?;
        return Ok(Arc::new(store));
    }

    Err(StoreError::Connection(format!(
        "unsupported store URL scheme: {}",
        url.split("://").next().unwrap_or(url)
    )))
}
