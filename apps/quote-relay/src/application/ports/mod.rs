//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QuoteSourcePort`: External price API
//! - `QuoteStorePort`: Append-only sample history
//! - `TransportPort`: Publish/subscribe broker connection

mod quote_source_port;
mod quote_store_port;
mod transport_port;

pub use quote_source_port::{FETCH_TIMEOUT, FetchError, QuoteSourcePort};
pub use quote_store_port::{QuoteStorePort, StoreError, StoredQuote};
pub use transport_port::{
    CloseReason, ConnectionState, Message, Subscription, TransportError, TransportPort,
    validate_subject,
};

#[cfg(test)]
pub use quote_source_port::MockQuoteSourcePort;
#[cfg(test)]
pub use quote_store_port::MockQuoteStorePort;
