//! # Data Loader Crate
//!
//! The event store side of the reward feature engine: typed purchase and
//! interaction records, row parsing, per-client datasets and the store
//! abstraction the driver's workers load from.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (EventRecord, PurchaseRecord, ClientDataset, RawRow)
//! - **parser**: Turn raw table rows into records and back
//! - **index**: Build client datasets from per-client or global tables
//! - **store**: The `EventStore` trait and an in-memory implementation
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{ClientDataset, EventStore, InMemoryEventStore};
//!
//! let dataset = ClientDataset::from_rows("230", &purchase_rows, &event_rows)?;
//! let store = InMemoryEventStore::from_datasets(vec![dataset]);
//!
//! let snapshot = store.load_client("230")?;
//! println!("client 230: {:?} (purchases, events)", snapshot.counts());
//! ```

// Public modules
pub mod error;
pub mod types;
pub mod parser;
pub mod index;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use index::partition_by_client;
pub use parser::parse_event_date;
pub use store::{EventStore, InMemoryEventStore};
pub use types::{
    // Type aliases
    ClientId,
    PropositionId,
    // Core types
    ClientDataset,
    EventRecord,
    PurchaseRecord,
    RawRow,
    // Column names
    columns,
};
