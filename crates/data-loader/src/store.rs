//! The event store seam.
//!
//! Workers never share a dataset: every `load_client` call hands out a fresh
//! owned snapshot, and `write_client` replaces a client's tables wholesale.
//! A client id maps to exactly one pair of tables, so two workers holding
//! different client ids never touch the same data.

use crate::error::{DataLoadError, Result};
use crate::types::{ClientDataset, ClientId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Per-client storage of purchase and interaction tables.
///
/// `Send + Sync` so a single store handle can be given to every worker of
/// the driver's pool.
pub trait EventStore: Send + Sync {
    /// Every client with stored tables, in a stable order
    fn client_ids(&self) -> Result<Vec<ClientId>>;

    /// Load a fresh snapshot of one client's tables
    fn load_client(&self, client_id: &str) -> Result<ClientDataset>;

    /// Replace one client's tables (full overwrite, no append)
    fn write_client(&self, dataset: &ClientDataset) -> Result<()>;
}

/// Store backed by a map in memory.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    clients: RwLock<BTreeMap<ClientId, ClientDataset>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from already built datasets
    pub fn from_datasets(datasets: impl IntoIterator<Item = ClientDataset>) -> Self {
        let clients = datasets
            .into_iter()
            .map(|dataset| (dataset.client_id().to_string(), dataset))
            .collect();
        Self {
            clients: RwLock::new(clients),
        }
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

impl EventStore for InMemoryEventStore {
    fn client_ids(&self) -> Result<Vec<ClientId>> {
        Ok(self.clients.read().keys().cloned().collect())
    }

    fn load_client(&self, client_id: &str) -> Result<ClientDataset> {
        self.clients
            .read()
            .get(client_id)
            .cloned()
            .ok_or_else(|| DataLoadError::ClientNotFound(client_id.to_string()))
    }

    fn write_client(&self, dataset: &ClientDataset) -> Result<()> {
        debug!(
            "Overwriting tables of client {} ({} purchases, {} events)",
            dataset.client_id(),
            dataset.purchases().len(),
            dataset.events().len()
        );
        self.clients
            .write()
            .insert(dataset.client_id().to_string(), dataset.clone());
        Ok(())
    }
}
