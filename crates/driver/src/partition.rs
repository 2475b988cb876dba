//! Splitting the client population into batches.

use crate::error::{DriverError, Result};
use data_loader::ClientId;
use std::collections::HashSet;

/// A contiguous slice of the client list, processed as one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientBatch {
    pub index: usize,
    pub client_ids: Vec<ClientId>,
}

impl ClientBatch {
    pub fn len(&self) -> usize {
        self.client_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.client_ids.is_empty()
    }
}

/// Cut `client_ids` into batches of `batch_size` (the last may be shorter).
///
/// Duplicate ids are rejected so every client lands in exactly one batch.
pub fn partition_clients(client_ids: Vec<ClientId>, batch_size: usize) -> Result<Vec<ClientBatch>> {
    if batch_size == 0 {
        return Err(DriverError::InvalidConfig("batch_size must be at least 1".into()));
    }

    let mut seen = HashSet::with_capacity(client_ids.len());
    for id in &client_ids {
        if !seen.insert(id.as_str()) {
            return Err(DriverError::DuplicateClient(id.clone()));
        }
    }

    Ok(client_ids
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| ClientBatch {
            index,
            client_ids: chunk.to_vec(),
        })
        .collect())
}
