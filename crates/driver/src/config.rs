//! Driver configuration.
//!
//! One struct, chosen once at the top level and validated before any
//! worker starts. Every field has a default so a JSON file only needs the
//! values it changes:
//!
//! ```json
//! { "batch_size": 50, "worker_count": 4, "on_client_error": "abort_batch" }
//! ```

use crate::error::{DriverError, Result};
use aggregator::{CategoryMissPolicy, EnrichmentOptions};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// What a worker does when one client fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorPolicy {
    /// Log the client and continue with the next one
    #[default]
    Skip,
    /// Give up on the rest of this batch, other batches continue
    AbortBatch,
    /// Stop the whole run
    AbortAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Clients per batch
    pub batch_size: usize,
    /// Worker threads in the pool
    pub worker_count: usize,
    pub on_client_error: ClientErrorPolicy,
    /// Outcome groups computed by the enrichment job
    pub enrichment: EnrichmentOptions,
    pub category_miss: CategoryMissPolicy,
    /// Finished batches buffered ahead of the sink (defaults to worker_count)
    pub channel_capacity: Option<usize>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            on_client_error: ClientErrorPolicy::default(),
            enrichment: EnrichmentOptions::all(),
            category_miss: CategoryMissPolicy::default(),
            channel_capacity: None,
        }
    }
}

impl DriverConfig {
    /// Parse and validate a JSON config file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read driver config {}", path.display()))?;
        let config = Self::from_json_str(&raw)
            .with_context(|| format!("invalid driver config {}", path.display()))?;
        debug!("Loaded driver config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let config: DriverConfig = serde_json::from_str(raw).context("failed to parse driver config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DriverError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.worker_count == 0 {
            return Err(DriverError::InvalidConfig("worker_count must be at least 1".into()));
        }
        if self.channel_capacity == Some(0) {
            return Err(DriverError::InvalidConfig("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(self.worker_count)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_on_client_error(mut self, policy: ClientErrorPolicy) -> Self {
        self.on_client_error = policy;
        self
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentOptions) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_category_miss(mut self, policy: CategoryMissPolicy) -> Self {
        self.category_miss = policy;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }
}
