use crate::behavior::Distribution;
use crate::metrics_defs::STORE_CONFLICTS;
use async_trait::async_trait;
use shared::counter;
use std::collections::HashMap;
use std::sync::Mutex;

/// A configuration together with the concurrency token it was read under.
#[derive(Clone, Debug)]
pub struct Fetched<C> {
    pub config: C,
    pub etag: String,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("distribution {0} not found")]
    NotFound(String),
    /// The distribution changed after it was fetched.
    #[error("distribution {distribution_id} was modified concurrently: {message}")]
    Conflict {
        distribution_id: String,
        message: String,
    },
    #[error("distribution store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn conflict(distribution_id: &str, message: impl Into<String>) -> Self {
        counter!(STORE_CONFLICTS).increment(1);
        StoreError::Conflict {
            distribution_id: distribution_id.to_string(),
            message: message.into(),
        }
    }
}

/// Reads distribution configurations and writes them back with
/// compare-and-swap semantics.
#[async_trait]
pub trait DistributionStore: Send + Sync {
    type Config: Distribution + Send + Sync;

    async fn fetch(&self, distribution_id: &str) -> Result<Fetched<Self::Config>, StoreError>;

    /// Replaces the configuration if `etag` still identifies the current
    /// version, otherwise fails with `StoreError::Conflict`.
    async fn compare_and_swap(
        &self,
        distribution_id: &str,
        etag: &str,
        config: Self::Config,
    ) -> Result<(), StoreError>;
}

struct StoredDistribution<C> {
    config: C,
    version: u64,
}

impl<C> StoredDistribution<C> {
    fn etag(&self) -> String {
        format!("E{}", self.version)
    }
}

/// Store keeping distributions in memory. Every write bumps the version the
/// etag is derived from.
pub struct InMemoryStore<C> {
    distributions: Mutex<HashMap<String, StoredDistribution<C>>>,
}

impl<C> Default for InMemoryStore<C> {
    fn default() -> Self {
        InMemoryStore {
            distributions: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clone> InMemoryStore<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `config` unconditionally, as a concurrent writer would.
    pub fn put(&self, distribution_id: &str, config: C) {
        let mut distributions = self.lock();
        let version = distributions
            .get(distribution_id)
            .map_or(1, |stored| stored.version + 1);
        distributions.insert(
            distribution_id.to_string(),
            StoredDistribution { config, version },
        );
    }

    pub fn get(&self, distribution_id: &str) -> Option<C> {
        self.lock()
            .get(distribution_id)
            .map(|stored| stored.config.clone())
    }

    pub fn etag(&self, distribution_id: &str) -> Option<String> {
        self.lock().get(distribution_id).map(StoredDistribution::etag)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredDistribution<C>>> {
        // Every write is a single insert, so the map survives a poisoned lock.
        self.distributions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<C> DistributionStore for InMemoryStore<C>
where
    C: Distribution + Clone + Send + Sync,
{
    type Config = C;

    async fn fetch(&self, distribution_id: &str) -> Result<Fetched<C>, StoreError> {
        let distributions = self.lock();
        let stored = distributions
            .get(distribution_id)
            .ok_or_else(|| StoreError::NotFound(distribution_id.to_string()))?;

        Ok(Fetched {
            config: stored.config.clone(),
            etag: stored.etag(),
        })
    }

    async fn compare_and_swap(
        &self,
        distribution_id: &str,
        etag: &str,
        config: C,
    ) -> Result<(), StoreError> {
        let mut distributions = self.lock();
        let stored = distributions
            .get_mut(distribution_id)
            .ok_or_else(|| StoreError::NotFound(distribution_id.to_string()))?;

        let current = stored.etag();
        if current != etag {
            return Err(StoreError::conflict(
                distribution_id,
                format!("etag {etag} does not match current etag {current}"),
            ));
        }

        stored.config = config;
        stored.version += 1;
        tracing::debug!(distribution_id, etag = %stored.etag(), "Stored distribution");
        Ok(())
    }
}
