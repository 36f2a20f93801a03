use std::{future::Future, sync::Arc};

use data_model::{ArchiveInfo, ArtifactRecord, DonorEntry};
use ethers::types::{Address, U256};
use memoria_utils::retry::{retry_with_policy, RetryPolicy};
use opentelemetry::{metrics::Counter, KeyValue};
use tracing::debug;

use crate::{
    backend::ArchiveBackend,
    cache::{QueryCache, QueryKey},
    error::ChainResult,
};

pub struct ReadMetrics {
    pub attempts: Counter<u64>,
    pub failures: Counter<u64>,
    pub cache_hits: Counter<u64>,
}

impl Default for ReadMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("archive-facade");
        Self {
            attempts: meter
                .u64_counter("memoria.chain_read_attempts")
                .with_description("view calls sent to the node, retries included")
                .build(),
            failures: meter
                .u64_counter("memoria.chain_read_failures")
                .with_description("reads that failed after the retry policy gave up")
                .build(),
            cache_hits: meter
                .u64_counter("memoria.chain_read_cache_hits")
                .with_description("reads answered from the query cache")
                .build(),
        }
    }
}

/// Retry-wrapped, cached view calls.
#[derive(Clone)]
pub struct ArchiveReader {
    backend: Arc<dyn ArchiveBackend>,
    cache: Arc<QueryCache>,
    policy: RetryPolicy,
    metrics: Arc<ReadMetrics>,
}

impl ArchiveReader {
    pub fn new(backend: Arc<dyn ArchiveBackend>, cache: Arc<QueryCache>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            cache,
            policy,
            metrics: Arc::new(ReadMetrics::new()),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn factory_address(&self) -> Address {
        self.backend.factory_address()
    }

    async fn read<T, F, Fut>(&self, key: QueryKey, fetch: F) -> ChainResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = ChainResult<T>>,
    {
        let labels = [KeyValue::new("function", key.function)];
        if let Some(hit) = self.cache.get::<T>(&key) {
            debug!(query = %key, "cache hit");
            self.metrics.cache_hits.add(1, &labels);
            return Ok(hit);
        }

        let description = key.to_string();
        let result = retry_with_policy(&self.policy, &description, || {
            self.metrics.attempts.add(1, &labels);
            fetch()
        })
        .await;

        match result {
            Ok(value) => {
                self.cache.insert(key, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.metrics.failures.add(1, &labels);
                Err(err)
            }
        }
    }

    pub async fn name(&self, archive: Address) -> ChainResult<String> {
        self.read(QueryKey::new(archive, "name"), || self.backend.name(archive))
            .await
    }

    pub async fn description(&self, archive: Address) -> ChainResult<String> {
        self.read(QueryKey::new(archive, "description"), || {
            self.backend.description(archive)
        })
        .await
    }

    pub async fn admin(&self, archive: Address) -> ChainResult<Address> {
        self.read(QueryKey::new(archive, "admin"), || self.backend.admin(archive))
            .await
    }

    pub async fn archive_info(&self, archive: Address) -> ChainResult<ArchiveInfo> {
        self.read(QueryKey::new(archive, "getArchiveInfo"), || {
            self.backend.archive_info(archive)
        })
        .await
    }

    pub async fn donors(
        &self,
        archive: Address,
        offset: u64,
        limit: u64,
    ) -> ChainResult<Vec<DonorEntry>> {
        let key = QueryKey::new(archive, "getDonors").arg(offset).arg(limit);
        self.read(key, || {
            self.backend
                .donors(archive, U256::from(offset), U256::from(limit))
        })
        .await
    }

    pub async fn artifact(&self, archive: Address, id: U256) -> ChainResult<ArtifactRecord> {
        self.read(QueryKey::new(archive, "getArtifact").arg(id), || {
            self.backend.artifact(archive, id)
        })
        .await
    }

    pub async fn total_artifacts(&self, archive: Address) -> ChainResult<U256> {
        self.read(QueryKey::new(archive, "getTotalArtifacts"), || {
            self.backend.total_artifacts(archive)
        })
        .await
    }

    pub async fn total_archives(&self) -> ChainResult<U256> {
        let factory = self.backend.factory_address();
        self.read(QueryKey::new(factory, "totalArchives"), || {
            self.backend.total_archives()
        })
        .await
    }

    pub async fn archive_at(&self, index: u64) -> ChainResult<Address> {
        let factory = self.backend.factory_address();
        self.read(QueryKey::new(factory, "archives").arg(index), || {
            self.backend.archive_at(U256::from(index))
        })
        .await
    }
}
