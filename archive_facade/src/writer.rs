use std::sync::Arc;

use ethers::types::{Address, U256};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    backend::{ArchiveBackend, Confirmed},
    cache::QueryKey,
    error::{ChainError, ChainResult},
    reader::ArchiveReader,
    DONOR_PAGE_SIZE,
};

/// Cached reads a confirmed write makes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffectedQuery {
    Admin,
    Info,
    /// Every donor page; the first page is read back.
    Donors,
    Artifact(U256),
    TotalArtifacts,
    TotalArchives,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome<T> {
    pub confirmed: Confirmed<T>,
    /// Queries read back after confirmation.
    pub refreshed: Vec<String>,
    /// Queries that were invalidated but could not be read back. The next
    /// read retries them.
    pub refresh_failures: Vec<String>,
}

/// Submits state-changing calls. Nothing here touches cached values before
/// the chain confirmed the write; a rejected write leaves the cache as is.
pub struct ArchiveWriter {
    backend: Arc<dyn ArchiveBackend>,
    reader: ArchiveReader,
}

fn require(condition: bool, message: &str) -> ChainResult<()> {
    if condition {
        Ok(())
    } else {
        Err(ChainError::InvalidInput(message.to_string()))
    }
}

impl ArchiveWriter {
    pub fn new(backend: Arc<dyn ArchiveBackend>, reader: ArchiveReader) -> Self {
        Self { backend, reader }
    }

    pub async fn create_archive(
        &self,
        name: &str,
        description: &str,
        base_uri: &str,
    ) -> ChainResult<WriteOutcome<Address>> {
        require(!name.trim().is_empty(), "archive name is required")?;
        let confirmed = self
            .backend
            .create_archive(name, description, base_uri)
            .await?;
        info!(archive = ?confirmed.value, "archive created");
        let factory = self.backend.factory_address();
        Ok(self
            .refresh(confirmed, factory, &[AffectedQuery::TotalArchives])
            .await)
    }

    pub async fn submit_artifact(
        &self,
        archive: Address,
        title: &str,
        uri: &str,
        mime_type: &str,
    ) -> ChainResult<WriteOutcome<U256>> {
        require(!title.trim().is_empty(), "artifact title is required")?;
        require(!uri.trim().is_empty(), "artifact uri is required")?;
        let confirmed = self
            .backend
            .submit_artifact(archive, title, uri, mime_type)
            .await?;
        info!(?archive, id = %confirmed.value, "artifact submitted");
        let id = confirmed.value;
        Ok(self
            .refresh(
                confirmed,
                archive,
                &[
                    AffectedQuery::Info,
                    AffectedQuery::TotalArtifacts,
                    AffectedQuery::Artifact(id),
                ],
            )
            .await)
    }

    pub async fn donate(
        &self,
        archive: Address,
        message: &str,
        amount: U256,
    ) -> ChainResult<WriteOutcome<()>> {
        require(!amount.is_zero(), "donation amount must be positive")?;
        let confirmed = self
            .backend
            .receive_donation(archive, message, amount)
            .await?;
        Ok(self
            .refresh(
                confirmed,
                archive,
                &[AffectedQuery::Info, AffectedQuery::Donors],
            )
            .await)
    }

    pub async fn accept_artifact(
        &self,
        archive: Address,
        id: U256,
        reward_wei: U256,
    ) -> ChainResult<WriteOutcome<()>> {
        let confirmed = self
            .backend
            .accept_artifact(archive, id, reward_wei)
            .await?;
        Ok(self
            .refresh(
                confirmed,
                archive,
                &[AffectedQuery::Artifact(id), AffectedQuery::Info],
            )
            .await)
    }

    pub async fn reject_artifact(
        &self,
        archive: Address,
        id: U256,
    ) -> ChainResult<WriteOutcome<()>> {
        let confirmed = self.backend.reject_artifact(archive, id).await?;
        Ok(self
            .refresh(confirmed, archive, &[AffectedQuery::Artifact(id)])
            .await)
    }

    pub async fn transfer_admin(
        &self,
        archive: Address,
        new_admin: Address,
    ) -> ChainResult<WriteOutcome<()>> {
        require(!new_admin.is_zero(), "new admin must not be the zero address")?;
        let confirmed = self.backend.transfer_admin(archive, new_admin).await?;
        Ok(self
            .refresh(confirmed, archive, &[AffectedQuery::Admin])
            .await)
    }

    async fn refresh<T>(
        &self,
        confirmed: Confirmed<T>,
        address: Address,
        affected: &[AffectedQuery],
    ) -> WriteOutcome<T> {
        let results = join_all(
            affected
                .iter()
                .map(|query| self.refresh_one(address, *query)),
        )
        .await;

        let mut refreshed = Vec::new();
        let mut refresh_failures = Vec::new();
        for (key, result) in results {
            match result {
                Ok(()) => refreshed.push(key.to_string()),
                Err(err) => {
                    warn!(query = %key, error = %err, "read-back after write failed");
                    refresh_failures.push(key.to_string());
                }
            }
        }
        WriteOutcome {
            confirmed,
            refreshed,
            refresh_failures,
        }
    }

    async fn refresh_one(
        &self,
        address: Address,
        query: AffectedQuery,
    ) -> (QueryKey, ChainResult<()>) {
        let cache = self.reader.cache();
        match query {
            AffectedQuery::Admin => {
                let key = QueryKey::new(address, "admin");
                cache.invalidate(&key);
                (key, self.reader.admin(address).await.map(|_| ()))
            }
            AffectedQuery::Info => {
                let key = QueryKey::new(address, "getArchiveInfo");
                cache.invalidate(&key);
                (key, self.reader.archive_info(address).await.map(|_| ()))
            }
            AffectedQuery::Donors => {
                cache.invalidate_functions(address, &["getDonors"]);
                let key = QueryKey::new(address, "getDonors")
                    .arg(0)
                    .arg(DONOR_PAGE_SIZE);
                let result = self
                    .reader
                    .donors(address, 0, DONOR_PAGE_SIZE)
                    .await
                    .map(|_| ());
                (key, result)
            }
            AffectedQuery::Artifact(id) => {
                let key = QueryKey::new(address, "getArtifact").arg(id);
                cache.invalidate(&key);
                (key, self.reader.artifact(address, id).await.map(|_| ()))
            }
            AffectedQuery::TotalArtifacts => {
                let key = QueryKey::new(address, "getTotalArtifacts");
                cache.invalidate(&key);
                (key, self.reader.total_artifacts(address).await.map(|_| ()))
            }
            AffectedQuery::TotalArchives => {
                let key = QueryKey::new(address, "totalArchives");
                cache.invalidate(&key);
                (key, self.reader.total_archives().await.map(|_| ()))
            }
        }
    }
}
