//! Composed read models. Each field of a view loads on its own; a failed
//! field is recorded as unavailable and never hides the others.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

use data_model::{ArchiveInfo, ArchiveRecord, ArchiveSummary, ArtifactRecord, DonorEntry, Loadable};
use ethers::types::{Address, U256};
use futures::future::join_all;
use serde::Serialize;

use crate::{error::ChainResult, ArchiveFacade, DONOR_PAGE_SIZE};

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveView {
    pub address: Address,
    pub name: Loadable<String>,
    pub description: Loadable<String>,
    pub admin: Loadable<Address>,
    pub info: Loadable<ArchiveInfo>,
    /// First donor page.
    pub donors: Loadable<Vec<DonorEntry>>,
    /// Canonical artifact count.
    pub total_artifacts: Loadable<U256>,
}

impl ArchiveView {
    pub fn is_ready(&self) -> bool {
        self.name.is_ready()
            && self.description.is_ready()
            && self.admin.is_ready()
            && self.info.is_ready()
            && self.donors.is_ready()
            && self.total_artifacts.is_ready()
    }

    /// Review and admin-transfer controls are offered only to the recorded
    /// admin. The contract enforces the same rule on its side.
    pub fn admin_controls_visible(&self, viewer: &Address) -> bool {
        matches!(self.admin.value(), Some(admin) if admin == viewer)
    }

    pub fn record(&self) -> Option<ArchiveRecord> {
        Some(ArchiveRecord {
            address: self.address,
            name: self.name.value()?.clone(),
            description: self.description.value()?.clone(),
            admin: *self.admin.value()?,
            info: *self.info.value()?,
            donors: self.donors.value()?.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveListing {
    pub total: U256,
    pub offset: u64,
    pub limit: u64,
    pub archives: Vec<Loadable<ArchiveSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSlot {
    pub id: U256,
    pub artifact: Loadable<ArtifactRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactListing {
    /// Exclusive upper bound of the id space.
    pub next_artifact_id: U256,
    pub total_artifacts: Loadable<U256>,
    pub offset: u64,
    pub limit: u64,
    pub artifacts: Vec<ArtifactSlot>,
}

impl ArtifactListing {
    /// There is no status filter on the contract, so pending artifacts are
    /// picked out of the loaded window.
    pub fn pending(&self) -> Vec<&ArtifactRecord> {
        self.artifacts
            .iter()
            .filter_map(|slot| slot.artifact.value())
            .filter(|artifact| artifact.is_pending())
            .collect()
    }
}

/// `[offset, min(offset + limit, end))`, empty when offset is past the end.
fn window(offset: u64, limit: u64, end: U256) -> std::ops::Range<u64> {
    let end = if end > U256::from(u64::MAX) {
        u64::MAX
    } else {
        end.as_u64()
    };
    let stop = offset.saturating_add(limit).min(end);
    offset.min(stop)..stop
}

impl ArchiveFacade {
    pub async fn archive_view(&self, address: Address) -> ArchiveView {
        let reader = self.reader();
        let (name, description, admin, info, donors, total_artifacts) = tokio::join!(
            reader.name(address),
            reader.description(address),
            reader.admin(address),
            reader.archive_info(address),
            reader.donors(address, 0, DONOR_PAGE_SIZE),
            reader.total_artifacts(address),
        );
        ArchiveView {
            address,
            name: name.into(),
            description: description.into(),
            admin: admin.into(),
            info: info.into(),
            donors: donors.into(),
            total_artifacts: total_artifacts.into(),
        }
    }

    pub async fn archive_summary(&self, index: u64) -> ChainResult<ArchiveSummary> {
        let reader = self.reader();
        let address = reader.archive_at(index).await?;
        let (name, description, admin, info) = tokio::join!(
            reader.name(address),
            reader.description(address),
            reader.admin(address),
            reader.archive_info(address),
        );
        Ok(ArchiveSummary {
            index,
            address,
            name: name.into(),
            description: description.into(),
            admin: admin.into(),
            info: info.into(),
        })
    }

    pub async fn archive_listing(&self, offset: u64, limit: u64) -> ChainResult<ArchiveListing> {
        let total = self.reader().total_archives().await?;
        let archives = join_all(
            window(offset, limit, total).map(|index| async move {
                Loadable::from(self.archive_summary(index).await)
            }),
        )
        .await;
        Ok(ArchiveListing {
            total,
            offset,
            limit,
            archives,
        })
    }

    pub async fn artifact_listing(
        &self,
        archive: Address,
        offset: u64,
        limit: u64,
    ) -> ChainResult<ArtifactListing> {
        let reader = self.reader();
        let (info, total_artifacts) =
            tokio::join!(reader.archive_info(archive), reader.total_artifacts(archive));
        let info = info?;
        let artifacts = join_all(
            window(offset, limit, info.next_artifact_id).map(|id| async move {
                let id = U256::from(id);
                ArtifactSlot {
                    id,
                    artifact: reader.artifact(archive, id).await.into(),
                }
            }),
        )
        .await;
        Ok(ArtifactListing {
            next_artifact_id: info.next_artifact_id,
            total_artifacts: total_artifacts.into(),
            offset,
            limit,
            artifacts,
        })
    }
}

/// Token for one load issued by a [`ViewSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewToken(u64);

/// Tracks which load a view is currently waiting for. Results carrying an
/// older token arrive after navigation or teardown and are dropped.
#[derive(Debug, Default)]
pub struct ViewSession {
    generation: AtomicU64,
}

impl ViewSession {
    pub fn begin(&self) -> ViewToken {
        ViewToken(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Moves the session on without starting a new load.
    pub fn end(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, token: ViewToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    pub fn accept<T>(&self, token: ViewToken, value: T) -> Option<T> {
        self.is_current(token).then_some(value)
    }

    pub async fn run<T>(&self, load: impl Future<Output = T>) -> Option<T> {
        let token = self.begin();
        let value = load.await;
        self.accept(token, value)
    }
}
