#[cfg(any(test, feature = "testing"))]
pub mod test_objects;

use std::fmt::{self, Display};

use anyhow::{anyhow, Result};
use bytes::Bytes;
use ethers::types::{Address, U256};
use memoria_utils::get_epoch_time_in_ms;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay};

/// MIME type recorded when an upload does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One file handed to the upload gateway. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub data: Bytes,
    pub content_type: String,
    pub file_name: String,
}

impl UploadRequest {
    pub fn new(data: Bytes, content_type: Option<String>, file_name: Option<String>) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        Self {
            data,
            content_type,
            file_name: file_name.unwrap_or_default(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// What the gateway hands back once the storage network accepted a
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub transaction_id: String,
    pub url: String,
    /// Human readable price, e.g. `0.000000000123 AR`.
    pub cost: String,
    pub reward_winston: String,
    pub data_size: u64,
    pub submitted_at_ms: u64,
}

impl UploadReceipt {
    pub fn new(
        transaction_id: String,
        url: String,
        cost: String,
        reward_winston: String,
        data_size: u64,
    ) -> Self {
        Self {
            transaction_id,
            url,
            cost,
            reward_winston,
            data_size,
            submitted_at_ms: get_epoch_time_in_ms(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Accepted,
    Rejected,
}

impl TryFrom<u8> for ArtifactStatus {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ArtifactStatus::Pending),
            1 => Ok(ArtifactStatus::Accepted),
            2 => Ok(ArtifactStatus::Rejected),
            other => Err(anyhow!("unknown artifact status code {}", other)),
        }
    }
}

impl From<ArtifactStatus> for u8 {
    fn from(status: ArtifactStatus) -> Self {
        match status {
            ArtifactStatus::Pending => 0,
            ArtifactStatus::Accepted => 1,
            ArtifactStatus::Rejected => 2,
        }
    }
}

/// Decoded `getArchiveInfo()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Exclusive upper bound of the artifact id space.
    pub next_artifact_id: U256,
    pub balance: U256,
    pub total_donor_count: U256,
}

impl From<(U256, U256, U256)> for ArchiveInfo {
    fn from((next_artifact_id, balance, total_donor_count): (U256, U256, U256)) -> Self {
        Self {
            next_artifact_id,
            balance,
            total_donor_count,
        }
    }
}

/// Decoded element of `getDonors(offset, limit)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorEntry {
    pub donor: Address,
    pub total_donated: U256,
    pub donation_count: U256,
}

impl From<(Address, U256, U256)> for DonorEntry {
    fn from((donor, total_donated, donation_count): (Address, U256, U256)) -> Self {
        Self {
            donor,
            total_donated,
            donation_count,
        }
    }
}

/// Decoded `getArtifact(id)`, keyed by the id it was read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: U256,
    pub title: String,
    pub uri: String,
    pub mime_type: String,
    /// Block timestamp of the submission, in seconds.
    pub timestamp: U256,
    pub submitter: Address,
    pub status: ArtifactStatus,
}

impl ArtifactRecord {
    pub fn from_tuple(
        id: U256,
        (title, uri, mime_type, timestamp, submitter, status): (
            String,
            String,
            String,
            U256,
            Address,
            u8,
        ),
    ) -> Result<Self> {
        Ok(Self {
            id,
            title,
            uri,
            mime_type,
            timestamp,
            submitter,
            status: ArtifactStatus::try_from(status)?,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == ArtifactStatus::Pending
    }
}

impl Display for ArtifactRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} [{}] {} ({})",
            self.id, self.title, self.mime_type, self.uri, self.status
        )
    }
}

/// Every field of one archive, assembled once all reads succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub address: Address,
    pub name: String,
    pub description: String,
    pub admin: Address,
    pub info: ArchiveInfo,
    pub donors: Vec<DonorEntry>,
}

impl ArchiveRecord {
    pub fn is_admin(&self, viewer: &Address) -> bool {
        &self.admin == viewer
    }
}

/// Outcome of one independently loaded field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Loadable<T> {
    Ready { value: T },
    Unavailable { error: String },
}

impl<T> Loadable<T> {
    pub fn ready(value: T) -> Self {
        Loadable::Ready { value }
    }

    pub fn unavailable(error: impl Display) -> Self {
        Loadable::Unavailable {
            error: error.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Loadable::Ready { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Loadable::Ready { value } => Some(value),
            Loadable::Unavailable { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Loadable::Ready { .. } => None,
            Loadable::Unavailable { error } => Some(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loadable<U> {
        match self {
            Loadable::Ready { value } => Loadable::Ready { value: f(value) },
            Loadable::Unavailable { error } => Loadable::Unavailable { error },
        }
    }
}

impl<T, E: Display> From<std::result::Result<T, E>> for Loadable<T> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Loadable::ready(value),
            Err(err) => Loadable::unavailable(err),
        }
    }
}

/// One card of the archive listing. The factory index and address are
/// known up front, everything else loads independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub index: u64,
    pub address: Address,
    pub name: Loadable<String>,
    pub description: Loadable<String>,
    pub admin: Loadable<Address>,
    pub info: Loadable<ArchiveInfo>,
}

impl ArchiveSummary {
    pub fn is_ready(&self) -> bool {
        self.name.is_ready()
            && self.description.is_ready()
            && self.admin.is_ready()
            && self.info.is_ready()
    }
}
