use archive_facade::{ArchiveListing, ArchiveView, ArtifactListing, ChainError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use data_model::{
    ArchiveInfo,
    ArchiveSummary,
    ArtifactRecord,
    DonorEntry,
    Loadable,
    UploadReceipt,
};
use ethers::{types::Address, utils::to_checksum};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::upload::{UploadError, UPLOAD_SUCCESS_MESSAGE};

/// Window applied when a list route is called without `limit`.
pub const DEFAULT_WINDOW: u64 = 10;
/// Largest window a single list request may ask for.
pub const MAX_WINDOW: u64 = 100;

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct MemoriaAPIError {
    #[serde(skip)]
    status_code: StatusCode,
    message: String,
}

impl MemoriaAPIError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: &str) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for MemoriaAPIError {
    fn into_response(self) -> Response {
        error!("API Error: {} - {}", self.status_code, self.message);
        (self.status_code, self.message).into_response()
    }
}

impl From<ChainError> for MemoriaAPIError {
    fn from(err: ChainError) -> Self {
        match &err {
            ChainError::ContractRead { .. } => Self::not_found(&err.to_string()),
            ChainError::TransientNetwork { .. } => Self::bad_gateway(&err.to_string()),
            ChainError::InvalidInput(_) => Self::bad_request(&err.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        }
    }
}

pub fn parse_address(value: &str) -> Result<Address, MemoriaAPIError> {
    value
        .parse::<Address>()
        .map_err(|_| MemoriaAPIError::bad_request(&format!("invalid address: {}", value)))
}

fn address_string(address: &Address) -> String {
    to_checksum(address, None)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSuccess {
    pub success: bool,
    pub transaction_id: String,
    pub arweave_url: String,
    pub cost: String,
    pub message: String,
}

impl From<UploadReceipt> for UploadSuccess {
    fn from(receipt: UploadReceipt) -> Self {
        Self {
            success: true,
            transaction_id: receipt.transaction_id,
            arweave_url: receipt.url,
            cost: receipt.cost,
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
        }
    }
}

/// Failure envelope of the upload route. Only the message of the error is
/// exposed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadFailure {
    #[serde(skip)]
    status_code: StatusCode,
    pub success: bool,
    pub error: String,
}

impl From<UploadError> for UploadFailure {
    fn from(err: UploadError) -> Self {
        Self {
            status_code: err.status_code(),
            success: false,
            error: err.to_string(),
        }
    }
}

impl IntoResponse for UploadFailure {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, IntoParams)]
pub struct WindowParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl WindowParams {
    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_WINDOW).min(MAX_WINDOW)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
pub struct ViewerParams {
    /// Account looking at the archive.
    pub viewer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArchiveInfoDto {
    pub next_artifact_id: String,
    /// Wei held by the archive.
    pub balance: String,
    pub total_donor_count: String,
}

impl From<ArchiveInfo> for ArchiveInfoDto {
    fn from(info: ArchiveInfo) -> Self {
        Self {
            next_artifact_id: info.next_artifact_id.to_string(),
            balance: info.balance.to_string(),
            total_donor_count: info.total_donor_count.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Donor {
    pub donor: String,
    pub total_donated: String,
    pub donation_count: String,
}

impl From<DonorEntry> for Donor {
    fn from(entry: DonorEntry) -> Self {
        Self {
            donor: address_string(&entry.donor),
            total_donated: entry.total_donated.to_string(),
            donation_count: entry.donation_count.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub uri: String,
    pub mime_type: String,
    pub timestamp: String,
    pub submitter: String,
    pub status: String,
}

impl From<ArtifactRecord> for Artifact {
    fn from(record: ArtifactRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title,
            uri: record.uri,
            mime_type: record.mime_type,
            timestamp: record.timestamp.to_string(),
            submitter: address_string(&record.submitter),
            status: record.status.to_string(),
        }
    }
}

/// Archive page. Each field is either `{"status":"ready","value":..}` or
/// `{"status":"unavailable","error":..}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArchiveViewResponse {
    pub address: String,
    pub ready: bool,
    /// True when the `viewer` of the request is the archive admin.
    pub admin_controls: bool,
    #[schema(value_type = Object)]
    pub name: Loadable<String>,
    #[schema(value_type = Object)]
    pub description: Loadable<String>,
    #[schema(value_type = Object)]
    pub admin: Loadable<String>,
    #[schema(value_type = Object)]
    pub info: Loadable<ArchiveInfoDto>,
    #[schema(value_type = Object)]
    pub donors: Loadable<Vec<Donor>>,
    #[schema(value_type = Object)]
    pub total_artifacts: Loadable<String>,
}

impl From<ArchiveView> for ArchiveViewResponse {
    fn from(view: ArchiveView) -> Self {
        Self {
            address: address_string(&view.address),
            ready: view.is_ready(),
            admin_controls: false,
            name: view.name,
            description: view.description,
            admin: view.admin.map(|admin| address_string(&admin)),
            info: view.info.map(ArchiveInfoDto::from),
            donors: view
                .donors
                .map(|donors| donors.into_iter().map(Donor::from).collect()),
            total_artifacts: view.total_artifacts.map(|total| total.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArchiveCard {
    pub index: u64,
    pub address: String,
    #[schema(value_type = Object)]
    pub name: Loadable<String>,
    #[schema(value_type = Object)]
    pub description: Loadable<String>,
    #[schema(value_type = Object)]
    pub admin: Loadable<String>,
    #[schema(value_type = Object)]
    pub info: Loadable<ArchiveInfoDto>,
}

impl From<ArchiveSummary> for ArchiveCard {
    fn from(summary: ArchiveSummary) -> Self {
        Self {
            index: summary.index,
            address: address_string(&summary.address),
            name: summary.name,
            description: summary.description,
            admin: summary.admin.map(|admin| address_string(&admin)),
            info: summary.info.map(ArchiveInfoDto::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArchiveList {
    pub total: String,
    pub offset: u64,
    pub limit: u64,
    #[schema(value_type = Vec<Object>)]
    pub archives: Vec<Loadable<ArchiveCard>>,
}

impl From<ArchiveListing> for ArchiveList {
    fn from(listing: ArchiveListing) -> Self {
        Self {
            total: listing.total.to_string(),
            offset: listing.offset,
            limit: listing.limit,
            archives: listing
                .archives
                .into_iter()
                .map(|card| card.map(ArchiveCard::from))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonorPage {
    pub archive: String,
    pub offset: u64,
    pub limit: u64,
    pub donors: Vec<Donor>,
}

impl DonorPage {
    pub fn new(archive: &Address, offset: u64, limit: u64, donors: Vec<DonorEntry>) -> Self {
        Self {
            archive: address_string(archive),
            offset,
            limit,
            donors: donors.into_iter().map(Donor::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArtifactSlot {
    pub id: String,
    #[schema(value_type = Object)]
    pub artifact: Loadable<Artifact>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArtifactList {
    pub next_artifact_id: String,
    #[schema(value_type = Object)]
    pub total_artifacts: Loadable<String>,
    pub offset: u64,
    pub limit: u64,
    pub artifacts: Vec<ArtifactSlot>,
    /// Ids of the pending artifacts in this window.
    pub pending: Vec<String>,
}

impl From<ArtifactListing> for ArtifactList {
    fn from(listing: ArtifactListing) -> Self {
        let pending = listing
            .pending()
            .into_iter()
            .map(|artifact| artifact.id.to_string())
            .collect();
        Self {
            next_artifact_id: listing.next_artifact_id.to_string(),
            total_artifacts: listing.total_artifacts.map(|total| total.to_string()),
            offset: listing.offset,
            limit: listing.limit,
            artifacts: listing
                .artifacts
                .into_iter()
                .map(|slot| ArtifactSlot {
                    id: slot.id.to_string(),
                    artifact: slot.artifact.map(Artifact::from),
                })
                .collect(),
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use data_model::{
        test_objects::tests::{mock_artifact, mock_donors, test_admin},
        ArtifactStatus,
    };

    use super::*;

    #[test]
    fn test_chain_errors_map_to_status_codes() {
        let not_found: MemoriaAPIError = ChainError::ContractRead {
            function: "getArtifact",
            message: "execution reverted".to_string(),
        }
        .into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let bad_gateway: MemoriaAPIError = ChainError::TransientNetwork {
            function: "name",
            message: "connection refused".to_string(),
        }
        .into();
        assert_eq!(bad_gateway.status_code(), StatusCode::BAD_GATEWAY);
        assert!(bad_gateway.message().contains("connection refused"));
    }

    #[test]
    fn test_window_defaults_and_cap() {
        let params = WindowParams {
            offset: None,
            limit: None,
        };
        assert_eq!((params.offset(), params.limit()), (0, DEFAULT_WINDOW));
        let params = WindowParams {
            offset: Some(5),
            limit: Some(10_000),
        };
        assert_eq!((params.offset(), params.limit()), (5, MAX_WINDOW));
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x371cb38b81ae204a7950ff31b3caa1a5b563b1de").is_ok());
        let err = parse_address("harbor").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_amounts_are_decimal_strings() {
        let donor = Donor::from(mock_donors(2).remove(1));
        assert_eq!(donor.total_donated, "2000");
        assert_eq!(donor.donation_count, "2");

        let artifact = Artifact::from(mock_artifact(7, ArtifactStatus::Accepted));
        assert_eq!(artifact.id, "7");
        assert_eq!(artifact.status, "accepted");

        let json = serde_json::to_value(Loadable::ready(address_string(&test_admin()))).unwrap();
        assert_eq!(json["status"], "ready");
        assert!(json["value"].as_str().unwrap().starts_with("0x"));
    }

    #[test]
    fn test_upload_envelopes() {
        let success = UploadSuccess::from(UploadReceipt::new(
            "tx".to_string(),
            "https://arweave.net/tx".to_string(),
            "0.000000000123 AR".to_string(),
            "123".to_string(),
            3,
        ));
        let json = serde_json::to_value(&success).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["transactionId"], "tx");
        assert_eq!(json["arweaveUrl"], "https://arweave.net/tx");
        assert_eq!(json["message"], UPLOAD_SUCCESS_MESSAGE);

        let failure = UploadFailure::from(UploadError::no_file());
        assert_eq!(failure.status_code, StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "No file uploaded"}));
    }
}
