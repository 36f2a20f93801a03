use axum::{
    extract::{Path, Query, State},
    Json,
};
use ethers::types::U256;

use super::RouteState;
use crate::http_objects::{
    parse_address,
    ArchiveList,
    ArchiveViewResponse,
    Artifact,
    ArtifactList,
    DonorPage,
    MemoriaAPIError,
    ViewerParams,
    WindowParams,
};

/// List archives created by the factory
#[utoipa::path(
    get,
    path = "/api/archives",
    tag = "archives",
    params(WindowParams),
    responses(
        (status = 200, description = "Window of archive cards", body = ArchiveList),
        (status = NOT_FOUND, description = "Factory call failed"),
        (status = BAD_GATEWAY, description = "Chain node unreachable")
    ),
)]
pub async fn list_archives(
    State(state): State<RouteState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<ArchiveList>, MemoriaAPIError> {
    let listing = state
        .facade
        .archive_listing(params.offset(), params.limit())
        .await?;
    Ok(Json(listing.into()))
}

/// Archive page; fields that failed to load are reported individually
#[utoipa::path(
    get,
    path = "/api/archives/{address}",
    tag = "archives",
    params(("address" = String, Path, description = "Archive contract address"), ViewerParams),
    responses(
        (status = 200, description = "Archive view", body = ArchiveViewResponse),
        (status = BAD_REQUEST, description = "Malformed address")
    ),
)]
pub async fn get_archive(
    State(state): State<RouteState>,
    Path(address): Path<String>,
    Query(params): Query<ViewerParams>,
) -> Result<Json<ArchiveViewResponse>, MemoriaAPIError> {
    let address = parse_address(&address)?;
    let viewer = params.viewer.as_deref().map(parse_address).transpose()?;

    let view = state.facade.archive_view(address).await;
    let admin_controls = viewer.is_some_and(|viewer| view.admin_controls_visible(&viewer));
    let mut response = ArchiveViewResponse::from(view);
    response.admin_controls = admin_controls;
    Ok(Json(response))
}

/// Page of donors
#[utoipa::path(
    get,
    path = "/api/archives/{address}/donors",
    tag = "archives",
    params(("address" = String, Path, description = "Archive contract address"), WindowParams),
    responses(
        (status = 200, description = "Donor page, possibly shorter than limit", body = DonorPage),
        (status = BAD_REQUEST, description = "Malformed address"),
        (status = NOT_FOUND, description = "Contract call failed"),
        (status = BAD_GATEWAY, description = "Chain node unreachable")
    ),
)]
pub async fn list_donors(
    State(state): State<RouteState>,
    Path(address): Path<String>,
    Query(params): Query<WindowParams>,
) -> Result<Json<DonorPage>, MemoriaAPIError> {
    let address = parse_address(&address)?;
    let (offset, limit) = (params.offset(), params.limit());
    let donors = state
        .facade
        .reader()
        .donors(address, offset, limit)
        .await?;
    Ok(Json(DonorPage::new(&address, offset, limit, donors)))
}

/// Window of artifacts by id
#[utoipa::path(
    get,
    path = "/api/archives/{address}/artifacts",
    tag = "archives",
    params(("address" = String, Path, description = "Archive contract address"), WindowParams),
    responses(
        (status = 200, description = "Artifact window", body = ArtifactList),
        (status = BAD_REQUEST, description = "Malformed address"),
        (status = NOT_FOUND, description = "Contract call failed"),
        (status = BAD_GATEWAY, description = "Chain node unreachable")
    ),
)]
pub async fn list_artifacts(
    State(state): State<RouteState>,
    Path(address): Path<String>,
    Query(params): Query<WindowParams>,
) -> Result<Json<ArtifactList>, MemoriaAPIError> {
    let address = parse_address(&address)?;
    let listing = state
        .facade
        .artifact_listing(address, params.offset(), params.limit())
        .await?;
    Ok(Json(listing.into()))
}

/// One artifact
#[utoipa::path(
    get,
    path = "/api/archives/{address}/artifacts/{id}",
    tag = "archives",
    params(
        ("address" = String, Path, description = "Archive contract address"),
        ("id" = String, Path, description = "Artifact id")
    ),
    responses(
        (status = 200, description = "Artifact", body = Artifact),
        (status = BAD_REQUEST, description = "Malformed address or id"),
        (status = NOT_FOUND, description = "No such artifact"),
        (status = BAD_GATEWAY, description = "Chain node unreachable")
    ),
)]
pub async fn get_artifact(
    State(state): State<RouteState>,
    Path((address, id)): Path<(String, String)>,
) -> Result<Json<Artifact>, MemoriaAPIError> {
    let address = parse_address(&address)?;
    let id = U256::from_dec_str(&id)
        .map_err(|_| MemoriaAPIError::bad_request(&format!("invalid artifact id: {}", id)))?;
    let artifact = state.facade.reader().artifact(address, id).await?;
    Ok(Json(artifact.into()))
}
