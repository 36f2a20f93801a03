use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use data_model::UploadRequest;
use tracing::{info, warn};

use super::RouteState;
use crate::{
    http_objects::{UploadFailure, UploadSuccess},
    upload::UploadError,
};

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

/// Upload one file to permanent storage
#[utoipa::path(
    post,
    path = "/api/media-upload",
    tag = "uploads",
    request_body(content_type = "multipart/form-data", description = "form with a `file` part"),
    responses(
        (status = 200, description = "File stored", body = UploadSuccess),
        (status = BAD_REQUEST, description = "No file in the request", body = UploadFailure),
        (status = INTERNAL_SERVER_ERROR, description = "Upload failed", body = UploadFailure)
    ),
)]
pub async fn upload_media(
    State(state): State<RouteState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadSuccess>, UploadFailure> {
    let file = match multipart {
        Ok(multipart) => read_file_field(multipart).await?,
        Err(rejection) => {
            warn!("upload request is not a multipart form: {}", rejection);
            None
        }
    };
    if let Some(file) = &file {
        info!(
            file_name = %file.file_name,
            content_type = %file.content_type,
            size = file.size(),
            "received upload"
        );
    }

    let receipt = state.uploader.upload(file).await?;
    Ok(Json(UploadSuccess::from(receipt)))
}

async fn read_file_field(mut multipart: Multipart) -> Result<Option<UploadRequest>, UploadFailure> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::Request(format!("Invalid upload form: {}", err)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| UploadError::Request(format!("Unable to read file: {}", err)))?;
        return Ok(Some(UploadRequest::new(data, content_type, file_name)));
    }
    Ok(None)
}
