use std::path::Path;

use anyhow::{anyhow, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unable to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload failed with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Body of `POST /api/media-upload`, success and failure alike.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    transaction_id: Option<String>,
    arweave_url: Option<String>,
    cost: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub transaction_id: String,
    pub url: String,
    pub cost: String,
    pub content_type: String,
}

pub struct GatewayClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl GatewayClient {
    pub fn new(gateway_url: &str) -> Result<Self> {
        let mut base = Url::parse(gateway_url)
            .map_err(|e| anyhow!("invalid gateway url {}: {}", gateway_url, e))?;
        // joined paths replace the last segment unless it ends in a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("api/media-upload")?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub async fn upload_file(&self, path: &Path) -> Result<UploadedFile, GatewayError> {
        let data = tokio::fs::read(path).await.map_err(|source| GatewayError::File {
            path: path.display().to_string(),
            source,
        })?;
        let content_type = content_type_for(path);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(%file_name, %content_type, size = data.len(), "uploading file");

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(&content_type)?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let mut uploaded = parse_upload_response(status, &body)?;
        uploaded.content_type = content_type;
        Ok(uploaded)
    }
}

pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn parse_upload_response(status: u16, body: &str) -> Result<UploadedFile, GatewayError> {
    let rejected = |message: String| GatewayError::Rejected { status, message };
    let response: UploadResponse =
        serde_json::from_str(body).map_err(|_| rejected(body.to_string()))?;
    if !response.success {
        return Err(rejected(response.error.unwrap_or_default()));
    }
    match (response.transaction_id, response.arweave_url) {
        (Some(transaction_id), Some(url)) => Ok(UploadedFile {
            transaction_id,
            url,
            cost: response.cost.unwrap_or_default(),
            content_type: String::new(),
        }),
        _ => Err(rejected("response is missing the transaction id".to_string())),
    }
}
