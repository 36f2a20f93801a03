use std::sync::Arc;

use archive_facade::ArchiveFacade;
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    http_objects::{
        ArchiveCard,
        ArchiveInfoDto,
        ArchiveList,
        ArchiveViewResponse,
        Artifact,
        ArtifactList,
        ArtifactSlot,
        Donor,
        DonorPage,
        MemoriaAPIError,
        UploadFailure,
        UploadSuccess,
    },
    middleware::InstanceRequestSpan,
    upload::MediaUploader,
};

mod archives;
mod media_upload;

use archives::{get_archive, get_artifact, list_archives, list_artifacts, list_donors};
use media_upload::upload_media;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
        paths(
            media_upload::upload_media,
            archives::list_archives,
            archives::get_archive,
            archives::list_donors,
            archives::list_artifacts,
            archives::get_artifact,
        ),
        components(
            schemas(
                UploadSuccess,
                UploadFailure,
                MemoriaAPIError,
                ArchiveList,
                ArchiveCard,
                ArchiveViewResponse,
                ArchiveInfoDto,
                DonorPage,
                Donor,
                ArtifactList,
                ArtifactSlot,
                Artifact,
            )
        ),
        tags(
            (name = "memoria", description = "Memoria API")
        )
    )]
struct ApiDoc;

#[derive(Clone)]
pub struct RouteState {
    pub uploader: Arc<MediaUploader>,
    pub facade: Arc<ArchiveFacade>,
}

pub fn create_routes(
    route_state: RouteState,
    max_upload_bytes: usize,
    request_span: InstanceRequestSpan,
) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/docs/swagger").url("/docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(index))
        .route(
            "/api/media-upload",
            post(upload_media).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
            )),
        )
        .route("/api/archives", get(list_archives))
        .route("/api/archives/{address}", get(get_archive))
        .route("/api/archives/{address}/donors", get(list_donors))
        .route("/api/archives/{address}/artifacts", get(list_artifacts))
        .route("/api/archives/{address}/artifacts/{id}", get(get_artifact))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_failure(()),
        )
        .layer(cors)
        .with_state(route_state)
}

async fn index() -> &'static str {
    "Memoria Server"
}

#[cfg(test)]
mod tests {
    use arweave_store::{client::testing::FakeStorageNetwork, Winston};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use data_model::{
        test_objects::tests::{mock_donors, test_admin, test_viewer},
        ArtifactStatus,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::{testing::TestGateway, upload::GatewayCredential};

    const BOUNDARY: &str = "memoria-test-boundary";

    fn multipart_request(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/media-upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_index() {
        let gateway = TestGateway::with_wallet();
        let response = gateway.router().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_success() {
        let gateway = TestGateway::with_wallet();
        let response = gateway
            .router()
            .oneshot(multipart_request("file", "harbor.png", "image/png", b"pixels"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        let id = json["transactionId"].as_str().unwrap();
        assert!(!id.is_empty());
        assert!(json["arweaveUrl"].as_str().unwrap().contains(id));
        assert_eq!(json["cost"], "0.000000000123 AR");
        assert_eq!(json["message"], "File uploaded to Arweave successfully!");
        assert_eq!(gateway.network.post_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_bad_request() {
        let gateway = TestGateway::with_wallet();
        let response = gateway
            .router()
            .oneshot(multipart_request("notes", "notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No file uploaded");

        let response = gateway
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/media-upload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
        assert_eq!(gateway.network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_form_is_server_error() {
        let gateway = TestGateway::with_wallet();
        let oversized = vec![7u8; 2 * 1024 * 1024];
        let response = gateway
            .router()
            .oneshot(multipart_request("file", "big.bin", "application/octet-stream", &oversized))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_ne!(json["error"], "No file uploaded");

        let truncated = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nabc",
            BOUNDARY
        );
        let response = gateway
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/media-upload")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(truncated))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(gateway.network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_without_credential() {
        let gateway = TestGateway::new(
            FakeStorageNetwork::default(),
            GatewayCredential::from_jwk("ARWEAVE_WALLET_KEY", ""),
        );
        let response = gateway
            .router()
            .oneshot(multipart_request("file", "a.txt", "text/plain", b"a"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_upload_with_empty_wallet() {
        let gateway = TestGateway::new(
            FakeStorageNetwork::default().with_balance(Winston(0)),
            TestGateway::wallet_credential(),
        );
        let response = gateway
            .router()
            .oneshot(multipart_request("file", "a.txt", "text/plain", b"a"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(json["error"]
            .as_str()
            .unwrap()
            .contains("Insufficient wallet balance"));
        assert_eq!(gateway.network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejected_by_network() {
        let gateway = TestGateway::new(
            FakeStorageNetwork::default().with_post_status(400),
            TestGateway::wallet_credential(),
        );
        let response = gateway
            .router()
            .oneshot(multipart_request("file", "a.txt", "text/plain", b"a"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("400"));
    }

    #[tokio::test]
    async fn test_archive_donors_page() {
        let gateway = TestGateway::with_wallet();
        let archive = gateway.archives.seed_archive(test_admin());
        gateway.archives.seed_donors(archive, mock_donors(3));

        let response = gateway
            .router()
            .oneshot(get(&format!(
                "/api/archives/{:?}/donors?offset=0&limit=10",
                archive
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["donors"].as_array().unwrap().len(), 3);
        assert_eq!(json["limit"], 10);
        assert_eq!(json["donors"][2]["total_donated"], "3000");
    }

    #[tokio::test]
    async fn test_archive_view_and_admin_controls() {
        let gateway = TestGateway::with_wallet();
        let archive = gateway.archives.seed_archive(test_admin());
        gateway.archives.seed_donors(archive, mock_donors(2));

        let response = gateway
            .router()
            .oneshot(get(&format!(
                "/api/archives/{:?}?viewer={:?}",
                archive,
                test_admin()
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["ready"], true);
        assert_eq!(json["admin_controls"], true);
        assert_eq!(json["name"]["status"], "ready");
        assert_eq!(json["name"]["value"], "Harbor Letters");
        assert_eq!(json["info"]["value"]["total_donor_count"], "2");

        let response = gateway
            .router()
            .oneshot(get(&format!(
                "/api/archives/{:?}?viewer={:?}",
                archive,
                test_viewer()
            )))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["admin_controls"], false);
    }

    #[tokio::test]
    async fn test_archive_view_renders_partial_failures() {
        let gateway = TestGateway::with_wallet();
        let archive = gateway.archives.seed_archive(test_admin());
        gateway.archives.fail_reads(
            "description",
            archive_facade::ChainError::ContractRead {
                function: "description",
                message: "execution reverted".to_string(),
            },
            1,
        );

        let response = gateway
            .router()
            .oneshot(get(&format!("/api/archives/{:?}", archive)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["ready"], false);
        assert_eq!(json["description"]["status"], "unavailable");
        assert!(json["description"]["error"]
            .as_str()
            .unwrap()
            .contains("execution reverted"));
        assert_eq!(json["name"]["status"], "ready");
        assert_eq!(json["admin"]["status"], "ready");
    }

    #[tokio::test]
    async fn test_malformed_address_is_bad_request() {
        let gateway = TestGateway::with_wallet();
        for uri in [
            "/api/archives/harbor",
            "/api/archives/0x12/donors",
            "/api/archives/harbor/artifacts",
        ] {
            let response = gateway.router().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_archive_listing() {
        let gateway = TestGateway::with_wallet();
        for _ in 0..3 {
            gateway.archives.seed_archive(test_admin());
        }

        let response = gateway
            .router()
            .oneshot(get("/api/archives?offset=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["total"], "3");
        assert_eq!(json["limit"], 10);
        let archives = json["archives"].as_array().unwrap();
        assert_eq!(archives.len(), 2);
        assert_eq!(archives[0]["status"], "ready");
        assert_eq!(archives[0]["value"]["index"], 1);
    }

    #[tokio::test]
    async fn test_artifact_routes() {
        let gateway = TestGateway::with_wallet();
        let archive = gateway.archives.seed_archive(test_admin());
        gateway
            .archives
            .seed_artifact(archive, "lighthouse", ArtifactStatus::Accepted);
        gateway
            .archives
            .seed_artifact(archive, "tide-table", ArtifactStatus::Pending);

        let response = gateway
            .router()
            .oneshot(get(&format!("/api/archives/{:?}/artifacts", archive)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["next_artifact_id"], "2");
        assert_eq!(json["total_artifacts"]["value"], "2");
        assert_eq!(json["artifacts"].as_array().unwrap().len(), 2);
        assert_eq!(json["pending"], serde_json::json!(["1"]));

        let response = gateway
            .router()
            .oneshot(get(&format!("/api/archives/{:?}/artifacts/0", archive)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["title"], "lighthouse");
        assert_eq!(json["status"], "accepted");

        let response = gateway
            .router()
            .oneshot(get(&format!("/api/archives/{:?}/artifacts/9", archive)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = gateway
            .router()
            .oneshot(get(&format!("/api/archives/{:?}/artifacts/first", archive)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_network_failure_of_single_read_is_bad_gateway() {
        let gateway = TestGateway::with_wallet();
        let archive = gateway.archives.seed_archive(test_admin());
        gateway.archives.fail_reads(
            "getDonors",
            archive_facade::ChainError::TransientNetwork {
                function: "getDonors",
                message: "connection refused".to_string(),
            },
            10,
        );

        let response = gateway
            .router()
            .oneshot(get(&format!("/api/archives/{:?}/donors", archive)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
