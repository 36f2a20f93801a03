use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::{
    error::{StoreError, StoreResult},
    network::GatewayConfig,
    transaction::SignedTransaction,
    winston::Winston,
};

/// Raw answer of `POST /tx`. Any status is returned as is; only transport
/// failures are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResponse {
    pub status: u16,
    pub body: String,
}

impl PostResponse {
    /// 208 means the gateway already has this transaction.
    pub fn is_accepted(&self) -> bool {
        self.status == 200 || self.status == 208
    }
}

#[async_trait]
pub trait StorageNetwork: Send + Sync {
    async fn balance(&self, address: &str) -> StoreResult<Winston>;

    async fn price(&self, data_size: u64) -> StoreResult<Winston>;

    async fn tx_anchor(&self) -> StoreResult<String>;

    async fn post_transaction(&self, tx: &SignedTransaction) -> StoreResult<PostResponse>;

    /// Public URL at which a transaction's data is served.
    fn permanent_url(&self, id: &str) -> String;
}

pub struct ArweaveClient {
    client: Client,
    base_url: Url,
}

impl ArweaveClient {
    pub fn new(config: &GatewayConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.base_url()?;
        info!(gateway = %base_url, "using storage gateway");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_text(&self, path: &str) -> StoreResult<String> {
        let url = self.base_url.join(path)?;
        debug!(%url, "storage gateway request");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::UnexpectedResponse {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_winston(&self, path: &str) -> StoreResult<Winston> {
        let body = self.get_text(path).await?;
        body.parse().map_err(|_| StoreError::UnexpectedResponse {
            endpoint: path.to_string(),
            status: 200,
            body,
        })
    }
}

#[async_trait]
impl StorageNetwork for ArweaveClient {
    async fn balance(&self, address: &str) -> StoreResult<Winston> {
        self.get_winston(&format!("wallet/{}/balance", address)).await
    }

    async fn price(&self, data_size: u64) -> StoreResult<Winston> {
        self.get_winston(&format!("price/{}", data_size)).await
    }

    async fn tx_anchor(&self) -> StoreResult<String> {
        Ok(self.get_text("tx_anchor").await?.trim().to_string())
    }

    async fn post_transaction(&self, tx: &SignedTransaction) -> StoreResult<PostResponse> {
        let url = self.base_url.join("tx")?;
        let response = self.client.post(url).json(&tx.to_json()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(PostResponse { status, body })
    }

    fn permanent_url(&self, id: &str) -> String {
        format!("{}{}", self.base_url, id)
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;

    /// In-memory gateway that records every submission.
    pub struct FakeStorageNetwork {
        pub balance: Mutex<Winston>,
        pub price: Winston,
        pub anchor: String,
        pub post_status: Mutex<u16>,
        pub post_body: String,
        pub fail_price: bool,
        posts: AtomicUsize,
        last_posted: Mutex<Option<serde_json::Value>>,
    }

    impl Default for FakeStorageNetwork {
        fn default() -> Self {
            Self {
                balance: Mutex::new(Winston(5_000_000_000_000)),
                price: Winston(123),
                anchor: "x4U2m3_x3NYz3XOdhSjGKMqV2w8hZNQeqqyPbzJ0Mck4Q9tJkXfFCJ2t8z_xdPiG"
                    .to_string(),
                post_status: Mutex::new(200),
                post_body: "OK".to_string(),
                fail_price: false,
                posts: AtomicUsize::new(0),
                last_posted: Mutex::new(None),
            }
        }
    }

    impl FakeStorageNetwork {
        pub fn with_balance(self, balance: Winston) -> Self {
            *self.balance.lock().unwrap() = balance;
            self
        }

        pub fn with_post_status(self, status: u16) -> Self {
            *self.post_status.lock().unwrap() = status;
            self
        }

        pub fn with_failing_price(mut self) -> Self {
            self.fail_price = true;
            self
        }

        pub fn post_count(&self) -> usize {
            self.posts.load(Ordering::SeqCst)
        }

        pub fn last_posted(&self) -> Option<serde_json::Value> {
            self.last_posted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StorageNetwork for FakeStorageNetwork {
        async fn balance(&self, _address: &str) -> StoreResult<Winston> {
            Ok(*self.balance.lock().unwrap())
        }

        async fn price(&self, _data_size: u64) -> StoreResult<Winston> {
            if self.fail_price {
                return Err(StoreError::UnexpectedResponse {
                    endpoint: "price".to_string(),
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.price)
        }

        async fn tx_anchor(&self) -> StoreResult<String> {
            Ok(self.anchor.clone())
        }

        async fn post_transaction(&self, tx: &SignedTransaction) -> StoreResult<PostResponse> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            *self.last_posted.lock().unwrap() = serde_json::to_value(tx.to_json()).ok();
            Ok(PostResponse {
                status: *self.post_status.lock().unwrap(),
                body: self.post_body.clone(),
            })
        }

        fn permanent_url(&self, id: &str) -> String {
            format!("https://arweave.net/{}", id)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Path, State},
        http::StatusCode,
        routing::{get, post},
        Json,
        Router,
    };
    use bytes::Bytes;

    use super::*;
    use crate::{
        network::ArweaveNetwork,
        transaction::TransactionBuilder,
        wallet::{
            testing::{test_wallet, TEST_WALLET_ADDRESS},
            TransactionSigner,
        },
    };

    #[derive(Clone)]
    struct LocalGateway {
        post_status: StatusCode,
        posted: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    async fn balance(Path(address): Path<String>) -> (StatusCode, String) {
        match address.as_str() {
            TEST_WALLET_ADDRESS => (StatusCode::OK, "5000000000000".to_string()),
            "garbled" => (StatusCode::OK, "plenty".to_string()),
            _ => (StatusCode::OK, "0".to_string()),
        }
    }

    async fn price(Path(size): Path<u64>) -> (StatusCode, String) {
        if size == 0 {
            return (StatusCode::SERVICE_UNAVAILABLE, "busy".to_string());
        }
        (StatusCode::OK, (size * 10).to_string())
    }

    async fn submit(
        State(gateway): State<LocalGateway>,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, &'static str) {
        gateway.posted.lock().unwrap().push(body);
        (gateway.post_status, "OK")
    }

    /// Serves the gateway endpoints under `/gw` on an ephemeral port.
    async fn start_gateway(post_status: StatusCode) -> (ArweaveClient, LocalGateway) {
        let gateway = LocalGateway {
            post_status,
            posted: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/gw/wallet/{address}/balance", get(balance))
            .route("/gw/price/{size}", get(price))
            .route("/gw/tx_anchor", get(|| async { "anchor-from-gateway\n" }))
            .route("/gw/tx", post(submit))
            .with_state(gateway.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = ArweaveClient::new(&GatewayConfig {
            gateway_url: Some(format!("http://{}/gw", addr)),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap();
        (client, gateway)
    }

    async fn signed(client: &ArweaveClient) -> SignedTransaction {
        let wallet = test_wallet();
        let anchor = client.tx_anchor().await.unwrap();
        TransactionBuilder::new(Bytes::from_static(b"tide table"))
            .owner(wallet.owner())
            .last_tx(anchor)
            .reward(Winston(100))
            .tag("Content-Type", "text/plain")
            .build()
            .unwrap()
            .sign(&wallet)
            .unwrap()
    }

    #[tokio::test]
    async fn test_reads_from_gateway() {
        let (client, _) = start_gateway(StatusCode::OK).await;
        assert_eq!(
            client.balance(TEST_WALLET_ADDRESS).await.unwrap(),
            Winston(5_000_000_000_000)
        );
        assert_eq!(client.balance("someone-else").await.unwrap(), Winston(0));
        assert_eq!(client.price(2048).await.unwrap(), Winston(20_480));
        assert_eq!(client.tx_anchor().await.unwrap(), "anchor-from-gateway");
        assert!(client.permanent_url("abc").ends_with("/gw/abc"));
    }

    #[tokio::test]
    async fn test_bad_gateway_answers() {
        let (client, _) = start_gateway(StatusCode::OK).await;
        match client.price(0).await.unwrap_err() {
            StoreError::UnexpectedResponse { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected error {:?}", other),
        }
        let err = client.balance("garbled").await.unwrap_err();
        assert!(err.to_string().contains("plenty"));
    }

    #[tokio::test]
    async fn test_post_returns_status_as_is() {
        let (client, gateway) = start_gateway(StatusCode::ALREADY_REPORTED).await;
        let tx = signed(&client).await;
        let response = client.post_transaction(&tx).await.unwrap();
        assert_eq!(response.status, 208);
        assert!(response.is_accepted());
        let posted = gateway.posted.lock().unwrap().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["id"], tx.id());
        assert_eq!(posted[0]["last_tx"], "anchor-from-gateway");

        let (client, _) = start_gateway(StatusCode::BAD_REQUEST).await;
        let tx = signed(&client).await;
        let response = client.post_transaction(&tx).await.unwrap();
        assert_eq!(response.status, 400);
        assert!(!response.is_accepted());
    }

    #[test]
    fn test_accepted_statuses() {
        for (status, accepted) in [(200, true), (208, true), (202, false), (400, false), (500, false)] {
            let response = PostResponse {
                status,
                body: String::new(),
            };
            assert_eq!(response.is_accepted(), accepted, "status {}", status);
        }
    }

    #[test]
    fn test_permanent_url() {
        let client = ArweaveClient::new(&GatewayConfig::default()).unwrap();
        assert_eq!(client.permanent_url("abc"), "https://arweave.net/abc");

        let client = ArweaveClient::new(&GatewayConfig {
            network: ArweaveNetwork::Local,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.permanent_url("abc"), "http://localhost:1984/abc");
    }
}
