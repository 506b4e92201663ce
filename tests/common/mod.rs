#![allow(dead_code)]

use reqwest::{Client, StatusCode};
use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

use pos_inventory::api::create_api_router;
use pos_inventory::config::AppConfig;
use pos_inventory::connect;
use pos_inventory::entities::setup_schema;
use pos_inventory::error::ApiResponse;

/// The real router served on an ephemeral port, backed by a private database.
pub struct TestServer {
    pub client: Client,
    pub db: Arc<DatabaseConnection>,
    base: String,
    _dir: Option<TempDir>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::serve(
            &[("DATABASE_URL", "sqlite::memory:".to_string())],
            None,
        )
        .await
    }

    /// Same router over a sqlite file with a pool of several connections, so
    /// concurrent requests really run side by side.
    pub async fn start_on_disk() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("pos.db").display());

        Self::serve(
            &[
                ("DATABASE_URL", url),
                ("DB_MAX_CONNECTIONS", "8".to_string()),
            ],
            Some(dir),
        )
        .await
    }

    async fn serve(env: &[(&str, String)], dir: Option<TempDir>) -> Self {
        let config = AppConfig::from_lookup(|key| {
            env.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.clone())
        })
        .expect("Failed to build test config");

        let db = connect(&config).await.expect("Failed to open test database");
        setup_schema(&db).await.expect("Failed to create schema");
        let db = Arc::new(db);

        let app = create_api_router(db.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server failed");
        });

        TestServer {
            client: Client::new(),
            db,
            base: format!("http://{}", addr),
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base, path)
    }

    pub async fn create_category(&self, name: &str) -> i32 {
        let response = self
            .client
            .post(self.url("/categories"))
            .json(&json!({ "name": name }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.json::<Value>().await.expect("Failed to parse response JSON");
        body["data"]["id"].as_i64().expect("category id") as i32
    }

    pub async fn create_product(
        &self,
        name: &str,
        price: &str,
        stock: i32,
        category_id: Option<i32>,
    ) -> i32 {
        let response = self
            .client
            .post(self.url("/products"))
            .json(&json!({
                "name": name,
                "description": format!("{name} from the test bakery"),
                "price": price,
                "stock": stock,
                "categoryId": category_id,
            }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.json::<Value>().await.expect("Failed to parse response JSON");
        body["data"]["id"].as_i64().expect("product id") as i32
    }

    /// GETs `path` and returns the status with the decoded envelope.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> (StatusCode, ApiResponse<T>) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send request");
        let status = response.status();
        let body = response
            .json::<ApiResponse<T>>()
            .await
            .expect("Failed to parse response JSON");
        (status, body)
    }
}
