//! Integration tests for the gastro backend.

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Create config
        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
        };

        let state = AppState {
            repo,
            config: Arc::new(config),
            restore_lock: Arc::new(Mutex::new(())),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = psk {
            headers.insert("x-api-key", key.parse().unwrap());
        }
        headers.insert("x-actor", "integration-tester".parse().unwrap());

        TestFixture {
            client: Client::builder().default_headers(headers).build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A client that sends the API key but no actor identity header.
    fn anonymous_client(&self) -> Client {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-api-key", "test-api-key".parse().unwrap());
        Client::builder().default_headers(headers).build().unwrap()
    }

    /// Create a table and a menu item, then an order on them.
    /// Returns (table_id, menu_item_id, order_id).
    async fn seed_order(&self) -> (i64, i64, i64) {
        let table_resp = self
            .client
            .post(self.url("/api/tables"))
            .json(&json!({ "label": "T1", "seats": 4, "zone": "main" }))
            .send()
            .await
            .unwrap();
        let table_body: Value = table_resp.json().await.unwrap();
        let table_id = table_body["data"]["id"].as_i64().unwrap();

        let item_resp = self
            .client
            .post(self.url("/api/menu"))
            .json(&json!({
                "name": "Margherita",
                "category": "pizza",
                "price": 9.5,
                "vatRate": 0.07
            }))
            .send()
            .await
            .unwrap();
        let item_body: Value = item_resp.json().await.unwrap();
        let item_id = item_body["data"]["id"].as_i64().unwrap();

        // userId 1 is the seeded admin user
        let order_resp = self
            .client
            .post(self.url("/api/orders"))
            .json(&json!({
                "tableId": table_id,
                "userId": 1,
                "lines": [{ "menuItemId": item_id, "quantity": 2 }]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(order_resp.status(), 200);
        let order_body: Value = order_resp.json().await.unwrap();
        let order_id = order_body["data"]["id"].as_i64().unwrap();

        (table_id, item_id, order_id)
    }

    async fn set_order_status(&self, order_id: i64, status: &str) {
        let resp = self
            .client
            .put(self.url(&format!("/api/orders/{}/status", order_id)))
            .json(&json!({ "status": status }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    // Request without API key
    let client = Client::new();
    let resp = client
        .get(fixture.url("/api/menu"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    let client = Client::new();
    let resp = client
        .get(fixture.url("/api/menu"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_auth_valid_psk() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/menu"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_menu_crud() {
    let fixture = TestFixture::new().await;

    // Create
    let create_resp = fixture
        .client
        .post(fixture.url("/api/menu"))
        .json(&json!({
            "name": "Espresso",
            "category": "drinks",
            "price": 2.5,
            "vatRate": 0.19
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(create_resp.status(), 200);
    let create_body: Value = create_resp.json().await.unwrap();
    assert_eq!(create_body["success"], true);
    let item_id = create_body["data"]["id"].as_i64().unwrap();
    assert_eq!(create_body["data"]["name"], "Espresso");
    assert_eq!(create_body["data"]["active"], true);

    // Get
    let get_resp = fixture
        .client
        .get(fixture.url(&format!("/api/menu/{}", item_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(get_resp.status(), 200);
    let get_body: Value = get_resp.json().await.unwrap();
    assert_eq!(get_body["data"]["price"], 2.5);

    // Update
    let update_resp = fixture
        .client
        .put(fixture.url(&format!("/api/menu/{}", item_id)))
        .json(&json!({ "price": 2.8, "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(update_resp.status(), 200);
    let update_body: Value = update_resp.json().await.unwrap();
    assert_eq!(update_body["data"]["price"], 2.8);
    assert_eq!(update_body["data"]["active"], false);

    // List
    let list_resp = fixture
        .client
        .get(fixture.url("/api/menu"))
        .send()
        .await
        .unwrap();
    let list_body: Value = list_resp.json().await.unwrap();
    assert!(!list_body["data"].as_array().unwrap().is_empty());

    // Delete
    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/menu/{}", item_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 200);

    // Verify deleted
    let get_deleted = fixture
        .client
        .get(fixture.url(&format!("/api/menu/{}", item_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(get_deleted.status(), 404);
}

#[tokio::test]
async fn test_menu_validation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/menu"))
        .json(&json!({ "name": "", "category": "drinks", "price": 2.5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let resp2 = fixture
        .client
        .post(fixture.url("/api/menu"))
        .json(&json!({ "name": "Broken", "category": "drinks", "price": -1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp2.status(), 400);
}

#[tokio::test]
async fn test_table_crud() {
    let fixture = TestFixture::new().await;

    let create_resp = fixture
        .client
        .post(fixture.url("/api/tables"))
        .json(&json!({ "label": "Terrace 3", "seats": 2, "zone": "terrace" }))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 200);
    let create_body: Value = create_resp.json().await.unwrap();
    let table_id = create_body["data"]["id"].as_i64().unwrap();
    assert_eq!(create_body["data"]["label"], "Terrace 3");

    let update_resp = fixture
        .client
        .put(fixture.url(&format!("/api/tables/{}", table_id)))
        .json(&json!({ "seats": 6 }))
        .send()
        .await
        .unwrap();
    assert_eq!(update_resp.status(), 200);
    let update_body: Value = update_resp.json().await.unwrap();
    assert_eq!(update_body["data"]["seats"], 6);
    assert_eq!(update_body["data"]["zone"], "terrace");

    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/tables/{}", table_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 200);

    let get_deleted = fixture
        .client
        .get(fixture.url(&format!("/api/tables/{}", table_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(get_deleted.status(), 404);

    // Invalid seat count
    let invalid_resp = fixture
        .client
        .post(fixture.url("/api/tables"))
        .json(&json!({ "label": "Broken", "seats": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid_resp.status(), 400);
}

#[tokio::test]
async fn test_order_lifecycle() {
    let fixture = TestFixture::new().await;
    let (_table_id, item_id, order_id) = fixture.seed_order().await;

    // New orders start open with captured unit prices
    let get_resp = fixture
        .client
        .get(fixture.url(&format!("/api/orders/{}", order_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(get_resp.status(), 200);
    let get_body: Value = get_resp.json().await.unwrap();
    assert_eq!(get_body["data"]["status"], "open");
    let lines = get_body["data"]["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["menuItemId"].as_i64().unwrap(), item_id);
    assert_eq!(lines[0]["unitPrice"], 9.5);

    // Filter by status
    let open_resp = fixture
        .client
        .get(fixture.url("/api/orders?status=open"))
        .send()
        .await
        .unwrap();
    let open_body: Value = open_resp.json().await.unwrap();
    assert_eq!(open_body["data"].as_array().unwrap().len(), 1);

    let paid_resp = fixture
        .client
        .get(fixture.url("/api/orders?status=paid"))
        .send()
        .await
        .unwrap();
    let paid_body: Value = paid_resp.json().await.unwrap();
    assert!(paid_body["data"].as_array().unwrap().is_empty());

    // Transition to paid
    fixture.set_order_status(order_id, "paid").await;

    let closed_resp = fixture
        .client
        .get(fixture.url(&format!("/api/orders/{}", order_id)))
        .send()
        .await
        .unwrap();
    let closed_body: Value = closed_resp.json().await.unwrap();
    assert_eq!(closed_body["data"]["status"], "paid");
    assert!(closed_body["data"]["closedAt"].is_string());

    // Finalized orders refuse further transitions
    let reopen_resp = fixture
        .client
        .put(fixture.url(&format!("/api/orders/{}/status", order_id)))
        .json(&json!({ "status": "open" }))
        .send()
        .await
        .unwrap();
    assert_eq!(reopen_resp.status(), 400);
}

#[tokio::test]
async fn test_order_validation() {
    let fixture = TestFixture::new().await;

    // Order without lines
    let resp = fixture
        .client
        .post(fixture.url("/api/orders"))
        .json(&json!({ "tableId": 1, "userId": 1, "lines": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown status filter
    let resp2 = fixture
        .client
        .get(fixture.url("/api/orders?status=bogus"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp2.status(), 400);
}

#[tokio::test]
async fn test_not_found_errors() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/orders/9999"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_snapshot_export_download() {
    let fixture = TestFixture::new().await;
    fixture.seed_order().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/snapshot/export"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/zip"
    );
    let disposition = resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"restaurant-snapshot-"));
    assert!(disposition.ends_with(".zip\""));

    let bytes = resp.bytes().await.unwrap();
    assert!(!bytes.is_empty());
    // Zip local file header magic
    assert_eq!(&bytes[..4], b"PK\x03\x04");
}

#[tokio::test]
async fn test_snapshot_export_requires_actor() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .anonymous_client()
        .get(fixture.url("/api/snapshot/export"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "IDENTITY_ERROR");
}

#[tokio::test]
async fn test_snapshot_restore_requires_confirmation() {
    let fixture = TestFixture::new().await;

    // Without confirm=true nothing else is even looked at: no actor header,
    // garbage body, still the confirmation error.
    let resp = fixture
        .anonymous_client()
        .post(fixture.url("/api/snapshot/restore"))
        .body("not a zip")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");
}

#[tokio::test]
async fn test_snapshot_restore_requires_actor() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .anonymous_client()
        .post(fixture.url("/api/snapshot/restore?confirm=true"))
        .body("not a zip")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "IDENTITY_ERROR");
}

#[tokio::test]
async fn test_snapshot_restore_rejects_garbage() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/snapshot/restore?confirm=true"))
        .body("definitely not a zip archive")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "STRUCTURAL_ERROR");
}

#[tokio::test]
async fn test_snapshot_restore_blocked_by_open_order() {
    let fixture = TestFixture::new().await;
    fixture.seed_order().await;

    // Grab a valid archive first (the open order is in it, but the guard
    // checks the live store, not the archive)
    let export_resp = fixture
        .client
        .get(fixture.url("/api/snapshot/export"))
        .send()
        .await
        .unwrap();
    let archive = export_resp.bytes().await.unwrap();

    let resp = fixture
        .client
        .post(fixture.url("/api/snapshot/restore?confirm=true"))
        .body(archive)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let fixture = TestFixture::new().await;
    let (_table_id, item_id, order_id) = fixture.seed_order().await;
    fixture.set_order_status(order_id, "paid").await;

    // Export the settled state
    let export_resp = fixture
        .client
        .get(fixture.url("/api/snapshot/export"))
        .send()
        .await
        .unwrap();
    assert_eq!(export_resp.status(), 200);
    let archive = export_resp.bytes().await.unwrap();

    // Mutate: rename the menu item and add another one
    fixture
        .client
        .put(fixture.url(&format!("/api/menu/{}", item_id)))
        .json(&json!({ "name": "Renamed After Export" }))
        .send()
        .await
        .unwrap();
    fixture
        .client
        .post(fixture.url("/api/menu"))
        .json(&json!({ "name": "Tiramisu", "category": "dessert", "price": 5.0 }))
        .send()
        .await
        .unwrap();

    // Restore
    let restore_resp = fixture
        .client
        .post(fixture.url("/api/snapshot/restore?confirm=true"))
        .body(archive)
        .send()
        .await
        .unwrap();

    assert_eq!(restore_resp.status(), 200);
    let restore_body: Value = restore_resp.json().await.unwrap();
    assert_eq!(restore_body["success"], true);
    assert!(restore_body["data"]["rowsLoaded"].as_u64().unwrap() > 0);
    assert_eq!(restore_body["data"]["capturedBy"], "integration-tester");

    // The pre-export state is back: original name, no Tiramisu
    let item_resp = fixture
        .client
        .get(fixture.url(&format!("/api/menu/{}", item_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(item_resp.status(), 200);
    let item_body: Value = item_resp.json().await.unwrap();
    assert_eq!(item_body["data"]["name"], "Margherita");

    let list_resp = fixture
        .client
        .get(fixture.url("/api/menu"))
        .send()
        .await
        .unwrap();
    let list_body: Value = list_resp.json().await.unwrap();
    let names: Vec<&str> = list_body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert!(!names.contains(&"Tiramisu"));

    // The order survived with its original id and lines
    let order_resp = fixture
        .client
        .get(fixture.url(&format!("/api/orders/{}", order_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(order_resp.status(), 200);
    let order_body: Value = order_resp.json().await.unwrap();
    assert_eq!(order_body["data"]["status"], "paid");
    assert_eq!(order_body["data"]["lines"].as_array().unwrap().len(), 1);

    // Identity generators were resynced: a fresh insert does not collide
    let new_item_resp = fixture
        .client
        .post(fixture.url("/api/menu"))
        .json(&json!({ "name": "Limoncello", "category": "drinks", "price": 4.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(new_item_resp.status(), 200);
    let new_item_body: Value = new_item_resp.json().await.unwrap();
    let new_id = new_item_body["data"]["id"].as_i64().unwrap();
    assert!(new_id > item_id);
}
