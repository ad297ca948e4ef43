use chrono::{Duration as ChronoDuration, Utc};
use equiplend_auth::{JwtClaims, Role};
use equiplend_core::UserId;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory stores, bound to an ephemeral port.
        let app = equiplend_api::app::build_app(SECRET.to_string());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let res = req.send().await.unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path)).bearer_auth(token)).await
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    async fn delete(&self, token: &str, path: &str) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path)).bearer_auth(token)).await
    }

    async fn product(&self, admin: &str, stock: i64) -> String {
        let (status, body) = self
            .post(admin, "/admin/products", json!({ "name": "Projector", "stock": stock }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn request(&self, token: &str, product_id: &str, quantity: i64) -> String {
        let (status, body) = self
            .post(
                token,
                "/requests",
                json!({
                    "purpose": "Guest lecture",
                    "notes": "Room 4",
                    "items": [{ "product_id": product_id, "quantity": quantity }],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn stock(&self, token: &str, product_id: &str) -> i64 {
        let (_, body) = self.get(token, &format!("/products/{product_id}")).await;
        body["data"]["stock"].as_i64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt_with(role: Role, issued_at: chrono::DateTime<Utc>, ttl: ChronoDuration) -> String {
    let claims = JwtClaims {
        sub: UserId::new(),
        role,
        issued_at,
        expires_at: issued_at + ttl,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn mint_jwt(role: Role) -> String {
    mint_jwt_with(role, Utc::now(), ChronoDuration::minutes(10))
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.send(srv.client.get(srv.url("/requests/my"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = srv.get("not-a-jwt", "/requests/my").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_and_foreign_tokens_are_rejected() {
    let srv = TestServer::spawn().await;

    let expired = mint_jwt_with(
        Role::Requester,
        Utc::now() - ChronoDuration::hours(2),
        ChronoDuration::minutes(10),
    );
    let (status, _) = srv.get(&expired, "/requests/my").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let now = Utc::now();
    let foreign = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &JwtClaims {
            sub: UserId::new(),
            role: Role::Admin,
            issued_at: now,
            expires_at: now + ChronoDuration::minutes(10),
        },
        &EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();
    let (status, _) = srv.get(&foreign, "/admin/requests").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get(&mint_jwt(Role::Admin), "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn approval_reserves_stock_and_second_request_is_short() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin);
    let product = srv.product(&admin, 5).await;

    let first = srv.request(&mint_jwt(Role::Requester), &product, 3).await;
    let second = srv.request(&mint_jwt(Role::Requester), &product, 3).await;
    assert_eq!(srv.stock(&admin, &product).await, 5);

    let (status, body) = srv
        .put(&admin, &format!("/admin/requests/{first}/status"), json!({ "status": "APPROVED" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "APPROVED");
    assert_eq!(srv.stock(&admin, &product).await, 2);

    let (status, body) = srv
        .put(&admin, &format!("/admin/requests/{second}/status"), json!({ "status": "approved" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(srv.stock(&admin, &product).await, 2);
}

#[tokio::test]
async fn requester_sees_only_own_requisitions() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin);
    let product = srv.product(&admin, 5).await;

    let owner = mint_jwt(Role::Requester);
    let id = srv.request(&owner, &product, 1).await;

    let (status, body) = srv.get(&owner, &format!("/requests/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["purpose"], "Guest lecture");
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["availability"][0]["sufficient"], true);

    let (status, _) = srv.get(&mint_jwt(Role::Requester), &format!("/requests/{id}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.get(&owner, "/requests/my").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = srv.get(&owner, "/admin/requests").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cancel_is_owner_only_and_pending_only() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin);
    let product = srv.product(&admin, 5).await;
    let owner = mint_jwt(Role::Requester);
    let id = srv.request(&owner, &product, 3).await;

    let (status, _) = srv
        .put(&mint_jwt(Role::Requester), &format!("/requests/{id}/cancel"), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.put(&owner, &format!("/requests/{id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");
    assert_eq!(srv.stock(&admin, &product).await, 5);

    let (status, body) = srv.put(&owner, &format!("/requests/{id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn requester_cannot_change_status() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin);
    let product = srv.product(&admin, 5).await;
    let owner = mint_jwt(Role::Requester);
    let id = srv.request(&owner, &product, 1).await;

    for target in ["APPROVED", "PENDING", "CANCELLED"] {
        let (status, body) = srv
            .put(&owner, &format!("/admin/requests/{id}/status"), json!({ "status": target }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{target}: {body}");
    }
    assert_eq!(srv.stock(&admin, &product).await, 5);

    let (_, body) = srv.get(&owner, &format!("/requests/{id}")).await;
    assert_eq!(body["data"]["status"], "PENDING");
}

#[tokio::test]
async fn bad_input_is_a_client_error() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin);
    let requester = mint_jwt(Role::Requester);
    let product = srv.product(&admin, 5).await;

    let (status, _) = srv
        .post(&requester, "/requests", json!({ "purpose": "x", "items": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv.post(&requester, "/requests", json!({ "items": 3 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv.get(&requester, "/requests/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = srv.request(&requester, &product, 1).await;
    let (status, body) = srv
        .put(&admin, &format!("/admin/requests/{id}/status"), json!({ "status": "LOST" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_status");

    let (status, _) = srv.get(&admin, "/admin/requests?status=nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_requisition_is_not_found() {
    let srv = TestServer::spawn().await;
    let id = uuid_like();
    let (status, body) = srv.get(&mint_jwt(Role::Admin), &format!("/requests/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

fn uuid_like() -> String {
    UserId::new().to_string()
}

#[tokio::test]
async fn full_lifecycle_then_soft_delete() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin);
    let product = srv.product(&admin, 4).await;
    let owner = mint_jwt(Role::Requester);
    let id = srv.request(&owner, &product, 2).await;

    let (status, _) = srv.delete(&admin, &format!("/admin/requests/{id}")).await;
    assert_eq!(status, StatusCode::CONFLICT, "only finished requisitions can be deleted");

    for target in ["APPROVED", "ISSUED", "COMPLETED"] {
        let (status, body) = srv
            .put(
                &admin,
                &format!("/admin/requests/{id}/status"),
                json!({ "status": target, "notes": "ok" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{target}: {body}");
        assert_eq!(body["data"]["status"], target);
    }
    assert_eq!(srv.stock(&admin, &product).await, 2);

    let (status, body) = srv
        .put(&admin, &format!("/admin/requests/{id}/status"), json!({ "status": "APPROVED" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (status, _) = srv
        .get(&admin, "/admin/requests?status=completed")
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = srv.delete(&admin, &format!("/admin/requests/{id}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = srv.get(&owner, &format!("/requests/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = srv.get(&admin, "/admin/requests").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn product_administration() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(Role::Admin);
    let requester = mint_jwt(Role::Requester);

    let (status, _) = srv
        .post(&requester, "/admin/products", json!({ "name": "Camera", "stock": 1 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv
        .post(&admin, "/admin/products", json!({ "name": "Camera", "stock": 3, "min_stock": 1 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let req = srv.request(&requester, &id, 2).await;
    let (status, _) = srv
        .put(&admin, &format!("/admin/requests/{req}/status"), json!({ "status": "APPROVED" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv.get(&admin, "/admin/products/low-stock").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], id.as_str());

    let (status, body) = srv
        .post(&admin, &format!("/admin/products/{id}/restock"), json!({ "quantity": 4 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stock"], 5);

    let (status, body) = srv
        .put(&admin, &format!("/admin/products/{id}/active"), json!({ "active": false }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "INACTIVE");

    let (status, body) = srv
        .post(
            &requester,
            "/requests",
            json!({ "purpose": "Shoot", "items": [{ "product_id": id, "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = srv.get(&requester, "/products").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
