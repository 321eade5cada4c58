#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use buildsite_api::{config::AppConfig, db, AppState};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::{str::FromStr, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "site_secret_for_integration_tests_0123456789";

/// Status code plus parsed JSON body of one response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    /// The `data` member of a success envelope.
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

/// A signed-in user as seen by the tests.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub company_id: i64,
    pub token: String,
}

/// Full router over a throwaway SQLite database and upload directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub uploads: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pool_size(1).await
    }

    /// Same as `new`, with `connections` pooled connections so requests can
    /// hit the database at the same time.
    pub async fn with_pool_size(connections: u32) -> Self {
        let uploads = tempfile::tempdir().expect("create temp dir");
        let db_path = uploads.path().join("buildsite-test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        cfg.upload_dir = uploads.path().join("files").display().to_string();
        cfg.max_upload_bytes = 1024 * 1024;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = buildsite_api::build_router(state.clone());

        Self {
            router,
            state,
            uploads,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }

    /// JSON request with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("build request")).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, None, Some(token)).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: &str) -> TestResponse {
        self.request(Method::POST, uri, Some(body), Some(token))
            .await
    }

    pub async fn put(&self, uri: &str, body: Value, token: &str) -> TestResponse {
        self.request(Method::PUT, uri, Some(body), Some(token)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None, Some(token)).await
    }

    /// Multipart upload with a single file field.
    pub async fn upload(
        &self,
        uri: &str,
        field: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
        token: &str,
    ) -> TestResponse {
        let boundary = "buildsite-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("authorization", format!("Bearer {}", token))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("build multipart request");
        self.send(request).await
    }

    /// Registers a user through the public signup endpoint.
    pub async fn signup(&self, name: &str, email: &str, role: &str, company: &str) -> Account {
        let response = self
            .request(
                Method::POST,
                "/api/auth/signup",
                Some(json!({
                    "name": name,
                    "email": email,
                    "password": "secret123",
                    "role": role,
                    "companyName": company,
                })),
                None,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "signup failed: {}",
            response.body
        );
        let data = response.data();
        Account {
            id: data["user"]["id"].as_i64().expect("user id"),
            company_id: data["user"]["companyId"].as_i64().expect("company id"),
            token: data["token"].as_str().expect("token").to_string(),
        }
    }

    pub async fn admin(&self, company: &str) -> Account {
        let email = format!("admin@{}.test", company.to_lowercase());
        self.signup("Admin", &email, "Admin", company).await
    }

    pub async fn engineer(&self, name: &str, company: &str) -> Account {
        let email = format!("{}@{}.test", name.to_lowercase(), company.to_lowercase());
        self.signup(name, &email, "Site_Engineer", company).await
    }

    /// Creates a project and returns its numeric id.
    pub async fn create_project(&self, admin: &Account, code: &str) -> i64 {
        let response = self
            .post(
                "/api/projects",
                json!({
                    "projectId": code,
                    "name": format!("Project {code}"),
                    "clientName": "Client",
                    "budget": "100000",
                }),
                &admin.token,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "project create failed: {}",
            response.body
        );
        response.data()["id"].as_i64().expect("project id")
    }

    /// Creates a catalog material and returns its numeric id.
    pub async fn create_material(&self, admin: &Account, name: &str) -> i64 {
        let response = self
            .post(
                "/api/materials",
                json!({
                    "name": name,
                    "category": "Cement",
                    "unit": "bag",
                    "defaultRate": "350.00",
                }),
                &admin.token,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "material create failed: {}",
            response.body
        );
        response.data()["id"].as_i64().expect("material id")
    }

    pub async fn allocate(
        &self,
        admin: &Account,
        project_id: i64,
        material_id: i64,
        assigned: &str,
    ) -> Value {
        let response = self
            .post(
                "/api/project-materials",
                json!({
                    "projectId": project_id,
                    "materialId": material_id,
                    "assigned": assigned,
                }),
                &admin.token,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "allocation failed: {}",
            response.body
        );
        response.data().clone()
    }

    /// The allocation row of `material_id` within the project listing.
    pub async fn allocation(&self, token: &str, project_id: i64, material_id: i64) -> Value {
        let response = self
            .get(&format!("/api/project-materials/{project_id}"), token)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response
            .data()
            .as_array()
            .expect("allocation list")
            .iter()
            .find(|row| row["materialId"].as_i64() == Some(material_id))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Reads a decimal serialized either as a JSON string or a number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}
