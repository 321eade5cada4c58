//! BuildSite API library
//!
//! Multi-tenant construction-project backend: material requests and their
//! approval workflow, per-project material allocations reconciled against
//! usage logs, and the project, workforce and financial records around them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod storage;
pub mod tracing;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    response::Json,
    routing::{delete, get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService};
use crate::storage::FileStorage;

/// Role required by the review and catalog-management endpoints.
const ADMIN_ROLE: &str = "Admin";

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: services::AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires every service against one pool, one token service and the upload directory.
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(auth::AuthConfig::from(&config)));
        let storage = Arc::new(FileStorage::new(config.upload_dir.clone()));
        let services =
            services::AppServices::new(db.clone(), auth.clone(), storage, config.max_upload_bytes);
        Self {
            db,
            config,
            services,
            auth,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Non-fatal condition the caller should surface, e.g. over-allocated usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            warning: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn warning_is_only_serialized_when_present() {
        let quiet = serde_json::to_value(ApiResponse::success(1).with_warning(None)).unwrap();
        assert!(quiet.get("warning").is_none());
        assert!(quiet.get("message").is_none());

        let loud = serde_json::to_value(
            ApiResponse::success(1)
                .with_message("Usage logged successfully")
                .with_warning(Some("Usage exceeds assigned quantity".into())),
        )
        .unwrap();
        assert_eq!(loud["warning"], "Usage exceeds assigned quantity");
        assert_eq!(loud["message"], "Usage logged successfully");
        assert_eq!(loud["success"], true);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api` route, grouped by the access they require.
pub fn api_routes() -> Router<AppState> {
    use handlers::{
        accounts, contracts, engineers, financial, labour, material_requests, materials,
        notifications, project_materials, projects, usage_logs,
    };

    let public = Router::new()
        .route("/auth/signup", post(accounts::signup))
        .route("/auth/login", post(accounts::login))
        .route("/auth/companies", get(accounts::companies))
        .route("/engineers/login", post(engineers::login));

    let authenticated = Router::new()
        .route("/profile", get(accounts::profile))
        .route("/employees", get(accounts::employees))
        .route("/companies/:id", get(accounts::company))
        // Catalog
        .route("/materials", get(materials::list_materials))
        .route("/materials/categories", get(materials::list_categories))
        .route("/materials/:id", get(materials::get_material))
        // Projects
        .route("/projects", get(projects::list_projects))
        .route("/projects/:id", get(projects::get_project))
        .route("/projects/:id/files", get(projects::list_files))
        .route(
            "/project-materials/:id",
            get(project_materials::list_for_project),
        )
        // Requests and usage
        .route(
            "/material-requests",
            post(material_requests::submit_request),
        )
        .route(
            "/material-requests/my-requests",
            get(material_requests::my_requests),
        )
        .route(
            "/usage-logs",
            get(usage_logs::list_usage).post(usage_logs::record_usage),
        )
        .route("/usage-logs/:id", put(usage_logs::update_usage))
        // Workforce
        .route("/engineers", get(engineers::list_engineers))
        .route("/engineers/:id", get(engineers::get_engineer))
        .route(
            "/labours",
            get(labour::list_labour).post(labour::create_labour),
        )
        .route("/labours/statistics", get(labour::statistics))
        .route("/labours/project/:id", get(labour::list_for_project))
        .route(
            "/labours/:id",
            get(labour::get_labour)
                .put(labour::update_labour)
                .delete(labour::delete_labour),
        )
        .route(
            "/labours/:id/payments",
            get(labour::list_payments).post(labour::add_payment),
        )
        .route(
            "/labours/:id/payments/:payment_id",
            delete(labour::delete_payment),
        )
        // Contracts and money
        .route(
            "/contracts",
            get(contracts::list_contracts).post(contracts::create_contract),
        )
        .route(
            "/contracts/project/:id",
            get(contracts::list_for_project),
        )
        .route(
            "/contracts/:id",
            get(contracts::get_contract)
                .put(contracts::update_contract)
                .delete(contracts::delete_contract),
        )
        .route(
            "/financial/projects",
            get(financial::list_projects).post(financial::create_project),
        )
        .route("/financial/projects/:id", get(financial::get_project))
        .route(
            "/financial/projects/:id/expenses",
            post(financial::add_expense),
        )
        .route(
            "/financial/expenses/:id",
            put(financial::update_expense).delete(financial::delete_expense),
        )
        .route("/financial/summary", get(financial::summary))
        // Inbox
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/notifications/clear-read", delete(notifications::clear_read))
        .route("/notifications/:id/read", put(notifications::mark_read))
        .route(
            "/notifications/:id",
            delete(notifications::delete_notification),
        )
        .with_auth();

    let admin = Router::new()
        .route("/admin/users", get(accounts::users))
        .route("/materials", post(materials::create_material))
        .route(
            "/materials/:id",
            put(materials::update_material).delete(materials::delete_material),
        )
        .route("/projects", post(projects::create_project))
        .route(
            "/projects/:id",
            put(projects::update_project).delete(projects::delete_project),
        )
        .route("/projects/:id/files", post(projects::upload_file))
        .route("/projects/:id/files/:file_id", delete(projects::delete_file))
        .route(
            "/project-materials",
            post(project_materials::add_allocation),
        )
        .route(
            "/project-materials/:id",
            put(project_materials::update_allocation)
                .delete(project_materials::remove_allocation),
        )
        .route("/material-requests", get(material_requests::list_requests))
        .route(
            "/material-requests/pending",
            get(material_requests::pending_requests),
        )
        .route(
            "/material-requests/:id/approve",
            put(material_requests::approve_request),
        )
        .route(
            "/material-requests/:id/reject",
            put(material_requests::reject_request),
        )
        .route("/usage-logs/:id", delete(usage_logs::delete_usage))
        .route("/engineers", post(engineers::create_engineer))
        .route(
            "/engineers/:id",
            put(engineers::update_engineer).delete(engineers::delete_engineer),
        )
        .route("/engineers/:id/image", post(engineers::upload_image))
        .with_role(ADMIN_ROLE);

    public.merge(authenticated).merge(admin)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Full application router: `/api`, `/health`, `/uploads` and Swagger UI,
/// behind the shared middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cfg = state.config.clone();

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes())
        .nest_service("/uploads", ServeDir::new(&cfg.upload_dir))
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&cfg))
        .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_secs)))
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(Extension(state.auth.clone()))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
