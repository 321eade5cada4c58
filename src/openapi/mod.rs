use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BuildSite API",
        version = "1.0.0",
        description = r#"
# BuildSite Construction Management API

Multi-tenant backend for construction companies: projects, the material
catalog, material requests raised by site engineers and reviewed by admins,
per-project material allocations and the usage logs that consume them.

## Authentication

Protected endpoints expect a JWT issued by `/api/auth/login`,
`/api/auth/signup` or `/api/engineers/login`:

```
Authorization: Bearer <your-jwt-token>
```

## Decimal values

Quantities, rates and amounts are exact decimals serialized as strings
(e.g. `"150.00"`).
        "#
    ),
    tags(
        (name = "Auth", description = "Signup, login and company lookup"),
        (name = "Material Requests", description = "Submission and admin review of material requests"),
        (name = "Project Materials", description = "Per-project material allocations"),
        (name = "Usage Logs", description = "Material consumption records"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::accounts::signup,
        crate::handlers::accounts::login,
        crate::handlers::accounts::companies,

        crate::handlers::material_requests::my_requests,
        crate::handlers::material_requests::pending_requests,
        crate::handlers::material_requests::list_requests,
        crate::handlers::material_requests::submit_request,
        crate::handlers::material_requests::approve_request,
        crate::handlers::material_requests::reject_request,

        crate::handlers::project_materials::list_for_project,
        crate::handlers::project_materials::add_allocation,
        crate::handlers::project_materials::update_allocation,
        crate::handlers::project_materials::remove_allocation,

        crate::handlers::usage_logs::list_usage,
        crate::handlers::usage_logs::record_usage,
        crate::handlers::usage_logs::update_usage,
        crate::handlers::usage_logs::delete_usage,

        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::services::accounts::SignupRequest,
            crate::services::accounts::LoginRequest,
            crate::services::accounts::CompanySummary,
            crate::services::material_requests::SubmitMaterialRequest,
            crate::services::material_requests::ApproveMaterialRequest,
            crate::services::material_requests::RejectMaterialRequest,
            crate::services::project_materials::AddProjectMaterial,
            crate::services::project_materials::UpdateProjectMaterial,
            crate::services::usage::RecordUsage,
            crate::services::usage::UpdateUsage,
            crate::entities::material_request::RequestType,
            crate::entities::material_request::RequestStatus,
            crate::entities::project_material::MaterialStatus,
            crate::handlers::health::HealthReport,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_covers_request_workflow() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("BuildSite API"));
        assert!(json.contains("/api/material-requests/{id}/approve"));
        assert!(json.contains("/api/usage-logs"));
        assert!(json.contains("/api/project-materials"));
        assert!(json.contains("\"Bearer\""));
    }
}
