mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn approved_project_material_request_allocates_and_usage_completes_it() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;
    assert_eq!(admin.company_id, engineer.company_id);

    let project_id = app.create_project(&admin, "PRJ-100").await;
    let material_id = app.create_material(&admin, "Portland Cement").await;

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Portland Cement",
                "category": "Cement",
                "unit": "bag",
                "defaultRate": "350.00",
                "type": "PROJECT_MATERIAL",
                "projectId": project_id,
                "materialId": material_id,
                "quantity": "50",
            }),
            &engineer.token,
        )
        .await;
    assert_eq!(submitted.status, StatusCode::CREATED, "{}", submitted.body);
    assert_eq!(submitted.message(), "Material request submitted successfully");
    let request = submitted.data();
    assert_eq!(request["status"], "PENDING");
    assert_eq!(request["type"], "PROJECT_MATERIAL");
    assert!(request["requestId"].as_str().unwrap().starts_with("REQ"));
    let request_id = request["id"].as_i64().unwrap();

    let pending = app.get("/api/material-requests/pending", &admin.token).await;
    assert_eq!(pending.status, StatusCode::OK);
    assert_eq!(pending.data().as_array().unwrap().len(), 1);

    let approved = app
        .put(
            &format!("/api/material-requests/{request_id}/approve"),
            json!({ "approvalNotes": "Deliver on Monday" }),
            &admin.token,
        )
        .await;
    assert_eq!(approved.status, StatusCode::OK, "{}", approved.body);
    assert_eq!(approved.data()["status"], "APPROVED");
    assert_eq!(approved.data()["reviewedBy"].as_i64(), Some(admin.id));
    assert_eq!(approved.data()["approvalNotes"], "Deliver on Monday");

    let allocation = app.allocation(&admin.token, project_id, material_id).await;
    assert_eq!(decimal(&allocation["assigned"]), dec!(50));
    assert_eq!(decimal(&allocation["used"]), dec!(0));
    assert_eq!(allocation["status"], "NOT_USED");

    let first = app
        .post(
            "/api/usage-logs",
            json!({ "projectId": project_id, "materialId": material_id, "quantity": "20" }),
            &engineer.token,
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.body);
    assert_eq!(first.message(), "Usage logged successfully");
    assert!(first.body.get("warning").is_none());
    assert_eq!(first.data()["projectMaterial"]["status"], "ACTIVE");

    let allocation = app.allocation(&admin.token, project_id, material_id).await;
    assert_eq!(decimal(&allocation["remaining"]), dec!(30));
    assert_eq!(allocation["status"], "ACTIVE");

    let second = app
        .post(
            "/api/usage-logs",
            json!({ "projectId": project_id, "materialId": material_id, "quantity": "30" }),
            &engineer.token,
        )
        .await;
    assert_eq!(second.status, StatusCode::CREATED, "{}", second.body);
    assert_eq!(second.data()["projectMaterial"]["status"], "COMPLETED");
    assert_eq!(decimal(&second.data()["projectMaterial"]["used"]), dec!(50));

    let pending = app.get("/api/material-requests/pending", &admin.token).await;
    assert!(pending.data().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn request_can_only_be_reviewed_once() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Rebar 12mm",
                "category": "Steel",
                "unit": "kg",
                "defaultRate": "72.5",
                "type": "GLOBAL",
            }),
            &engineer.token,
        )
        .await;
    assert_eq!(submitted.status, StatusCode::CREATED, "{}", submitted.body);
    let request_id = submitted.data()["id"].as_i64().unwrap();
    let approve_uri = format!("/api/material-requests/{request_id}/approve");

    let first = app.put(&approve_uri, json!({}), &admin.token).await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);

    let second = app.put(&approve_uri, json!({}), &admin.token).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.message(), "Request has already been reviewed");

    let reject = app
        .put(
            &format!("/api/material-requests/{request_id}/reject"),
            json!({ "rejectionReason": "Too late" }),
            &admin.token,
        )
        .await;
    assert_eq!(reject.status, StatusCode::CONFLICT);

    // Approval ran once, so exactly one catalog row was created.
    let catalog = app.get("/api/materials?search=Rebar", &admin.token).await;
    assert_eq!(catalog.data().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn global_approval_copies_rate_exactly() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Teak plywood",
                "category": "Wood",
                "unit": "sheet",
                "defaultRate": "150.00",
                "type": "GLOBAL",
            }),
            &engineer.token,
        )
        .await;
    assert_eq!(submitted.status, StatusCode::CREATED, "{}", submitted.body);
    let request_id = submitted.data()["id"].as_i64().unwrap();

    // Approving without any body is accepted.
    let approved = app
        .request(
            Method::PUT,
            &format!("/api/material-requests/{request_id}/approve"),
            None,
            Some(&admin.token),
        )
        .await;
    assert_eq!(approved.status, StatusCode::OK, "{}", approved.body);

    let catalog = app.get("/api/materials?category=Wood", &admin.token).await;
    let rows = catalog.data().as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Teak plywood");
    assert_eq!(rows[0]["unit"], "sheet");
    assert_eq!(decimal(&rows[0]["defaultRate"]), dec!(150.00));

    let categories = app.get("/api/materials/categories", &engineer.token).await;
    assert_eq!(categories.data(), &json!(["All", "Wood"]));
}

#[tokio::test]
async fn project_request_creates_material_and_allocation() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;
    let project_id = app.create_project(&admin, "PRJ-200").await;

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Granite slab",
                "category": "Stone",
                "unit": "sqft",
                "defaultRate": "210",
                "type": "PROJECT",
                "projectId": project_id,
                "quantity": "120",
            }),
            &engineer.token,
        )
        .await;
    assert_eq!(submitted.status, StatusCode::CREATED, "{}", submitted.body);
    let request_id = submitted.data()["id"].as_i64().unwrap();

    let approved = app
        .put(
            &format!("/api/material-requests/{request_id}/approve"),
            json!({}),
            &admin.token,
        )
        .await;
    assert_eq!(approved.status, StatusCode::OK, "{}", approved.body);

    let allocations = app
        .get(&format!("/api/project-materials/{project_id}"), &engineer.token)
        .await;
    let rows = allocations.data().as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["material"]["name"], "Granite slab");
    assert_eq!(decimal(&rows[0]["assigned"]), dec!(120));
    assert_eq!(rows[0]["status"], "NOT_USED");
}

#[tokio::test]
async fn approving_for_an_existing_allocation_tops_it_up() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;
    let project_id = app.create_project(&admin, "PRJ-300").await;
    let material_id = app.create_material(&admin, "River sand").await;
    app.allocate(&admin, project_id, material_id, "10").await;

    let used = app
        .post(
            "/api/usage-logs",
            json!({ "projectId": project_id, "materialId": material_id, "quantity": "10" }),
            &engineer.token,
        )
        .await;
    assert_eq!(used.data()["projectMaterial"]["status"], "COMPLETED");

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "River sand",
                "category": "Cement",
                "unit": "bag",
                "defaultRate": "350",
                "type": "PROJECT_MATERIAL",
                "projectId": project_id,
                "materialId": material_id,
                "quantity": "15",
            }),
            &engineer.token,
        )
        .await;
    let request_id = submitted.data()["id"].as_i64().unwrap();
    let approved = app
        .put(
            &format!("/api/material-requests/{request_id}/approve"),
            json!({}),
            &admin.token,
        )
        .await;
    assert_eq!(approved.status, StatusCode::OK, "{}", approved.body);

    let allocation = app.allocation(&admin.token, project_id, material_id).await;
    assert_eq!(decimal(&allocation["assigned"]), dec!(25));
    assert_eq!(decimal(&allocation["used"]), dec!(10));
    assert_eq!(allocation["status"], "ACTIVE");
}

#[tokio::test]
async fn failed_approval_leaves_request_pending_and_inventory_untouched() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;
    let project_id = app.create_project(&admin, "PRJ-RB").await;
    let material_id = app.create_material(&admin, "Lime").await;

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Lime",
                "category": "Cement",
                "unit": "bag",
                "defaultRate": "350",
                "type": "PROJECT_MATERIAL",
                "projectId": project_id,
                "materialId": material_id,
                "quantity": "12",
            }),
            &engineer.token,
        )
        .await;
    assert_eq!(submitted.status, StatusCode::CREATED, "{}", submitted.body);
    let request_id = submitted.data()["id"].as_i64().unwrap();

    // The catalog row disappears between submission and review.
    let removed = app
        .delete(&format!("/api/materials/{material_id}"), &admin.token)
        .await;
    assert_eq!(removed.status, StatusCode::OK, "{}", removed.body);

    let approved = app
        .put(
            &format!("/api/material-requests/{request_id}/approve"),
            json!({ "approvalNotes": "go ahead" }),
            &admin.token,
        )
        .await;
    assert_eq!(approved.status, StatusCode::NOT_FOUND, "{}", approved.body);

    let pending = app.get("/api/material-requests/pending", &admin.token).await;
    let rows = pending.data().as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "PENDING");
    assert!(rows[0]["reviewedBy"].is_null());

    let allocations = app
        .get(&format!("/api/project-materials/{project_id}"), &admin.token)
        .await;
    assert!(allocations.data().as_array().unwrap().is_empty());
    let catalog = app.get("/api/materials", &admin.token).await;
    assert!(catalog.data().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rejection_requires_a_reason_and_leaves_inventory_alone() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;
    let project_id = app.create_project(&admin, "PRJ-400").await;

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Glass panel",
                "category": "Glass",
                "unit": "piece",
                "defaultRate": "900",
                "type": "PROJECT",
                "projectId": project_id,
                "quantity": "4",
            }),
            &engineer.token,
        )
        .await;
    let request_id = submitted.data()["id"].as_i64().unwrap();
    let reject_uri = format!("/api/material-requests/{request_id}/reject");

    let missing = app.put(&reject_uri, json!({}), &admin.token).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.message(), "Rejection reason is required");

    let blank = app
        .put(&reject_uri, json!({ "rejectionReason": "   " }), &admin.token)
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let rejected = app
        .put(
            &reject_uri,
            json!({ "rejectionReason": "Over budget" }),
            &admin.token,
        )
        .await;
    assert_eq!(rejected.status, StatusCode::OK, "{}", rejected.body);
    assert_eq!(rejected.data()["status"], "REJECTED");
    assert_eq!(rejected.data()["rejectionReason"], "Over budget");

    let catalog = app.get("/api/materials", &admin.token).await;
    assert!(catalog.data().as_array().unwrap().is_empty());
    let allocations = app
        .get(&format!("/api/project-materials/{project_id}"), &admin.token)
        .await;
    assert!(allocations.data().as_array().unwrap().is_empty());

    let mine = app
        .get("/api/material-requests/my-requests", &engineer.token)
        .await;
    let rows = mine.data().as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "REJECTED");
}

#[tokio::test]
async fn review_is_confined_to_the_reviewers_company() {
    let app = TestApp::new().await;
    let engineer = app.engineer("Ravi", "Acme").await;
    let outsider = app.admin("Zenith").await;
    assert_ne!(engineer.company_id, outsider.company_id);

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Tiles",
                "category": "Flooring",
                "unit": "box",
                "defaultRate": "40",
                "type": "GLOBAL",
            }),
            &engineer.token,
        )
        .await;
    let request_id = submitted.data()["id"].as_i64().unwrap();

    let approve = app
        .put(
            &format!("/api/material-requests/{request_id}/approve"),
            json!({}),
            &outsider.token,
        )
        .await;
    assert_eq!(approve.status, StatusCode::FORBIDDEN);

    let pending = app.get("/api/material-requests/pending", &outsider.token).await;
    assert!(pending.data().as_array().unwrap().is_empty());

    let missing = app
        .put("/api/material-requests/9999/approve", json!({}), &outsider.token)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submission_targets_must_belong_to_the_company() {
    let app = TestApp::new().await;
    let engineer = app.engineer("Ravi", "Acme").await;
    let other_admin = app.admin("Zenith").await;
    let foreign_project = app.create_project(&other_admin, "ZEN-1").await;

    let response = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Paint",
                "category": "Finishing",
                "unit": "litre",
                "defaultRate": "300",
                "type": "PROJECT",
                "projectId": foreign_project,
                "quantity": "10",
            }),
            &engineer.token,
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let invalid = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Paint",
                "category": "Finishing",
                "unit": "litre",
                "type": "GLOBAL",
            }),
            &engineer.token,
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.message(), "Default rate is required");
}

#[tokio::test]
async fn review_routes_require_an_admin_token() {
    let app = TestApp::new().await;
    let engineer = app.engineer("Ravi", "Acme").await;

    let pending = app.get("/api/material-requests/pending", &engineer.token).await;
    assert_eq!(pending.status, StatusCode::FORBIDDEN);

    let approve = app
        .put("/api/material-requests/1/approve", json!({}), &engineer.token)
        .await;
    assert_eq!(approve.status, StatusCode::FORBIDDEN);

    let anonymous = app
        .request(Method::GET, "/api/material-requests/my-requests", None, None)
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let garbage = app
        .request(
            Method::GET,
            "/api/material-requests/my-requests",
            None,
            Some("not-a-jwt"),
        )
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submitter_and_reviewer_are_notified() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let engineer = app.engineer("Ravi", "Acme").await;

    let submitted = app
        .post(
            "/api/material-requests",
            json!({
                "name": "Bitumen",
                "category": "Roofing",
                "unit": "drum",
                "defaultRate": "5000",
                "type": "GLOBAL",
            }),
            &engineer.token,
        )
        .await;
    let request_id = submitted.data()["id"].as_i64().unwrap();
    app.put(
        &format!("/api/material-requests/{request_id}/approve"),
        json!({}),
        &admin.token,
    )
    .await;

    let inbox = app.get("/api/notifications", &engineer.token).await;
    assert_eq!(inbox.status, StatusCode::OK, "{}", inbox.body);
    assert_eq!(inbox.data()["unreadCount"], 2);
    let messages: Vec<String> = inbox.data()["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["message"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().any(|m| m.contains("has been approved")));
    assert!(messages.iter().any(|m| m.contains("submitted for approval")));
}
