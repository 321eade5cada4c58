mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn admin_created_engineer_can_log_in_by_username() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;

    let created = app
        .post(
            "/api/engineers",
            json!({
                "name": "Meena",
                "phone": "9876543210",
                "empId": "EMP-7",
                "address": "12 Lake Road",
                "username": "meena_site",
                "password": "secret123",
            }),
            &admin.token,
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.data()["username"], "meena_site");
    assert!(created.data().get("password").is_none());

    let clash = app
        .post(
            "/api/engineers",
            json!({
                "name": "Other",
                "phone": "9876543211",
                "empId": "EMP-8",
                "address": "Somewhere",
                "username": "meena_site",
                "password": "secret123",
            }),
            &admin.token,
        )
        .await;
    assert_eq!(clash.status, StatusCode::CONFLICT);

    let bad_phone = app
        .post(
            "/api/engineers",
            json!({
                "name": "Other",
                "phone": "12345",
                "empId": "EMP-9",
                "address": "Somewhere",
                "username": "other_site",
                "password": "secret123",
            }),
            &admin.token,
        )
        .await;
    assert_eq!(bad_phone.status, StatusCode::BAD_REQUEST);

    let login = app
        .request(
            Method::POST,
            "/api/engineers/login",
            Some(json!({ "username": "meena_site", "password": "secret123" })),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.body);
    let token = login.data()["token"].as_str().unwrap().to_string();

    let profile = app.get("/api/profile", &token).await;
    assert_eq!(profile.data()["role"], "Site_Engineer");
    assert_eq!(profile.data()["companyId"].as_i64(), Some(admin.company_id));

    let wrong = app
        .request(
            Method::POST,
            "/api/engineers/login",
            Some(json!({ "username": "meena_site", "password": "nope-nope" })),
            None,
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let listing = app.get("/api/engineers", &token).await;
    assert_eq!(listing.data().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn labour_payments_feed_statistics() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let project_id = app.create_project(&admin, "PRJ-L").await;

    let created = app
        .post(
            "/api/labours",
            json!({ "name": "Suresh", "phone": "9000000001", "projectId": project_id }),
            &admin.token,
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    let labour_id = created.data()["id"].as_i64().unwrap();
    app.post(
        "/api/labours",
        json!({ "name": "Kiran", "phone": "9000000002" }),
        &admin.token,
    )
    .await;

    let payments_uri = format!("/api/labours/{labour_id}/payments");
    let first = app
        .post(&payments_uri, json!({ "amount": "1500.50" }), &admin.token)
        .await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.body);
    let second = app
        .post(&payments_uri, json!({ "amount": "500" }), &admin.token)
        .await;
    assert_eq!(second.status, StatusCode::CREATED);
    let zero = app
        .post(&payments_uri, json!({ "amount": "0" }), &admin.token)
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let labourer = app.get(&format!("/api/labours/{labour_id}"), &admin.token).await;
    assert_eq!(decimal(&labourer.data()["totalPaid"]), dec!(2000.50));
    assert_eq!(labourer.data()["payments"].as_array().unwrap().len(), 2);

    let stats = app.get("/api/labours/statistics", &admin.token).await;
    assert_eq!(stats.status, StatusCode::OK, "{}", stats.body);
    assert_eq!(stats.data()["totalLabourers"], 2);
    assert_eq!(decimal(&stats.data()["totalPaid"]), dec!(2000.50));
    assert_eq!(decimal(&stats.data()["totalPaidThisMonth"]), dec!(2000.50));
    assert_eq!(
        stats.data()["labourersByProject"].as_array().unwrap().len(),
        2
    );

    let on_project = app
        .get(&format!("/api/labours/project/{project_id}"), &admin.token)
        .await;
    assert_eq!(on_project.data().as_array().unwrap().len(), 1);

    let payment_id = first.data()["id"].as_i64().unwrap();
    let removed = app
        .delete(&format!("{payments_uri}/{payment_id}"), &admin.token)
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    let payments = app.get(&payments_uri, &admin.token).await;
    assert_eq!(payments.data().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn contracts_belong_to_company_projects() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;
    let outsider = app.admin("Zenith").await;
    let project_id = app.create_project(&admin, "PRJ-C").await;

    let missing = app
        .post(
            "/api/contracts",
            json!({ "contractorName": "BuildRight", "contactNumber": "9000000003" }),
            &admin.token,
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let created = app
        .post(
            "/api/contracts",
            json!({
                "projectId": project_id,
                "contractorName": "BuildRight",
                "contactNumber": "9000000003",
                "contractAmount": "75000",
            }),
            &admin.token,
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.data()["workStatus"], "Pending");
    assert_eq!(created.data()["projectName"], format!("Project PRJ-C"));
    let contract_id = created.data()["id"].as_i64().unwrap();

    let updated = app
        .put(
            &format!("/api/contracts/{contract_id}"),
            json!({ "workStatus": "In Progress" }),
            &admin.token,
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{}", updated.body);
    assert_eq!(updated.data()["workStatus"], "In Progress");

    let for_project = app
        .get(&format!("/api/contracts/project/{project_id}"), &admin.token)
        .await;
    assert_eq!(for_project.data().as_array().unwrap().len(), 1);

    let foreign = app
        .get(&format!("/api/contracts/{contract_id}"), &outsider.token)
        .await;
    assert_ne!(foreign.status, StatusCode::OK);
}

#[tokio::test]
async fn expenses_roll_up_into_the_summary() {
    let app = TestApp::new().await;
    let admin = app.admin("Acme").await;

    let incomplete = app
        .post(
            "/api/financial/projects",
            json!({ "name": "Warehouse", "budget": "1000" }),
            &admin.token,
        )
        .await;
    assert_eq!(incomplete.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        incomplete.message(),
        "Name, budget, quotation amount, and due date are required"
    );

    let created = app
        .post(
            "/api/financial/projects",
            json!({
                "name": "Warehouse",
                "budget": "1000",
                "quotationAmount": "1200",
                "dueDate": "2026-12-31",
            }),
            &admin.token,
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    let project_id = created.data()["id"].as_i64().unwrap();
    assert_eq!(decimal(&created.data()["quotationAmount"]), dec!(1200));
    assert_eq!(created.data()["dueDate"], "2026-12-31");

    let expenses_uri = format!("/api/financial/projects/{project_id}/expenses");
    let steel = app
        .post(
            &expenses_uri,
            json!({ "category": "Steel", "amount": "400" }),
            &admin.token,
        )
        .await;
    assert_eq!(steel.status, StatusCode::CREATED, "{}", steel.body);
    app.post(
        &expenses_uri,
        json!({ "category": "Labour", "amount": "350.25" }),
        &admin.token,
    )
    .await;

    let summary = app.get("/api/financial/summary", &admin.token).await;
    assert_eq!(summary.status, StatusCode::OK, "{}", summary.body);
    assert_eq!(decimal(&summary.data()["totalBudget"]), dec!(1000));
    assert_eq!(decimal(&summary.data()["totalSpent"]), dec!(750.25));
    assert_eq!(decimal(&summary.data()["totalRemaining"]), dec!(249.75));
    assert_eq!(summary.data()["projectsOverBudget"], 0);

    let steel_id = steel.data()["id"].as_i64().unwrap();
    let raised = app
        .put(
            &format!("/api/financial/expenses/{steel_id}"),
            json!({ "category": "Steel", "amount": "900" }),
            &admin.token,
        )
        .await;
    assert_eq!(raised.status, StatusCode::OK, "{}", raised.body);

    let summary = app.get("/api/financial/summary", &admin.token).await;
    assert_eq!(summary.data()["projectsOverBudget"], 1);

    let negative = app
        .post(
            &expenses_uri,
            json!({ "category": "Misc", "amount": "-1" }),
            &admin.token,
        )
        .await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn notifications_can_be_read_and_cleared() {
    let app = TestApp::new().await;
    let engineer = app.engineer("Ravi", "Acme").await;

    for name in ["Nails", "Screws"] {
        app.post(
            "/api/material-requests",
            json!({
                "name": name,
                "category": "Hardware",
                "unit": "box",
                "defaultRate": "20",
                "type": "GLOBAL",
            }),
            &engineer.token,
        )
        .await;
    }

    let inbox = app.get("/api/notifications", &engineer.token).await;
    assert_eq!(inbox.data()["unreadCount"], 2);
    let first_id = inbox.data()["notifications"][0]["id"].as_i64().unwrap();

    let read = app
        .put(
            &format!("/api/notifications/{first_id}/read"),
            json!({}),
            &engineer.token,
        )
        .await;
    assert_eq!(read.status, StatusCode::OK, "{}", read.body);
    assert_eq!(read.data()["read"], true);

    let unread = app
        .get("/api/notifications?unreadOnly=true", &engineer.token)
        .await;
    assert_eq!(unread.data()["count"], 1);

    let cleared = app
        .request(
            Method::DELETE,
            "/api/notifications/clear-read",
            None,
            Some(&engineer.token),
        )
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.data()["count"], 1);

    let all_read = app
        .put("/api/notifications/read-all", json!({}), &engineer.token)
        .await;
    assert_eq!(all_read.data()["count"], 1);

    let outsider = app.engineer("Mallory", "Zenith").await;
    let stolen = app
        .delete(&format!("/api/notifications/{first_id}"), &outsider.token)
        .await;
    assert_ne!(stolen.status, StatusCode::OK);
}
