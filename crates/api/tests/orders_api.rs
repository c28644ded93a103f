//! HTTP-level tests for `/api/v1/orders`, including the report-driven cascade.

mod common;

use axum::http::StatusCode;
use common::{body_json, delete, get, post_json, TestApp};
use serde_json::{json, Value};
use sqlx::PgPool;

use cascade_core::naming;

const RUNNING: i16 = 1;
const COMPLETE: i16 = 2;

async fn report(test: &TestApp, body: Value) -> (StatusCode, Value) {
    let response = post_json(test.app(), "/api/v1/orders/report", body).await;
    let status = response.status();
    (status, body_json(response).await)
}

/// `extract` with children `load` (seq 1) and `audit` (seq 2).
async fn pipeline(test: &TestApp) -> i64 {
    let root = common::create_job(test, "extract", None, 0).await;
    common::create_job(test, "load", Some(root), 1).await;
    common::create_job(test, "audit", Some(root), 2).await;
    root
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn running_report_creates_order_without_cascade(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;

    let (status, json) = report(
        &test,
        json!({"name": "nightly", "job_id": root, "status": RUNNING}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["created"], true);
    assert_eq!(json["data"]["order"]["status_id"], RUNNING);
    assert_eq!(json["data"]["cascade"]["state"], "not_complete");
    assert!(test.backend.submitted_names().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_report_dispatches_children_once(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;
    report(&test, json!({"name": "nightly", "job_id": root, "status": RUNNING})).await;

    let (status, json) = report(
        &test,
        json!({"name": "nightly", "job_id": root, "status_id": COMPLETE, "output": "s3://out/nightly"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let upstream = json["data"]["order"]["id"].as_i64().unwrap();
    let load = naming::child_order_name("load", upstream, 1);
    let audit = naming::child_order_name("audit", upstream, 1);
    let cascade = &json["data"]["cascade"];
    assert_eq!(cascade["state"], "dispatched");
    assert_eq!(cascade["generation"], 1);
    let names: Vec<_> = cascade["dispatched"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["order_name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec![load.clone(), audit.clone()]);
    assert_eq!(json["data"]["order"]["run_times"], 1);

    // A repeat report does not dispatch again.
    let (status, json) = report(
        &test,
        json!({"name": "nightly", "job_id": root, "status": COMPLETE}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cascade"]["state"], "already_dispatched");
    assert_eq!(json["data"]["order"]["output"], "s3://out/nightly");
    assert_eq!(
        test.backend.submitted_names(),
        vec![naming::run_name(&load, 1), naming::run_name(&audit, 1)]
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn forced_report_accepts_integer_flag(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;
    report(&test, json!({"name": "nightly", "job_id": root, "status": COMPLETE})).await;

    let (status, json) = report(
        &test,
        json!({"name": "nightly", "job_id": root, "status": COMPLETE, "force": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cascade"]["state"], "dispatched");
    assert_eq!(json["data"]["cascade"]["generation"], 2);
    assert_eq!(json["data"]["order"]["run_times"], 2);
    let upstream = json["data"]["order"]["id"].as_i64().unwrap();
    assert_eq!(
        json["data"]["cascade"]["dispatched"][0]["order_name"],
        naming::child_order_name("load", upstream, 2).as_str()
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deepest_child_names_can_be_reported(pool: PgPool) {
    let test = common::build_test_app(pool);
    let job_name = "j".repeat(naming::MAX_JOB_NAME_LEN);
    let job = common::create_job(&test, &job_name, None, 0).await;
    let name = naming::child_order_name(&job_name, i64::MAX, i32::MAX);

    let (status, _) = report(&test, json!({"name": name, "job_id": job, "status": RUNNING})).await;
    assert_eq!(status, StatusCode::CREATED);

    let too_long = "o".repeat(naming::MAX_ORDER_NAME_LEN + 1);
    let (status, _) = report(&test, json!({"name": too_long, "job_id": job, "status": RUNNING})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn partial_failure_is_reported_per_child(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;
    test.backend.reject_runs_containing("audit");

    let (status, json) = report(
        &test,
        json!({"name": "nightly", "job_id": root, "status": COMPLETE}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let cascade = &json["data"]["cascade"];
    assert_eq!(cascade["dispatched"].as_array().unwrap().len(), 1);
    assert_eq!(cascade["failures"].as_array().unwrap().len(), 1);
    assert_eq!(cascade["failures"][0]["job_name"], "audit");
    assert!(cascade["failures"][0]["message"]
        .as_str()
        .unwrap()
        .contains("quota exceeded"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_reports_are_rejected(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;

    let (status, json) = report(&test, json!({"name": "x", "job_id": root, "status": 7})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let (status, _) = report(&test, json!({"name": "x", "job_id": 999_999, "status": RUNNING})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = report(&test, json!({"name": "", "job_id": root, "status": RUNNING})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let json = body_json(get(test.app(), "/api/v1/orders").await).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn lineage_and_attempts_are_queryable(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;
    let (_, json) = report(&test, json!({"name": "nightly", "job_id": root, "status": COMPLETE})).await;
    let upstream = json["data"]["order"]["id"].as_i64().unwrap();

    let json = body_json(get(test.app(), &format!("/api/v1/orders/{upstream}/children")).await).await;
    let children = json["data"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| c["upstream_order_id"] == upstream));
    assert!(children.iter().all(|c| c["generation"] == 1));

    let child = children[0]["id"].as_i64().unwrap();
    let json = body_json(get(test.app(), &format!("/api/v1/orders/{child}/attempts")).await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["attempt"], 1);

    let json = body_json(
        get(test.app(), &format!("/api/v1/orders?upstream_order_id={upstream}&status_id={RUNNING}")).await,
    )
    .await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let response = get(test.app(), "/api/v1/orders/999999/attempts").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deleted_order_is_gone(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;
    let (_, json) = report(&test, json!({"name": "nightly", "job_id": root, "status": RUNNING})).await;
    let id = json["data"]["order"]["id"].as_i64().unwrap();

    let response = delete(test.app(), &format!("/api/v1/orders/{id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(test.app(), &format!("/api/v1/orders/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The name stays reserved.
    let (status, _) = report(&test, json!({"name": "nightly", "job_id": root, "status": RUNNING})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Resubmit
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_child_can_be_resubmitted(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;
    test.backend.reject_runs_containing("audit");
    let (_, json) = report(&test, json!({"name": "nightly", "job_id": root, "status": COMPLETE})).await;
    let failed = json["data"]["cascade"]["failures"][0]["order_id"].as_i64().unwrap();

    // Still refused.
    let response = post_json(test.app(), &format!("/api/v1/orders/{failed}/resubmit"), json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(get(test.app(), &format!("/api/v1/orders/{failed}")).await).await;
    assert_eq!(json["data"]["status_id"], 0);
    assert!(json["data"]["error_message"].as_str().unwrap().contains("quota exceeded"));

    let json = body_json(get(test.app(), &format!("/api/v1/orders/{failed}/attempts")).await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_order_cannot_be_resubmitted(pool: PgPool) {
    let test = common::build_test_app(pool);
    let root = pipeline(&test).await;
    let (_, json) = report(&test, json!({"name": "nightly", "job_id": root, "status": COMPLETE})).await;
    let id = json["data"]["order"]["id"].as_i64().unwrap();

    let response = post_json(test.app(), &format!("/api/v1/orders/{id}/resubmit"), json!({})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post_json(test.app(), "/api/v1/orders/999999/resubmit", json!({})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn running_order_with_a_run_cannot_be_resubmitted(pool: PgPool) {
    let test = common::build_test_app(pool);
    let id = common::create_job(&test, "extract", None, 0).await;
    let response = post_json(
        test.app(),
        &format!("/api/v1/jobs/{id}/launch"),
        json!({"order_name": "nightly"}),
    )
    .await;
    let order = body_json(response).await["data"]["order"]["id"].as_i64().unwrap();

    let response = post_json(test.app(), &format!("/api/v1/orders/{order}/resubmit"), json!({})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(test.backend.submitted_names(), vec!["nightly-1"]);

    let json = body_json(get(test.app(), &format!("/api/v1/orders/{order}/attempts")).await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["outcome_id"], 1);
}
