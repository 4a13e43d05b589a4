//! Integration tests for community report submission.

mod common;

use axum::http::{Method, StatusCode};
use common::{create_test_app, json_request, parse_response_body, report_body, test_state, TestClient};
use domain::services::MockRiskService;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_submit_report_success() {
    let mock = MockRiskService::new();
    let state = test_state(mock.clone());
    let app = create_test_app(&state);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/reports/submit",
            report_body("user-1", 13.0827, 80.2707),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Report submitted successfully");
    assert_eq!(body["mlProcessed"], true);

    let report_id = body["reportId"].as_str().unwrap();
    assert!(report_id.starts_with("report_"));
    assert!(report_id.ends_with("_user-1"));
    assert_eq!(mock.processed_count(), 1);
}

#[tokio::test]
async fn test_submit_report_survives_ml_outage() {
    let state = test_state(MockRiskService::failing());
    let mut client = TestClient::connect(&state.hub, None);
    client.subscribe_incidents(&state.hub);

    let response = create_test_app(&state)
        .oneshot(json_request(
            Method::POST,
            "/api/reports/submit",
            report_body("user-1", 13.0827, 80.2707),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["mlProcessed"], false);
    assert_eq!(client.events("incident:new").len(), 1);
}

#[tokio::test]
async fn test_submit_report_defaults_severity_and_type() {
    let state = test_state(MockRiskService::new());
    let mut client = TestClient::connect(&state.hub, None);
    client.subscribe_incidents(&state.hub);

    let response = create_test_app(&state)
        .oneshot(json_request(
            Method::POST,
            "/api/reports/submit",
            json!({
                "userId": "user-9",
                "type": "suspicious_activity",
                "category": "stalking",
                "description": "Someone followed me from the station",
                "location": {"latitude": 13.08, "longitude": 80.27}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let frames = client.events("incident:new");
    assert_eq!(frames[0]["data"]["severity"], 3);
    assert_eq!(frames[0]["data"]["type"], "community_report");
}

#[tokio::test]
async fn test_submit_report_rejects_bad_severity() {
    let state = test_state(MockRiskService::new());
    let mut body = report_body("user-1", 13.08, 80.27);
    body["severity"] = json!(9);

    let response = create_test_app(&state)
        .oneshot(json_request(Method::POST, "/api/reports/submit", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "Severity must be between 1 and 5");
}

#[tokio::test]
async fn test_submit_report_rejects_missing_fields() {
    let state = test_state(MockRiskService::new());

    let response = create_test_app(&state)
        .oneshot(json_request(
            Method::POST,
            "/api/reports/submit",
            json!({"userId": "user-1", "type": "community_report"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_submit_report_rejects_out_of_range_location() {
    let state = test_state(MockRiskService::new());
    let mut client = TestClient::connect(&state.hub, None);
    client.subscribe_incidents(&state.hub);

    let response = create_test_app(&state)
        .oneshot(json_request(
            Method::POST,
            "/api/reports/submit",
            report_body("user-1", 13.08, 200.0),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(client.drain().is_empty());
}
