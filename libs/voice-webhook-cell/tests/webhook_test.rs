use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path};

use shared_config::AppConfig;
use shared_utils::test_utils::{MockRows, TestConfig};
use voice_webhook_cell::router::webhook_routes;
use voice_webhook_cell::security::sign_body;

async fn post_webhook(config: AppConfig, body: Value, signature: Option<&str>) -> (StatusCode, Value) {
    let app = webhook_routes(Arc::new(config));

    let mut builder = Request::builder()
        .method("POST")
        .uri("/vapi")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-vapi-signature", signature);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let parsed = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, parsed)
}

#[tokio::test]
async fn oversized_payload_is_rejected_with_413() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let app = webhook_routes(Arc::new(config));

    let request = Request::builder()
        .method("POST")
        .uri("/vapi")
        .header("content-type", "application/json")
        .body(Body::from(vec![b'x'; 1_000_001]))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn missing_signature_in_production_returns_empty_200() {
    let mock_server = MockServer::start().await;
    let mut config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    config.app_env = "production".to_string();
    config.vapi_webhook_secret = "topsecret".to_string();

    let (status, body) = post_webhook(
        config,
        json!({"message": {"type": "status-update", "call": {"id": "vapi-1"}}}),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn valid_signature_is_accepted_in_production() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(Uuid::new_v4(), practice_id, "vapi-1", "in-progress")
        ])))
        .mount(&mock_server)
        .await;

    let mut config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    config.app_env = "production".to_string();
    config.vapi_webhook_secret = "topsecret".to_string();

    let payload = json!({"message": {"type": "hang", "call": {"id": "vapi-1"}}});
    let signature = sign_body("topsecret", payload.to_string().as_bytes());

    let (status, body) = post_webhook(config, payload, Some(&signature)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn assistant_request_defers_to_dashboard_configuration() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(Uuid::new_v4(), practice_id, "vapi-1", "in-progress")
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let (status, body) = post_webhook(
        config,
        json!({"message": {"type": "assistant-request", "call": {"id": "vapi-1"}}}),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"assistant": null}));
}

#[tokio::test]
async fn unresolvable_practice_returns_empty_200() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let (status, body) = post_webhook(
        config,
        json!({"message": {
            "type": "status-update",
            "call": {"id": "vapi-nope", "phoneNumber": {"number": "+15550002222"}},
        }}),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn tool_calls_return_results_keyed_by_tool_call_id() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(Uuid::new_v4(), practice_id, "vapi-1", "in-progress")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::practice_config(practice_id)
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let (status, body) = post_webhook(
        config,
        json!({"message": {
            "type": "tool-calls",
            "call": {"id": "vapi-1"},
            "toolWithToolCallList": [{
                "name": "transfer_to_staff",
                "toolCall": {
                    "id": "tc-1",
                    "function": {"arguments": "{\"reason\": \"billing question\"}"},
                },
            }],
        }}),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    let results = body.get("results").and_then(|v| v.as_array()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["toolCallId"], json!("tc-1"));
    assert_eq!(results[0]["result"]["transfer"], json!(true));
    assert_eq!(results[0]["result"]["number"], json!("+15559876543"));
    assert_eq!(results[0]["result"]["reason"], json!("billing question"));
}

#[tokio::test]
async fn unknown_tool_reports_an_error_result() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(Uuid::new_v4(), practice_id, "vapi-1", "in-progress")
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let (status, body) = post_webhook(
        config,
        json!({"message": {
            "type": "tool-calls",
            "call": {"id": "vapi-1"},
            "toolCallList": [{
                "id": "tc-9",
                "name": "summon_doctor",
                "function": {"arguments": {}},
            }],
        }}),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    let results = body.get("results").and_then(|v| v.as_array()).unwrap();
    assert_eq!(results[0]["toolCallId"], json!("tc-9"));
    assert_eq!(results[0]["result"]["error"], json!("Unknown tool: summon_doctor"));
}

#[tokio::test]
async fn short_dropped_call_with_identity_is_flagged_for_callback() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let call_id = Uuid::new_v4();

    let mut call_row = MockRows::call(call_id, practice_id, "vapi-1", "ended");
    call_row["caller_name"] = json!("Jane");
    call_row["duration_seconds"] = json!(8);

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([call_row.clone()])))
        .mount(&mock_server)
        .await;
    // Artefact save
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/calls"))
        .and(body_partial_json(json!({"status": "ended", "duration_seconds": 8})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([call_row])))
        .expect(1)
        .mount(&mock_server)
        .await;
    // The callback flag must be set for a known caller on a dropped call
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/calls"))
        .and(body_partial_json(json!({"callback_needed": true})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    // Background feedback analysis queries; responses can be empty
    Mock::given(method("GET"))
        .and(path("/rest/v1/call_feedback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/prompt_versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/call_feedback"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let (status, _) = post_webhook(
        config,
        json!({"message": {
            "type": "end-of-call-report",
            "endedReason": "customer-did-not-answer",
            "call": {
                "id": "vapi-1",
                "startedAt": "2025-03-17T15:00:00Z",
                "endedAt": "2025-03-17T15:00:08Z",
            },
            "artifact": {"transcript": "assistant: hello?"},
        }}),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_json_still_returns_200() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let app = webhook_routes(Arc::new(config));

    let request = Request::builder()
        .method("POST")
        .uri("/vapi")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// Runs in real time: the stalled gateway response must outlive the 15 s
// tool deadline.
#[tokio::test]
#[ignore = "slow: exercises the full 15 second tool timeout"]
async fn stalled_tool_times_out_with_a_generic_error() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(Uuid::new_v4(), practice_id, "vapi-1", "in-progress")
        ])))
        .mount(&mock_server)
        .await;
    // The config lookup stalls past the 15 second tool deadline
    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([MockRows::practice_config(practice_id)]))
                .set_delay(std::time::Duration::from_secs(20)),
        )
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let (status, body) = post_webhook(
        config,
        json!({"message": {
            "type": "tool-calls",
            "call": {"id": "vapi-1"},
            "toolWithToolCallList": [{
                "name": "transfer_to_staff",
                "toolCall": {"id": "tc-1", "function": {"arguments": "{}"}},
            }],
        }}),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    let results = body.get("results").and_then(|v| v.as_array()).unwrap();
    assert_eq!(results[0]["toolCallId"], json!("tc-1"));
    let message = results[0]["result"]["error"].as_str().unwrap();
    assert!(message.contains("timed out"));
    assert!(message.contains("Please try again"));
}
