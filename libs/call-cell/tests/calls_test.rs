use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path};

use call_cell::models::EndOfCallReport;
use call_cell::services::calls::CallService;
use shared_utils::test_utils::{MockRows, TestConfig};

#[tokio::test]
async fn create_or_update_inserts_when_call_is_unknown() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let call_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockRows::call(call_id, practice_id, "vapi-abc", "in-progress")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = CallService::new(&config);

    let call = service.create_or_update_call(
        practice_id, "vapi-abc", Some("+15557654321"),
        "in-progress", "inbound", None, None,
    ).await.unwrap();

    assert_eq!(call.id, call_id);
}

#[tokio::test]
async fn create_or_update_patches_existing_call_instead_of_duplicating() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let call_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(call_id, practice_id, "vapi-abc", "ringing")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/calls"))
        .and(body_partial_json(json!({"status": "in-progress"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(call_id, practice_id, "vapi-abc", "in-progress")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = CallService::new(&config);

    let call = service.create_or_update_call(
        practice_id, "vapi-abc", None, "in-progress", "inbound", None, None,
    ).await.unwrap();

    assert_eq!(call.status, "in-progress");
}

#[tokio::test]
async fn resolves_practice_from_dialed_number() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"practice_id": practice_id}
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = CallService::new(&config);

    let resolved = service.resolve_practice_from_phone("+15550002222").await.unwrap();
    assert_eq!(resolved, Some(practice_id));
}

#[tokio::test]
async fn end_of_call_report_updates_artefacts() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let call_id = Uuid::new_v4();

    let mut ended = MockRows::call(call_id, practice_id, "vapi-abc", "ended");
    ended["transcription"] = json!("assistant: hello");
    ended["duration_seconds"] = json!(42);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/calls"))
        .and(body_partial_json(json!({
            "status": "ended",
            "transcription": "assistant: hello",
            "duration_seconds": 42,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([ended])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = CallService::new(&config);

    let call = service.save_end_of_call_report("vapi-abc", &EndOfCallReport {
        transcript: Some("assistant: hello".to_string()),
        recording_url: None,
        summary: None,
        duration_seconds: Some(42),
        cost: None,
        ended_reason: Some("customer-ended-call".to_string()),
    }).await.unwrap();

    assert_eq!(call.unwrap().duration_seconds, Some(42));
}
