use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path};

use call_cell::models::Call;
use feedback_cell::services::analyzer::{basic_scoring, FeedbackService};
use shared_utils::test_utils::{MockRows, TestConfig};

fn call_from_row(row: serde_json::Value) -> Call {
    serde_json::from_value(row).unwrap()
}

fn feedback_row(call_id: Uuid, practice_id: Uuid, score: f64) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "call_id": call_id,
        "practice_id": practice_id,
        "overall_score": score,
        "resolution_score": score,
        "efficiency_score": 0.5,
        "empathy_score": 0.5,
        "accuracy_score": 0.5,
        "was_successful": false,
        "failure_point": "call_connection",
        "failure_reason": null,
        "improvement_suggestion": null,
        "call_complexity": "simple",
        "language_detected": "en",
        "caller_dropped": true,
        "raw_analysis": null,
        "prompt_version": null,
        "created_at": "2025-03-17T15:00:10Z"
    })
}

#[test]
fn dropped_short_call_scores_at_or_below_half() {
    let practice_id = Uuid::new_v4();
    let mut row = MockRows::call(Uuid::new_v4(), practice_id, "vapi-1", "ended");
    row["outcome"] = json!("customer-did-not-answer");
    row["duration_seconds"] = json!(8);

    let analysis = basic_scoring(&call_from_row(row));

    assert!(analysis.overall_score.unwrap() <= 0.5);
    assert_eq!(analysis.was_successful, Some(false));
    assert!(analysis.caller_dropped);
    assert_eq!(analysis.failure_point.as_deref(), Some("call_connection"));
}

#[test]
fn clean_long_call_scores_above_half() {
    let practice_id = Uuid::new_v4();
    let mut row = MockRows::call(Uuid::new_v4(), practice_id, "vapi-2", "ended");
    row["outcome"] = json!("customer-ended-call");
    row["duration_seconds"] = json!(120);
    row["success_evaluation"] = json!("true");

    let analysis = basic_scoring(&call_from_row(row));

    assert!(analysis.overall_score.unwrap() > 0.5);
    assert_eq!(analysis.was_successful, Some(true));
    assert!(!analysis.caller_dropped);
}

#[tokio::test]
async fn analysis_without_model_uses_the_fallback_scorer() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let call_id = Uuid::new_v4();

    let mut call_row = MockRows::call(call_id, practice_id, "vapi-1", "ended");
    call_row["outcome"] = json!("customer-did-not-answer");
    call_row["duration_seconds"] = json!(8);

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([call_row])))
        .mount(&mock_server)
        .await;
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
    // 0.5 base, -0.3 bad ending, -0.2 under 15 seconds
    Mock::given(method("POST"))
        .and(path("/rest/v1/call_feedback"))
        .and(body_partial_json(json!({
            "overall_score": 0.0,
            "was_successful": false,
            "failure_point": "call_connection",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            feedback_row(call_id, practice_id, 0.0)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = FeedbackService::new(&config);

    let feedback = service.analyze_call_quality(call_id).await.unwrap();
    assert!(feedback.is_some());
}

#[tokio::test]
async fn very_short_calls_are_not_analyzed() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let call_id = Uuid::new_v4();

    let mut call_row = MockRows::call(call_id, practice_id, "vapi-1", "ended");
    call_row["duration_seconds"] = json!(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([call_row])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/call_feedback"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = FeedbackService::new(&config);

    let feedback = service.analyze_call_quality(call_id).await.unwrap();
    assert!(feedback.is_none());
}

#[tokio::test]
async fn already_analyzed_calls_are_skipped() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let call_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::call(call_id, practice_id, "vapi-1", "ended")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/call_feedback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": Uuid::new_v4()}
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/call_feedback"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = FeedbackService::new(&config);

    let feedback = service.analyze_call_quality(call_id).await.unwrap();
    assert!(feedback.is_none());
}

#[tokio::test]
async fn applying_a_prompt_deactivates_the_previous_version() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/prompt_versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"version": 3}
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/prompt_versions"))
        .and(body_partial_json(json!({"is_active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/prompt_versions"))
        .and(body_partial_json(json!({"version": 4, "is_active": true})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "practice_id": practice_id,
            "version": 4,
            "prompt_text": "better prompt",
            "change_reason": "insights applied",
            "change_diff": null,
            "is_active": true,
            "activated_at": "2025-03-17T15:00:00Z",
            "deactivated_at": null,
            "total_calls": 0,
            "successful_calls": 0,
            "avg_score": null,
            "booking_rate": null,
            "created_at": "2025-03-17T15:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = FeedbackService::new(&config);

    let version = service
        .apply_prompt_improvement(practice_id, "better prompt", "insights applied", None)
        .await
        .unwrap();

    assert_eq!(version.version, 4);
    assert!(version.is_active);
}
