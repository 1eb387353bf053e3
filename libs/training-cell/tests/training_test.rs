use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path};

use shared_utils::test_utils::TestConfig;
use training_cell::models::TranscriptImport;
use training_cell::services::training::TrainingService;

fn session_row(id: Uuid, practice_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "practice_id": practice_id,
        "name": "March batch",
        "status": status,
        "aggregated_insights": null,
        "generated_prompt": null,
        "created_at": "2025-03-01T12:00:00Z"
    })
}

#[tokio::test]
async fn create_session_inserts_a_created_row() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/training_sessions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            session_row(session_id, practice_id, "created")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = TrainingService::new(&config);

    let session = service.create_session(practice_id, Some("March batch")).await.unwrap();
    assert_eq!(session.id, session_id);
    assert_eq!(session.status, "created");
}

#[tokio::test]
async fn import_skips_empty_transcripts() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/training_recordings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "session_id": session_id,
            "practice_id": practice_id,
            "original_filename": null,
            "transcript": "caller: hi",
            "language_detected": "en",
            "duration_seconds": null,
            "analysis": null,
            "status": "transcribed",
            "error_message": null
        }])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = TrainingService::new(&config);

    let imported = service.import_transcripts(practice_id, session_id, vec![
        TranscriptImport { transcript: "caller: hi".to_string(), language: None },
        TranscriptImport { transcript: "   ".to_string(), language: None },
        TranscriptImport { transcript: "caller: hola".to_string(), language: Some("es".to_string()) },
    ]).await.unwrap();

    assert_eq!(imported, 2);
}

#[tokio::test]
async fn aggregation_with_no_completed_recordings_yields_nothing() {
    let mock_server = MockServer::start().await;
    let session_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/training_recordings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = TrainingService::new(&config);

    let insights = service.aggregate_session_insights(session_id).await.unwrap();
    assert!(insights.is_none());
}

#[tokio::test]
async fn applying_without_a_generated_prompt_fails() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/training_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            session_row(session_id, practice_id, "completed")
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = TrainingService::new(&config);

    let result = service.apply_training_prompt(practice_id, session_id).await;
    assert!(result.is_err());
}
