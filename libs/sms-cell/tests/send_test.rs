use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path};

use shared_utils::test_utils::{MockRows, TestConfig};
use sms_cell::models::TwilioCredentials;
use sms_cell::services::sms::SmsService;
use sms_cell::services::twilio::send_sms;

fn credentials() -> TwilioCredentials {
    TwilioCredentials {
        account_sid: format!("AC{}", Uuid::new_v4().simple()),
        auth_token: "token".to_string(),
        from_number: "+15550001111".to_string(),
    }
}

#[tokio::test]
async fn rejects_invalid_destination_before_calling_the_provider() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = send_sms(&mock_server.uri(), &credentials(), "555-1234", "hi").await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Invalid phone number"));
}

#[tokio::test]
async fn successful_send_returns_the_message_sid() {
    let mock_server = MockServer::start().await;
    let creds = credentials();

    Mock::given(method("POST"))
        .and(path(format!("/2010-04-01/Accounts/{}/Messages.json", creds.account_sid)))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM12345"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = send_sms(&mock_server.uri(), &creds, "+15557654321", "hello").await;

    assert!(result.success);
    assert_eq!(result.message_sid.as_deref(), Some("SM12345"));
    assert!(!result.permanent);
}

#[tokio::test]
async fn server_error_then_success_ends_sent() {
    let mock_server = MockServer::start().await;
    let creds = credentials();
    let messages_path = format!("/2010-04-01/Accounts/{}/Messages.json", creds.account_sid);

    // First attempt hits a 500, the retry succeeds
    Mock::given(method("POST"))
        .and(path(messages_path.clone()))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(messages_path))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM999"})))
        .mount(&mock_server)
        .await;

    let result = send_sms(&mock_server.uri(), &creds, "+15557654321", "hello").await;

    assert!(result.success);
    assert_eq!(result.message_sid.as_deref(), Some("SM999"));
}

#[tokio::test]
async fn client_error_fails_permanently_without_retry() {
    let mock_server = MockServer::start().await;
    let creds = credentials();

    Mock::given(method("POST"))
        .and(path(format!("/2010-04-01/Accounts/{}/Messages.json", creds.account_sid)))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad number"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = send_sms(&mock_server.uri(), &creds, "+15557654321", "hello").await;

    assert!(!result.success);
    assert!(result.permanent);
}

#[tokio::test]
async fn tenant_credentials_override_globals() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    let mut row = MockRows::practice_config(practice_id);
    row["twilio_account_sid"] = json!("ACtenant");
    row["twilio_auth_token"] = json!("tenant-token");
    row["twilio_from_number"] = json!("+15553334444");
    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = SmsService::new(&config);
    let creds = service.twilio_credentials(practice_id).await.unwrap();

    assert_eq!(creds.account_sid, "ACtenant");
    assert_eq!(creds.auth_token, "tenant-token");
    assert_eq!(creds.from_number, "+15553334444");
}

#[tokio::test]
async fn missing_credentials_everywhere_is_an_error() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let mut config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    config.twilio_account_sid = String::new();
    config.twilio_auth_token = String::new();
    config.twilio_from_number = String::new();

    let service = SmsService::new(&config);
    let result = service.twilio_credentials(practice_id).await;

    assert!(result.is_err());
}
