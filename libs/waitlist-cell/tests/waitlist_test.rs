use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use shared_utils::test_utils::TestConfig;
use waitlist_cell::models::{CancelledSlot, NewWaitlistEntry, WaitlistStatus};
use waitlist_cell::router::waitlist_routes;
use waitlist_cell::services::waitlist::WaitlistService;

fn entry_row(
    id: Uuid,
    practice_id: Uuid,
    phone: &str,
    priority: i32,
    status: &str,
    appointment_type_id: Option<Uuid>,
) -> serde_json::Value {
    json!({
        "id": id,
        "practice_id": practice_id,
        "patient_id": null,
        "patient_name": "Maria Lopez",
        "patient_phone": phone,
        "appointment_type_id": appointment_type_id,
        "preferred_date_start": null,
        "preferred_date_end": null,
        "preferred_time_start": null,
        "preferred_time_end": null,
        "notes": null,
        "priority": priority,
        "status": status,
        "notified_at": null,
        "expires_at": null,
        "created_at": "2025-03-01T12:00:00Z"
    })
}

fn cancelled_slot(type_id: Uuid) -> CancelledSlot {
    CancelledSlot {
        date: NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(),
        time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        appointment_type_id: type_id,
    }
}

async fn mount_notification_mocks(mock_server: &MockServer, practice_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/practices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Main Street Clinic"}
        ])))
        .mount(mock_server)
        .await;
    // Credentials lookup for the SMS send
    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            shared_utils::test_utils::MockRows::practice_config(practice_id)
        ])))
        .mount(mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/ACtest/Messages.json"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM1"})))
        .mount(mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist_entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn notifies_top_three_matches_by_priority() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let type_id = Uuid::new_v4();

    let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    // Rows arrive ordered by (priority asc, created_at asc), as the query asks
    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist_entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry_row(ids[0], practice_id, "+15550000001", 1, "waiting", None),
            entry_row(ids[1], practice_id, "+15550000002", 2, "waiting", None),
            entry_row(ids[2], practice_id, "+15550000003", 3, "waiting", None),
            entry_row(ids[3], practice_id, "+15550000004", 4, "waiting", None),
        ])))
        .mount(&mock_server)
        .await;
    mount_notification_mocks(&mock_server, practice_id).await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = WaitlistService::new(&config);

    let notifications = service
        .check_on_cancellation(practice_id, cancelled_slot(type_id))
        .await
        .unwrap();

    assert_eq!(notifications.len(), 3);
    assert_eq!(notifications[0].entry_id, ids[0]);
    assert_eq!(notifications[1].entry_id, ids[1]);
    assert_eq!(notifications[2].entry_id, ids[2]);
    assert!(notifications.iter().all(|n| n.sms_success));
}

#[tokio::test]
async fn type_filter_excludes_mismatched_entries() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let slot_type = Uuid::new_v4();
    let other_type = Uuid::new_v4();
    let matching_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist_entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry_row(Uuid::new_v4(), practice_id, "+15550000001", 1, "waiting", Some(other_type)),
            entry_row(matching_id, practice_id, "+15550000002", 2, "waiting", Some(slot_type)),
        ])))
        .mount(&mock_server)
        .await;
    mount_notification_mocks(&mock_server, practice_id).await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = WaitlistService::new(&config);

    let notifications = service
        .check_on_cancellation(practice_id, cancelled_slot(slot_type))
        .await
        .unwrap();

    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].entry_id, matching_id);
}

#[tokio::test]
async fn yes_reply_books_the_latest_unexpired_offer() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let entry_id = Uuid::new_v4();

    let mut notified = entry_row(entry_id, practice_id, "+15550000001", 2, "notified", None);
    notified["notified_at"] = json!(Utc::now());
    notified["expires_at"] = json!(Utc::now() + ChronoDuration::hours(1));

    let mut booked = notified.clone();
    booked["status"] = json!("booked");

    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist_entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([notified])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist_entries"))
        .and(body_partial_json(json!({"status": "booked"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([booked])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = WaitlistService::new(&config);

    let outcome = service.process_response("+15550000001", " yes ").await.unwrap();
    let (entry, action) = outcome.expect("expected a matched entry");
    assert_eq!(entry.status, WaitlistStatus::Booked);
    assert_eq!(action, "booked");
}

#[tokio::test]
async fn unrecognized_reply_is_ignored() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = WaitlistService::new(&config);

    let outcome = service.process_response("+15550000001", "MAYBE").await.unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn expiry_sweep_counts_both_kinds() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    // Notified entries past their offer window
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist_entries"))
        .and(query_param("status", "eq.notified"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry_row(Uuid::new_v4(), practice_id, "+15550000001", 1, "expired", None),
            entry_row(Uuid::new_v4(), practice_id, "+15550000002", 2, "expired", None),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    // Waiting entries whose preferred window has passed, judged on the
    // owning practice's wall clock
    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist_entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": Uuid::new_v4(), "practice_id": practice_id, "preferred_date_end": "2020-01-01"},
            {"id": Uuid::new_v4(), "practice_id": practice_id, "preferred_date_end": "2020-06-01"},
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/practices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": practice_id, "timezone": "America/Los_Angeles"}
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/waitlist_entries"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry_row(Uuid::new_v4(), practice_id, "+15550000003", 3, "expired", None),
            entry_row(Uuid::new_v4(), practice_id, "+15550000004", 4, "expired", None),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = WaitlistService::new(&config);

    let expired = service.expire_old_entries().await.unwrap();
    assert_eq!(expired, 4);
}

#[tokio::test]
async fn stats_route_reports_counts_and_conversion() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist_entries"))
        .and(query_param("select", "status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"status": "booked"},
            {"status": "expired"},
            {"status": "waiting"},
        ])))
        .mount(&mock_server)
        .await;
    let mut booked = entry_row(Uuid::new_v4(), practice_id, "+15550000001", 2, "booked", None);
    booked["created_at"] = json!("2025-03-01T12:00:00Z");
    booked["notified_at"] = json!("2025-03-01T14:00:00Z");
    Mock::given(method("GET"))
        .and(path("/rest/v1/waitlist_entries"))
        .and(query_param("status", "eq.booked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([booked])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let app = waitlist_routes(Arc::new(config));

    let request = Request::builder()
        .method("GET")
        .uri(format!("/stats?practice_id={}", practice_id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["total_waiting"], json!(1));
    assert_eq!(stats["total_booked"], json!(1));
    assert_eq!(stats["total_expired"], json!(1));
    assert_eq!(stats["conversion_rate"], json!(50.0));
    assert_eq!(stats["avg_wait_hours"], json!(2.0));
}

#[tokio::test]
async fn add_rejects_out_of_range_priority() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = WaitlistService::new(&config);

    let result = service.add_to_waitlist(Uuid::new_v4(), NewWaitlistEntry {
        patient_name: "Maria Lopez".to_string(),
        patient_phone: "+15550000001".to_string(),
        priority: Some(9),
        ..Default::default()
    }).await;

    assert!(result.is_err());
}
