use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path};

use booking_cell::models::{
    AppointmentStatus, BookAppointmentRequest, BookedBy, BookingError,
};
use booking_cell::services::booking::BookingService;
use shared_config::AppConfig;
use shared_utils::test_utils::{MockRows, TestConfig};
use shared_utils::timefmt::today_in_timezone;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// A date safely inside the booking window regardless of when the test runs.
fn upcoming_date() -> NaiveDate {
    today_in_timezone("America/New_York") + chrono::Duration::days(7)
}

struct BookingFixture {
    practice_id: Uuid,
    patient_id: Uuid,
    type_id: Uuid,
    date: NaiveDate,
    config: AppConfig,
}

/// Mount the standard mocks for a working Monday 09:00-11:00 with
/// 30-minute slots and the given existing bookings.
async fn setup_booking_mocks(mock_server: &MockServer, booked_times: &[&str]) -> BookingFixture {
    let practice_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let type_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::appointment_type(type_id, practice_id, "Consultation", 30)
        ])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/holidays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::schedule_template(practice_id, 0, true, "09:00:00", "11:00:00")
        ])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/practice_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::practice_config(practice_id)
        ])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/practices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::practice(practice_id, "Main Street Clinic", "America/New_York")
        ])))
        .mount(mock_server)
        .await;

    let booked: Vec<_> = booked_times.iter()
        .map(|time| json!({"time": time}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(booked)))
        .mount(mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    BookingFixture { practice_id, patient_id, type_id, date: upcoming_date(), config }
}

fn book_request(fixture: &BookingFixture, date: NaiveDate, time: NaiveTime) -> BookAppointmentRequest {
    BookAppointmentRequest {
        practice_id: fixture.practice_id,
        patient_id: fixture.patient_id,
        appointment_type_id: fixture.type_id,
        date,
        time,
        booked_by: BookedBy::Ai,
        call_id: None,
        notes: None,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn book_inserts_when_slot_is_free() {
    let mock_server = MockServer::start().await;
    let fixture = setup_booking_mocks(&mock_server, &[]).await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockRows::appointment(
                appointment_id, fixture.practice_id, fixture.patient_id,
                fixture.type_id, &fixture.date.to_string(), "10:00:00", "booked",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let service = BookingService::new(&fixture.config);
    let appointment = service
        .book(book_request(&fixture, fixture.date, t(10, 0)))
        .await
        .unwrap();

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.status, AppointmentStatus::Booked);
}

#[tokio::test]
async fn book_rejects_full_slot() {
    let mock_server = MockServer::start().await;
    // Overbooking disabled, one existing booking at 10:00
    let fixture = setup_booking_mocks(&mock_server, &["10:00:00"]).await;

    let service = BookingService::new(&fixture.config);
    let result = service
        .book(book_request(&fixture, fixture.date, t(10, 0)))
        .await;

    assert_matches!(result, Err(BookingError::ConflictFull { .. }));
}

#[tokio::test]
async fn book_rejects_time_outside_the_grid() {
    let mock_server = MockServer::start().await;
    let fixture = setup_booking_mocks(&mock_server, &[]).await;

    let service = BookingService::new(&fixture.config);
    let result = service
        .book(book_request(&fixture, fixture.date, t(10, 15)))
        .await;

    assert_matches!(result, Err(BookingError::InvalidSlot { .. }));
}

#[tokio::test]
async fn book_rejects_inactive_type() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let type_id = Uuid::new_v4();

    let mut inactive = MockRows::appointment_type(type_id, practice_id, "Consultation", 30);
    inactive["is_active"] = json!(false);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([inactive])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = BookingService::new(&config);
    let result = service.book(BookAppointmentRequest {
        practice_id,
        patient_id: Uuid::new_v4(),
        appointment_type_id: type_id,
        date: upcoming_date(),
        time: t(10, 0),
        booked_by: BookedBy::Ai,
        call_id: None,
        notes: None,
        idempotency_key: None,
    }).await;

    assert_matches!(result, Err(BookingError::TypeInactive));
}

#[tokio::test]
async fn holiday_rejects_booking_even_with_enabled_template() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let type_id = Uuid::new_v4();
    let holiday = upcoming_date();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::appointment_type(type_id, practice_id, "Consultation", 30)
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/practices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::practice(practice_id, "Main Street Clinic", "America/New_York")
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
    Mock::given(method("GET"))
        .and(path("/rest/v1/holidays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": Uuid::new_v4(), "date": holiday, "name": "Founders Day"}
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::schedule_template(practice_id, 3, true, "09:00:00", "17:00:00")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = BookingService::new(&config);
    let result = service.book(BookAppointmentRequest {
        practice_id,
        patient_id: Uuid::new_v4(),
        appointment_type_id: type_id,
        date: holiday,
        time: t(10, 0),
        booked_by: BookedBy::Staff,
        call_id: None,
        notes: None,
        idempotency_key: None,
    }).await;

    assert_matches!(result, Err(BookingError::InvalidSlot { .. }));
}

#[tokio::test]
async fn booking_in_the_past_is_rejected() {
    let mock_server = MockServer::start().await;
    let fixture = setup_booking_mocks(&mock_server, &[]).await;
    let yesterday = today_in_timezone("America/New_York") - chrono::Duration::days(1);

    let service = BookingService::new(&fixture.config);
    let result = service
        .book(book_request(&fixture, yesterday, t(10, 0)))
        .await;

    assert_matches!(result, Err(BookingError::Validation(_)));
}

#[tokio::test]
async fn booking_beyond_the_horizon_is_rejected() {
    let mock_server = MockServer::start().await;
    let fixture = setup_booking_mocks(&mock_server, &[]).await;
    // Default horizon is 90 days
    let far_out = today_in_timezone("America/New_York") + chrono::Duration::days(365);

    let service = BookingService::new(&fixture.config);
    let result = service
        .book(book_request(&fixture, far_out, t(10, 0)))
        .await;

    assert_matches!(result, Err(BookingError::Validation(_)));
}

#[tokio::test]
async fn cancel_is_rejected_when_already_cancelled() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::appointment(
                appointment_id, practice_id, Uuid::new_v4(), Uuid::new_v4(),
                "2025-03-17", "10:00:00", "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = BookingService::new(&config);
    let result = service.cancel(practice_id, appointment_id, Some("test")).await;

    assert_matches!(result, Err(BookingError::AlreadyCancelled));
}

#[tokio::test]
async fn confirm_only_transitions_from_booked() {
    let mock_server = MockServer::start().await;
    let practice_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::appointment(
                appointment_id, practice_id, Uuid::new_v4(), Uuid::new_v4(),
                "2025-03-17", "10:00:00", "completed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::for_mock_server(&mock_server.uri()).to_app_config();
    let service = BookingService::new(&config);
    let result = service.confirm(practice_id, appointment_id).await;

    assert_matches!(
        result,
        Err(BookingError::BadTransition { from: AppointmentStatus::Completed })
    );
}

#[tokio::test]
async fn find_next_available_prefers_closest_time() {
    let mock_server = MockServer::start().await;
    let fixture = setup_booking_mocks(&mock_server, &[]).await;

    let service = BookingService::new(&fixture.config);
    let slot = service
        .find_next_available(
            fixture.practice_id,
            None,
            fixture.date,
            Some(t(10, 20)),
        )
        .await
        .unwrap()
        .expect("expected an available slot");

    // Grid is 09:00/09:30/10:00/10:30; 10:30 is 10 minutes away, 10:00 is 20
    assert_eq!(slot.date, fixture.date);
    assert_eq!(slot.time, t(10, 30));
}

#[tokio::test]
async fn find_next_available_returns_first_slot_without_preference() {
    let mock_server = MockServer::start().await;
    let fixture = setup_booking_mocks(&mock_server, &["09:00:00"]).await;

    let service = BookingService::new(&fixture.config);
    let slot = service
        .find_next_available(fixture.practice_id, None, fixture.date, None)
        .await
        .unwrap()
        .expect("expected an available slot");

    assert_eq!(slot.time, t(9, 30));
}
