use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{ClinicStore, SupabaseClinicStore, UpcomingQuery};
use shared_models::{
    ActivityCategory, ActivityRecord, Appointment, AppointmentStatus, AppointmentType, StoreError,
};

fn test_config(mock_server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: mock_server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_service_role_key: "test-service-key".to_string(),
        booking_timeout_ms: 1_000,
        dashboard_timeout_ms: 1_000,
    }
}

fn appointment_json(id: Uuid, doctor_id: Uuid, start: &str, status: &str) -> serde_json::Value {
    let actor = Uuid::new_v4();
    json!({
        "id": id,
        "patient_id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "appointment_type": "consultation",
        "scheduled_start_time": start,
        "scheduled_end_time": "ignored-by-client",
        "duration_minutes": 30,
        "status": status,
        "location": "Room 4",
        "notes": null,
        "created_by": actor,
        "updated_by": actor,
        "created_at": "2030-03-01T09:00:00Z",
        "updated_at": "2030-03-01T09:00:00Z"
    })
}

fn sample_appointment() -> Appointment {
    let actor = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap();
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        appointment_type: AppointmentType::FollowUp,
        scheduled_start_time: start,
        duration_minutes: 30,
        status: AppointmentStatus::Scheduled,
        location: "Room 2".to_string(),
        notes: None,
        patient_history: None,
        created_by: actor,
        updated_by: actor,
        created_at: start,
        updated_at: start,
    }
}

#[tokio::test]
async fn test_counts_are_read_from_content_range() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(header("Prefer", "count=exact"))
        .and(header("Authorization", "Bearer test-service-key"))
        .respond_with(ResponseTemplate::new(200)
            .insert_header("Content-Range", "0-0/42")
            .set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(200)
            .insert_header("Content-Range", "*/0")
            .set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));

    assert_eq!(store.count_patients().await.unwrap(), 42);
    assert_eq!(store.count_medical_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_count_failure_maps_to_database_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));

    assert_matches!(store.count_doctors().await, Err(StoreError::Database(_)));
}

#[tokio::test]
async fn test_upcoming_query_is_pushed_down() {
    let mock_server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(scheduled,confirmed)"))
        .and(query_param("order", "scheduled_start_time.asc"))
        .and(query_param("limit", "5"))
        .and(query_param("scheduled_start_time", "gte.2030-03-04T08:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": id,
                "scheduled_start_time": "2030-03-04T10:00:00Z",
                "status": "confirmed",
                "patient": { "name": "Ada Lovelace" },
                "doctor": null
            }
        ])))
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));
    let from = Utc.with_ymd_and_hms(2030, 3, 4, 8, 0, 0).unwrap();

    let upcoming = store.list_upcoming_appointments(UpcomingQuery {
        from,
        until: from + Duration::days(7),
        limit: 5,
    }).await.unwrap();

    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].id, id);
    assert_eq!(upcoming[0].patient_name, "Ada Lovelace");
    assert_eq!(upcoming[0].doctor_name, "Unknown doctor");
    assert_eq!(upcoming[0].status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn test_window_listing_decodes_appointments() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("scheduled_start_time", "lt.2030-03-04T10:30:00.000Z"))
        .and(query_param("scheduled_end_time", "gt.2030-03-04T10:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_json(id, doctor_id, "2030-03-04T09:45:00Z", "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));
    let start = Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap();

    let mut uow = store.begin().await.unwrap();
    let found = uow.list_appointments_by_doctor_and_window(
        doctor_id, start, start + Duration::minutes(30),
    ).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
    assert_eq!(found[0].appointment_type, AppointmentType::Consultation);
}

#[tokio::test]
async fn test_commit_sends_one_rpc_with_all_writes() {
    let mock_server = MockServer::start().await;
    let appointment = sample_appointment();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/commit_scheduling_unit"))
        .and(body_partial_json(json!({
            "appointment_inserts": [{ "id": appointment.id, "status": "scheduled" }],
            "appointment_updates": [],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));
    let mut uow = store.begin().await.unwrap();
    uow.insert_appointment(&appointment).await.unwrap();
    uow.insert_activity(&ActivityRecord::new(
        ActivityCategory::Appointment, "New Appointment Scheduled", "test",
    )).await.unwrap();

    uow.commit().await.unwrap();
}

#[tokio::test]
async fn test_commit_conflict_maps_to_store_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/commit_scheduling_unit"))
        .respond_with(ResponseTemplate::new(409)
            .set_body_string("conflicting key value violates exclusion constraint"))
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));
    let mut uow = store.begin().await.unwrap();
    uow.insert_appointment(&sample_appointment()).await.unwrap();

    assert_matches!(uow.commit().await, Err(StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_commit_server_error_maps_to_transaction_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/commit_scheduling_unit"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));
    let mut uow = store.begin().await.unwrap();
    uow.insert_appointment(&sample_appointment()).await.unwrap();

    assert_matches!(uow.commit().await, Err(StoreError::Transaction(_)));
}

#[tokio::test]
async fn test_rollback_sends_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = SupabaseClinicStore::new(&test_config(&mock_server));
    let mut uow = store.begin().await.unwrap();
    uow.insert_appointment(&sample_appointment()).await.unwrap();
    uow.rollback().await.unwrap();
}
