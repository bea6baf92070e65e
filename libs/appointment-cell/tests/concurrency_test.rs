use assert_matches::assert_matches;
use chrono::Duration;
use futures::future::join_all;
use std::sync::Arc;

use appointment_cell::models::{
    AppointmentError, AppointmentPatch, AppointmentType, CreateAppointmentRequest, SchedulingRules,
};
use appointment_cell::AppointmentBookingService;
use shared_utils::test_utils::{init_test_tracing, tomorrow_at, ClinicFixture};

const CALLERS: usize = 16;

async fn setup() -> (ClinicFixture, Arc<AppointmentBookingService>) {
    init_test_tracing();
    let fixture = ClinicFixture::seeded(CALLERS, 2).await;
    let service = Arc::new(AppointmentBookingService::new(
        fixture.store.clone(),
        SchedulingRules::default(),
    ));
    (fixture, service)
}

fn request(fixture: &ClinicFixture, patient: usize, doctor: usize, offset_minutes: i64) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id: fixture.patient(patient),
        doctor_id: fixture.doctor(doctor),
        appointment_type: AppointmentType::CheckUp,
        scheduled_start_time: tomorrow_at(9, 0) + Duration::minutes(offset_minutes),
        duration_minutes: 30,
        location: "Room 1".to_string(),
        notes: None,
        patient_history: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_overlapping_creates_commit_once() {
    let (fixture, service) = setup().await;

    let handles: Vec<_> = (0..CALLERS)
        .map(|n| {
            let service = Arc::clone(&service);
            // Every window overlaps 09:00-09:30.
            let request = request(&fixture, n, 0, (n % 3) as i64 * 10);
            let actor = fixture.actor_id;
            tokio::spawn(async move { service.create_appointment(request, actor).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_matches!(e, AppointmentError::ConflictDetected { .. }),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(fixture.store.appointments().await.len(), 1);
    assert_eq!(fixture.store.activities().await.len(), 1);

    let metrics = service.metrics();
    assert_eq!(metrics.bookings_succeeded, 1);
    assert_eq!(metrics.conflicts_rejected, (CALLERS - 1) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_creates_all_commit() {
    let (fixture, service) = setup().await;

    let results = join_all((0..CALLERS).map(|n| {
        let service = Arc::clone(&service);
        let request = request(&fixture, n, n % 2, (n / 2) as i64 * 30);
        let actor = fixture.actor_id;
        async move { service.create_appointment(request, actor).await }
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(fixture.store.appointments().await.len(), CALLERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_racing_create_into_same_slot() {
    let (fixture, service) = setup().await;
    let actor = fixture.actor_id;

    let existing = service
        .create_appointment(request(&fixture, 0, 0, 0), actor)
        .await
        .unwrap();

    // Both operations target 10:00-10:30 for the same doctor.
    let target = tomorrow_at(10, 0);
    let update = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .update_appointment(existing, AppointmentPatch {
                    scheduled_start_time: Some(target),
                    ..Default::default()
                }, actor)
                .await
                .map(|_| ())
        })
    };
    let create = {
        let service = Arc::clone(&service);
        let request = request(&fixture, 1, 0, 60);
        tokio::spawn(async move { service.create_appointment(request, actor).await.map(|_| ()) })
    };

    let outcomes = [update.await.unwrap(), create.await.unwrap()];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppointmentError::ConflictDetected { .. })));

    let at_ten = fixture
        .store
        .appointments()
        .await
        .into_iter()
        .filter(|apt| apt.scheduled_start_time == target)
        .count();
    assert_eq!(at_ten, 1);
}
