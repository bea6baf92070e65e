use std::sync::Arc;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::InMemoryClinicStore;
use shared_models::{DoctorRecord, MedicalRecordEntry, PatientRecord};

use crate::telemetry::{init_tracing, DEFAULT_LOG_FILTER};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub booking_timeout_ms: u64,
    pub dashboard_timeout_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            booking_timeout_ms: 2_000,
            dashboard_timeout_ms: 2_000,
        }
    }
}

impl TestConfig {
    pub fn with_booking_timeout_ms(mut self, millis: u64) -> Self {
        self.booking_timeout_ms = millis;
        self
    }

    pub fn with_dashboard_timeout_ms(mut self, millis: u64) -> Self {
        self.dashboard_timeout_ms = millis;
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            booking_timeout_ms: self.booking_timeout_ms,
            dashboard_timeout_ms: self.dashboard_timeout_ms,
        }
    }
}

/// In-memory clinic with a few patients and doctors already registered.
pub struct ClinicFixture {
    pub store: Arc<InMemoryClinicStore>,
    pub patient_ids: Vec<Uuid>,
    pub doctor_ids: Vec<Uuid>,
    pub actor_id: Uuid,
}

impl ClinicFixture {
    pub async fn seeded(patients: usize, doctors: usize) -> Self {
        let store = Arc::new(InMemoryClinicStore::new());
        let mut patient_ids = Vec::with_capacity(patients);
        let mut doctor_ids = Vec::with_capacity(doctors);

        for n in 1..=patients {
            let id = Uuid::new_v4();
            store.insert_patient(PatientRecord { id, name: format!("Patient {}", n) }).await;
            patient_ids.push(id);
        }

        for n in 1..=doctors {
            let id = Uuid::new_v4();
            store.insert_doctor(DoctorRecord {
                id,
                name: format!("Dr. Doctor {}", n),
                specialty: Some("General Practice".to_string()),
            }).await;
            doctor_ids.push(id);
        }

        Self { store, patient_ids, doctor_ids, actor_id: Uuid::new_v4() }
    }

    pub fn patient(&self, index: usize) -> Uuid {
        self.patient_ids[index]
    }

    pub fn doctor(&self, index: usize) -> Uuid {
        self.doctor_ids[index]
    }

    pub async fn add_medical_records(&self, count: usize) {
        for n in 0..count {
            self.store.insert_medical_record(MedicalRecordEntry {
                id: Uuid::new_v4(),
                patient_id: self.patient_ids[n % self.patient_ids.len()],
                doctor_id: self.doctor_ids[n % self.doctor_ids.len()],
                recorded_at: Utc::now(),
            }).await;
        }
    }
}

/// Tomorrow (UTC) at `hour:minute`, so scheduled instants are always in the
/// future and inside the dashboard's upcoming horizon.
pub fn tomorrow_at(hour: u32, minute: u32) -> DateTime<Utc> {
    let day = (Utc::now() + Duration::days(1)).date_naive();
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    Utc.from_utc_datetime(&day.and_time(time))
}

pub fn init_test_tracing() {
    init_tracing(DEFAULT_LOG_FILTER);
}
