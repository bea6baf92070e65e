// libs/shared/database/src/memory.rs
//
// Process-local store used when no remote database is configured and by the
// test suites. Units of work stage their writes privately and apply them in
// one critical section on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::{
    windows_overlap, ActivityRecord, Appointment, DoctorRecord, MedicalRecordEntry,
    PatientRecord, StoreError, UpcomingAppointment,
};

use crate::store::{ClinicStore, UnitOfWork, UpcomingQuery};

pub const UNKNOWN_PATIENT: &str = "Unknown patient";
pub const UNKNOWN_DOCTOR: &str = "Unknown doctor";

#[derive(Debug, Default)]
struct ClinicState {
    appointments: HashMap<Uuid, Appointment>,
    patients: HashMap<Uuid, PatientRecord>,
    doctors: HashMap<Uuid, DoctorRecord>,
    medical_records: HashMap<Uuid, MedicalRecordEntry>,
    activities: Vec<ActivityRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryClinicStore {
    state: Arc<RwLock<ClinicState>>,
}

impl InMemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_patient(&self, patient: PatientRecord) {
        self.state.write().await.patients.insert(patient.id, patient);
    }

    pub async fn insert_doctor(&self, doctor: DoctorRecord) {
        self.state.write().await.doctors.insert(doctor.id, doctor);
    }

    pub async fn insert_medical_record(&self, record: MedicalRecordEntry) {
        self.state.write().await.medical_records.insert(record.id, record);
    }

    /// Committed appointments, in no particular order.
    pub async fn appointments(&self) -> Vec<Appointment> {
        self.state.read().await.appointments.values().cloned().collect()
    }

    /// Committed activity records in append order.
    pub async fn activities(&self) -> Vec<ActivityRecord> {
        self.state.read().await.activities.clone()
    }
}

#[async_trait]
impl ClinicStore for InMemoryClinicStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            staged_appointments: Vec::new(),
            staged_activities: Vec::new(),
        }))
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.state.read().await.appointments.get(&id).cloned())
    }

    async fn count_appointments(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.appointments.len() as u64)
    }

    async fn count_patients(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.patients.len() as u64)
    }

    async fn count_doctors(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.doctors.len() as u64)
    }

    async fn count_medical_records(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.medical_records.len() as u64)
    }

    async fn list_upcoming_appointments(
        &self,
        query: UpcomingQuery,
    ) -> Result<Vec<UpcomingAppointment>, StoreError> {
        let state = self.state.read().await;

        let mut upcoming: Vec<&Appointment> = state.appointments.values()
            .filter(|apt| apt.is_active())
            .filter(|apt| apt.scheduled_start_time >= query.from && apt.scheduled_start_time <= query.until)
            .collect();
        upcoming.sort_by_key(|apt| (apt.scheduled_start_time, apt.id));
        upcoming.truncate(query.limit);

        Ok(upcoming.into_iter()
            .map(|apt| UpcomingAppointment {
                id: apt.id,
                patient_name: state.patients.get(&apt.patient_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
                doctor_name: state.doctors.get(&apt.doctor_id)
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| UNKNOWN_DOCTOR.to_string()),
                scheduled_start_time: apt.scheduled_start_time,
                status: apt.status,
            })
            .collect())
    }

    async fn list_recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let state = self.state.read().await;
        let mut recent = state.activities.clone();
        // Stable sort keeps append order for equal timestamps; reverse puts the newest first.
        recent.sort_by_key(|activity| activity.timestamp);
        recent.reverse();
        recent.truncate(limit);
        Ok(recent)
    }
}

#[derive(Debug)]
enum StagedWrite {
    Insert(Appointment),
    Update(Appointment),
}

impl StagedWrite {
    fn appointment(&self) -> &Appointment {
        match self {
            StagedWrite::Insert(apt) | StagedWrite::Update(apt) => apt,
        }
    }
}

pub struct InMemoryUnitOfWork {
    state: Arc<RwLock<ClinicState>>,
    staged_appointments: Vec<StagedWrite>,
    staged_activities: Vec<ActivityRecord>,
}

impl InMemoryUnitOfWork {
    fn staged(&self, id: Uuid) -> Option<&Appointment> {
        self.staged_appointments.iter()
            .rev()
            .map(StagedWrite::appointment)
            .find(|apt| apt.id == id)
    }

    fn stage(&mut self, write: StagedWrite) {
        let id = write.appointment().id;
        // An update of a row inserted earlier in the same unit stays an insert.
        let was_inserted = self.staged_appointments.iter()
            .any(|w| matches!(w, StagedWrite::Insert(apt) if apt.id == id));
        self.staged_appointments.retain(|w| w.appointment().id != id);
        let write = match write {
            StagedWrite::Update(apt) if was_inserted => StagedWrite::Insert(apt),
            other => other,
        };
        self.staged_appointments.push(write);
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn get_appointment(&mut self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        if let Some(apt) = self.staged(id) {
            return Ok(Some(apt.clone()));
        }
        Ok(self.state.read().await.appointments.get(&id).cloned())
    }

    async fn list_appointments_by_doctor_and_window(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let committed: Vec<Appointment> = {
            let state = self.state.read().await;
            state.appointments.values()
                .filter(|apt| self.staged(apt.id).is_none())
                .cloned()
                .collect()
        };

        let mut matching: Vec<Appointment> = committed.into_iter()
            .chain(self.staged_appointments.iter().map(|w| w.appointment().clone()))
            .filter(|apt| apt.doctor_id == doctor_id && apt.overlaps(start, end))
            .collect();
        matching.sort_by_key(|apt| apt.scheduled_start_time);
        Ok(matching)
    }

    async fn patient_exists(&mut self, patient_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.read().await.patients.contains_key(&patient_id))
    }

    async fn doctor_exists(&mut self, doctor_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.read().await.doctors.contains_key(&doctor_id))
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        let exists = self.staged(appointment.id).is_some()
            || self.state.read().await.appointments.contains_key(&appointment.id);
        if exists {
            return Err(StoreError::Transaction(format!(
                "appointment {} already exists", appointment.id
            )));
        }
        self.stage(StagedWrite::Insert(appointment.clone()));
        Ok(())
    }

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        let exists = self.staged(appointment.id).is_some()
            || self.state.read().await.appointments.contains_key(&appointment.id);
        if !exists {
            return Err(StoreError::NotFound(format!("appointment {}", appointment.id)));
        }
        self.stage(StagedWrite::Update(appointment.clone()));
        Ok(())
    }

    async fn insert_activity(&mut self, activity: &ActivityRecord) -> Result<(), StoreError> {
        self.staged_activities.push(activity.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut state = this.state.write().await;

        for write in &this.staged_appointments {
            match write {
                StagedWrite::Insert(apt) if state.appointments.contains_key(&apt.id) => {
                    return Err(StoreError::Transaction(format!(
                        "appointment {} was inserted concurrently", apt.id
                    )));
                }
                StagedWrite::Update(apt) if !state.appointments.contains_key(&apt.id) => {
                    return Err(StoreError::NotFound(format!("appointment {}", apt.id)));
                }
                _ => {}
            }
        }

        // Doctor/slot exclusion: no two active appointments of one doctor may
        // overlap in the state this commit would produce.
        for write in &this.staged_appointments {
            let staged = write.appointment();
            if !staged.is_active() {
                continue;
            }
            let clash = state.appointments.values()
                .filter(|existing| existing.id != staged.id)
                .filter(|existing| !this.staged_appointments.iter().any(|w| w.appointment().id == existing.id))
                .chain(this.staged_appointments.iter().map(StagedWrite::appointment).filter(|other| other.id != staged.id))
                .find(|other| {
                    other.doctor_id == staged.doctor_id
                        && other.is_active()
                        && windows_overlap(
                            other.scheduled_start_time,
                            other.scheduled_end_time(),
                            staged.scheduled_start_time,
                            staged.scheduled_end_time(),
                        )
                });
            if let Some(other) = clash {
                warn!("Commit rejected: appointment {} overlaps {} for doctor {}",
                      staged.id, other.id, staged.doctor_id);
                return Err(StoreError::Conflict(format!(
                    "appointment {} overlaps appointment {} for doctor {}",
                    staged.id, other.id, staged.doctor_id
                )));
            }
        }

        let appointment_writes = this.staged_appointments.len();
        for write in this.staged_appointments {
            let apt = match write {
                StagedWrite::Insert(apt) | StagedWrite::Update(apt) => apt,
            };
            state.appointments.insert(apt.id, apt);
        }
        let activity_writes = this.staged_activities.len();
        state.activities.extend(this.staged_activities);

        debug!("Committed unit of work: {} appointment writes, {} activity records",
               appointment_writes, activity_writes);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        debug!("Rolled back unit of work with {} staged appointment writes",
               self.staged_appointments.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use shared_models::{AppointmentStatus, AppointmentType};

    fn appointment(doctor_id: Uuid, start: DateTime<Utc>, minutes: i32) -> Appointment {
        let actor = Uuid::new_v4();
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id,
            appointment_type: AppointmentType::CheckUp,
            scheduled_start_time: start,
            duration_minutes: minutes,
            status: AppointmentStatus::Scheduled,
            location: "Room 101".to_string(),
            notes: None,
            patient_history: None,
            created_by: actor,
            updated_by: actor,
            created_at: start,
            updated_at: start,
        }
    }

    fn ten_o_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_staged_writes_are_invisible_until_commit() {
        let store = InMemoryClinicStore::new();
        let apt = appointment(Uuid::new_v4(), ten_o_clock(), 30);

        let mut uow = store.begin().await.unwrap();
        uow.insert_appointment(&apt).await.unwrap();
        uow.insert_activity(&ActivityRecord::new(
            shared_models::ActivityCategory::Appointment, "t", "d",
        )).await.unwrap();

        assert!(uow.get_appointment(apt.id).await.unwrap().is_some());
        assert!(store.get_appointment(apt.id).await.unwrap().is_none());
        assert!(store.activities().await.is_empty());

        uow.commit().await.unwrap();
        assert!(store.get_appointment(apt.id).await.unwrap().is_some());
        assert_eq!(store.activities().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_applies_nothing() {
        let store = InMemoryClinicStore::new();
        let apt = appointment(Uuid::new_v4(), ten_o_clock(), 30);

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_appointment(&apt).await.unwrap();
        }

        assert_eq!(store.count_appointments().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_rejects_overlapping_active_appointments() {
        let store = InMemoryClinicStore::new();
        let doctor = Uuid::new_v4();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_appointment(&appointment(doctor, ten_o_clock(), 30)).await.unwrap();
        second.insert_appointment(&appointment(doctor, ten_o_clock() + Duration::minutes(15), 30)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.count_appointments().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_window_listing_sees_own_staged_updates() {
        let store = InMemoryClinicStore::new();
        let doctor = Uuid::new_v4();
        let apt = appointment(doctor, ten_o_clock(), 30);

        let mut uow = store.begin().await.unwrap();
        uow.insert_appointment(&apt).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let mut moved = apt.clone();
        moved.scheduled_start_time = ten_o_clock() + Duration::hours(2);
        uow.update_appointment(&moved).await.unwrap();

        let at_ten = uow.list_appointments_by_doctor_and_window(
            doctor, ten_o_clock(), ten_o_clock() + Duration::minutes(30),
        ).await.unwrap();
        assert!(at_ten.is_empty());

        let at_noon = uow.list_appointments_by_doctor_and_window(
            doctor, ten_o_clock() + Duration::hours(2), ten_o_clock() + Duration::hours(3),
        ).await.unwrap();
        assert_eq!(at_noon.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_activity_is_newest_first_and_limited() {
        let store = InMemoryClinicStore::new();
        let mut uow = store.begin().await.unwrap();
        for i in 0..4 {
            let mut record = ActivityRecord::new(
                shared_models::ActivityCategory::Appointment, format!("a{}", i), "",
            );
            record.timestamp = ten_o_clock() + Duration::minutes(i);
            uow.insert_activity(&record).await.unwrap();
        }
        uow.commit().await.unwrap();

        let recent = store.list_recent_activity(3).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["a3", "a2", "a1"]);
    }
}
