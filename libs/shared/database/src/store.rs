// libs/shared/database/src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::{ActivityRecord, Appointment, StoreError, UpcomingAppointment};

/// Filter for the dashboard's upcoming-appointment listing. Stores apply the
/// window, the active-status filter, the ascending order and the limit
/// themselves rather than returning everything for in-memory filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpcomingQuery {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub limit: usize,
}

/// The persistent store collaborator. Plain reads run outside any unit of
/// work; every write goes through [`UnitOfWork`].
#[async_trait]
pub trait ClinicStore: Send + Sync {
    /// Open a unit of work. Writes staged on it become visible to other
    /// readers only when [`UnitOfWork::commit`] succeeds; dropping the handle
    /// without committing discards them.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn count_appointments(&self) -> Result<u64, StoreError>;

    async fn count_patients(&self) -> Result<u64, StoreError>;

    async fn count_doctors(&self) -> Result<u64, StoreError>;

    async fn count_medical_records(&self) -> Result<u64, StoreError>;

    async fn list_upcoming_appointments(
        &self,
        query: UpcomingQuery,
    ) -> Result<Vec<UpcomingAppointment>, StoreError>;

    /// Most recent activity first.
    async fn list_recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>, StoreError>;
}

/// Transactional scope handed explicitly to every collaborator taking part
/// in a booking operation. Reads observe the unit's own staged writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn get_appointment(&mut self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Appointments of `doctor_id` in any status whose window intersects
    /// `[start, end)`.
    async fn list_appointments_by_doctor_and_window(
        &mut self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn patient_exists(&mut self, patient_id: Uuid) -> Result<bool, StoreError>;

    async fn doctor_exists(&mut self, doctor_id: Uuid) -> Result<bool, StoreError>;

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn insert_activity(&mut self, activity: &ActivityRecord) -> Result<(), StoreError>;

    /// Apply every staged write atomically. On error nothing was applied.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
