use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::UnitOfWork;

use crate::models::{Appointment, AppointmentError};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    pub fn new() -> Self {
        Self
    }

    /// Active appointments of `doctor_id`, other than `exclude_appointment_id`,
    /// whose window intersects `[start_time, end_time)`. Reads through the
    /// caller's unit of work so its own staged writes are visible.
    pub async fn find_overlapping(
        &self,
        uow: &mut dyn UnitOfWork,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start_time, end_time);

        let candidates = uow
            .list_appointments_by_doctor_and_window(doctor_id, start_time, end_time)
            .await?;

        // The store query may be coarser than the half-open predicate.
        Ok(candidates
            .into_iter()
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .filter(|apt| apt.doctor_id == doctor_id)
            .filter(|apt| apt.is_active())
            .filter(|apt| apt.overlaps(start_time, end_time))
            .collect())
    }

    /// Fails with `ConflictDetected` when the window is taken.
    pub async fn ensure_slot_available(
        &self,
        uow: &mut dyn UnitOfWork,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let conflicting = self
            .find_overlapping(uow, doctor_id, start_time, end_time, exclude_appointment_id)
            .await?;

        if conflicting.is_empty() {
            return Ok(());
        }

        warn!("Conflict detected for doctor {} - {} conflicting appointments",
              doctor_id, conflicting.len());

        let first = &conflicting[0];
        Err(AppointmentError::ConflictDetected {
            reason: format!(
                "doctor {} is booked from {} to {} (appointment {})",
                doctor_id,
                first.scheduled_start_time.to_rfc3339(),
                first.scheduled_end_time().to_rfc3339(),
                first.id,
            ),
            conflicting: conflicting.iter().map(|apt| apt.id).collect(),
        })
    }
}
