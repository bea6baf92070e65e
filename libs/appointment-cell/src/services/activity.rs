use tracing::debug;

use shared_database::UnitOfWork;
use shared_models::{ActivityCategory, ActivityRecord};

use crate::models::{Appointment, AppointmentError};

pub const TITLE_SCHEDULED: &str = "New Appointment Scheduled";
pub const TITLE_UPDATED: &str = "Appointment Updated";
pub const TITLE_CANCELLED: &str = "Appointment Cancelled";
pub const TITLE_STATUS_UPDATED: &str = "Appointment Status Updated";

/// Appends audit records inside the caller's unit of work, so they commit
/// or roll back together with the appointment write.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivityLogService;

impl ActivityLogService {
    pub fn new() -> Self {
        Self
    }

    pub async fn record(
        &self,
        uow: &mut dyn UnitOfWork,
        category: ActivityCategory,
        title: &str,
        description: String,
    ) -> Result<ActivityRecord, AppointmentError> {
        let activity = ActivityRecord::new(category, title, description);
        uow.insert_activity(&activity).await?;
        debug!("Staged activity {} ({})", activity.id, activity.title);
        Ok(activity)
    }

    pub async fn appointment_scheduled(
        &self,
        uow: &mut dyn UnitOfWork,
        appointment: &Appointment,
    ) -> Result<ActivityRecord, AppointmentError> {
        let description = format!(
            "Appointment for patient {} with doctor {} on {} has been scheduled.",
            appointment.patient_id,
            appointment.doctor_id,
            appointment.scheduled_start_time.to_rfc3339(),
        );
        self.record(uow, ActivityCategory::Appointment, TITLE_SCHEDULED, description).await
    }

    pub async fn appointment_updated(
        &self,
        uow: &mut dyn UnitOfWork,
        appointment: &Appointment,
        changed_fields: &[&str],
    ) -> Result<ActivityRecord, AppointmentError> {
        let mut description = format!(
            "Appointment {} has been updated. New status: {}.",
            appointment.id, appointment.status,
        );
        if !changed_fields.is_empty() {
            description.push_str(&format!(" Changed: {}.", changed_fields.join(", ")));
        }
        self.record(uow, ActivityCategory::Appointment, TITLE_UPDATED, description).await
    }

    pub async fn appointment_cancelled(
        &self,
        uow: &mut dyn UnitOfWork,
        appointment: &Appointment,
    ) -> Result<ActivityRecord, AppointmentError> {
        let description = format!(
            "Appointment {} for patient {} with doctor {} on {} has been cancelled.",
            appointment.id,
            appointment.patient_id,
            appointment.doctor_id,
            appointment.scheduled_start_time.to_rfc3339(),
        );
        self.record(uow, ActivityCategory::Appointment, TITLE_CANCELLED, description).await
    }

    pub async fn status_updated(
        &self,
        uow: &mut dyn UnitOfWork,
        appointment: &Appointment,
    ) -> Result<ActivityRecord, AppointmentError> {
        let description = format!(
            "Appointment {} has been updated. New status: {}.",
            appointment.id, appointment.status,
        );
        self.record(uow, ActivityCategory::Appointment, TITLE_STATUS_UPDATED, description).await
    }
}
