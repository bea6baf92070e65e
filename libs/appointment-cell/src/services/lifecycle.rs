// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed. Moving to the current
    /// status is not a transition.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Re-booking the same record
            AppointmentStatus::Cancelled => vec![AppointmentStatus::Scheduled],
            AppointmentStatus::Completed => vec![],
        }
    }

    /// Completed appointments reject every modification, cancellation included.
    pub fn ensure_mutable(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        if appointment.status.is_terminal() {
            warn!("Rejected modification of {} appointment {}", appointment.status, appointment.id);
            return Err(AppointmentError::ImmutableState {
                id: appointment.id,
                status: appointment.status,
            });
        }
        Ok(())
    }

    /// A transition that moves the appointment back into the active set has
    /// to win its window again.
    pub fn requires_conflict_check(&self, from: AppointmentStatus, to: AppointmentStatus) -> bool {
        !from.is_active() && to.is_active()
    }
}
