// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{ParseEnumError, StoreError};

pub use shared_models::{Appointment, AppointmentStatus, AppointmentType};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_type: AppointmentType,
    pub scheduled_start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub location: String,
    pub notes: Option<String>,
    pub patient_history: Option<String>,
}

/// Partial update. Only the fields that are present are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentPatch {
    pub doctor_id: Option<Uuid>,
    pub appointment_type: Option<AppointmentType>,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub status: Option<AppointmentStatus>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub patient_history: Option<String>,
}

impl AppointmentPatch {
    pub fn is_empty(&self) -> bool {
        self.doctor_id.is_none()
            && self.appointment_type.is_none()
            && self.scheduled_start_time.is_none()
            && self.duration_minutes.is_none()
            && self.status.is_none()
            && self.location.is_none()
            && self.notes.is_none()
            && self.patient_history.is_none()
    }
}

// ==============================================================================
// SETTINGS & METRICS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    /// Deadline for one coordinator operation, lock wait and commit included.
    pub operation_timeout: Duration,
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            operation_timeout: config.booking_timeout(),
        }
    }
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self::from_config(&AppConfig::local())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingMetrics {
    pub bookings_attempted: u64,
    pub bookings_succeeded: u64,
    pub conflicts_rejected: u64,
    pub bookings_failed: u64,
    pub lock_contention_events: u64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Caller-facing classification of [`AppointmentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Conflict,
    NotFound,
    ImmutableState,
    Transaction,
}

#[derive(Debug, Clone, Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment conflicts with existing booking: {reason}")]
    ConflictDetected {
        reason: String,
        conflicting: Vec<Uuid>,
    },

    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Appointment {id} cannot be modified in status {status}")]
    ImmutableState {
        id: Uuid,
        status: AppointmentStatus,
    },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Transaction failed: {0}")]
    TransactionError(String),

    #[error("{operation} did not finish within {timeout_ms} ms")]
    DeadlineExceeded {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl AppointmentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppointmentError::ValidationError(_)
            | AppointmentError::InvalidStatusTransition { .. } => ErrorCategory::Validation,
            AppointmentError::ConflictDetected { .. } => ErrorCategory::Conflict,
            AppointmentError::NotFound(_) => ErrorCategory::NotFound,
            AppointmentError::ImmutableState { .. } => ErrorCategory::ImmutableState,
            AppointmentError::TransactionError(_)
            | AppointmentError::DeadlineExceeded { .. } => ErrorCategory::Transaction,
        }
    }
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => AppointmentError::ConflictDetected {
                reason,
                conflicting: Vec::new(),
            },
            other => AppointmentError::TransactionError(other.to_string()),
        }
    }
}

impl From<ParseEnumError> for AppointmentError {
    fn from(err: ParseEnumError) -> Self {
        AppointmentError::ValidationError(err.to_string())
    }
}
