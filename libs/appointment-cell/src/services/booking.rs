// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_database::{ClinicStore, UnitOfWork};
use shared_models::checked_window_end;

use crate::models::{
    Appointment, AppointmentError, AppointmentPatch, AppointmentStatus,
    CreateAppointmentRequest, SchedulingMetrics, SchedulingRules,
};
use crate::services::activity::ActivityLogService;
use crate::services::conflict::ConflictDetectionService;
use crate::services::consistency::{SchedulingGuard, SchedulingLockManager};
use crate::services::lifecycle::AppointmentLifecycleService;

#[derive(Debug, Default)]
struct MetricsRecorder {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    conflicts: AtomicU64,
    failed: AtomicU64,
}

impl MetricsRecorder {
    fn observe<T>(&self, result: &Result<T, AppointmentError>) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(_) => &self.succeeded,
            Err(AppointmentError::ConflictDetected { .. }) => &self.conflicts,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// An open unit of work over one appointment, with its doctor's schedule locked.
struct LockedUnit {
    guard: SchedulingGuard,
    uow: Box<dyn UnitOfWork>,
    appointment: Appointment,
}

/// Transactional booking coordinator. Every write operation runs as one unit
/// of work under the scheduling locks of the doctors it touches and under the
/// configured deadline.
pub struct AppointmentBookingService {
    store: Arc<dyn ClinicStore>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    activity_service: ActivityLogService,
    locks: SchedulingLockManager,
    rules: SchedulingRules,
    metrics: MetricsRecorder,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn ClinicStore>, rules: SchedulingRules) -> Self {
        Self {
            store,
            conflict_service: ConflictDetectionService::new(),
            lifecycle_service: AppointmentLifecycleService::new(),
            activity_service: ActivityLogService::new(),
            locks: SchedulingLockManager::new(),
            rules,
            metrics: MetricsRecorder::default(),
        }
    }

    pub fn metrics(&self) -> SchedulingMetrics {
        SchedulingMetrics {
            bookings_attempted: self.metrics.attempted.load(Ordering::Relaxed),
            bookings_succeeded: self.metrics.succeeded.load(Ordering::Relaxed),
            conflicts_rejected: self.metrics.conflicts.load(Ordering::Relaxed),
            bookings_failed: self.metrics.failed.load(Ordering::Relaxed),
            lock_contention_events: self.locks.contention_events(),
        }
    }

    // ==============================================================================
    // PUBLIC OPERATIONS
    // ==============================================================================

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, patient_id = %request.patient_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        actor_id: Uuid,
    ) -> Result<Uuid, AppointmentError> {
        let result = self
            .with_deadline("create_appointment", self.create_locked(request, actor_id))
            .await;
        self.metrics.observe(&result);
        result
    }

    #[instrument(skip(self, patch))]
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let result = self
            .with_deadline("update_appointment", self.update_locked(appointment_id, patch, actor_id))
            .await;
        self.metrics.observe(&result);
        result
    }

    /// Cancellation is a status change; appointments are never deleted.
    #[instrument(skip(self))]
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let result = self
            .with_deadline("cancel_appointment", self.cancel_locked(appointment_id, actor_id))
            .await;
        self.metrics.observe(&result);
        result
    }

    #[instrument(skip(self))]
    pub async fn set_appointment_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let result = self
            .with_deadline(
                "set_appointment_status",
                self.set_status_locked(appointment_id, new_status, actor_id),
            )
            .await;
        self.metrics.observe(&result);
        result
    }

    #[instrument(skip(self))]
    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.with_deadline("get_appointment", async {
            self.store
                .get_appointment(appointment_id)
                .await?
                .ok_or(AppointmentError::NotFound(appointment_id))
        })
        .await
    }

    // ==============================================================================
    // OPERATION BODIES
    // ==============================================================================

    async fn create_locked(
        &self,
        request: CreateAppointmentRequest,
        actor_id: Uuid,
    ) -> Result<Uuid, AppointmentError> {
        validate_create_request(&request)?;

        let guard = self.locks.acquire(&[request.doctor_id]).await;
        let mut uow = self.store.begin().await?;
        let outcome = self.create_in_unit(uow.as_mut(), &request, actor_id).await;
        let result = self.finish(uow, outcome).await;
        drop(guard);

        let appointment = result?;
        info!("Appointment {} scheduled for doctor {} at {}",
              appointment.id, appointment.doctor_id, appointment.scheduled_start_time);
        Ok(appointment.id)
    }

    async fn create_in_unit(
        &self,
        uow: &mut dyn UnitOfWork,
        request: &CreateAppointmentRequest,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        if !uow.patient_exists(request.patient_id).await? {
            return Err(AppointmentError::ValidationError(format!(
                "patient {} does not exist", request.patient_id
            )));
        }
        self.ensure_doctor_exists(uow, request.doctor_id).await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            appointment_type: request.appointment_type,
            scheduled_start_time: request.scheduled_start_time,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Scheduled,
            location: request.location.clone(),
            notes: request.notes.clone(),
            patient_history: request.patient_history.clone(),
            created_by: actor_id,
            updated_by: actor_id,
            created_at: now,
            updated_at: now,
        };

        self.conflict_service
            .ensure_slot_available(
                uow,
                appointment.doctor_id,
                appointment.scheduled_start_time,
                appointment.scheduled_end_time(),
                None,
            )
            .await?;

        uow.insert_appointment(&appointment).await?;
        self.activity_service.appointment_scheduled(uow, &appointment).await?;
        Ok(appointment)
    }

    async fn update_locked(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        if patch.is_empty() {
            return Err(AppointmentError::ValidationError("update contains no changes".to_string()));
        }
        validate_patch(&patch)?;

        let LockedUnit { guard, mut uow, appointment } =
            self.open_locked_unit(appointment_id, patch.doctor_id).await?;
        let outcome = self.update_in_unit(uow.as_mut(), appointment, &patch, actor_id).await;
        let result = self.finish(uow, outcome).await;
        drop(guard);

        let updated = result?;
        info!("Appointment {} updated by {}", updated.id, actor_id);
        Ok(updated)
    }

    async fn update_in_unit(
        &self,
        uow: &mut dyn UnitOfWork,
        current: Appointment,
        patch: &AppointmentPatch,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle_service.ensure_mutable(&current)?;

        let mut updated = current.clone();
        let mut changed: Vec<&str> = Vec::new();

        if let Some(doctor_id) = patch.doctor_id.filter(|d| *d != current.doctor_id) {
            self.ensure_doctor_exists(uow, doctor_id).await?;
            updated.doctor_id = doctor_id;
            changed.push("doctor");
        }
        if let Some(start) = patch.scheduled_start_time.filter(|s| *s != current.scheduled_start_time) {
            updated.scheduled_start_time = start;
            changed.push("scheduled_start_time");
        }
        if let Some(minutes) = patch.duration_minutes.filter(|m| *m != current.duration_minutes) {
            updated.duration_minutes = minutes;
            changed.push("duration_minutes");
        }
        if let Some(status) = patch.status.filter(|s| *s != current.status) {
            self.lifecycle_service.validate_status_transition(current.status, status)?;
            updated.status = status;
            changed.push("status");
        }
        if let Some(kind) = patch.appointment_type.filter(|k| *k != current.appointment_type) {
            updated.appointment_type = kind;
            changed.push("appointment_type");
        }
        if let Some(location) = patch.location.as_ref().filter(|l| **l != current.location) {
            updated.location = location.clone();
            changed.push("location");
        }
        if let Some(notes) = patch.notes.as_ref().filter(|n| Some(*n) != current.notes.as_ref()) {
            updated.notes = Some(notes.clone());
            changed.push("notes");
        }
        if let Some(history) = patch.patient_history.as_ref()
            .filter(|h| Some(*h) != current.patient_history.as_ref())
        {
            updated.patient_history = Some(history.clone());
            changed.push("patient_history");
        }

        validate_window(updated.scheduled_start_time, updated.duration_minutes)?;

        let window_changed = updated.doctor_id != current.doctor_id
            || updated.scheduled_start_time != current.scheduled_start_time
            || updated.duration_minutes != current.duration_minutes;
        let reactivated = self.lifecycle_service.requires_conflict_check(current.status, updated.status);

        if updated.is_active() && (window_changed || reactivated) {
            self.conflict_service
                .ensure_slot_available(
                    uow,
                    updated.doctor_id,
                    updated.scheduled_start_time,
                    updated.scheduled_end_time(),
                    Some(updated.id),
                )
                .await?;
        }

        updated.updated_by = actor_id;
        updated.updated_at = Utc::now();

        uow.update_appointment(&updated).await?;
        self.activity_service.appointment_updated(uow, &updated, &changed).await?;
        Ok(updated)
    }

    async fn cancel_locked(
        &self,
        appointment_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let LockedUnit { guard, mut uow, appointment } =
            self.open_locked_unit(appointment_id, None).await?;

        if appointment.status == AppointmentStatus::Cancelled {
            debug!("Appointment {} is already cancelled", appointment_id);
            self.discard(uow).await;
            drop(guard);
            return Ok(appointment);
        }

        let outcome = self.cancel_in_unit(uow.as_mut(), appointment, actor_id).await;
        let result = self.finish(uow, outcome).await;
        drop(guard);

        let cancelled = result?;
        info!("Appointment {} cancelled by {}", cancelled.id, actor_id);
        Ok(cancelled)
    }

    async fn cancel_in_unit(
        &self,
        uow: &mut dyn UnitOfWork,
        mut appointment: Appointment,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle_service.ensure_mutable(&appointment)?;

        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_by = actor_id;
        appointment.updated_at = Utc::now();

        uow.update_appointment(&appointment).await?;
        self.activity_service.appointment_cancelled(uow, &appointment).await?;
        Ok(appointment)
    }

    async fn set_status_locked(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let LockedUnit { guard, mut uow, appointment } =
            self.open_locked_unit(appointment_id, None).await?;
        let outcome = self.set_status_in_unit(uow.as_mut(), appointment, new_status, actor_id).await;
        let result = self.finish(uow, outcome).await;
        drop(guard);

        let updated = result?;
        info!("Appointment {} moved to {} by {}", updated.id, updated.status, actor_id);
        Ok(updated)
    }

    async fn set_status_in_unit(
        &self,
        uow: &mut dyn UnitOfWork,
        mut appointment: Appointment,
        new_status: AppointmentStatus,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let previous = appointment.status;
        self.lifecycle_service.validate_status_transition(previous, new_status)?;

        if self.lifecycle_service.requires_conflict_check(previous, new_status) {
            self.conflict_service
                .ensure_slot_available(
                    uow,
                    appointment.doctor_id,
                    appointment.scheduled_start_time,
                    appointment.scheduled_end_time(),
                    Some(appointment.id),
                )
                .await?;
        }

        appointment.status = new_status;
        appointment.updated_by = actor_id;
        appointment.updated_at = Utc::now();

        uow.update_appointment(&appointment).await?;
        self.activity_service.status_updated(uow, &appointment).await?;
        Ok(appointment)
    }

    // ==============================================================================
    // UNIT OF WORK PLUMBING
    // ==============================================================================

    /// Lock the schedules the operation touches, then open a unit of work and
    /// load the appointment through it. When the appointment moved to another
    /// doctor between the peek and the lock, start over with the new doctor.
    async fn open_locked_unit(
        &self,
        appointment_id: Uuid,
        target_doctor: Option<Uuid>,
    ) -> Result<LockedUnit, AppointmentError> {
        loop {
            let peeked = self
                .store
                .get_appointment(appointment_id)
                .await?
                .ok_or(AppointmentError::NotFound(appointment_id))?;

            let mut doctors = vec![peeked.doctor_id];
            doctors.extend(target_doctor);
            let guard = self.locks.acquire(&doctors).await;

            let mut uow = self.store.begin().await?;
            let loaded = match uow.get_appointment(appointment_id).await {
                Ok(Some(appointment)) => appointment,
                Ok(None) => {
                    self.discard(uow).await;
                    return Err(AppointmentError::NotFound(appointment_id));
                }
                Err(e) => {
                    self.discard(uow).await;
                    return Err(e.into());
                }
            };

            if loaded.doctor_id == peeked.doctor_id {
                return Ok(LockedUnit { guard, uow, appointment: loaded });
            }

            debug!("Appointment {} moved from doctor {} to {} while locking, retrying",
                   appointment_id, peeked.doctor_id, loaded.doctor_id);
            self.discard(uow).await;
        }
    }

    /// Commit on success, roll back on failure. A failed commit leaves no
    /// trace and is never retried.
    async fn finish<T>(
        &self,
        uow: Box<dyn UnitOfWork>,
        outcome: Result<T, AppointmentError>,
    ) -> Result<T, AppointmentError> {
        match outcome {
            Ok(value) => match uow.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    let e = AppointmentError::from(e);
                    if matches!(e, AppointmentError::ConflictDetected { .. }) {
                        warn!("Rejected at commit: {}", e);
                    } else {
                        error!("Commit failed: {}", e);
                    }
                    Err(e)
                }
            },
            Err(e) => {
                if matches!(e, AppointmentError::ImmutableState { .. }) {
                    warn!("Rejected: {}", e);
                }
                self.discard(uow).await;
                Err(e)
            }
        }
    }

    async fn discard(&self, uow: Box<dyn UnitOfWork>) {
        if let Err(e) = uow.rollback().await {
            error!("Rollback failed: {}", e);
        }
    }

    async fn ensure_doctor_exists(
        &self,
        uow: &mut dyn UnitOfWork,
        doctor_id: Uuid,
    ) -> Result<(), AppointmentError> {
        if !uow.doctor_exists(doctor_id).await? {
            return Err(AppointmentError::ValidationError(format!(
                "doctor {} does not exist", doctor_id
            )));
        }
        Ok(())
    }

    /// Dropping the timed-out future drops its unit of work, which discards
    /// every staged write.
    async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AppointmentError>
    where
        F: Future<Output = Result<T, AppointmentError>>,
    {
        match tokio::time::timeout(self.rules.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(self.rules.operation_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!("{} exceeded its {} ms deadline", operation, timeout_ms);
                Err(AppointmentError::DeadlineExceeded { operation, timeout_ms })
            }
        }
    }
}

// ==============================================================================
// VALIDATION
// ==============================================================================

fn validate_create_request(request: &CreateAppointmentRequest) -> Result<(), AppointmentError> {
    if request.patient_id.is_nil() {
        return Err(AppointmentError::ValidationError("patient_id is required".to_string()));
    }
    if request.doctor_id.is_nil() {
        return Err(AppointmentError::ValidationError("doctor_id is required".to_string()));
    }
    validate_start_time(request.scheduled_start_time)?;
    validate_duration(request.duration_minutes)?;
    validate_window(request.scheduled_start_time, request.duration_minutes)
}

fn validate_patch(patch: &AppointmentPatch) -> Result<(), AppointmentError> {
    if patch.doctor_id.is_some_and(|d| d.is_nil()) {
        return Err(AppointmentError::ValidationError("doctor_id is required".to_string()));
    }
    if let Some(start) = patch.scheduled_start_time {
        validate_start_time(start)?;
    }
    if let Some(minutes) = patch.duration_minutes {
        validate_duration(minutes)?;
    }
    if let (Some(start), Some(minutes)) = (patch.scheduled_start_time, patch.duration_minutes) {
        validate_window(start, minutes)?;
    }
    Ok(())
}

/// The Unix epoch or earlier counts as an unset start time.
fn validate_start_time(start: DateTime<Utc>) -> Result<(), AppointmentError> {
    if start.timestamp() <= 0 {
        return Err(AppointmentError::ValidationError(
            "scheduled_start_time is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_window(start: DateTime<Utc>, minutes: i32) -> Result<(), AppointmentError> {
    if checked_window_end(start, minutes).is_none() {
        return Err(AppointmentError::ValidationError(format!(
            "appointment of {} minutes starting at {} ends out of range", minutes, start
        )));
    }
    Ok(())
}

fn validate_duration(minutes: i32) -> Result<(), AppointmentError> {
    if minutes <= 0 {
        return Err(AppointmentError::ValidationError(format!(
            "duration_minutes must be positive, got {}", minutes
        )));
    }
    Ok(())
}
