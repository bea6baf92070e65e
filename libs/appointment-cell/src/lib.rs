// =====================================================================================
// APPOINTMENT CELL - SCHEDULING CORE
// =====================================================================================
//
// Conflict detection, the appointment status lifecycle, per-doctor scheduling
// locks and the transactional booking coordinator that ties them together.
//
// =====================================================================================

pub mod models;
pub mod services;

pub use models::{
    AppointmentError, AppointmentPatch, CreateAppointmentRequest, ErrorCategory,
    SchedulingMetrics, SchedulingRules,
};

pub use services::{
    ActivityLogService, AppointmentBookingService, AppointmentLifecycleService,
    ConflictDetectionService, SchedulingLockManager,
};
