pub mod activity;
pub mod booking;
pub mod conflict;
pub mod consistency;
pub mod lifecycle;

pub use activity::ActivityLogService;
pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use consistency::{SchedulingGuard, SchedulingLockManager};
pub use lifecycle::AppointmentLifecycleService;
