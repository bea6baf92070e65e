// =====================================================================================
// DASHBOARD CELL - OPERATIONAL SNAPSHOT
// =====================================================================================
//
// Fans the dashboard's independent store reads out concurrently and joins
// them into one snapshot. Read-only; never touches the booking locks.
//
// =====================================================================================

pub mod models;
pub mod services;

pub use models::{DashboardError, DashboardSettings, DashboardSnapshot, DashboardStats};
pub use services::DashboardAggregationService;
