// =====================================================================================
// DASHBOARD CELL MODELS
// =====================================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_config::AppConfig;
use shared_models::{ActivityRecord, StoreError, UpcomingAppointment};

pub const UPCOMING_LIMIT: usize = 5;
pub const UPCOMING_HORIZON_DAYS: i64 = 7;
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub patients_count: u64,
    pub doctors_count: u64,
    pub appointments_count: u64,
    pub medical_records_count: u64,
}

/// Recomputed on every request. The sub-queries run concurrently without a
/// shared read view, so the parts may reflect slightly different moments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub stats: DashboardStats,
    pub upcoming_appointments: Vec<UpcomingAppointment>,
    pub recent_activities: Vec<ActivityRecord>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub upcoming_limit: usize,
    pub upcoming_horizon: Duration,
    pub recent_activity_limit: usize,
    pub timeout: std::time::Duration,
}

impl DashboardSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            upcoming_limit: UPCOMING_LIMIT,
            upcoming_horizon: Duration::days(UPCOMING_HORIZON_DAYS),
            recent_activity_limit: RECENT_ACTIVITY_LIMIT,
            timeout: config.dashboard_timeout(),
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::local())
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Dashboard query {query} failed: {source}")]
    Aggregation {
        query: &'static str,
        source: StoreError,
    },

    #[error("Dashboard snapshot did not finish within {timeout_ms} ms")]
    DeadlineExceeded { timeout_ms: u64 },
}
