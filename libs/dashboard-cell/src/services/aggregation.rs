// =====================================================================================
// DASHBOARD AGGREGATION SERVICE
// =====================================================================================

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use shared_database::{ClinicStore, UpcomingQuery};
use shared_models::StoreError;

use crate::models::{DashboardError, DashboardSettings, DashboardSnapshot, DashboardStats};

pub struct DashboardAggregationService {
    store: Arc<dyn ClinicStore>,
    settings: DashboardSettings,
}

impl DashboardAggregationService {
    pub fn new(store: Arc<dyn ClinicStore>, settings: DashboardSettings) -> Self {
        Self { store, settings }
    }

    /// Run every dashboard query concurrently and join the results. The first
    /// failure fails the snapshot and drops the queries still in flight; so
    /// does the deadline.
    #[instrument(skip(self))]
    pub async fn get_snapshot(&self) -> Result<DashboardSnapshot, DashboardError> {
        let started = Instant::now();
        let now = Utc::now();
        let upcoming_query = UpcomingQuery {
            from: now,
            until: now + self.settings.upcoming_horizon,
            limit: self.settings.upcoming_limit,
        };
        let store = self.store.as_ref();

        let fan_out = async {
            futures::try_join!(
                timed("count_patients", store.count_patients()),
                timed("count_doctors", store.count_doctors()),
                timed("count_appointments", store.count_appointments()),
                timed("count_medical_records", store.count_medical_records()),
                timed("list_upcoming_appointments", store.list_upcoming_appointments(upcoming_query)),
                timed(
                    "list_recent_activity",
                    store.list_recent_activity(self.settings.recent_activity_limit),
                ),
            )
        };

        let joined = match tokio::time::timeout(self.settings.timeout, fan_out).await {
            Ok(joined) => joined,
            Err(_) => {
                let timeout_ms = u64::try_from(self.settings.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!("Dashboard snapshot exceeded its {} ms deadline", timeout_ms);
                return Err(DashboardError::DeadlineExceeded { timeout_ms });
            }
        };

        let (
            patients_count,
            doctors_count,
            appointments_count,
            medical_records_count,
            upcoming_appointments,
            recent_activities,
        ) = joined?;

        info!("Dashboard snapshot built in {} ms", started.elapsed().as_millis());

        Ok(DashboardSnapshot {
            stats: DashboardStats {
                patients_count,
                doctors_count,
                appointments_count,
                medical_records_count,
            },
            upcoming_appointments,
            recent_activities,
            generated_at: now,
        })
    }
}

async fn timed<T, F>(query: &'static str, fut: F) -> Result<T, DashboardError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let result = fut.await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(value) => {
            debug!(query, elapsed_ms, "Dashboard query finished");
            Ok(value)
        }
        Err(source) => {
            error!(query, elapsed_ms, "Dashboard query failed: {}", source);
            Err(DashboardError::Aggregation { query, source })
        }
    }
}
