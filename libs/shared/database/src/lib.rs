pub mod memory;
pub mod postgrest;
pub mod store;
pub mod supabase;

use std::sync::Arc;
use tracing::{info, warn};

use shared_config::AppConfig;

pub use memory::InMemoryClinicStore;
pub use postgrest::SupabaseClinicStore;
pub use store::{ClinicStore, UnitOfWork, UpcomingQuery};

/// Pick the store backend for a configuration: Supabase when fully
/// configured, otherwise a fresh in-memory store.
pub fn store_from_config(config: &AppConfig) -> Arc<dyn ClinicStore> {
    if config.is_configured() {
        info!("Using Supabase clinic store at {}", config.supabase_url);
        Arc::new(SupabaseClinicStore::new(config))
    } else {
        warn!("Supabase not configured, using in-memory clinic store");
        Arc::new(InMemoryClinicStore::new())
    }
}
