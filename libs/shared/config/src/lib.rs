use std::env;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BOOKING_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_DASHBOARD_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub booking_timeout_ms: u64,
    pub dashboard_timeout_ms: u64,
}

impl AppConfig {
    /// Load a `.env` file if one exists, then read the environment.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            booking_timeout_ms: parse_millis(
                "BOOKING_TIMEOUT_MS",
                env::var("BOOKING_TIMEOUT_MS").ok(),
                DEFAULT_BOOKING_TIMEOUT_MS,
            ),
            dashboard_timeout_ms: parse_millis(
                "DASHBOARD_TIMEOUT_MS",
                env::var("DASHBOARD_TIMEOUT_MS").ok(),
                DEFAULT_DASHBOARD_TIMEOUT_MS,
            ),
        };

        if !config.is_configured() {
            warn!("Store not fully configured - scheduling will run against the in-memory store");
        }

        config
    }

    /// Configuration with no remote store and default deadlines.
    pub fn local() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            booking_timeout_ms: DEFAULT_BOOKING_TIMEOUT_MS,
            dashboard_timeout_ms: DEFAULT_DASHBOARD_TIMEOUT_MS,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }

    pub fn booking_timeout(&self) -> Duration {
        Duration::from_millis(self.booking_timeout_ms)
    }

    pub fn dashboard_timeout(&self) -> Duration {
        Duration::from_millis(self.dashboard_timeout_ms)
    }
}

fn parse_millis(name: &str, raw: Option<String>, default: u64) -> u64 {
    match raw {
        None => default,
        Some(value) => match value.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => ms,
            _ => {
                warn!("{} has invalid value {:?}, using default {} ms", name, value, default);
                default
            }
        },
    }
}
