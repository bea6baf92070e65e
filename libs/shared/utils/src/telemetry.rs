use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "info,appointment_cell=debug,dashboard_cell=debug";

/// Install the global subscriber: `RUST_LOG` when set, otherwise
/// `default_filter`. Returns false when a subscriber was already installed,
/// which is expected when several tests in one binary call this.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
