pub mod telemetry;
pub mod test_utils;

pub use telemetry::init_tracing;
