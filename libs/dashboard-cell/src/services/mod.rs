pub mod aggregation;

pub use aggregation::DashboardAggregationService;
