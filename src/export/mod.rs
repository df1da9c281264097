pub mod metrics;

pub use metrics::RunMetrics;
