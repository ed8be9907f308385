pub mod health;
pub mod metrics;

pub use health::WorkerHealth;
pub use metrics::{Metrics, MetricsSnapshot};
