pub mod scoring;
pub mod types;

pub use scoring::trend_score;
pub use types::*;
