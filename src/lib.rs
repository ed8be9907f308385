//! Event-driven trend scoring for movies and shows.
//!
//! The [`producer`] registers titles and publishes view and score-refresh
//! events to RabbitMQ. Two independent workers consume them: one counts views,
//! the other fetches external popularity data and recomputes the trend score.
//! PostgreSQL holds the records.

pub mod broker;
pub mod config;
pub mod core;
pub mod error;
pub mod http_server;
pub mod monitoring;
pub mod producer;
pub mod store;
pub mod tmdb;
pub mod workers;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use http_server::HttpServer;
pub use producer::{EventProducer, Registration};
