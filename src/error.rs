use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Title {0} is already registered")]
    AlreadyExists(i64),

    #[error("Title {0} not found")]
    NotFound(i64),

    #[error("Message broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Unprocessable message: {0}")]
    UnprocessableMessage(String),

    #[error("Failed to connect to message broker after {attempts} attempts: {reason}")]
    FatalStartup { attempts: u32, reason: String },

    #[error("PostgreSQL error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External fetch error: {0}")]
    ExternalFetch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Errors that retrying the same message can never fix. The consumer
    /// acknowledges and drops the message instead of requeueing it.
    pub fn is_terminal_for_message(&self) -> bool {
        matches!(
            self,
            PipelineError::NotFound(_)
                | PipelineError::UnprocessableMessage(_)
                | PipelineError::AlreadyExists(_)
                | PipelineError::ExternalFetch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
