use thiserror::Error;

/// Error taxonomy of the voting pipeline.
///
/// `Transport` and `Persistence` are retryable from the caller's point of
/// view and carry the upstream cause; the rest map onto caller mistakes or
/// exhausted limits.
#[derive(Error, Debug)]
pub enum VotingError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("resource limit reached: {0}")]
    ResourceLimit(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("queue transport failure: {0}")]
    Transport(#[from] lapin::Error),

    #[error("store failure: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("store call timed out: {0}")]
    StoreTimeout(&'static str),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VotingError {
    /// Stable label for the `voting_errors_total{error_type}` counter.
    pub fn metric_label(&self) -> &'static str {
        match self {
            VotingError::Validation(_) => "validation_error",
            VotingError::ResourceLimit(_) => "resource_limit_error",
            VotingError::NotFound(_) => "not_found_error",
            VotingError::Conflict(_) => "conflict_error",
            VotingError::Transport(_) => "queue_publish_error",
            VotingError::Persistence(_) => "database_error",
            VotingError::StoreTimeout(_) => "database_timeout_error",
            VotingError::Serialization(_) => "serialization_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, VotingError>;
