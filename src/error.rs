use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Job {0} already exists")]
    DuplicateJob(uuid::Uuid),

    #[error("No running job with execution id {0}")]
    JobNotRunning(u64),

    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("User store error: {0}")]
    UserStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
