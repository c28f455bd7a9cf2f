use thiserror::Error;

/// Refusals surfaced to the user by the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("unknown project {0}")]
    UnknownProject(String),

    #[error("cannot delete {name} while it is running; stop it first")]
    DeleteWhileRunning { name: String },

    #[error("{name} is already {status}")]
    AlreadyActive { name: String, status: &'static str },

    #[error("{name} is not running")]
    NotRunning { name: String },
}

/// Failures of the text-generation collaborator. Never escape the generator adapter.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    Unavailable,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response contained no text")]
    EmptyResponse,
}
