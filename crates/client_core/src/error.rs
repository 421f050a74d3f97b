use shared::{
    domain::QuestionId,
    error::{ApiError, ErrorCode},
    form::ValidationErrors,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Local validation failed; nothing was sent.
    #[error("answers failed validation: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    NotFound(String),
    /// The server answered with an error envelope.
    #[error("server rejected request ({status}): {}", error.message)]
    Api { status: u16, error: ApiError },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("question {0} is not part of this assessment")]
    UnknownQuestion(QuestionId),
    #[error("draft store failure: {0:#}")]
    Drafts(anyhow::Error),
}

impl ClientError {
    /// Wire error code when the failure came from the server.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { error, .. } => Some(error.code),
            Self::NotFound(_) => Some(ErrorCode::NotFound),
            _ => None,
        }
    }
}
