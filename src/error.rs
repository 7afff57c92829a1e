use thiserror::Error;

use crate::engine::EngineError;

/// Errors raised by the study core
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    #[error("{code}: a computation is already running")]
    NotRunnable { code: &'static str },

    #[error("upstream service error: {0}")]
    Upstream(EngineError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type StudyResult<T> = Result<T, StudyError>;

impl StudyError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StudyError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        StudyError::Forbidden {
            code,
            message: message.into(),
        }
    }

    /// Named code surfaced to API clients
    pub fn code(&self) -> &'static str {
        match self {
            StudyError::NotFound { .. } => "NOT_FOUND",
            StudyError::Forbidden { code, .. } => code,
            StudyError::NotRunnable { code } => code,
            StudyError::Upstream(_) => "UPSTREAM_ERROR",
            StudyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<EngineError> for StudyError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::NotFound(what) => StudyError::NotFound {
                kind: "result",
                id: what,
            },
            other => StudyError::Upstream(other),
        }
    }
}

impl From<serde_json::Error> for StudyError {
    fn from(error: serde_json::Error) -> Self {
        StudyError::Internal(error.to_string())
    }
}
