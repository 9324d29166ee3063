use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("executor error: {message}")]
    Executor {
        message: String,
        code: Option<String>,
    },

    #[error("step handler error: {0}")]
    StepHandler(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn executor(message: impl Into<String>) -> Self {
        Self::Executor {
            message: message.into(),
            code: None,
        }
    }

    pub fn executor_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Executor {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Short reason recorded against a failed unit of work.
    pub fn unit_reason(&self) -> String {
        match self {
            Self::Executor { message, .. } => message.clone(),
            Self::StepHandler(message) => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Executor { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
