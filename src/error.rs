use std::path::PathBuf;
use thiserror::Error;

/// Message used when a failure carries nothing presentable.
pub const GENERIC_FAILURE: &str = "Failed to render or send email";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("{path:?} is not inside template root {root:?}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("{0:?} is not a template file")]
    NotTemplate(PathBuf),
    #[error("{0:?} contains a non UTF-8 component")]
    NonUtf8(PathBuf),
}

/// Failure while generating or writing the artifacts of one template.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Failed to render artifact: {0}")]
    Render(String),
    #[error("Failed to write {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal failure of a preview API request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Email path is required")]
    MissingPath,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Email template not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: invalid or missing API key")]
    Unauthorized,
    #[error("Too many requests, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Failed to render email: {0}")]
    Upstream(String),
    #[error("{0}")]
    Handler(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::MissingPath | ApiError::InvalidBody(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::NotFound(_) => 404,
            ApiError::RateLimited { .. } => 429,
            ApiError::Upstream(_) | ApiError::Handler(_) => 500,
        }
    }

    /// Builds a handler failure, falling back to the generic message when
    /// the underlying error has nothing to say.
    pub fn handler(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            ApiError::Handler(GENERIC_FAILURE.to_string())
        } else {
            ApiError::Handler(message)
        }
    }
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Failed to spawn send command {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Send command {command:?} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to create filesystem watcher: {0}")]
    Create(#[source] notify::Error),
    #[error("Failed to watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::MissingPath.status(), 400);
        assert_eq!(ApiError::InvalidBody("x".into()).status(), 400);
        assert_eq!(ApiError::Unauthorized.status(), 401);
        assert_eq!(ApiError::NotFound("x".into()).status(), 404);
        assert_eq!(ApiError::RateLimited { retry_after_ms: 5 }.status(), 429);
        assert_eq!(ApiError::Upstream("boom".into()).status(), 500);
        assert_eq!(ApiError::Handler("boom".into()).status(), 500);
    }

    #[test]
    fn test_handler_message_normalized() {
        assert_eq!(
            ApiError::handler("  "),
            ApiError::Handler(GENERIC_FAILURE.to_string())
        );
        assert_eq!(
            ApiError::handler("smtp down"),
            ApiError::Handler("smtp down".to_string())
        );
    }
}
