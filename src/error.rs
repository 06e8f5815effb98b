use std::fmt;

/// A configured path that could not be turned into an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFailure {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for PathFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.path, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FsEventsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event stream already started")]
    AlreadyStarted,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to resolve {} path(s): {}", failures.len(), join_failures(failures))]
    PathResolution { failures: Vec<PathFailure> },

    #[error("failed to create event stream")]
    CreateFailed,

    #[error("failed to create dispatch queue")]
    QueueFailed,

    #[error("failed to start event stream")]
    StartFailed,

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, FsEventsError>;

fn join_failures(failures: &[PathFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
