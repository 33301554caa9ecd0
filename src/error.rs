use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InspectError>;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Not a git repository: {}", path.display())]
    NotAGitRepository { path: PathBuf },
    #[error("Git command failed: `{command}`: {stderr}")]
    GitCommand { command: String, stderr: String },
    #[error("Git command timed out after {}s: `{command}`", timeout.as_secs())]
    GitTimeout { command: String, timeout: Duration },
    #[error("Analysis cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Git error: {0}")]
    Git(#[from] Box<gix::open::Error>),
    #[error("Object find error: {0}")]
    ObjectFind(#[from] Box<gix::object::find::existing::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Reference find error: {0}")]
    RefFind(#[from] Box<gix::reference::find::existing::Error>),
    #[error("Head peel error: {0}")]
    HeadPeel(#[from] Box<gix::head::peel::to_commit::Error>),
}

impl InspectError {
    /// Errors worth a second attempt with identical arguments.
    pub fn is_transient(&self) -> bool {
        matches!(self, InspectError::GitTimeout { .. })
    }

    /// Errors raised by invalid settings, before any git invocation.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            InspectError::Config(_) | InspectError::Pattern { .. } | InspectError::InvalidDate(_)
        )
    }
}

// Manual From implementations for unboxed to boxed conversions
impl From<gix::open::Error> for InspectError {
    fn from(err: gix::open::Error) -> Self {
        InspectError::Git(Box::new(err))
    }
}

impl From<gix::object::find::existing::Error> for InspectError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        InspectError::ObjectFind(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for InspectError {
    fn from(err: gix::object::commit::Error) -> Self {
        InspectError::Commit(Box::new(err))
    }
}

impl From<gix::reference::find::existing::Error> for InspectError {
    fn from(err: gix::reference::find::existing::Error) -> Self {
        InspectError::RefFind(Box::new(err))
    }
}

impl From<gix::head::peel::to_commit::Error> for InspectError {
    fn from(err: gix::head::peel::to_commit::Error) -> Self {
        InspectError::HeadPeel(Box::new(err))
    }
}
